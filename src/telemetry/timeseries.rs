// ═══════════════════════════════════════════════════════════════════════════════
// 📦 telemetry/timeseries.rs - Time-Series Points & Writer Worker
// ═══════════════════════════════════════════════════════════════════════════════
// Points are queued without blocking the pipeline. A worker thread writes them
// in batches and retries failures with exponential backoff.
// ═══════════════════════════════════════════════════════════════════════════════

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::Receiver;
use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::error::SinkError;
use crate::state::TelemetryRecord;

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Point / نقطة قياس
// ═══════════════════════════════════════════════════════════════════════════════

/// One time-series sample
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, f64>,
    /// Unix milliseconds
    pub timestamp: i64,
}

impl Point {
    /// Fields: motion_score and baseline when defined, state as 0/1
    pub fn from_record(
        record: &TelemetryRecord,
        measurement: &str,
        tags: &BTreeMap<String, String>,
    ) -> Self {
        let mut fields = BTreeMap::new();
        if let Some(score) = record.motion_score {
            fields.insert("motion_score".to_string(), score);
        }
        if let Some(baseline) = record.baseline {
            fields.insert("baseline".to_string(), baseline);
        }
        fields.insert("state".to_string(), record.state.as_int() as f64);

        Self {
            measurement: measurement.to_string(),
            tags: tags.clone(),
            fields,
            timestamp: record.timestamp,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Writer Trait / واجهة الكاتب
// ═══════════════════════════════════════════════════════════════════════════════

/// Destination for time-series points
pub trait TimeSeriesWriter: Send {
    fn write(&mut self, point: &Point) -> Result<(), SinkError>;

    fn write_batch(&mut self, points: &[Point]) -> Result<(), SinkError> {
        for point in points {
            self.write(point)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Worker / العامل
// ═══════════════════════════════════════════════════════════════════════════════

/// Counters shared between the sink and its worker
#[derive(Debug, Default)]
pub struct SeriesCounters {
    /// Points rejected: queue full or worker gone
    pub dropped: AtomicU64,
    pub written: AtomicU64,
    pub discarded_batches: AtomicU64,
}

/// Write a batch, retrying with backoff. Returns false if it was discarded.
///
/// Once `closing` is set a failed batch is not retried.
pub fn write_with_retry(
    writer: &mut dyn TimeSeriesWriter,
    batch: &[Point],
    policy: &RetryPolicy,
    closing: &AtomicBool,
) -> bool {
    let attempts = policy.max_attempts.max(1);
    for attempt in 0..attempts {
        let error = match writer.write_batch(batch) {
            Ok(()) => return true,
            Err(e) => e,
        };

        let last = attempt + 1 >= attempts || closing.load(Ordering::SeqCst);
        if last {
            warn!(
                points = batch.len(),
                attempts = attempt + 1,
                %error,
                "discarding time-series batch"
            );
            return false;
        }

        let delay = policy.delay_for(attempt);
        warn!(attempt = attempt + 1, retry_in_ms = delay.as_millis() as u64, %error, "time-series write failed");
        thread::sleep(delay);
    }
    false
}

/// Worker loop: batch up queued points until the channel closes
pub fn run_worker(
    mut writer: Box<dyn TimeSeriesWriter>,
    rx: Receiver<Point>,
    batch_size: usize,
    policy: RetryPolicy,
    closing: Arc<AtomicBool>,
    counters: Arc<SeriesCounters>,
) {
    let mut batch = Vec::with_capacity(batch_size);

    while let Ok(first) = rx.recv() {
        batch.push(first);
        while batch.len() < batch_size {
            match rx.try_recv() {
                Ok(point) => batch.push(point),
                Err(_) => break,
            }
        }

        if write_with_retry(writer.as_mut(), &batch, &policy, &closing) {
            counters.written.fetch_add(batch.len() as u64, Ordering::Relaxed);
        } else {
            counters.discarded_batches.fetch_add(1, Ordering::Relaxed);
        }
        batch.clear();

        if rx.is_empty() {
            if let Err(error) = writer.flush() {
                warn!(%error, "time-series flush failed");
            }
        }
    }

    if let Err(error) = writer.flush() {
        warn!(%error, "final time-series flush failed");
    }
    debug!("time-series worker finished");
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 In-memory Writer (tests) / كاتب في الذاكرة
// ═══════════════════════════════════════════════════════════════════════════════


// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Unit Tests / اختبارات الوحدة
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use crossbeam::channel::bounded;

    use super::testing::MemoryWriter;
    use super::*;
    use crate::state::MotionState;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            base_delay_ms: 1,
            max_delay_ms: 4,
            max_attempts,
        }
    }

    fn point(ts: i64) -> Point {
        let mut fields = BTreeMap::new();
        fields.insert("motion_score".to_string(), ts as f64);
        Point {
            measurement: "csi_motion".to_string(),
            tags: BTreeMap::new(),
            fields,
            timestamp: ts,
        }
    }

    #[test]
    fn test_point_from_record() {
        let record = TelemetryRecord {
            timestamp: 10,
            motion_score: Some(2.5),
            baseline: Some(0.5),
            state: MotionState::Active,
            transition: None,
            amplitudes: Some(vec![1.0]),
        };
        let mut tags = BTreeMap::new();
        tags.insert("room".to_string(), "lab".to_string());

        let p = Point::from_record(&record, "csi_motion", &tags);
        assert_eq!(p.fields.get("motion_score"), Some(&2.5));
        assert_eq!(p.fields.get("baseline"), Some(&0.5));
        assert_eq!(p.fields.get("state"), Some(&1.0));
        assert_eq!(p.tags.get("room").map(String::as_str), Some("lab"));

        let warmup = TelemetryRecord {
            motion_score: None,
            baseline: None,
            ..record
        };
        let p = Point::from_record(&warmup, "csi_motion", &tags);
        assert_eq!(p.fields.len(), 1);
    }

    #[test]
    fn test_retry_until_success() {
        let mut writer = MemoryWriter::failing(3);
        let closing = AtomicBool::new(false);
        assert!(write_with_retry(&mut writer, &[point(1)], &fast_policy(5), &closing));
        assert_eq!(writer.calls.load(Ordering::SeqCst), 4);
        assert_eq!(writer.collected().len(), 1);
    }

    #[test]
    fn test_batch_discarded_after_max_attempts() {
        let mut writer = MemoryWriter::failing(u64::MAX);
        let closing = AtomicBool::new(false);
        assert!(!write_with_retry(&mut writer, &[point(1)], &fast_policy(5), &closing));
        assert_eq!(writer.calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_no_retry_while_closing() {
        let mut writer = MemoryWriter::failing(u64::MAX);
        let closing = AtomicBool::new(true);
        assert!(!write_with_retry(&mut writer, &[point(1)], &RetryPolicy::default(), &closing));
        assert_eq!(writer.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_worker_drains_queue_in_batches() {
        let writer = MemoryWriter::failing(1);
        let (tx, rx) = bounded(64);
        for ts in 0..25 {
            tx.send(point(ts)).unwrap();
        }
        drop(tx);

        let counters = Arc::new(SeriesCounters::default());
        run_worker(
            Box::new(writer.clone()),
            rx,
            10,
            fast_policy(5),
            Arc::new(AtomicBool::new(false)),
            Arc::clone(&counters),
        );

        let stamps: Vec<i64> = writer.collected().iter().map(|p| p.timestamp).collect();
        assert_eq!(stamps, (0..25).collect::<Vec<_>>());
        assert_eq!(counters.written.load(Ordering::SeqCst), 25);
        assert_eq!(counters.discarded_batches.load(Ordering::SeqCst), 0);
    }
}
