// ═══════════════════════════════════════════════════════════════════════════════
// 📦 telemetry/mod.rs - Telemetry Sink
// ═══════════════════════════════════════════════════════════════════════════════
// Fans each record out to two independent destinations:
// - visualization: line protocol, bounded channel, blocking send (backpressure)
// - time-series:   points, bounded channel, try_send (never blocks)
// Each destination has its own consumer thread.
// ═══════════════════════════════════════════════════════════════════════════════

mod influx;
mod line;
mod timeseries;

pub use influx::InfluxWriter;
pub use line::{format_line, parse_line};
pub use timeseries::{run_worker, Point, SeriesCounters, TimeSeriesWriter};

#[cfg(test)]
pub(crate) use timeseries::testing;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::config::{SinkConfig, TimeSeriesTarget};
use crate::csv_logger::CsvLogger;
use crate::error::SinkError;
use crate::state::TelemetryRecord;

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Destinations / الوجهات
// ═══════════════════════════════════════════════════════════════════════════════

/// Open the visualization target: "-" (stdout), tcp://host:port or a file
pub fn open_visual(target: &str) -> Result<Box<dyn Write + Send>, SinkError> {
    let open_err = |source: io::Error| SinkError::OpenVisual {
        target: target.to_string(),
        source,
    };

    if target == "-" {
        return Ok(Box::new(io::stdout()));
    }
    if let Some(address) = target.strip_prefix("tcp://") {
        let stream = TcpStream::connect(address).map_err(open_err)?;
        stream.set_nodelay(true).map_err(open_err)?;
        return Ok(Box::new(stream));
    }
    let file = File::create(target).map_err(open_err)?;
    Ok(Box::new(file))
}

/// Build the configured time-series writer
pub fn open_timeseries(target: &TimeSeriesTarget) -> Result<Box<dyn TimeSeriesWriter>, SinkError> {
    Ok(match target {
        TimeSeriesTarget::Influx {
            url,
            org,
            bucket,
            token,
        } => Box::new(InfluxWriter::new(url, org, bucket, token.clone())?),
        TimeSeriesTarget::Csv { path } => {
            let logger = if path.is_empty() || path == "auto" {
                CsvLogger::new_with_timestamp()?
            } else {
                CsvLogger::new(path)?
            };
            info!(path = %logger.path().display(), "writing time-series to CSV");
            Box::new(logger)
        }
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Statistics / الإحصائيات
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub lines: u64,
    pub points_queued: u64,
    pub points_dropped: u64,
    pub points_written: u64,
    pub batches_discarded: u64,
}

struct SeriesChannel {
    tx: Sender<Point>,
    handle: JoinHandle<()>,
    closing: Arc<AtomicBool>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Telemetry Sink / مخرج القياس
// ═══════════════════════════════════════════════════════════════════════════════

pub struct TelemetrySink {
    visual_tx: Option<Sender<String>>,
    visual_handle: Option<JoinHandle<Result<(), SinkError>>>,
    visual_failed: Arc<AtomicBool>,

    series: Option<SeriesChannel>,
    /// Outlives the channel so stats stay readable after shutdown
    series_counters: Option<Arc<SeriesCounters>>,

    measurement: String,
    tags: BTreeMap<String, String>,

    lines: u64,
    points_queued: u64,
    /// The time-series worker exited early
    series_stopped: bool,
}

impl TelemetrySink {
    /// Open every destination named in the config
    pub fn open(config: &SinkConfig) -> Result<Self, SinkError> {
        let visual = open_visual(&config.visual)?;
        let series = config.timeseries.as_ref().map(open_timeseries).transpose()?;
        info!(
            visual = %config.visual,
            timeseries = series.is_some(),
            "telemetry sink ready"
        );
        Ok(Self::with_writers(visual, series, config))
    }

    /// Start consumer threads over already-open writers
    pub fn with_writers(
        visual: Box<dyn Write + Send>,
        series: Option<Box<dyn TimeSeriesWriter>>,
        config: &SinkConfig,
    ) -> Self {
        let (visual_tx, visual_rx) = bounded::<String>(config.visual_queue);
        let visual_failed = Arc::new(AtomicBool::new(false));
        let failed = Arc::clone(&visual_failed);
        let visual_handle = thread::spawn(move || run_visual(visual, visual_rx, failed));

        let counters = series.as_ref().map(|_| Arc::new(SeriesCounters::default()));
        let series = series.zip(counters.clone()).map(|(writer, counters)| {
            let (tx, rx) = bounded::<Point>(config.timeseries_queue);
            let closing = Arc::new(AtomicBool::new(false));
            let batch_size = config.batch_size;
            let policy = config.retry;
            let worker_closing = Arc::clone(&closing);
            let handle = thread::spawn(move || {
                run_worker(writer, rx, batch_size, policy, worker_closing, counters)
            });
            SeriesChannel { tx, handle, closing }
        });

        Self {
            visual_tx: Some(visual_tx),
            visual_handle: Some(visual_handle),
            visual_failed,
            series,
            series_counters: counters,
            measurement: config.measurement.clone(),
            tags: config.tags.clone(),
            lines: 0,
            points_queued: 0,
            series_stopped: false,
        }
    }

    /// Send one record to every destination
    /// إرسال سجل إلى جميع الوجهات
    ///
    /// Blocks while the visualization queue is full. Fails only when the
    /// visualization consumer is gone.
    pub fn emit(&mut self, record: &TelemetryRecord) -> Result<(), SinkError> {
        if self.visual_failed.load(Ordering::SeqCst) {
            return Err(SinkError::VisualizationClosed);
        }
        let tx = self.visual_tx.as_ref().ok_or(SinkError::VisualizationClosed)?;
        tx.send(format_line(record))
            .map_err(|_| SinkError::VisualizationClosed)?;
        self.lines += 1;

        if let (Some(series), Some(counters)) = (&self.series, &self.series_counters) {
            let point = Point::from_record(record, &self.measurement, &self.tags);
            match series.tx.try_send(point) {
                Ok(()) => self.points_queued += 1,
                Err(TrySendError::Full(_)) => {
                    let dropped = counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    if dropped == 1 || dropped % 1000 == 0 {
                        warn!(dropped, "time-series queue full, dropping points");
                    }
                }
                Err(TrySendError::Disconnected(_)) => {
                    counters.dropped.fetch_add(1, Ordering::Relaxed);
                    if !self.series_stopped {
                        self.series_stopped = true;
                        warn!("time-series worker stopped, dropping all further points");
                    }
                }
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> SinkStats {
        let (dropped, written, discarded) = match self.series_counters {
            Some(ref c) => (
                c.dropped.load(Ordering::Relaxed),
                c.written.load(Ordering::Relaxed),
                c.discarded_batches.load(Ordering::Relaxed),
            ),
            None => (0, 0, 0),
        };
        SinkStats {
            lines: self.lines,
            points_queued: self.points_queued,
            points_dropped: dropped,
            points_written: written,
            batches_discarded: discarded,
        }
    }

    /// Close channels, let consumers drain and flush, join threads
    /// إغلاق القنوات وانتظار انتهاء الخيوط
    pub fn shutdown(mut self) -> Result<SinkStats, SinkError> {
        let result = self.close();
        let stats = self.stats();
        result.map(|_| stats)
    }

    fn close(&mut self) -> Result<(), SinkError> {
        // Dropping the sender ends the consumer loop after the queue drains
        self.visual_tx.take();
        let visual = match self.visual_handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or(Err(SinkError::VisualizationClosed)),
            None => Ok(()),
        };

        if let Some(series) = self.series.take() {
            series.closing.store(true, Ordering::SeqCst);
            drop(series.tx);
            if series.handle.join().is_err() {
                warn!("time-series worker panicked");
            }
        }
        debug!("telemetry sink closed");
        visual
    }
}

impl Drop for TelemetrySink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Visualization consumer: write lines, flush whenever the queue is idle
fn run_visual(
    writer: Box<dyn Write + Send>,
    rx: Receiver<String>,
    failed: Arc<AtomicBool>,
) -> Result<(), SinkError> {
    let mut writer = BufWriter::new(writer);

    let result = (|| -> io::Result<()> {
        for line in rx.iter() {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
            if rx.is_empty() {
                writer.flush()?;
            }
        }
        writer.flush()
    })();

    if let Err(error) = result {
        failed.store(true, Ordering::SeqCst);
        warn!(%error, "visualization destination closed");
        return Err(SinkError::VisualizationClosed);
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Unit Tests / اختبارات الوحدة
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use super::testing::MemoryWriter;
    use super::*;
    use crate::state::MotionState;

    /// Shared in-memory visualization target
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Fails every write, like a closed pipe
    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader went away"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader went away"))
        }
    }

    /// Store whose writes blow up the worker thread
    struct PanickingStore;

    impl TimeSeriesWriter for PanickingStore {
        fn write(&mut self, _: &Point) -> Result<(), SinkError> {
            panic!("store crashed");
        }

        fn flush(&mut self) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn record(ts: i64) -> TelemetryRecord {
        TelemetryRecord {
            timestamp: ts,
            motion_score: Some(ts as f64),
            baseline: Some(0.01),
            state: MotionState::Idle,
            transition: None,
            amplitudes: None,
        }
    }

    #[test]
    fn test_lines_and_points_reach_both_destinations() {
        let visual = SharedBuffer::default();
        let series = MemoryWriter::default();
        let mut sink = TelemetrySink::with_writers(
            Box::new(visual.clone()),
            Some(Box::new(series.clone())),
            &SinkConfig::default(),
        );
        for ts in 0..10 {
            sink.emit(&record(ts)).unwrap();
        }
        let stats = sink.shutdown().unwrap();

        let text = String::from_utf8(visual.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text.lines().count(), 10);
        assert_eq!(text.lines().next(), Some("0,0,IDLE"));
        assert_eq!(series.collected().len(), 10);
        assert_eq!(stats.lines, 10);
        assert_eq!(stats.points_written, 10);
        assert_eq!(stats.points_dropped, 0);
    }

    #[test]
    fn test_slow_store_never_blocks_emit() {
        let series = MemoryWriter {
            latency: Some(Duration::from_millis(200)),
            ..MemoryWriter::default()
        };
        let config = SinkConfig {
            timeseries_queue: 4,
            batch_size: 1,
            ..SinkConfig::default()
        };
        let mut sink = TelemetrySink::with_writers(
            Box::new(io::sink()),
            Some(Box::new(series)),
            &config,
        );

        let started = Instant::now();
        for ts in 0..100 {
            sink.emit(&record(ts)).unwrap();
        }
        assert!(started.elapsed() < Duration::from_millis(150));

        let stats = sink.stats();
        assert!(stats.points_dropped > 0);
        assert_eq!(stats.points_queued + stats.points_dropped, 100);
    }

    #[test]
    fn test_stopped_worker_drops_points_without_failing_emit() {
        let mut sink = TelemetrySink::with_writers(
            Box::new(io::sink()),
            Some(Box::new(PanickingStore)),
            &SinkConfig::default(),
        );
        sink.emit(&record(0)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !sink.series.as_ref().map_or(true, |s| s.handle.is_finished()) {
            assert!(Instant::now() < deadline, "worker still running");
            thread::sleep(Duration::from_millis(5));
        }

        for ts in 1..4 {
            sink.emit(&record(ts)).unwrap();
        }
        assert!(sink.series_stopped);

        let stats = sink.stats();
        assert_eq!(stats.lines, 4);
        assert_eq!(stats.points_queued, 1);
        assert_eq!(stats.points_dropped, 3);
        assert_eq!(stats.points_written, 0);
    }

    #[test]
    fn test_closed_visualization_is_fatal() {
        let mut sink = TelemetrySink::with_writers(Box::new(ClosedPipe), None, &SinkConfig::default());

        let mut outcome = Ok(());
        for ts in 0..1000 {
            outcome = sink.emit(&record(ts));
            if outcome.is_err() {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        assert!(matches!(outcome, Err(SinkError::VisualizationClosed)));
    }

    #[test]
    fn test_visual_file_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lines.txt");
        let config = SinkConfig {
            visual: path.to_string_lossy().into_owned(),
            ..SinkConfig::default()
        };

        let mut sink = TelemetrySink::open(&config).unwrap();
        sink.emit(&record(7)).unwrap();
        sink.shutdown().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "7,7,IDLE\n");
    }
}
