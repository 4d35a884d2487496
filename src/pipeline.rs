// ═══════════════════════════════════════════════════════════════════════════════
// 📦 pipeline.rs - Capture Session
// ═══════════════════════════════════════════════════════════════════════════════
// Frame-synchronous loop on one thread: read → decode → ingest → emit.
// The stop flag is checked between frames; source EOF ends the session too.
// ═══════════════════════════════════════════════════════════════════════════════

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::Config;
use crate::detectors::{bandwidth_label, MotionEngine};
use crate::error::PipelineError;
use crate::parser::{CsiDecoder, DecoderStats};
use crate::source::open_source;
use crate::state::MotionState;
use crate::telemetry::{SinkStats, TelemetrySink};

/// Why the session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    Interrupted,
    /// The source failed mid-stream; telemetry was still flushed
    SourceError,
}

/// Counters reported when a session ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub reason: StopReason,
    pub records: u64,
    pub activations: u64,
    /// Motion state when the session ended
    pub final_state: MotionState,
    pub decoder: DecoderStats,
    pub sink: SinkStats,
}

/// Run a session from the configured source into the configured sinks
/// تشغيل جلسة كاملة من المصدر إلى المخرجات
pub fn run_session(config: &Config, stop: Arc<AtomicBool>) -> Result<SessionSummary, PipelineError> {
    config.validate()?;

    let shape = config.source.shape();
    info!(
        input = %config.source.input,
        %shape,
        band = bandwidth_label(shape.subcarriers),
        window = config.engine.window_size,
        aggregator = %config.engine.aggregator,
        "starting capture session"
    );

    let engine = MotionEngine::new(config.engine.clone(), shape)?;
    let reader = open_source(&config.source.input)?;
    let sink = TelemetrySink::open(&config.sink)?;

    run_pipeline(config, reader, engine, sink, stop)
}

/// Drive an already-assembled pipeline until EOF, stop or a fatal error
pub fn run_pipeline<R: Read>(
    config: &Config,
    reader: R,
    mut engine: MotionEngine,
    mut sink: TelemetrySink,
    stop: Arc<AtomicBool>,
) -> Result<SessionSummary, PipelineError> {
    let mut decoder = CsiDecoder::new(reader)
        .with_shape(engine.shape())
        .with_mac_filter(config.source.mac_filter()?)
        .with_stop_flag(Arc::clone(&stop));

    let mut records = 0u64;
    let mut activations = 0u64;

    let reason = loop {
        if stop.load(Ordering::SeqCst) {
            break StopReason::Interrupted;
        }

        let frame = match decoder.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) if stop.load(Ordering::SeqCst) => break StopReason::Interrupted,
            Ok(None) => break StopReason::EndOfStream,
            Err(e) => {
                error!(error = %e, "frame source failed");
                break StopReason::SourceError;
            }
        };

        let record = engine.ingest(&frame)?;
        if let Some(t) = record.transition {
            if t.to == MotionState::Active {
                activations += 1;
            }
        }
        debug!(
            timestamp = record.timestamp,
            score = record.motion_score,
            state = %record.state,
            "tick"
        );

        sink.emit(&record)?;
        records += 1;
    };

    let sink_stats = sink.shutdown()?;
    let summary = SessionSummary {
        reason,
        records,
        activations,
        final_state: engine.state(),
        decoder: decoder.stats(),
        sink: sink_stats,
    };

    info!(
        reason = ?summary.reason,
        records,
        activations,
        final_state = %summary.final_state,
        frames = summary.decoder.frames,
        dropped = summary.decoder.dropped,
        shape_mismatches = summary.decoder.shape_mismatches,
        filtered = summary.decoder.filtered,
        points_dropped = summary.sink.points_dropped,
        "capture session finished"
    );
    Ok(summary)
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Unit Tests / اختبارات الوحدة
// ═══════════════════════════════════════════════════════════════════════════════
