// ═══════════════════════════════════════════════════════════════════════════════
// 📦 error.rs - Error Types
// ═══════════════════════════════════════════════════════════════════════════════
// Typed errors for every pipeline stage. Malformed input frames are not errors
// here: the decoder drops them and reports a FrameFault for logging only.
// ═══════════════════════════════════════════════════════════════════════════════

use thiserror::Error;

use crate::state::FrameShape;

/// Reason a raw frame was dropped by the decoder
/// سبب إسقاط إطار خام من قبل المفكك
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameFault {
    #[error("no magic marker at frame start ({skipped} bytes skipped)")]
    MissingMagic { skipped: usize },

    #[error("declared payload of {declared} bytes but next marker after {available} bytes")]
    LengthMismatch { declared: usize, available: usize },

    #[error("stream ended inside a frame: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    #[error("invalid frame shape: {subcarriers} subcarriers x {chains} chains")]
    InvalidShape { subcarriers: usize, chains: usize },
}

/// Errors surfaced by the frame decoder / أخطاء مفكك الإطارات
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The underlying byte stream failed; ends the session.
    #[error("frame source read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the motion engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("frame shape {got} does not match session shape {expected}")]
    ShapeMismatch { expected: FrameShape, got: FrameShape },
}

/// Startup configuration errors; always fatal
/// أخطاء الإعدادات عند بدء التشغيل (قاتلة دائماً)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors from telemetry destinations
#[derive(Debug, Error)]
pub enum SinkError {
    /// The visualization consumer went away. Fatal for the pipeline.
    #[error("visualization destination closed")]
    VisualizationClosed,

    #[error("failed to open visualization destination {target}: {source}")]
    OpenVisual {
        target: String,
        source: std::io::Error,
    },

    #[error("time-series write failed: {0}")]
    TimeSeries(String),

    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Malformed visualization line
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("expected at least 3 fields, got {0}")]
    MissingFields(usize),

    #[error("invalid timestamp '{0}'")]
    Timestamp(String),

    #[error("invalid motion score '{0}'")]
    Score(String),

    #[error("invalid state '{0}'")]
    State(String),

    #[error("invalid amplitude '{0}'")]
    Amplitude(String),
}

/// Umbrella error for a pipeline session
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("failed to open frame source {target}: {reason}")]
    Source { target: String, reason: String },
}
