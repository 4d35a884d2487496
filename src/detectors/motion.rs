// ═══════════════════════════════════════════════════════════════════════════════
// 📦 detectors/motion.rs - Motion Detection Engine
// ═══════════════════════════════════════════════════════════════════════════════
// كشف الحركة باستخدام تباين سعات CSI عبر نافذة زمنية
// Motion detection from the variance of CSI amplitudes over a sliding window
// ═══════════════════════════════════════════════════════════════════════════════

use tracing::{debug, info};

use super::aggregate::Aggregator;
use super::baseline::Baseline;
use super::hysteresis::Hysteresis;
use super::window::MotionWindow;
use crate::config::{EngineConfig, Verbosity};
use crate::error::{ConfigError, EngineError};
use crate::state::{amplitude_of, CsiFrame, FrameShape, MotionState, TelemetryRecord};

/// Baseline rate divisor for ticks that are not quiet
/// معامل إبطاء تكيف خط الأساس أثناء الحركة
const ACTIVE_SLOWDOWN: f64 = 10.0;

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Engine Structure / هيكل المحرك
// ═══════════════════════════════════════════════════════════════════════════════

/// Turns decoded frames into telemetry records, one per frame
/// يحول الإطارات إلى سجلات قياس، سجل لكل إطار
///
/// # Algorithm / الخوارزمية
/// ```text
/// - amplitude of every (chain, subcarrier) cell → ring buffer of W samples
/// - window full → sample variance per cell → aggregator → score
/// - score vs. EWMA baseline * multipliers → hysteresis → IDLE / ACTIVE
/// ```
pub struct MotionEngine {
    config: EngineConfig,
    shape: FrameShape,

    window: MotionWindow,
    aggregator: Box<dyn Aggregator>,
    baseline: Baseline,
    hysteresis: Hysteresis,

    /// Scratch buffers reused every tick
    amplitudes: Vec<f64>,
    variances: Vec<f64>,

    ticks: u64,
}

impl MotionEngine {
    /// Build an engine with the aggregator named in the config
    pub fn new(config: EngineConfig, shape: FrameShape) -> Result<Self, ConfigError> {
        let aggregator = config.aggregator.build()?;
        Self::with_aggregator(config, shape, aggregator)
    }

    /// Build an engine with a caller-supplied aggregation strategy
    pub fn with_aggregator(
        config: EngineConfig,
        shape: FrameShape,
        aggregator: Box<dyn Aggregator>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if shape.cells() == 0 {
            return Err(ConfigError::Invalid(format!(
                "frame shape {} has no cells",
                shape
            )));
        }

        let cells = shape.cells();
        debug!(
            %shape,
            window = config.window_size,
            aggregator = aggregator.name(),
            "motion engine ready"
        );

        Ok(Self {
            window: MotionWindow::new(cells, config.window_size),
            baseline: Baseline::new(config.baseline_horizon, config.min_baseline),
            hysteresis: Hysteresis::new(
                config.high_multiplier,
                config.low_multiplier,
                config.confirm_ticks,
                config.hold_ticks,
            ),
            aggregator,
            amplitudes: Vec::with_capacity(cells),
            variances: Vec::with_capacity(cells),
            ticks: 0,
            config,
            shape,
        })
    }

    pub fn shape(&self) -> FrameShape {
        self.shape
    }

    pub fn state(&self) -> MotionState {
        self.hysteresis.state()
    }

    pub fn last_transition(&self) -> Option<i64> {
        self.hysteresis.last_transition()
    }

    /// Frames ingested so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Process one frame / معالجة إطار واحد
    pub fn ingest(&mut self, frame: &CsiFrame) -> Result<TelemetryRecord, EngineError> {
        if frame.shape != self.shape || !frame.is_consistent() {
            return Err(EngineError::ShapeMismatch {
                expected: self.shape,
                got: frame.shape,
            });
        }
        self.ticks += 1;

        self.amplitudes.clear();
        self.amplitudes.extend(frame.subcarriers.iter().map(|c| amplitude_of(*c)));
        self.window.push(&self.amplitudes);

        let score = if self.window.variances_into(&mut self.variances) {
            self.aggregator.aggregate(&self.variances)
        } else {
            None
        };

        let mut baseline = None;
        let mut transition = None;

        if let Some(score) = score {
            if !self.baseline.is_seeded() {
                self.baseline.observe(score);
            }
            let effective = self.baseline.effective();
            transition = self.hysteresis.update(score, effective, frame.timestamp);
            baseline = Some(effective);

            // Quiet ticks teach the noise floor; the rest only nudge it
            if transition.is_none()
                && self.hysteresis.state() == MotionState::Idle
                && !self.hysteresis.is_above_high(score, effective)
            {
                self.baseline.observe(score);
            } else {
                self.baseline.observe_slow(score, ACTIVE_SLOWDOWN);
            }

            if let Some(t) = transition {
                info!(
                    from = %t.from,
                    to = %t.to,
                    timestamp = t.timestamp,
                    score,
                    baseline = effective,
                    "motion state changed"
                );
            }
        }

        let amplitudes = match self.config.verbosity {
            Verbosity::Matrix => Some(frame.amplitudes()),
            Verbosity::Score => None,
        };

        Ok(TelemetryRecord {
            timestamp: frame.timestamp,
            motion_score: score,
            baseline,
            state: self.hysteresis.state(),
            transition,
            amplitudes,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Unit Tests / اختبارات الوحدة
// ═══════════════════════════════════════════════════════════════════════════════
