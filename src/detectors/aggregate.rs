// ═══════════════════════════════════════════════════════════════════════════════
// 📦 detectors/aggregate.rs - Score Aggregation
// ═══════════════════════════════════════════════════════════════════════════════
// تجميع تباينات الخلايا في درجة حركة واحدة
// Reduces per-cell variances to one motion score
// ═══════════════════════════════════════════════════════════════════════════════

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Strategy that turns per-cell variances into a scalar score
pub trait Aggregator: Send {
    fn name(&self) -> &'static str;

    /// None for an empty input or when any value is not finite
    fn aggregate(&self, values: &[f64]) -> Option<f64>;
}

fn all_finite(values: &[f64]) -> bool {
    !values.is_empty() && values.iter().all(|v| v.is_finite())
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Implementations / التطبيقات
// ═══════════════════════════════════════════════════════════════════════════════

/// Average variance over all cells / متوسط التباين
#[derive(Debug, Clone, Copy, Default)]
pub struct Mean;

impl Aggregator for Mean {
    fn name(&self) -> &'static str {
        "mean"
    }

    fn aggregate(&self, values: &[f64]) -> Option<f64> {
        if !all_finite(values) {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Largest single-cell variance / أكبر تباين
#[derive(Debug, Clone, Copy, Default)]
pub struct Max;

impl Aggregator for Max {
    fn name(&self) -> &'static str {
        "max"
    }

    fn aggregate(&self, values: &[f64]) -> Option<f64> {
        if !all_finite(values) {
            return None;
        }
        Some(values.iter().copied().fold(f64::NEG_INFINITY, f64::max))
    }
}

/// Nearest-rank percentile, p in (0, 100]
#[derive(Debug, Clone, Copy)]
pub struct Percentile {
    p: f64,
}

impl Percentile {
    pub fn new(p: f64) -> Result<Self, ConfigError> {
        AggregatorKind::Percentile(p).validate()?;
        Ok(Self { p })
    }
}

impl Aggregator for Percentile {
    fn name(&self) -> &'static str {
        "percentile"
    }

    fn aggregate(&self, values: &[f64]) -> Option<f64> {
        if !all_finite(values) {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len();
        let rank = ((self.p / 100.0) * n as f64).ceil() as usize;
        Some(sorted[rank.clamp(1, n) - 1])
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Configuration Form / صيغة الإعدادات
// ═══════════════════════════════════════════════════════════════════════════════

/// Serializable aggregator choice: "mean", "max" or {"percentile": 90.0}
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregatorKind {
    #[default]
    Mean,
    Max,
    Percentile(f64),
}

impl AggregatorKind {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            AggregatorKind::Percentile(p) if !(p > 0.0 && p <= 100.0) => Err(ConfigError::Invalid(
                format!("percentile must be in (0, 100] (got {})", p),
            )),
            _ => Ok(()),
        }
    }

    pub fn build(&self) -> Result<Box<dyn Aggregator>, ConfigError> {
        Ok(match *self {
            AggregatorKind::Mean => Box::new(Mean),
            AggregatorKind::Max => Box::new(Max),
            AggregatorKind::Percentile(p) => Box::new(Percentile::new(p)?),
        })
    }
}

impl fmt::Display for AggregatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregatorKind::Mean => f.write_str("mean"),
            AggregatorKind::Max => f.write_str("max"),
            AggregatorKind::Percentile(p) => write!(f, "p{}", p),
        }
    }
}

/// CLI form: "mean", "max", "p90" or "percentile:90"
impl FromStr for AggregatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let number = match lower.as_str() {
            "mean" => return Ok(AggregatorKind::Mean),
            "max" => return Ok(AggregatorKind::Max),
            other => other
                .strip_prefix("percentile:")
                .or_else(|| other.strip_prefix('p'))
                .ok_or_else(|| format!("unknown aggregator '{}'", s))?,
        };
        number
            .parse::<f64>()
            .map(AggregatorKind::Percentile)
            .map_err(|_| format!("invalid percentile in '{}'", s))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Unit Tests / اختبارات الوحدة
// ═══════════════════════════════════════════════════════════════════════════════
