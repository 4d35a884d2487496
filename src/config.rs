// ═══════════════════════════════════════════════════════════════════════════════
// 📦 config.rs - Pipeline Configuration
// ═══════════════════════════════════════════════════════════════════════════════
// Immutable configuration for a session: frame source, motion engine and
// telemetry sinks. Loaded from an optional JSON file, overridden by CLI flags,
// validated once before any frame is processed.
// ═══════════════════════════════════════════════════════════════════════════════

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::detectors::AggregatorKind;
use crate::error::ConfigError;
use crate::state::FrameShape;

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Defaults / القيم الافتراضية
// ═══════════════════════════════════════════════════════════════════════════════

pub const DEFAULT_WINDOW_SIZE: usize = 50;
pub const DEFAULT_HIGH_MULTIPLIER: f64 = 3.0;
pub const DEFAULT_LOW_MULTIPLIER: f64 = 1.5;
pub const DEFAULT_CONFIRM_TICKS: u32 = 5;
pub const DEFAULT_HOLD_TICKS: u32 = 25;
pub const DEFAULT_BASELINE_HORIZON: u32 = 600;
pub const DEFAULT_MIN_BASELINE: f64 = 0.01;

/// 20 MHz HT/VHT data subcarriers
pub const DEFAULT_SUBCARRIERS: usize = 52;
pub const DEFAULT_ANTENNA_CHAINS: usize = 1;

pub const DEFAULT_MEASUREMENT: &str = "csi_motion";

/// Bounded channel capacities / سعة القنوات
pub const DEFAULT_VISUAL_QUEUE: usize = 256;
pub const DEFAULT_TIMESERIES_QUEUE: usize = 4096;
pub const DEFAULT_BATCH_SIZE: usize = 100;

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Engine Configuration / إعدادات محرك الحركة
// ═══════════════════════════════════════════════════════════════════════════════

/// What each telemetry record carries besides the score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Timestamp, score and state only
    #[default]
    Score,
    /// Also the per-(chain, subcarrier) amplitudes of the frame
    Matrix,
}

impl std::str::FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "score" => Ok(Verbosity::Score),
            "matrix" => Ok(Verbosity::Matrix),
            other => Err(format!("unknown verbosity '{}' (expected score or matrix)", other)),
        }
    }
}

/// Motion engine parameters / معاملات محرك الحركة
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Samples per (chain, subcarrier) window (W)
    pub window_size: usize,
    pub high_multiplier: f64,
    pub low_multiplier: f64,
    /// Consecutive ticks above the high threshold before Active
    pub confirm_ticks: u32,
    /// Consecutive ticks below the low threshold before Idle
    pub hold_ticks: u32,
    /// EWMA horizon in ticks (alpha = 1 / horizon)
    pub baseline_horizon: u32,
    /// Floor applied to the baseline before thresholding
    pub min_baseline: f64,
    pub aggregator: AggregatorKind,
    pub verbosity: Verbosity,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            high_multiplier: DEFAULT_HIGH_MULTIPLIER,
            low_multiplier: DEFAULT_LOW_MULTIPLIER,
            confirm_ticks: DEFAULT_CONFIRM_TICKS,
            hold_ticks: DEFAULT_HOLD_TICKS,
            baseline_horizon: DEFAULT_BASELINE_HORIZON,
            min_baseline: DEFAULT_MIN_BASELINE,
            aggregator: AggregatorKind::default(),
            verbosity: Verbosity::default(),
        }
    }
}

impl EngineConfig {
    /// Reject parameter combinations the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size < 2 {
            return Err(invalid(format!(
                "window_size must be at least 2 (got {})",
                self.window_size
            )));
        }
        if !(self.high_multiplier > 0.0) || !(self.low_multiplier > 0.0) {
            return Err(invalid(format!(
                "multipliers must be positive (high {}, low {})",
                self.high_multiplier, self.low_multiplier
            )));
        }
        if self.low_multiplier >= self.high_multiplier {
            return Err(invalid(format!(
                "low_multiplier ({}) must be below high_multiplier ({})",
                self.low_multiplier, self.high_multiplier
            )));
        }
        if self.confirm_ticks == 0 || self.hold_ticks == 0 {
            return Err(invalid("confirm_ticks and hold_ticks must be at least 1"));
        }
        if self.baseline_horizon == 0 {
            return Err(invalid("baseline_horizon must be at least 1"));
        }
        if !(self.min_baseline >= 0.0) || !self.min_baseline.is_finite() {
            return Err(invalid(format!(
                "min_baseline must be a non-negative number (got {})",
                self.min_baseline
            )));
        }
        self.aggregator.validate()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Source Configuration / إعدادات المصدر
// ═══════════════════════════════════════════════════════════════════════════════

/// Where frames come from and what they look like
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// "-" (stdin), a file path, tcp://host:port or serial:PATH[?baud=N]
    pub input: String,
    pub subcarriers: usize,
    pub antenna_chains: usize,
    /// Only accept frames from this transmitter (aa:bb:cc:dd:ee:ff)
    pub mac_filter: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            input: "-".to_string(),
            subcarriers: DEFAULT_SUBCARRIERS,
            antenna_chains: DEFAULT_ANTENNA_CHAINS,
            mac_filter: None,
        }
    }
}

impl SourceConfig {
    pub fn shape(&self) -> FrameShape {
        FrameShape::new(self.subcarriers, self.antenna_chains)
    }

    /// Parsed MAC filter, if any
    pub fn mac_filter(&self) -> Result<Option<[u8; 6]>, ConfigError> {
        self.mac_filter.as_deref().map(parse_mac).transpose()
    }
}

/// Parse "aa:bb:cc:dd:ee:ff" (or '-' separated) into bytes
/// تحليل عنوان MAC
pub fn parse_mac(text: &str) -> Result<[u8; 6], ConfigError> {
    let pattern = Regex::new(r"^([0-9A-Fa-f]{2})(?:[:-]([0-9A-Fa-f]{2})){5}$")
        .map_err(|e| invalid(e.to_string()))?;
    let text = text.trim();
    if !pattern.is_match(text) {
        return Err(invalid(format!("invalid MAC address '{}'", text)));
    }

    let mut mac = [0u8; 6];
    for (slot, part) in mac.iter_mut().zip(text.split(|c| c == ':' || c == '-')) {
        *slot = u8::from_str_radix(part, 16).map_err(|e| invalid(e.to_string()))?;
    }
    Ok(mac)
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Sink Configuration / إعدادات المخرجات
// ═══════════════════════════════════════════════════════════════════════════════

/// Retry schedule for time-series writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Attempts per batch, including the first
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 250,
            max_delay_ms: 8_000,
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0 = after the first failure)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

/// Time-series store / قاعدة بيانات السلاسل الزمنية
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TimeSeriesTarget {
    /// InfluxDB v2 HTTP write API
    Influx {
        url: String,
        org: String,
        bucket: String,
        #[serde(default)]
        token: Option<String>,
    },
    /// Append rows to a CSV file
    Csv { path: String },
}

/// Telemetry destinations / وجهات القياس
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// "-" (stdout), a file path or tcp://host:port
    pub visual: String,
    pub visual_queue: usize,
    pub timeseries: Option<TimeSeriesTarget>,
    pub timeseries_queue: usize,
    pub batch_size: usize,
    pub measurement: String,
    /// Extra tags attached to every point
    pub tags: BTreeMap<String, String>,
    pub retry: RetryPolicy,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            visual: "-".to_string(),
            visual_queue: DEFAULT_VISUAL_QUEUE,
            timeseries: None,
            timeseries_queue: DEFAULT_TIMESERIES_QUEUE,
            batch_size: DEFAULT_BATCH_SIZE,
            measurement: DEFAULT_MEASUREMENT.to_string(),
            tags: BTreeMap::new(),
            retry: RetryPolicy::default(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Top-level Configuration / الإعدادات الكاملة
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub engine: EngineConfig,
    pub sink: SinkConfig,
}

impl Config {
    /// Load from a JSON file, or defaults when no path is given
    /// تحميل الإعدادات من ملف JSON
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let display = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }

    /// Check every section; runs before the pipeline starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        let shape = self.source.shape();
        if shape.cells() == 0 {
            return Err(invalid(format!(
                "subcarriers * antenna_chains must be non-zero (got {})",
                shape
            )));
        }
        if shape.subcarriers > crate::parser::MAX_SUBCARRIERS
            || shape.antenna_chains > crate::parser::MAX_ANTENNA_CHAINS
        {
            return Err(invalid(format!("frame shape {} exceeds decoder limits", shape)));
        }
        if self.source.input.trim().is_empty() {
            return Err(invalid("source input must not be empty"));
        }
        self.source.mac_filter()?;

        self.engine.validate()?;

        let sink = &self.sink;
        if sink.visual_queue == 0 || sink.timeseries_queue == 0 || sink.batch_size == 0 {
            return Err(invalid("queue capacities and batch_size must be at least 1"));
        }
        if sink.measurement.trim().is_empty() {
            return Err(invalid("measurement name must not be empty"));
        }
        if sink.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Unit Tests / اختبارات الوحدة
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn assert_invalid(config: &Config) {
        assert!(
            matches!(config.validate(), Err(ConfigError::Invalid(_))),
            "expected config to be rejected: {:?}",
            config
        );
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.window_size, 50);
        assert_eq!(config.engine.aggregator, AggregatorKind::Mean);
        assert_eq!(config.source.shape(), FrameShape::new(52, 1));
    }

    #[test]
    fn test_rejects_zero_shape() {
        let mut config = Config::default();
        config.source.antenna_chains = 0;
        assert_invalid(&config);
    }

    #[test]
    fn test_rejects_short_window() {
        let mut config = Config::default();
        config.engine.window_size = 0;
        assert_invalid(&config);
        config.engine.window_size = 1;
        assert_invalid(&config);
    }

    #[test]
    fn test_rejects_inverted_multipliers() {
        let mut config = Config::default();
        config.engine.low_multiplier = 3.0;
        assert_invalid(&config);

        config.engine.low_multiplier = -1.0;
        assert_invalid(&config);
    }

    #[test]
    fn test_rejects_zero_ticks() {
        let mut config = Config::default();
        config.engine.confirm_ticks = 0;
        assert_invalid(&config);

        let mut config = Config::default();
        config.engine.hold_ticks = 0;
        assert_invalid(&config);
    }

    #[test]
    fn test_rejects_bad_percentile() {
        let mut config = Config::default();
        config.engine.aggregator = AggregatorKind::Percentile(0.0);
        assert_invalid(&config);
        config.engine.aggregator = AggregatorKind::Percentile(101.0);
        assert_invalid(&config);
        config.engine.aggregator = AggregatorKind::Percentile(100.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mac_parsing() {
        assert_eq!(
            parse_mac("AA:bb:0c:00:01:ff").unwrap(),
            [0xAA, 0xBB, 0x0C, 0x00, 0x01, 0xFF]
        );
        assert_eq!(parse_mac("01-02-03-04-05-06").unwrap(), [1, 2, 3, 4, 5, 6]);
        assert!(parse_mac("01:02:03:04:05").is_err());
        assert!(parse_mac("zz:02:03:04:05:06").is_err());

        let mut config = Config::default();
        config.source.mac_filter = Some("not-a-mac".to_string());
        assert_invalid(&config);
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..7).map(|n| policy.delay_for(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![250, 500, 1000, 2000, 4000, 8000, 8000]);
        assert_eq!(policy.delay_for(200), Duration::from_millis(8000));
    }

    #[test]
    fn test_load_partial_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "engine": {{ "window_size": 20, "aggregator": {{ "percentile": 90.0 }} }},
                "source": {{ "subcarriers": 114, "antenna_chains": 2 }},
                "sink": {{ "timeseries": {{ "kind": "csv", "path": "out.csv" }} }}
            }}"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.engine.window_size, 20);
        assert_eq!(config.engine.aggregator, AggregatorKind::Percentile(90.0));
        assert_eq!(config.engine.hold_ticks, DEFAULT_HOLD_TICKS);
        assert_eq!(config.source.shape(), FrameShape::new(114, 2));
        assert_eq!(
            config.sink.timeseries,
            Some(TimeSeriesTarget::Csv { path: "out.csv".to_string() })
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_reports_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            Config::load(Some(Path::new("/nonexistent/csi.json"))),
            Err(ConfigError::Read { .. })
        ));
    }
}
