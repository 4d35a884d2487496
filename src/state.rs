// ═══════════════════════════════════════════════════════════════════════════════
// 📦 state.rs - Core Data Model & Viewer State
// ═══════════════════════════════════════════════════════════════════════════════
// This module defines the CSI frame, motion state and telemetry record that flow
// through the pipeline, plus the viewer state shared between the line reader
// thread and the TUI thread (Arc<Mutex>).
// ═══════════════════════════════════════════════════════════════════════════════

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use num_complex::Complex;
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Frame Shape / شكل الإطار
// ═══════════════════════════════════════════════════════════════════════════════

/// Subcarrier count K and antenna chain count of a capture session
/// عدد الناقلات الفرعية وعدد سلاسل الهوائي لجلسة الالتقاط
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameShape {
    pub subcarriers: usize,
    pub antenna_chains: usize,
}

impl FrameShape {
    pub fn new(subcarriers: usize, antenna_chains: usize) -> Self {
        Self {
            subcarriers,
            antenna_chains,
        }
    }

    /// Number of (chain, subcarrier) cells / عدد الخلايا
    pub fn cells(&self) -> usize {
        self.subcarriers * self.antenna_chains
    }
}

impl fmt::Display for FrameShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.subcarriers, self.antenna_chains)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 CSI Frame Structure / هيكل إطار CSI
// ═══════════════════════════════════════════════════════════════════════════════

/// One decoded CSI capture unit
/// إطار CSI واحد بعد فك الترميز
#[derive(Debug, Clone, PartialEq)]
pub struct CsiFrame {
    /// Unix timestamp in milliseconds / الطابع الزمني بالميلي ثانية
    pub timestamp: i64,

    /// Received signal strength (dBm) / قوة الإشارة المستلمة
    pub rssi: i8,

    /// 802.11 frame-control bits of the captured beacon
    pub frame_control: u16,

    /// Transmitter MAC address / عنوان MAC للمرسل
    pub source_mac: [u8; 6],

    /// Beacon sequence number
    pub sequence: u16,

    /// Subcarrier and chain counts
    pub shape: FrameShape,

    /// Complex subcarrier values, chain-major: index = chain * K + subcarrier
    /// القيم المركبة للناقلات الفرعية مرتبة حسب السلسلة
    pub subcarriers: Vec<Complex<f64>>,
}

impl CsiFrame {
    /// Create a frame with empty link metadata / إنشاء إطار جديد
    pub fn new(timestamp: i64, shape: FrameShape, subcarriers: Vec<Complex<f64>>) -> Self {
        Self {
            timestamp,
            rssi: 0,
            frame_control: 0,
            source_mac: [0; 6],
            sequence: 0,
            shape,
            subcarriers,
        }
    }

    /// Build a frame from raw signed 16-bit (I, Q) pairs
    #[cfg(test)]
    pub fn from_iq(timestamp: i64, shape: FrameShape, pairs: &[(i16, i16)]) -> Self {
        let subcarriers = pairs
            .iter()
            .map(|&(i, q)| Complex::new(i as f64, q as f64))
            .collect();
        Self::new(timestamp, shape, subcarriers)
    }

    /// True when the data length matches K * chains
    pub fn is_consistent(&self) -> bool {
        self.subcarriers.len() == self.shape.cells()
    }

    /// Amplitude of one (chain, subcarrier) cell: sqrt(I² + Q²)
    /// سعة خلية واحدة
    pub fn amplitude(&self, chain: usize, subcarrier: usize) -> Option<f64> {
        if chain >= self.shape.antenna_chains || subcarrier >= self.shape.subcarriers {
            return None;
        }
        self.subcarriers
            .get(chain * self.shape.subcarriers + subcarrier)
            .map(|c| amplitude_of(*c))
    }

    /// All amplitudes, chain-major / جميع السعات
    pub fn amplitudes(&self) -> Vec<f64> {
        self.subcarriers.iter().map(|c| amplitude_of(*c)).collect()
    }

    /// All phases in radians: atan2(Q, I) / جميع الأطوار بالراديان
    pub fn phases(&self) -> Vec<f64> {
        self.subcarriers.iter().map(|c| c.arg()).collect()
    }
}

/// sqrt(I² + Q²), computed exactly that way (no hypot rescaling)
pub fn amplitude_of(value: Complex<f64>) -> f64 {
    value.norm_sqr().sqrt()
}

/// Format a MAC address as aa:bb:cc:dd:ee:ff
pub fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Motion State / حالة الحركة
// ═══════════════════════════════════════════════════════════════════════════════

/// Debounced motion state / حالة الحركة بعد التنعيم
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MotionState {
    /// No motion / لا توجد حركة
    #[default]
    Idle,
    /// Motion present / توجد حركة
    Active,
}

impl MotionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MotionState::Idle => "IDLE",
            MotionState::Active => "ACTIVE",
        }
    }

    /// Numeric form for time-series stores
    pub fn as_int(&self) -> i64 {
        match self {
            MotionState::Idle => 0,
            MotionState::Active => 1,
        }
    }
}

impl fmt::Display for MotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MotionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "IDLE" | "idle" | "0" => Ok(MotionState::Idle),
            "ACTIVE" | "active" | "1" => Ok(MotionState::Active),
            other => Err(format!("unknown motion state '{}'", other)),
        }
    }
}

/// A state change, reported exactly once
/// تغيير في الحالة يُبلغ عنه مرة واحدة فقط
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: MotionState,
    pub to: MotionState,
    /// Timestamp of the triggering frame
    pub timestamp: i64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Telemetry Record / سجل القياس عن بعد
// ═══════════════════════════════════════════════════════════════════════════════

/// One record per processed frame
/// سجل واحد لكل إطار معالج
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub timestamp: i64,

    /// Aggregated variability; None during window warm-up
    pub motion_score: Option<f64>,

    /// Effective noise floor used for this tick's thresholds
    pub baseline: Option<f64>,

    pub state: MotionState,

    /// Set only on the tick that changed state
    pub transition: Option<Transition>,

    /// Per-(chain, subcarrier) amplitudes of this frame (matrix verbosity only)
    pub amplitudes: Option<Vec<f64>>,
}

impl TelemetryRecord {
    /// Score used for plotting: warm-up ticks plot as zero
    pub fn score_or_zero(&self) -> f64 {
        self.motion_score.unwrap_or(0.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Viewer State / حالة العارض
// ═══════════════════════════════════════════════════════════════════════════════

/// Number of records kept for charts / عدد السجلات المحفوظة للرسوم البيانية
pub const MAX_HISTORY: usize = 200;

/// State of the terminal viewer, shared between threads
/// حالة العارض الطرفي المشتركة بين الخيوط
pub struct ViewerState {
    /// Is the line reader attached to its input? / هل القارئ متصل؟
    pub receiver_active: bool,

    /// Recent records (oldest first) / السجلات الأخيرة
    pub records: Vec<TelemetryRecord>,

    /// Current motion state as last reported
    pub current_state: MotionState,

    /// Timestamp of the last observed state change
    pub last_transition: Option<i64>,

    /// Number of Idle → Active changes seen
    pub activations: u64,

    /// Total lines parsed / إجمالي الأسطر المحللة
    pub lines_received: u64,

    /// Lines that failed to parse
    pub parse_errors: u64,

    /// Largest amplitude vector seen (cells)
    pub max_cells: usize,

    /// Subcarriers per chain, for labelling the heat-map
    pub subcarriers_hint: usize,

    /// Rendering paused (records still counted)
    pub paused: bool,

    /// Status message to display / رسالة الحالة للعرض
    pub status_message: String,

    /// Should the viewer quit? / هل يجب الخروج؟
    pub should_quit: bool,
}

impl ViewerState {
    pub fn new() -> Self {
        Self {
            receiver_active: false,
            records: Vec::new(),
            current_state: MotionState::Idle,
            last_transition: None,
            activations: 0,
            lines_received: 0,
            parse_errors: 0,
            max_cells: 0,
            subcarriers_hint: 0,
            paused: false,
            status_message: "Waiting for telemetry on stdin...".to_string(),
            should_quit: false,
        }
    }

    /// Add a parsed record and keep the last MAX_HISTORY
    /// إضافة سجل والحفاظ على آخر MAX_HISTORY سجل
    pub fn push_record(&mut self, record: TelemetryRecord) {
        self.lines_received += 1;

        if record.state != self.current_state {
            if record.state == MotionState::Active {
                self.activations += 1;
            }
            self.current_state = record.state;
            self.last_transition = Some(record.timestamp);
        }

        if let Some(ref amps) = record.amplitudes {
            self.max_cells = self.max_cells.max(amps.len());
        }

        if self.paused {
            return;
        }

        self.records.push(record);
        if self.records.len() > MAX_HISTORY {
            let excess = self.records.len() - MAX_HISTORY;
            self.records.drain(..excess);
        }
    }

    /// Get the last N records for display / الحصول على آخر N سجل
    pub fn get_last_records(&self, count: usize) -> &[TelemetryRecord] {
        let len = self.records.len();
        if len <= count {
            &self.records
        } else {
            &self.records[len - count..]
        }
    }

    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.records.last()
    }

    /// Clear chart history / مسح السجل
    pub fn clear(&mut self) {
        self.records.clear();
        self.max_cells = 0;
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }
}

impl Default for ViewerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe shared state type / نوع الحالة المشتركة الآمنة للخيوط
pub type SharedState = Arc<Mutex<ViewerState>>;

/// Create a new shared state instance
pub fn create_shared_state() -> SharedState {
    Arc::new(Mutex::new(ViewerState::new()))
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Unit Tests / اختبارات الوحدة
// ═══════════════════════════════════════════════════════════════════════════════
