// ═══════════════════════════════════════════════════════════════════════════════
// 📦 detectors/mod.rs - Motion Detection Module
// ═══════════════════════════════════════════════════════════════════════════════
// كشف الحركة باستخدام بيانات CSI (نافذة، تجميع، خط أساس، تخلف)
// Motion detection from CSI: windows, aggregation, baseline, hysteresis
// ═══════════════════════════════════════════════════════════════════════════════

mod aggregate;
mod baseline;
mod hysteresis;
mod motion;
mod window;

pub use aggregate::AggregatorKind;
pub use motion::MotionEngine;

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Subcarrier Layout / تخطيط الموجات الحاملة الفرعية
// ═══════════════════════════════════════════════════════════════════════════════

/// تحديد معيار الواي فاي وعرض القناة بناءً على عدد الموجات الحاملة
/// Channel width and PHY implied by a per-chain subcarrier count
///
/// ```text
/// 52  / 56   → HT/VHT 20 MHz
/// 64         → 20 MHz (all FFT bins)
/// 114 / 128  → HT/VHT 40 MHz
/// 242 / 256  → VHT/HE 80 MHz (or HE 20 MHz)
/// ```
pub fn bandwidth_label(subcarriers: usize) -> &'static str {
    match subcarriers {
        52 | 56 => "Wi-Fi 4/5 (20MHz)",
        64 => "20MHz (full FFT)",
        114 | 128 => "Wi-Fi 4/5 (40MHz)",
        242 | 256 => "Wi-Fi 5/6 (80MHz)",
        484 | 512 => "Wi-Fi 6 (160MHz)",
        0 => "Unknown",
        _ => "Custom",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Unit Tests / اختبارات الوحدة
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bandwidth_label() {
        assert_eq!(bandwidth_label(52), "Wi-Fi 4/5 (20MHz)");
        assert_eq!(bandwidth_label(114), "Wi-Fi 4/5 (40MHz)");
        assert_eq!(bandwidth_label(256), "Wi-Fi 5/6 (80MHz)");
        assert_eq!(bandwidth_label(7), "Custom");
    }
}
