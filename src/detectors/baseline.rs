// ═══════════════════════════════════════════════════════════════════════════════
// 📦 detectors/baseline.rs - Noise Floor Tracking
// ═══════════════════════════════════════════════════════════════════════════════
// خط الأساس: متوسط متحرك أسي لدرجة الحركة في بيئة هادئة
// ═══════════════════════════════════════════════════════════════════════════════

/// EWMA of the motion score, seeded by the first score
#[derive(Debug, Clone)]
pub struct Baseline {
    alpha: f64,
    floor: f64,
    value: Option<f64>,
}

impl Baseline {
    /// `horizon` ticks (alpha = 1 / horizon) and a lower bound for thresholds
    pub fn new(horizon: u32, floor: f64) -> Self {
        Self {
            alpha: 1.0 / horizon.max(1) as f64,
            floor,
            value: None,
        }
    }

    pub fn is_seeded(&self) -> bool {
        self.value.is_some()
    }

    /// Raw EWMA value
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// Baseline used for thresholds: never below the floor
    pub fn effective(&self) -> f64 {
        self.value.unwrap_or(0.0).max(self.floor)
    }

    /// Fold one score into the average
    pub fn observe(&mut self, score: f64) {
        self.fold(score, self.alpha);
    }

    /// Fold one score in at `1 / slowdown` of the normal rate
    /// يتكيف ببطء أثناء الحركة حتى يلحق بارتفاع دائم في الضجيج
    pub fn observe_slow(&mut self, score: f64, slowdown: f64) {
        self.fold(score, self.alpha / slowdown.max(1.0));
    }

    fn fold(&mut self, score: f64, alpha: f64) {
        self.value = Some(match self.value {
            None => score,
            Some(current) => current + alpha * (score - current),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_then_ewma() {
        let mut baseline = Baseline::new(4, 0.0);
        assert!(!baseline.is_seeded());

        baseline.observe(8.0);
        assert_eq!(baseline.value(), Some(8.0));

        baseline.observe(0.0);
        assert_eq!(baseline.value(), Some(6.0));
    }

    #[test]
    fn test_floor_applies_to_quiet_channel() {
        let mut baseline = Baseline::new(4, 0.01);
        assert_eq!(baseline.effective(), 0.01);
        baseline.observe(0.0);
        assert_eq!(baseline.effective(), 0.01);
        baseline.observe(5.0);
        assert_eq!(baseline.effective(), 1.25);
    }

    #[test]
    fn test_slow_observe_uses_reduced_rate() {
        let mut baseline = Baseline::new(4, 0.0);
        baseline.observe(0.0);
        baseline.observe_slow(8.0, 10.0);
        let value = baseline.value().unwrap();
        assert!((value - 0.2).abs() < 1e-12, "got {}", value);

        // slowdown below one never speeds the average up
        let mut fast = Baseline::new(4, 0.0);
        fast.observe(0.0);
        fast.observe_slow(8.0, 0.5);
        assert_eq!(fast.value(), Some(2.0));
    }
}
