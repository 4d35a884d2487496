// ═══════════════════════════════════════════════════════════════════════════════
// 📦 detectors/hysteresis.rs - Debounced Motion State
// ═══════════════════════════════════════════════════════════════════════════════
// آلة حالة بتخلف (Hysteresis) لمنع التذبذب بين الحالتين
// ═══════════════════════════════════════════════════════════════════════════════
//
// ```text
//            score > baseline * high  (confirm_ticks in a row)
//   ┌──────┐ ──────────────────────────────────────────────▶ ┌────────┐
//   │ IDLE │                                                  │ ACTIVE │
//   └──────┘ ◀────────────────────────────────────────────── └────────┘
//            score < baseline * low   (hold_ticks in a row)
// ```

use crate::state::{MotionState, Transition};

/// Two-threshold state machine with consecutive-tick confirmation
#[derive(Debug, Clone)]
pub struct Hysteresis {
    high_multiplier: f64,
    low_multiplier: f64,
    confirm_ticks: u32,
    hold_ticks: u32,

    state: MotionState,
    /// Consecutive ticks past the threshold of the current state
    streak: u32,
    last_transition: Option<i64>,
}

impl Hysteresis {
    pub fn new(high_multiplier: f64, low_multiplier: f64, confirm_ticks: u32, hold_ticks: u32) -> Self {
        Self {
            high_multiplier,
            low_multiplier,
            confirm_ticks,
            hold_ticks,
            state: MotionState::Idle,
            streak: 0,
            last_transition: None,
        }
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    pub fn last_transition(&self) -> Option<i64> {
        self.last_transition
    }

    /// Above the activation threshold for this baseline?
    pub fn is_above_high(&self, score: f64, baseline: f64) -> bool {
        score > baseline * self.high_multiplier
    }

    /// Feed one scored tick / تحديث الحالة بدرجة جديدة
    ///
    /// Returns the transition on the tick that completes a streak.
    pub fn update(&mut self, score: f64, baseline: f64, timestamp: i64) -> Option<Transition> {
        let (past_threshold, needed, next) = match self.state {
            MotionState::Idle => (
                self.is_above_high(score, baseline),
                self.confirm_ticks,
                MotionState::Active,
            ),
            MotionState::Active => (
                score < baseline * self.low_multiplier,
                self.hold_ticks,
                MotionState::Idle,
            ),
        };

        if !past_threshold {
            self.streak = 0;
            return None;
        }

        self.streak += 1;
        if self.streak < needed {
            return None;
        }

        let transition = Transition {
            from: self.state,
            to: next,
            timestamp,
        };
        self.state = next;
        self.streak = 0;
        self.last_transition = Some(timestamp);
        Some(transition)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Unit Tests / اختبارات الوحدة
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(h: &mut Hysteresis, scores: &[f64]) -> Vec<(usize, Transition)> {
        scores
            .iter()
            .enumerate()
            .filter_map(|(i, &s)| h.update(s, 1.0, i as i64).map(|t| (i, t)))
            .collect()
    }

    #[test]
    fn test_short_excursions_never_activate() {
        let mut h = Hysteresis::new(3.0, 1.5, 4, 2);
        // bursts of 3 above threshold, broken by a quiet tick
        let scores = [5.0, 5.0, 5.0, 0.0, 5.0, 5.0, 5.0, 2.0, 5.0, 5.0, 5.0];
        assert!(feed(&mut h, &scores).is_empty());
        assert_eq!(h.state(), MotionState::Idle);
    }

    #[test]
    fn test_activation_and_release() {
        let mut h = Hysteresis::new(3.0, 1.5, 3, 2);
        let scores = [5.0, 5.0, 5.0, 2.0, 1.0, 2.0, 1.0, 1.0, 1.0];
        let transitions = feed(&mut h, &scores);

        assert_eq!(transitions.len(), 2);
        assert_eq!(transitions[0].0, 2);
        assert_eq!(transitions[0].1.to, MotionState::Active);
        // 2.0 sits in the dead band and breaks the hold streak
        assert_eq!(transitions[1].0, 7);
        assert_eq!(transitions[1].1.from, MotionState::Active);
        assert_eq!(h.last_transition(), Some(7));
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut h = Hysteresis::new(3.0, 1.5, 1, 1);
        assert!(h.update(3.0, 1.0, 0).is_none());
        assert!(h.update(3.0001, 1.0, 1).is_some());
        assert!(h.update(1.5, 1.0, 2).is_none());
        assert!(h.update(1.4999, 1.0, 3).is_some());
    }
}
