// ═══════════════════════════════════════════════════════════════════════════════
// 📦 detectors/window.rs - Sliding Amplitude Windows
// ═══════════════════════════════════════════════════════════════════════════════
// نافذة منزلقة لكل خلية (سلسلة، ناقل فرعي)
// One ring buffer per (chain, subcarrier) cell, stored flat
// ═══════════════════════════════════════════════════════════════════════════════

/// Last `capacity` amplitudes of every cell.
///
/// ```text
/// samples: [cell 0: s0 s1 .. sW-1][cell 1: s0 s1 .. sW-1] ...
///                    ^cursor (shared by all cells)
/// ```
///
/// Storage is allocated once; pushing overwrites the oldest slot.
#[derive(Debug, Clone)]
pub struct MotionWindow {
    cells: usize,
    capacity: usize,
    samples: Vec<f64>,
    cursor: usize,
    len: usize,
}

impl MotionWindow {
    pub fn new(cells: usize, capacity: usize) -> Self {
        Self {
            cells,
            capacity,
            samples: vec![0.0; cells * capacity],
            cursor: 0,
            len: 0,
        }
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Append one amplitude per cell / إضافة سعة لكل خلية
    ///
    /// Extra values are ignored and missing cells keep their previous slot
    /// value; callers pass exactly `cells` amplitudes.
    pub fn push(&mut self, amplitudes: &[f64]) {
        debug_assert_eq!(amplitudes.len(), self.cells);
        for (cell, &value) in amplitudes.iter().take(self.cells).enumerate() {
            self.samples[cell * self.capacity + self.cursor] = value;
        }
        self.cursor = (self.cursor + 1) % self.capacity;
        self.len = (self.len + 1).min(self.capacity);
    }

    /// Samples of one cell in storage order (not chronological)
    fn cell_samples(&self, cell: usize) -> &[f64] {
        let start = cell * self.capacity;
        &self.samples[start..start + self.len]
    }

    /// Write every cell's variance into `out`; false during warm-up
    /// حساب التباين لكل الخلايا
    pub fn variances_into(&self, out: &mut Vec<f64>) -> bool {
        out.clear();
        if !self.is_full() {
            return false;
        }
        out.extend((0..self.cells).map(|cell| sample_variance(self.cell_samples(cell))));
        true
    }
}

/// Two-pass sample variance; order of samples does not matter
fn sample_variance(samples: &[f64]) -> f64 {
    let n = samples.len();
    if n < 2 {
        return 0.0;
    }
    let mean = samples.iter().sum::<f64>() / n as f64;
    let squares: f64 = samples.iter().map(|x| (x - mean) * (x - mean)).sum();
    squares / (n - 1) as f64
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Unit Tests / اختبارات الوحدة
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn variances(window: &MotionWindow) -> Option<Vec<f64>> {
        let mut out = Vec::new();
        window.variances_into(&mut out).then_some(out)
    }

    #[test]
    fn test_variance_only_when_full() {
        let mut window = MotionWindow::new(2, 3);
        window.push(&[1.0, 10.0]);
        window.push(&[2.0, 10.0]);
        assert_eq!(variances(&window), None);

        window.push(&[3.0, 10.0]);
        assert!(window.is_full());
        assert_eq!(variances(&window), Some(vec![1.0, 0.0]));
    }

    #[test]
    fn test_oldest_sample_is_overwritten() {
        let mut window = MotionWindow::new(1, 3);
        for value in [100.0, 1.0, 2.0, 3.0] {
            window.push(&[value]);
        }
        // 100 has been evicted: variance of {1, 2, 3}
        assert_eq!(variances(&window), Some(vec![1.0]));
    }

    #[test]
    fn test_variances_into_reuses_buffer() {
        let mut window = MotionWindow::new(3, 2);
        let mut out = vec![42.0; 8];
        window.push(&[0.0, 1.0, 2.0]);
        assert!(!window.variances_into(&mut out));
        assert!(out.is_empty());

        window.push(&[2.0, 1.0, 4.0]);
        assert!(window.variances_into(&mut out));
        assert_eq!(out, vec![2.0, 0.0, 2.0]);
    }
}
