//! 运动分数的时间平滑：有界历史 + Savitzky–Golay 多项式拟合

use std::collections::VecDeque;

pub const MOTION_HISTORY_CAPACITY: usize = 30;
pub const SMOOTHING_WINDOW: usize = 15;
pub const SMOOTHING_DEGREE: usize = 3;

/// Bounded FIFO of raw motion scores.
#[derive(Debug, Clone)]
pub struct MotionHistory {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl MotionHistory {
    pub fn new() -> Self {
        Self::with_capacity(MOTION_HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Appends a sample and returns `true` when the oldest one was evicted.
    pub fn push(&mut self, sample: f64) -> bool {
        self.samples.push_back(sample);
        if self.samples.len() > self.capacity {
            self.samples.pop_front();
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl Default for MotionHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Least-squares polynomial smoother evaluated at the newest sample,
/// i.e. the trailing edge of a Savitzky–Golay filter in `interp` mode.
#[derive(Debug, Clone, Copy)]
pub struct SavitzkyGolay {
    max_window: usize,
    degree: usize,
}

impl SavitzkyGolay {
    pub fn new(max_window: usize, degree: usize) -> Self {
        Self { max_window, degree }
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Window actually used for a series of `len` samples.
    pub fn window_for(&self, len: usize) -> usize {
        self.max_window.min(len)
    }

    /// Smoothed value at the last position, `None` when the window cannot
    /// support a fit of the configured degree.
    pub fn smooth_last(&self, series: &[f64]) -> Option<f64> {
        let window = self.window_for(series.len());
        let terms = self.degree + 1;
        if window < terms {
            return None;
        }

        let tail = &series[series.len() - window..];

        // x runs from -(window-1) to 0, so the fitted value at the newest
        // sample is the constant coefficient.
        let mut normal = vec![vec![0.0f64; terms]; terms];
        let mut rhs = vec![0.0f64; terms];
        for (i, &y) in tail.iter().enumerate() {
            let x = i as f64 - (window - 1) as f64;
            let mut powers = vec![1.0f64; 2 * terms - 1];
            for p in 1..powers.len() {
                powers[p] = powers[p - 1] * x;
            }
            for r in 0..terms {
                rhs[r] += powers[r] * y;
                for c in 0..terms {
                    normal[r][c] += powers[r + c];
                }
            }
        }

        solve(normal, rhs).map(|coeffs| coeffs[0])
    }
}

impl Default for SavitzkyGolay {
    fn default() -> Self {
        Self::new(SMOOTHING_WINDOW, SMOOTHING_DEGREE)
    }
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0f64; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

/// 运动历史 + 平滑器。只有在历史溢出（超过容量）之后才给出平滑值
#[derive(Debug, Clone, Default)]
pub struct TemporalSmoother {
    history: MotionHistory,
    filter: SavitzkyGolay,
}

impl TemporalSmoother {
    pub fn new(history: MotionHistory, filter: SavitzkyGolay) -> Self {
        Self { history, filter }
    }

    /// Records a raw sample. Returns the denoised current value once the
    /// history has overflowed its capacity, `None` while it is still filling.
    /// Windows too small for the polynomial fall back to the raw sample.
    pub fn update(&mut self, sample: f64) -> Option<f64> {
        if !self.history.push(sample) {
            return None;
        }

        let series: Vec<f64> = self.history.iter().collect();
        Some(self.filter.smooth_last(&series).unwrap_or(sample))
    }

    pub fn history(&self) -> &MotionHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut MotionHistory {
        &mut self.history
    }

    pub fn filter(&self) -> SavitzkyGolay {
        self.filter
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_is_bounded() {
        let mut history = MotionHistory::new();
        for i in 0..100 {
            history.push(i as f64);
        }
        assert_eq!(history.len(), 30);
        assert_eq!(history.iter().next(), Some(70.0));
        assert_eq!(history.last(), Some(99.0));
    }

    #[test]
    fn test_push_reports_eviction() {
        let mut history = MotionHistory::with_capacity(2);
        assert!(!history.push(1.0));
        assert!(!history.push(2.0));
        assert!(history.push(3.0));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_cubic_is_reproduced_exactly() {
        let series: Vec<f64> = (0..30)
            .map(|i| {
                let x = i as f64;
                0.01 * x * x * x - 0.2 * x * x + x + 3.0
            })
            .collect();
        let smoothed = SavitzkyGolay::default().smooth_last(&series).unwrap();
        assert!((smoothed - series[29]).abs() < 1e-6);
    }

    #[test]
    fn test_constant_series() {
        let series = vec![7.5; 30];
        let smoothed = SavitzkyGolay::default().smooth_last(&series).unwrap();
        assert!((smoothed - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_noise_is_damped() {
        let series: Vec<f64> = (0..30).map(|i| if i % 2 == 0 { 10.0 } else { 0.0 }).collect();
        let smoothed = SavitzkyGolay::default().smooth_last(&series).unwrap();
        assert!(smoothed < 10.0 && smoothed > 0.0);
    }

    #[test]
    fn test_window_too_small() {
        let filter = SavitzkyGolay::default();
        assert_eq!(filter.window_for(3), 3);
        assert!(filter.smooth_last(&[1.0, 2.0, 3.0]).is_none());
        assert!(filter.smooth_last(&[1.0, 2.0, 3.0, 4.0]).is_some());
    }

    #[test]
    fn test_smoother_waits_for_overflow() {
        let mut smoother = TemporalSmoother::default();
        for _ in 0..30 {
            assert!(smoother.update(4.0).is_none());
        }
        let value = smoother.update(4.0).unwrap();
        assert!((value - 4.0).abs() < 1e-9);
        assert_eq!(smoother.history().len(), 30);
    }

    #[test]
    fn test_smoother_falls_back_to_raw_sample() {
        let mut smoother =
            TemporalSmoother::new(MotionHistory::with_capacity(2), SavitzkyGolay::default());
        smoother.update(1.0);
        smoother.update(2.0);
        assert_eq!(smoother.update(9.0), Some(9.0));
    }
}
