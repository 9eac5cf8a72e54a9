//! Rolling per-channel baseline used as the reference level for spark thresholds.

use crate::CHANNELS;
use std::collections::VecDeque;

/// Raw values kept per channel for the baseline mean
pub const BACKGROUND_CAPACITY: usize = 20;

/// Bounded FIFO of the most recent raw values on one channel
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundWindow {
    values: VecDeque<f64>,
}

impl BackgroundWindow {
    pub fn new() -> Self {
        Self {
            values: VecDeque::with_capacity(BACKGROUND_CAPACITY + 1),
        }
    }

    pub fn push(&mut self, value: f64) {
        self.values.push_back(value);
        if self.values.len() > BACKGROUND_CAPACITY {
            self.values.pop_front();
        }
    }

    /// Mean of the window, `0.0` while empty
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.values.len()
    }
}

/// Baselines for all channels plus the shared warm-up counter.
///
/// Warm-up counts accepted readings across the whole link, not per channel,
/// so every channel arms on the same reading.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundEstimator {
    windows: [BackgroundWindow; CHANNELS],
    samples_seen: u64,
}

impl BackgroundEstimator {
    pub fn new() -> Self {
        Self {
            windows: std::array::from_fn(|_| BackgroundWindow::new()),
            samples_seen: 0,
        }
    }

    pub fn push(&mut self, values: &[f64; CHANNELS]) {
        for (window, &value) in self.windows.iter_mut().zip(values) {
            window.push(value);
        }
        self.samples_seen += 1;
    }

    pub fn baseline(&self, channel: usize) -> f64 {
        self.windows[channel].mean()
    }

    #[allow(dead_code)]
    pub fn window(&self, channel: usize) -> &BackgroundWindow {
        &self.windows[channel]
    }

    pub fn is_warmed_up(&self) -> bool {
        self.samples_seen > BACKGROUND_CAPACITY as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_never_exceeds_capacity() {
        let mut window = BackgroundWindow::new();
        for i in 0..100 {
            window.push(i as f64);
            assert!(window.len() <= BACKGROUND_CAPACITY);
        }
        // Holds 80..=99
        assert_eq!(window.len(), BACKGROUND_CAPACITY);
        assert!((window.mean() - 89.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_window_mean_is_zero() {
        assert_eq!(BackgroundWindow::new().mean(), 0.0);
    }

    #[test]
    fn test_warm_up_after_twenty_samples() {
        let mut estimator = BackgroundEstimator::new();
        for _ in 0..BACKGROUND_CAPACITY {
            estimator.push(&[1.0, 2.0, 3.0]);
            assert!(!estimator.is_warmed_up());
        }
        estimator.push(&[1.0, 2.0, 3.0]);
        assert!(estimator.is_warmed_up());
        assert!((estimator.baseline(1) - 2.0).abs() < 1e-12);
        assert_eq!(estimator.window(2).len(), BACKGROUND_CAPACITY);
    }
}
