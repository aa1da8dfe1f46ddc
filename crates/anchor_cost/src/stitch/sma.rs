//! Simple moving average over a fixed window.

use std::collections::VecDeque;

#[derive(Clone, Debug)]
pub struct Sma {
    capacity: usize,
    window: VecDeque<f64>,
    sum: f64,
}

impl Sma {
    /// A capacity of 0 behaves as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window: VecDeque::with_capacity(capacity),
            sum: 0.0,
        }
    }

    /// Admit `value` (evicting the oldest once full) and return the current mean.
    pub fn add(&mut self, value: f64) -> f64 {
        if self.window.len() >= self.capacity {
            if let Some(oldest) = self.window.pop_front() {
                self.sum -= oldest;
            }
        }
        self.window.push_back(value);
        self.sum += value;
        self.sum / self.window.len() as f64
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Smooth a whole series with a fresh window.
pub fn smooth(values: impl IntoIterator<Item = f64>, capacity: usize) -> Vec<f64> {
    let mut sma = Sma::new(capacity);
    values.into_iter().map(|v| sma.add(v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_of_two() {
        let mut sma = Sma::new(2);
        assert_eq!(sma.add(1.0), 1.0);
        assert_eq!(sma.add(2.0), 1.5);
        assert_eq!(sma.add(3.0), 2.5);
    }

    #[test]
    fn partial_window_is_not_zero_padded() {
        assert_eq!(smooth([4.0, 8.0], 10), vec![4.0, 6.0]);
    }

    #[test]
    fn zero_capacity_is_identity() {
        let mut sma = Sma::new(0);
        assert_eq!(sma.capacity(), 1);
        assert_eq!(smooth([3.0, 5.0, 7.0], 0), vec![3.0, 5.0, 7.0]);
        assert_eq!(sma.add(9.0), 9.0);
    }
}
