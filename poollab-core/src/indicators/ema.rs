//! Exponential Moving Average (EMA), incremental form.
//!
//! Recursive: EMA[t] = alpha * close[t] + (1 - alpha) * EMA[t-1]
//! Seed: the first close. Warm after `period` updates.

use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    alpha: f64,
    value: Option<f64>,
    updates: usize,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "EMA period must be >= 1");
        Self {
            period,
            alpha: 2.0 / (period as f64 + 1.0),
            value: None,
            updates: 0,
        }
    }

    pub fn update(&mut self, bar: &Bar) {
        self.value = Some(match self.value {
            None => bar.close,
            Some(prev) => self.alpha * bar.close + (1.0 - self.alpha) * prev,
        });
        self.updates += 1;
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// Warm once `period` bars have been seen.
    pub fn is_warm(&self) -> bool {
        self.updates >= self.period
    }

    pub fn period(&self) -> usize {
        self.period
    }
}
