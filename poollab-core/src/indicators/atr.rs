//! Average True Range (ATR), incremental form.
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|).
//! ATR is the simple moving average of TR over `period`, floored at a
//! configurable minimum to prevent divide-by-near-zero downstream.

use crate::buffer::RingBuffer;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    floor: f64,
    true_ranges: RingBuffer<f64>,
    prev_close: Option<f64>,
    value: Option<f64>,
}

impl Atr {
    pub fn new(period: usize, floor: f64) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        assert!(floor > 0.0, "ATR floor must be positive");
        Self {
            period,
            floor,
            true_ranges: RingBuffer::new(period),
            prev_close: None,
            value: None,
        }
    }

    pub fn update(&mut self, bar: &Bar) {
        let tr = match self.prev_close {
            // First bar: only the high-low range is available.
            None => bar.high - bar.low,
            Some(pc) => (bar.high - bar.low)
                .max((bar.high - pc).abs())
                .max((bar.low - pc).abs()),
        };
        self.true_ranges.push(tr);
        self.prev_close = Some(bar.close);

        if self.true_ranges.len() == self.period {
            // Fixed summation order: oldest to newest.
            let sum: f64 = self.true_ranges.iter().sum();
            self.value = Some((sum / self.period as f64).max(self.floor));
        } else {
            self.value = None;
        }
    }

    /// Current ATR, floored; `None` until `period` bars have been seen.
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn is_warm(&self) -> bool {
        self.value.is_some()
    }

    pub fn period(&self) -> usize {
        self.period
    }
}
