//! Pivot (swing point) detector.
//!
//! A swing high at index i exists when its high strictly exceeds every high
//! in the surrounding `lookback` bars on both sides, so confirmation — and
//! emission — lag by `lookback` closed HTF bars. Swing lows mirror it.
//! Strength classifies by the pivot's distance from the competing extreme in
//! ATR units.

use tracing::debug;

use crate::buffer::RingBuffer;
use crate::config::PivotConfig;
use crate::domain::{Bar, DetectorKind, PoolCandidateEvent, Side, Timeframe};

/// Fraction of ATR used as the half-width of the pool band around a pivot.
const BAND_ATR_FRACTION: f64 = 0.1;

/// Strength classification for a confirmed pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PivotStrength {
    Regular,
    Significant,
    Major,
}

#[derive(Debug, Clone)]
pub struct PivotDetector {
    tf: Timeframe,
    config: PivotConfig,
    window: RingBuffer<Bar>,
}

impl PivotDetector {
    pub fn new(tf: Timeframe, config: PivotConfig) -> Self {
        assert!(
            (2..=10).contains(&config.lookback),
            "pivot lookback must be between 2 and 10"
        );
        let window = RingBuffer::new(2 * config.lookback + 1);
        Self { tf, config, window }
    }

    /// Process one closed HTF bar; emits pivots confirmed by this bar.
    /// The candidate's `created_at` is the confirming bar's timestamp so
    /// the registry never schedules a pool in the past.
    pub fn update(&mut self, bar: &Bar, atr: Option<f64>) -> Vec<PoolCandidateEvent> {
        self.window.push(bar.clone());
        if !self.window.is_full() {
            return Vec::new();
        }

        let atr = match atr {
            Some(v) if v > 0.0 => v,
            _ => {
                debug!(tf = %self.tf, ts = %bar.ts, "pivot skipped: ATR not ready");
                return Vec::new();
            }
        };

        let lookback = self.config.lookback;
        let pivot = match self.window.at(lookback) {
            Some(p) => p.clone(),
            None => return Vec::new(),
        };

        let mut events = Vec::new();

        if self.is_swing_high(&pivot, lookback) {
            let max_other = self.surrounding_max_high(lookback);
            let distance = (pivot.high - max_other) / atr;
            if distance >= self.config.min_sigma {
                let (label, strength) = classify(distance);
                debug!(tf = %self.tf, price = pivot.high, ?label, "swing high confirmed");
                events.push(self.candidate(Side::Bearish, pivot.high, strength, atr, bar));
            }
        }

        if self.is_swing_low(&pivot, lookback) {
            let min_other = self.surrounding_min_low(lookback);
            let distance = (min_other - pivot.low) / atr;
            if distance >= self.config.min_sigma {
                let (label, strength) = classify(distance);
                debug!(tf = %self.tf, price = pivot.low, ?label, "swing low confirmed");
                events.push(self.candidate(Side::Bullish, pivot.low, strength, atr, bar));
            }
        }

        events
    }

    fn candidate(
        &self,
        side: Side,
        price: f64,
        strength: f64,
        atr: f64,
        confirming_bar: &Bar,
    ) -> PoolCandidateEvent {
        let half_width = BAND_ATR_FRACTION * atr;
        PoolCandidateEvent {
            detector: DetectorKind::Pivot,
            timeframe: self.tf,
            side,
            top: price + half_width,
            bottom: price - half_width,
            strength,
            created_at: confirming_bar.ts,
        }
    }

    fn is_swing_high(&self, pivot: &Bar, lookback: usize) -> bool {
        self.surrounding(lookback).all(|b| b.high < pivot.high)
    }

    fn is_swing_low(&self, pivot: &Bar, lookback: usize) -> bool {
        self.surrounding(lookback).all(|b| b.low > pivot.low)
    }

    fn surrounding(&self, lookback: usize) -> impl Iterator<Item = &Bar> {
        (0..self.window.len())
            .filter(move |&i| i != lookback)
            .filter_map(move |i| self.window.at(i))
    }

    fn surrounding_max_high(&self, lookback: usize) -> f64 {
        self.surrounding(lookback).map(|b| b.high).fold(f64::MIN, f64::max)
    }

    fn surrounding_min_low(&self, lookback: usize) -> f64 {
        self.surrounding(lookback).map(|b| b.low).fold(f64::MAX, f64::min)
    }
}

/// Classify ATR distance into a strength label and a normalized value.
fn classify(atr_distance: f64) -> (PivotStrength, f64) {
    if atr_distance >= 1.0 {
        (PivotStrength::Major, (atr_distance / 2.0).min(1.0))
    } else if atr_distance >= 0.5 {
        (PivotStrength::Significant, atr_distance)
    } else {
        (PivotStrength::Regular, atr_distance / 0.5)
    }
}
