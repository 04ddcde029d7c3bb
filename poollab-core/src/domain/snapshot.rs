//! Immutable indicator snapshots.
//!
//! A snapshot captures all indicator values AFTER updating with the current
//! bar; every decision stage reads the snapshot, never the live indicators,
//! so no stage can observe data the others have not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse market-trend classification derived from the EMA spread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    Bull,
    Bear,
    Neutral,
}

impl Regime {
    pub fn is_bullish(&self) -> bool {
        *self == Regime::Bull
    }

    pub fn is_bearish(&self) -> bool {
        *self == Regime::Bear
    }

    pub fn is_trending(&self) -> bool {
        *self != Regime::Neutral
    }
}

/// Indicator values as of a specific bar.
///
/// Fields are `None` until the corresponding indicator has seen enough bars;
/// `warmed_up` is true once every indicator has a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub ts: DateTime<Utc>,
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub atr: Option<f64>,
    pub volume_sma: Option<f64>,
    pub regime: Option<Regime>,
    pub current_close: f64,
    pub current_volume: f64,
    pub warmed_up: bool,
}

impl IndicatorSnapshot {
    /// True if EMA fast > EMA slow (bullish alignment).
    pub fn ema_aligned_bullish(&self) -> bool {
        matches!((self.ema_fast, self.ema_slow), (Some(f), Some(s)) if f > s)
    }

    /// True if EMA fast < EMA slow (bearish alignment).
    pub fn ema_aligned_bearish(&self) -> bool {
        matches!((self.ema_fast, self.ema_slow), (Some(f), Some(s)) if f < s)
    }

    /// Current volume as a multiple of average volume, `None` until the
    /// volume SMA is warm or when the average is zero.
    pub fn volume_multiple(&self) -> Option<f64> {
        match self.volume_sma {
            Some(sma) if sma > 0.0 => Some(self.current_volume / sma),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snap(ema_fast: Option<f64>, ema_slow: Option<f64>) -> IndicatorSnapshot {
        IndicatorSnapshot {
            ts: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            ema_fast,
            ema_slow,
            atr: Some(1.0),
            volume_sma: Some(1000.0),
            regime: Some(Regime::Bull),
            current_close: 100.0,
            current_volume: 2500.0,
            warmed_up: true,
        }
    }

    #[test]
    fn ema_alignment_requires_both_values() {
        assert!(snap(Some(101.0), Some(100.0)).ema_aligned_bullish());
        assert!(snap(Some(99.0), Some(100.0)).ema_aligned_bearish());
        assert!(!snap(None, Some(100.0)).ema_aligned_bullish());
        assert!(!snap(Some(101.0), None).ema_aligned_bearish());
    }

    #[test]
    fn volume_multiple_vs_sma() {
        let s = snap(Some(1.0), Some(1.0));
        assert_eq!(s.volume_multiple(), Some(2.5));

        let mut no_sma = snap(Some(1.0), Some(1.0));
        no_sma.volume_sma = None;
        assert_eq!(no_sma.volume_multiple(), None);
    }

    #[test]
    fn regime_predicates() {
        assert!(Regime::Bull.is_bullish());
        assert!(Regime::Bear.is_trending());
        assert!(!Regime::Neutral.is_trending());
    }
}
