use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::timeframe::Timeframe;

/// Single OHLCV bar with timestamp, symbol, and originating timeframe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(
        ts: DateTime<Utc>,
        symbol: String,
        timeframe: Timeframe,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self { ts, symbol, timeframe, open, high, low, close, volume }
    }

    /// Validate bar invariants: `low <= min(open, close) <= max(open, close) <= high`,
    /// `volume >= 0`, all prices finite.
    pub fn validate(&self) -> Result<(), BarError> {
        if !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite())
        {
            return Err(BarError::NonFinite);
        }
        if self.high < self.low {
            return Err(BarError::InvalidRange { high: self.high, low: self.low });
        }
        if !(self.low..=self.high).contains(&self.open) {
            return Err(BarError::OpenOutOfRange);
        }
        if !(self.low..=self.high).contains(&self.close) {
            return Err(BarError::CloseOutOfRange);
        }
        if self.volume < 0.0 {
            return Err(BarError::NegativeVolume);
        }
        Ok(())
    }

    /// Check if bar is bullish (close > open).
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Check if bar is bearish (close < open).
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Bar range (high - low).
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

#[derive(Debug, Error)]
pub enum BarError {
    #[error("Invalid bar range: high={high}, low={low}")]
    InvalidRange { high: f64, low: f64 },

    #[error("Non-finite price or volume")]
    NonFinite,

    #[error("Negative volume not allowed")]
    NegativeVolume,

    #[error("Open price outside high/low range")]
    OpenOutOfRange,

    #[error("Close price outside high/low range")]
    CloseOutOfRange,
}
