//! Incremental indicators.
//!
//! Each indicator advances one bar at a time in O(1); `IndicatorPack`
//! coordinates the suite and snapshots it per bar. The same pack type runs
//! once on the base stream and once per detector timeframe on closed HTF
//! bars.

pub mod atr;
pub mod ema;
pub mod pack;
pub mod regime;
pub mod volume_sma;

pub use atr::Atr;
pub use ema::Ema;
pub use pack::IndicatorPack;
pub use regime::RegimeClassifier;
pub use volume_sma::VolumeSma;

/// Create synthetic bars from close prices for testing.
///
/// Open = previous close (or close for the first bar), high/low bracket the
/// body by 1.0, volume = 1000.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<crate::domain::Bar> {
    use crate::domain::{Bar, Timeframe};
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            let high = open.max(close) + 1.0;
            let low = open.min(close) - 1.0;
            Bar::new(
                base + chrono::Duration::minutes(i as i64),
                "TEST".to_string(),
                Timeframe::M1,
                open,
                high,
                low,
                close,
                1000.0,
            )
        })
        .collect()
}

/// Create bars from explicit (open, high, low, close) tuples for testing.
#[cfg(test)]
pub fn make_ohlc_bars(data: &[(f64, f64, f64, f64)]) -> Vec<crate::domain::Bar> {
    use crate::domain::{Bar, Timeframe};
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    data.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| {
            Bar::new(
                base + chrono::Duration::minutes(i as i64),
                "TEST".to_string(),
                Timeframe::M1,
                open,
                high,
                low,
                close,
                1000.0,
            )
        })
        .collect()
}
