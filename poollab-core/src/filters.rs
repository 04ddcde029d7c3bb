//! Candidate entry filters.
//!
//! A closed set of guards, each a pure function of the bar, the indicator
//! snapshot, and configuration. Adding a filter means adding a variant here
//! and wiring it into the FSM's filter list — there is no dynamic dispatch.

use chrono::{DateTime, Timelike, Utc};

use crate::config::CandidateConfig;
use crate::domain::{Bar, IndicatorSnapshot, Regime, Side};

/// The filter set evaluated in FILTERS state, in fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    EmaAlignment,
    Volume,
    Regime,
    Session,
    Spacing,
}

impl Filter {
    pub const ALL: [Filter; 5] = [
        Filter::EmaAlignment,
        Filter::Volume,
        Filter::Regime,
        Filter::Session,
        Filter::Spacing,
    ];

    pub fn evaluate(
        &self,
        bar: &Bar,
        snapshot: &IndicatorSnapshot,
        side: Side,
        config: &CandidateConfig,
        last_ready: Option<DateTime<Utc>>,
    ) -> bool {
        match self {
            Filter::EmaAlignment => ema_alignment_ok(snapshot, side, config),
            Filter::Volume => volume_ok(bar, snapshot, config.volume_multiple),
            Filter::Regime => regime_ok(snapshot, side, &config.regime_allowed),
            Filter::Session => session_ok(bar.ts, config),
            Filter::Spacing => {
                spacing_ok(bar.ts, last_ready, config.min_entry_spacing_secs)
            }
        }
    }
}

/// EMA trend alignment: long needs fast above slow, short the reverse.
/// `ema_tolerance_pct` accepts near-alignment within a band of the slow EMA.
pub fn ema_alignment_ok(snapshot: &IndicatorSnapshot, side: Side, config: &CandidateConfig) -> bool {
    if !config.ema_alignment {
        return true;
    }
    let (fast, slow) = match (snapshot.ema_fast, snapshot.ema_slow) {
        (Some(f), Some(s)) => (f, s),
        _ => return false,
    };
    let tolerance = slow * config.ema_tolerance_pct;
    match side {
        Side::Bullish => fast > slow - tolerance,
        Side::Bearish => fast < slow + tolerance,
    }
}

/// Volume multiple vs the SMA. A multiple of 0 disables the filter; an
/// unwarmed volume SMA passes rather than blocking every early signal.
pub fn volume_ok(bar: &Bar, snapshot: &IndicatorSnapshot, multiple: f64) -> bool {
    if multiple <= 0.0 {
        return true;
    }
    match snapshot.volume_sma {
        Some(sma) if sma > 0.0 => bar.volume >= sma * multiple,
        _ => true,
    }
}

/// Regime allow-set. The configured set applies to longs; shorts use the
/// bull/bear mirror. An empty set or unwarmed regime passes.
pub fn regime_ok(snapshot: &IndicatorSnapshot, side: Side, allowed: &[Regime]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let regime = match snapshot.regime {
        Some(r) => r,
        None => return true,
    };
    let effective = match side {
        Side::Bullish => regime,
        Side::Bearish => mirror(regime),
    };
    allowed.contains(&effective)
}

/// UTC time-of-day session gate: inside at least one configured window (or
/// no windows configured) and inside no exclusion window.
pub fn session_ok(ts: DateTime<Utc>, config: &CandidateConfig) -> bool {
    let minute_of_day = ts.hour() * 60 + ts.minute();
    for exclusion in &config.session_exclusions {
        if exclusion.contains(minute_of_day) {
            return false;
        }
    }
    if config.sessions.is_empty() {
        return true;
    }
    config.sessions.iter().any(|w| w.contains(minute_of_day))
}

/// Per-side entry spacing: elapsed time since the last READY signal must
/// reach `min_spacing_secs`. 0 disables.
pub fn spacing_ok(
    ts: DateTime<Utc>,
    last_ready: Option<DateTime<Utc>>,
    min_spacing_secs: u64,
) -> bool {
    if min_spacing_secs == 0 {
        return true;
    }
    match last_ready {
        None => true,
        Some(last) => ts - last >= chrono::Duration::seconds(min_spacing_secs as i64),
    }
}

fn mirror(regime: Regime) -> Regime {
    match regime {
        Regime::Bull => Regime::Bear,
        Regime::Bear => Regime::Bull,
        Regime::Neutral => Regime::Neutral,
    }
}
