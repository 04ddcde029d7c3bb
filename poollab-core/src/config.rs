//! Typed configuration for every pipeline stage.
//!
//! One struct per component plus the umbrella `PipelineConfig`. Defaults
//! match the documented strategy parameters; `validate()` is called once at
//! load time and rejects settings the pipeline does not support.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{Regime, Timeframe};
use crate::errors::ConfigError;

/// How a stage reacts to a bar that arrives out of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutOfOrderPolicy {
    /// Silently ignore the bar (counted and reported as a diagnostic).
    Drop,
    /// Fail the symbol with `ClockSkew`.
    Raise,
    /// Reprocess past buckets. Not supported; rejected at validation.
    Recalc,
}

impl Default for OutOfOrderPolicy {
    fn default() -> Self {
        OutOfOrderPolicy::Drop
    }
}

/// Aggregation stage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Base timeframe of the input stream in minutes (usually 1).
    pub source_tf_minutes: i64,
    /// Higher timeframes to aggregate into, as minute counts.
    pub target_timeframes_minutes: Vec<i64>,
    /// Ring-buffer capacity for per-stage bar history.
    pub buffer_size: usize,
    pub out_of_order_policy: OutOfOrderPolicy,
    /// Future-bound tolerance in seconds; `None` disables the check.
    pub max_clock_skew_secs: Option<u64>,
    /// Require non-decreasing timestamps across calls.
    pub enable_strict_ordering: bool,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            source_tf_minutes: 1,
            target_timeframes_minutes: vec![60, 240],
            buffer_size: 1500,
            out_of_order_policy: OutOfOrderPolicy::default(),
            max_clock_skew_secs: None,
            enable_strict_ordering: true,
        }
    }
}

/// Indicator pack settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub ema_fast_period: usize,
    pub ema_slow_period: usize,
    pub atr_period: usize,
    pub volume_sma_period: usize,
    /// Regime threshold: bull when `ema_fast - ema_slow > sensitivity * close`.
    pub regime_sensitivity: f64,
    /// Minimum ATR value; prevents divide-by-near-zero downstream.
    pub atr_floor: f64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            ema_fast_period: 21,
            ema_slow_period: 50,
            atr_period: 14,
            volume_sma_period: 20,
            regime_sensitivity: 0.001,
            atr_floor: 1e-5,
        }
    }
}

/// Fair-Value-Gap detector thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FvgConfig {
    /// Minimum gap size in ATR units (OR'd with the percentage gate).
    pub min_gap_atr: f64,
    /// Minimum gap size as a fraction of price (OR'd with the ATR gate).
    pub min_gap_pct: f64,
    /// Minimum middle-bar volume relative to the volume SMA; 0 disables.
    pub min_rel_vol: f64,
}

impl Default for FvgConfig {
    fn default() -> Self {
        Self { min_gap_atr: 0.3, min_gap_pct: 0.05, min_rel_vol: 1.2 }
    }
}

/// Pivot detector thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PivotConfig {
    /// Bars on each side of a swing point; emission is delayed by this many bars.
    pub lookback: usize,
    /// Minimum distance to the competing extreme, in ATR units.
    pub min_sigma: f64,
}

impl Default for PivotConfig {
    fn default() -> Self {
        Self { lookback: 5, min_sigma: 0.5 }
    }
}

/// Detector stage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub fvg: FvgConfig,
    pub pivot: PivotConfig,
    pub out_of_order_policy: OutOfOrderPolicy,
    /// Timeframes the detectors run on; must be a subset of the aggregation
    /// targets. Empty means all targets.
    pub enabled_timeframes: Vec<Timeframe>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            fvg: FvgConfig::default(),
            pivot: PivotConfig::default(),
            out_of_order_policy: OutOfOrderPolicy::default(),
            enabled_timeframes: Vec::new(),
        }
    }
}

/// Per-timeframe pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolTimeframeConfig {
    /// Pool lifetime in seconds.
    pub ttl_secs: u64,
    /// Price tolerance applied on touch checks.
    pub hit_tolerance: f64,
    /// Candidates below this strength are not registered.
    pub strength_floor: f64,
}

impl Default for PoolTimeframeConfig {
    fn default() -> Self {
        Self { ttl_secs: 7200, hit_tolerance: 0.0, strength_floor: 0.0 }
    }
}

/// Pool registry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Per-timeframe overrides; timeframes not listed use the default.
    pub timeframes: BTreeMap<Timeframe, PoolTimeframeConfig>,
    /// Retention after expiry, in seconds.
    pub grace_period_secs: u64,
    /// Hard cap on pools per timeframe.
    pub max_pools_per_tf: usize,
}

impl PoolConfig {
    pub fn for_timeframe(&self, tf: Timeframe) -> PoolTimeframeConfig {
        self.timeframes.get(&tf).cloned().unwrap_or_default()
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            timeframes: BTreeMap::new(),
            grace_period_secs: 300,
            max_pools_per_tf: 10_000,
        }
    }
}

/// Overlap engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HlzConfig {
    pub min_members: usize,
    pub min_strength: f64,
    /// Merge HLZs whose band endpoints are within this distance.
    pub merge_tolerance: f64,
    /// Allow bullish and bearish pools in the same HLZ.
    pub side_mixing: bool,
    pub max_active_hlzs: usize,
    /// Recompute band/strength when membership changes.
    pub recompute_on_update: bool,
    /// Strength weight per source timeframe; unlisted timeframes weigh 1.0.
    pub tf_weight: BTreeMap<Timeframe, f64>,
}

impl HlzConfig {
    pub fn weight(&self, tf: Timeframe) -> f64 {
        self.tf_weight.get(&tf).copied().unwrap_or(1.0)
    }
}

impl Default for HlzConfig {
    fn default() -> Self {
        let mut tf_weight = BTreeMap::new();
        tf_weight.insert(Timeframe::H1, 1.0);
        tf_weight.insert(Timeframe::H4, 2.0);
        tf_weight.insert(Timeframe::D1, 3.0);
        Self {
            min_members: 2,
            min_strength: 3.0,
            merge_tolerance: 0.5,
            side_mixing: false,
            max_active_hlzs: 1000,
            recompute_on_update: true,
            tf_weight,
        }
    }
}

/// Zone watcher settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneWatcherConfig {
    /// Widens every zone band symmetrically.
    pub price_tolerance: f64,
    /// Require the bar close inside the band to confirm an entry.
    pub confirm_closure: bool,
    /// Zones below this strength are not tracked.
    pub min_strength: f64,
    pub max_active_zones: usize,
}

impl Default for ZoneWatcherConfig {
    fn default() -> Self {
        Self {
            price_tolerance: 0.0,
            confirm_closure: false,
            min_strength: 0.0,
            max_active_zones: 1000,
        }
    }
}

/// A named UTC time-of-day window, half-open `[start, end)`.
/// Windows where `start > end` wrap past midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub name: String,
    /// Minutes from midnight UTC, inclusive.
    pub start_minute: u32,
    /// Minutes from midnight UTC, exclusive.
    pub end_minute: u32,
}

impl SessionWindow {
    pub fn new(name: &str, start_minute: u32, end_minute: u32) -> Self {
        Self { name: name.to_string(), start_minute, end_minute }
    }

    /// True when `minute_of_day` falls inside the window.
    pub fn contains(&self, minute_of_day: u32) -> bool {
        if self.start_minute <= self.end_minute {
            minute_of_day >= self.start_minute && minute_of_day < self.end_minute
        } else {
            minute_of_day >= self.start_minute || minute_of_day < self.end_minute
        }
    }
}

/// Candidate FSM settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateConfig {
    /// Candidate lifetime in seconds.
    pub expiry_secs: u64,
    /// Require EMA fast/slow alignment with the signal direction.
    pub ema_alignment: bool,
    /// Alignment tolerance as a fraction of the slow EMA.
    pub ema_tolerance_pct: f64,
    /// Minimum volume as a multiple of the volume SMA; 0 disables.
    pub volume_multiple: f64,
    /// Allowed session windows; empty means always allowed.
    pub sessions: Vec<SessionWindow>,
    /// Low-volume windows excluded even inside a session.
    pub session_exclusions: Vec<SessionWindow>,
    /// Regimes allowed for long signals; mirrored for shorts.
    pub regime_allowed: Vec<Regime>,
    /// Minimum spacing between READY signals per side, in seconds; 0 disables.
    pub min_entry_spacing_secs: u64,
    /// Bars of history consulted for the swing stop hint.
    pub swing_lookback: usize,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            expiry_secs: 7200,
            ema_alignment: true,
            ema_tolerance_pct: 0.0,
            volume_multiple: 1.2,
            sessions: Vec::new(),
            session_exclusions: Vec::new(),
            regime_allowed: vec![Regime::Bull, Regime::Neutral],
            min_entry_spacing_secs: 0,
            swing_lookback: 10,
        }
    }
}

/// Risk sizing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Fraction of equity risked per trade.
    pub risk_per_trade: f64,
    /// ATR period the sizer expects the snapshot to carry.
    pub atr_period: usize,
    /// Minimum stop distance in ATR units.
    pub sl_atr_multiple: f64,
    /// Take-profit distance as a multiple of the stop distance.
    pub tp_rr: f64,
    pub min_position: f64,
    /// Maximum position notional as a fraction of equity.
    pub max_position_pct: f64,
    /// Entry worsened by this fraction; 0 disables.
    pub entry_slippage_pct: f64,
    /// Exit hint worsened by this fraction; 0 disables.
    pub exit_slippage_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_per_trade: 0.01,
            atr_period: 14,
            sl_atr_multiple: 1.5,
            tp_rr: 2.0,
            min_position: 0.01,
            max_position_pct: 0.1,
            entry_slippage_pct: 0.0,
            exit_slippage_pct: 0.0,
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub aggregation: AggregationConfig,
    pub indicators: IndicatorConfig,
    pub detectors: DetectorConfig,
    pub pools: PoolConfig,
    pub hlz: HlzConfig,
    pub zone_watcher: ZoneWatcherConfig,
    pub candidate: CandidateConfig,
    pub risk: RiskConfig,
    /// Account equity the risk sizer works against.
    pub equity: f64,
}

impl PipelineConfig {
    /// Validate the configuration tree. Called once at load time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.aggregation.out_of_order_policy == OutOfOrderPolicy::Recalc
            || self.detectors.out_of_order_policy == OutOfOrderPolicy::Recalc
        {
            // Recalculation semantics are undefined; refuse rather than guess.
            return Err(ConfigError::Unsupported(
                "out_of_order_policy = recalc".to_string(),
            ));
        }
        if self.aggregation.source_tf_minutes <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "aggregation.source_tf_minutes",
                detail: "must be positive".to_string(),
            });
        }
        if self.aggregation.buffer_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "aggregation.buffer_size",
                detail: "must be positive".to_string(),
            });
        }
        for &minutes in &self.aggregation.target_timeframes_minutes {
            let tf = Timeframe::from_minutes(minutes).ok_or(ConfigError::InvalidValue {
                field: "aggregation.target_timeframes_minutes",
                detail: format!("{minutes} is not a supported timeframe"),
            })?;
            if tf.minutes() < self.aggregation.source_tf_minutes {
                return Err(ConfigError::InvalidValue {
                    field: "aggregation.target_timeframes_minutes",
                    detail: format!("{tf} is finer than the source timeframe"),
                });
            }
        }
        for tf in &self.detectors.enabled_timeframes {
            if !self.aggregation.target_timeframes_minutes.contains(&tf.minutes()) {
                return Err(ConfigError::InvalidValue {
                    field: "detectors.enabled_timeframes",
                    detail: format!("{tf} is not an aggregation target"),
                });
            }
        }
        if !(0.0..1.0).contains(&self.risk.risk_per_trade) || self.risk.risk_per_trade == 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "risk.risk_per_trade",
                detail: "must be in (0, 1)".to_string(),
            });
        }
        if self.risk.sl_atr_multiple <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "risk.sl_atr_multiple",
                detail: "must be positive".to_string(),
            });
        }
        if self.risk.tp_rr <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "risk.tp_rr",
                detail: "must be positive".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.risk.max_position_pct) {
            return Err(ConfigError::InvalidValue {
                field: "risk.max_position_pct",
                detail: "must be in [0, 1]".to_string(),
            });
        }
        if self.indicators.atr_floor <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "indicators.atr_floor",
                detail: "must be positive".to_string(),
            });
        }
        for (tf, tf_config) in &self.pools.timeframes {
            if tf_config.ttl_secs == 0 || tf_config.ttl_secs as i64 >= crate::wheel::MAX_TTL_SECS {
                return Err(ConfigError::InvalidValue {
                    field: "pools.<tf>.ttl_secs",
                    detail: format!(
                        "{tf}: must be in [1, {}) seconds",
                        crate::wheel::MAX_TTL_SECS
                    ),
                });
            }
        }
        if self.hlz.min_members < 2 {
            return Err(ConfigError::InvalidValue {
                field: "hlz.min_members",
                detail: "must be at least 2".to_string(),
            });
        }
        for window in self.candidate.sessions.iter().chain(&self.candidate.session_exclusions) {
            if window.start_minute >= 1440 || window.end_minute > 1440 {
                return Err(ConfigError::InvalidValue {
                    field: "candidate.sessions",
                    detail: format!("window '{}' exceeds minutes-of-day range", window.name),
                });
            }
        }
        Ok(())
    }

    /// The timeframes detectors actually run on: the configured subset, or
    /// all aggregation targets when none is given.
    pub fn detector_timeframes(&self) -> Vec<Timeframe> {
        if self.detectors.enabled_timeframes.is_empty() {
            self.aggregation
                .target_timeframes_minutes
                .iter()
                .filter_map(|&m| Timeframe::from_minutes(m))
                .collect()
        } else {
            self.detectors.enabled_timeframes.clone()
        }
    }
}
