//! Liquidity pools and their lifecycle states.
//!
//! A pool is an immutable price band recorded from a detection event. State
//! transitions produce new instances; the band never moves after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::timeframe::Timeframe;

/// Which side of the market a zone favors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Bullish,
    Bearish,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bullish => write!(f, "bullish"),
            Side::Bearish => write!(f, "bearish"),
        }
    }
}

/// Lifecycle states. Transitions are monotonic:
/// `ACTIVE -> TOUCHED | EXPIRED -> GRACE -> removed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolState {
    Active,
    Touched,
    Expired,
    Grace,
}

impl PoolState {
    /// Ordering rank used to enforce forward-only transitions.
    fn rank(&self) -> u8 {
        match self {
            PoolState::Active => 0,
            PoolState::Touched => 1,
            PoolState::Expired => 2,
            PoolState::Grace => 3,
        }
    }

    pub fn can_transition_to(&self, next: PoolState) -> bool {
        next.rank() > self.rank()
    }
}

/// A liquidity pool zone with TTL management.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityPool {
    pub pool_id: PoolId,
    pub timeframe: Timeframe,
    pub side: Side,
    pub top: f64,
    pub bottom: f64,
    pub strength: f64,
    pub state: PoolState,
    pub created_at: DateTime<Utc>,
    pub last_touched_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub hit_tolerance: f64,
}

impl LiquidityPool {
    /// Midpoint of the pool band.
    pub fn mid_price(&self) -> f64 {
        (self.top + self.bottom) / 2.0
    }

    /// Height of the pool band.
    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    /// Check whether `price` falls within the band, widened by the hit
    /// tolerance on both sides.
    pub fn contains(&self, price: f64) -> bool {
        price >= self.bottom - self.hit_tolerance && price <= self.top + self.hit_tolerance
    }

    /// New instance with the given state. The caller is responsible for
    /// only requesting forward transitions.
    pub fn with_state(&self, state: PoolState) -> LiquidityPool {
        let mut next = self.clone();
        next.state = state;
        next
    }
}

/// Deterministic pool identifier.
///
/// Format: `{tf}|{rfc3339(created_at)}|{adler32 hex}` where the checksum
/// covers the packed `(tf, created_at_secs, top, bottom)` fields in a fixed
/// byte order, so ids are reproducible across runs and machines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolId(pub String);

impl PoolId {
    pub fn generate(tf: Timeframe, created_at: DateTime<Utc>, top: f64, bottom: f64) -> PoolId {
        let mut packed = Vec::with_capacity(32);
        packed.extend_from_slice(tf.label().as_bytes());
        packed.extend_from_slice(&created_at.timestamp().to_be_bytes());
        packed.extend_from_slice(&top.to_bits().to_be_bytes());
        packed.extend_from_slice(&bottom.to_bits().to_be_bytes());

        let mut hasher = adler32::RollingAdler32::new();
        hasher.update_buffer(&packed);
        let checksum = hasher.hash();

        let iso = created_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        PoolId(format!("{}|{}|{:08x}", tf.label(), iso, checksum))
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
