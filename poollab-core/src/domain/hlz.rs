//! High-Liquidity Zones — confluence bands formed by overlapping pools.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::pool::{PoolId, Side};
use super::timeframe::Timeframe;

/// Side of an HLZ. `Mixed` only occurs when side mixing is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HlzSide {
    Bullish,
    Bearish,
    Mixed,
}

impl From<Side> for HlzSide {
    fn from(side: Side) -> Self {
        match side {
            Side::Bullish => HlzSide::Bullish,
            Side::Bearish => HlzSide::Bearish,
        }
    }
}

/// A zone formed by the intersection of `min_members` or more pools.
///
/// The band equals the intersection of the member bands; strength is the
/// timeframe-weighted sum of member strengths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighLiquidityZone {
    pub hlz_id: HlzId,
    pub side: HlzSide,
    pub top: f64,
    pub bottom: f64,
    pub strength: f64,
    pub member_pool_ids: BTreeSet<PoolId>,
    pub timeframes: BTreeSet<Timeframe>,
    pub created_at: DateTime<Utc>,
}

impl HighLiquidityZone {
    pub fn mid_price(&self) -> f64 {
        (self.top + self.bottom) / 2.0
    }

    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    pub fn member_count(&self) -> usize {
        self.member_pool_ids.len()
    }
}

/// Deterministic HLZ identifier derived from the sorted member-id set, so
/// the same membership yields the same id regardless of discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HlzId(pub String);

impl HlzId {
    pub fn generate(members: &BTreeSet<PoolId>) -> HlzId {
        let mut hasher = blake3::Hasher::new();
        for (i, id) in members.iter().enumerate() {
            if i > 0 {
                hasher.update(b"|");
            }
            hasher.update(id.0.as_bytes());
        }
        let hash = hasher.finalize();
        HlzId(format!("hlz_{}", &hash.to_hex().as_str()[..12]))
    }
}

impl fmt::Display for HlzId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
