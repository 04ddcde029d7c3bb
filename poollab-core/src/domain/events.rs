//! Immutable events exchanged between pipeline stages.
//!
//! Components communicate only through these values; no stage mutates data
//! owned by another. `PipelineEvent` is the ordered union delivered to the
//! event sink, and its serialized form is the unit of replay determinism.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::hlz::{HighLiquidityZone, HlzId};
use super::pool::{LiquidityPool, PoolId, PoolState, Side};
use super::signal::{OrderOutcome, Signal, ZoneKind};
use super::bar::Bar;
use super::timeframe::Timeframe;

/// Which detector produced a pool candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    Fvg,
    Pivot,
}

/// A detector's proposal for a new liquidity pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolCandidateEvent {
    pub detector: DetectorKind,
    pub timeframe: Timeframe,
    pub side: Side,
    pub top: f64,
    pub bottom: f64,
    pub strength: f64,
    pub created_at: DateTime<Utc>,
}

/// Emitted when the registry accepts a new pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolCreatedEvent {
    pub pool_id: PoolId,
    pub ts: DateTime<Utc>,
    pub pool: LiquidityPool,
}

/// Emitted when price first enters an active pool's band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolTouchedEvent {
    pub pool_id: PoolId,
    pub timeframe: Timeframe,
    pub ts: DateTime<Utc>,
    pub touch_price: f64,
}

/// Emitted when a pool's TTL fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolExpiredEvent {
    pub pool_id: PoolId,
    pub timeframe: Timeframe,
    pub ts: DateTime<Utc>,
    pub final_state: PoolState,
}

/// Emitted when overlapping pools first satisfy the HLZ thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HlzCreatedEvent {
    pub hlz_id: HlzId,
    pub ts: DateTime<Utc>,
    pub hlz: HighLiquidityZone,
}

/// Emitted when an HLZ's membership or strength changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HlzUpdatedEvent {
    pub hlz_id: HlzId,
    pub ts: DateTime<Utc>,
    pub hlz: HighLiquidityZone,
    pub prev_strength: f64,
}

/// Emitted when an HLZ's membership falls below the minimum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HlzDissolvedEvent {
    pub hlz_id: HlzId,
    pub ts: DateTime<Utc>,
    pub final_member_count: usize,
}

/// Emitted when a bar's range enters a tracked zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneEnteredEvent {
    pub zone_id: String,
    pub zone_kind: ZoneKind,
    pub entry_ts: DateTime<Utc>,
    pub entry_price: f64,
    pub side: Side,
    pub strength: f64,
}

/// Recoverable anomaly, reported without interrupting the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub ts: DateTime<Utc>,
    pub stage: String,
    pub detail: String,
}

/// The ordered event stream delivered to the event sink.
///
/// Within a single driving bar, events appear in the stage order defined by
/// the driver: HTF closes, pool candidates/creations, expiries, touches,
/// HLZ changes, zone entries, candidate transitions, signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    HtfBarClosed { timeframe: Timeframe, bar: Bar },
    PoolCandidate(PoolCandidateEvent),
    PoolCreated(PoolCreatedEvent),
    PoolTouched(PoolTouchedEvent),
    PoolExpired(PoolExpiredEvent),
    HlzCreated(HlzCreatedEvent),
    HlzUpdated(HlzUpdatedEvent),
    HlzDissolved(HlzDissolvedEvent),
    ZoneEntered(ZoneEnteredEvent),
    CandidateSpawned { candidate_id: String, zone_id: String, ts: DateTime<Utc> },
    CandidateExpired { candidate_id: String, ts: DateTime<Utc> },
    SignalEmitted(Signal),
    OrderOutcome { ts: DateTime<Utc>, outcome: OrderOutcome },
    Diagnostic(DiagnosticEvent),
}

impl PipelineEvent {
    /// Timestamp of the driving bar that produced this event.
    pub fn ts(&self) -> DateTime<Utc> {
        match self {
            PipelineEvent::HtfBarClosed { bar, .. } => bar.ts,
            PipelineEvent::PoolCandidate(e) => e.created_at,
            PipelineEvent::PoolCreated(e) => e.ts,
            PipelineEvent::PoolTouched(e) => e.ts,
            PipelineEvent::PoolExpired(e) => e.ts,
            PipelineEvent::HlzCreated(e) => e.ts,
            PipelineEvent::HlzUpdated(e) => e.ts,
            PipelineEvent::HlzDissolved(e) => e.ts,
            PipelineEvent::ZoneEntered(e) => e.entry_ts,
            PipelineEvent::CandidateSpawned { ts, .. } => *ts,
            PipelineEvent::CandidateExpired { ts, .. } => *ts,
            PipelineEvent::SignalEmitted(s) => s.issued_at,
            PipelineEvent::OrderOutcome { ts, .. } => *ts,
            PipelineEvent::Diagnostic(d) => d.ts,
        }
    }
}
