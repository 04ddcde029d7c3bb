//! Signal candidates, trading signals, and order intents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::pool::Side;

/// Kind of zone a candidate originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    Pool,
    Hlz,
}

/// FSM states for signal candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateState {
    WaitEma,
    Filters,
    Ready,
    Expired,
}

impl CandidateState {
    /// READY and EXPIRED are terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CandidateState::Ready | CandidateState::Expired)
    }
}

/// A per-zone-entry FSM instance. Immutable; transitions create new values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub candidate_id: CandidateId,
    pub zone_id: String,
    pub zone_kind: ZoneKind,
    pub side: Side,
    pub entry_price: f64,
    pub zone_top: f64,
    pub zone_bottom: f64,
    pub strength: f64,
    pub state: CandidateState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_bar_ts: Option<DateTime<Utc>>,
}

impl Candidate {
    pub fn with_state(&self, state: CandidateState, bar_ts: DateTime<Utc>) -> Candidate {
        let mut next = self.clone();
        next.state = state;
        next.last_bar_ts = Some(bar_ts);
        next
    }
}

/// Deterministic candidate id: source zone plus spawn timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateId(pub String);

impl CandidateId {
    pub fn generate(zone_id: &str, spawned_at: DateTime<Utc>) -> CandidateId {
        CandidateId(format!("cand|{}|{}", zone_id, spawned_at.timestamp()))
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fully-filtered trading signal, ready for risk sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub signal_id: SignalId,
    pub side: Side,
    pub entry_hint_price: f64,
    pub stop_hint_price: f64,
    pub issued_at: DateTime<Utc>,
    pub source_zone_id: String,
    pub source_zone_kind: ZoneKind,
}

/// Deterministic signal id derived from the source candidate and issue time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalId(pub String);

impl SignalId {
    pub fn generate(candidate_id: &CandidateId, issued_at: DateTime<Utc>) -> SignalId {
        SignalId(format!("sig|{}|{}", candidate_id.0, issued_at.timestamp()))
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A sized order handed to the broker layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub signal_id: SignalId,
    pub side: Side,
    pub size: f64,
    pub entry_price: f64,
    pub stop_price: f64,
    pub take_profit_price: f64,
    pub risk_amount: f64,
}

/// Why the risk sizer refused a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InsufficientEquity,
    ZeroAtr,
    SizeBelowMinimum,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InsufficientEquity => write!(f, "insufficient_equity"),
            RejectReason::ZeroAtr => write!(f, "zero_atr"),
            RejectReason::SizeBelowMinimum => write!(f, "size_below_minimum"),
        }
    }
}

/// Outcome of risk sizing: either an intent or a reject with a reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OrderOutcome {
    Intent(OrderIntent),
    Rejected { signal_id: SignalId, reason: RejectReason },
}
