//! Domain types — the vocabulary of PoolLab.
//!
//! Every module in the pipeline builds on these types: bars, timeframes,
//! liquidity pools, high-liquidity zones, indicator snapshots, signal
//! candidates, and the immutable events that connect the stages.

pub mod bar;
pub mod events;
pub mod hlz;
pub mod pool;
pub mod signal;
pub mod snapshot;
pub mod timeframe;

// Re-export the most commonly used types at the domain level.
pub use bar::{Bar, BarError};
pub use events::{
    DetectorKind, DiagnosticEvent, HlzCreatedEvent, HlzDissolvedEvent, HlzUpdatedEvent,
    PipelineEvent, PoolCandidateEvent, PoolCreatedEvent, PoolExpiredEvent, PoolTouchedEvent,
    ZoneEnteredEvent,
};
pub use hlz::{HighLiquidityZone, HlzId, HlzSide};
pub use pool::{LiquidityPool, PoolId, PoolState, Side};
pub use signal::{
    Candidate, CandidateId, CandidateState, OrderIntent, OrderOutcome, RejectReason, Signal,
    SignalId, ZoneKind,
};
pub use snapshot::{IndicatorSnapshot, Regime};
pub use timeframe::Timeframe;
