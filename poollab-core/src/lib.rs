//! PoolLab Core Engine
//!
//! Real-time multi-timeframe liquidity-pattern detection and signal
//! pipeline: base bars are aggregated into higher timeframes, scanned for
//! fair-value gaps and pivots, tracked as TTL-bounded liquidity pools,
//! combined into high-liquidity zones, and turned into sized order intents
//! through a per-zone candidate state machine and a risk sizer.
//!
//! The whole pipeline is single-threaded per symbol and deterministic:
//! identical configuration and bar input produce a byte-identical event log.

pub mod aggregator;
pub mod buffer;
pub mod candidate;
pub mod config;
pub mod detectors;
pub mod domain;
pub mod errors;
pub mod filters;
pub mod indicators;
pub mod metrics;
pub mod overlap;
pub mod pipeline;
pub mod registry;
pub mod risk;
pub mod watcher;
pub mod wheel;

// Re-export the main entry points at the crate level.
pub use config::PipelineConfig;
pub use domain::{Bar, PipelineEvent, Timeframe};
pub use errors::{ConfigError, PipelineError};
pub use pipeline::{
    BarSource, EventSink, MetricsSink, OrderIntentSink, Pipeline, VecBarSource, VecEventSink,
    VecOrderSink,
};
