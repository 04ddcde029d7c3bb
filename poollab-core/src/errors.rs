//! Pipeline error kinds.
//!
//! The set is closed: every failure mode a stage can surface is a variant
//! here. Recoverable kinds are reported as diagnostics and metrics without
//! interrupting the stream; `raise`-policy violations terminate processing
//! for the offending symbol.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by pipeline stages.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("Clock skew: bar ts {bar_ts} precedes last ts {last_ts}")]
    ClockSkew { bar_ts: DateTime<Utc>, last_ts: DateTime<Utc> },

    #[error("Future bar: ts {bar_ts} exceeds now {now} plus allowed skew")]
    FutureBar { bar_ts: DateTime<Utc>, now: DateTime<Utc> },

    #[error("Capacity exceeded in {scope}")]
    CapacityExceeded { scope: String },

    #[error("Invalid bar: {reason}")]
    InvalidBar { reason: String },

    #[error("ATR underflow: floor invariant violated")]
    AtrUnderflow,
}

/// Errors raised while validating configuration at load time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Unsupported option: {0}")]
    Unsupported(String),

    #[error("Invalid value for {field}: {detail}")]
    InvalidValue { field: &'static str, detail: String },
}
