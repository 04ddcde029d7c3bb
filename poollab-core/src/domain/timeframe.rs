//! Timeframe arithmetic over integer epoch minutes.
//!
//! Bucket boundaries are derived from UTC epoch-minute division, never from
//! calendar components, so they cannot drift across DST transitions.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported timeframes, ordered from finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 6] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    /// Period length in minutes.
    pub fn minutes(&self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    /// Period length as a chrono duration.
    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.minutes())
    }

    /// Canonical label (e.g. "H1").
    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        }
    }

    /// Resolve a minute count back to a timeframe.
    pub fn from_minutes(minutes: i64) -> Option<Timeframe> {
        Timeframe::ALL.iter().copied().find(|tf| tf.minutes() == minutes)
    }

    /// Bucket id of `ts`: epoch minutes divided by the period length.
    pub fn bucket_id(&self, ts: DateTime<Utc>) -> i64 {
        let epoch_minutes = ts.timestamp().div_euclid(60);
        epoch_minutes.div_euclid(self.minutes())
    }

    /// UTC start of the bucket containing `ts`.
    pub fn bucket_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let start_minutes = self.bucket_id(ts) * self.minutes();
        Utc.timestamp_opt(start_minutes * 60, 0).unwrap()
    }

    /// True if `ts` falls exactly on a bucket boundary.
    pub fn is_boundary(&self, ts: DateTime<Utc>) -> bool {
        self.bucket_start(ts) == ts
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
