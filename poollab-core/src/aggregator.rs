//! Multi-timeframe aggregation with look-ahead prevention.
//!
//! Each target timeframe keeps a single in-progress bucket accumulator.
//! A bucket is emitted only when a base bar arrives in a *later* bucket, so
//! incomplete periods can never leak downstream. Ordering guardrails (clock
//! skew, future bars) are enforced once, across all targets.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::{AggregationConfig, OutOfOrderPolicy};
use crate::domain::{Bar, Timeframe};
use crate::errors::PipelineError;

/// In-progress OHLCV fold for one bucket.
#[derive(Debug, Clone)]
struct BucketAcc {
    bucket_id: i64,
    symbol: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl BucketAcc {
    fn start(bucket_id: i64, bar: &Bar) -> Self {
        Self {
            bucket_id,
            symbol: bar.symbol.clone(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        }
    }

    fn fold(&mut self, bar: &Bar) {
        self.high = self.high.max(bar.high);
        self.low = self.low.min(bar.low);
        self.close = bar.close;
        self.volume += bar.volume;
    }
}

/// Single-timeframe aggregator: one accumulator, O(1) per bar.
#[derive(Debug, Clone)]
pub struct TimeAggregator {
    tf: Timeframe,
    current: Option<BucketAcc>,
}

impl TimeAggregator {
    pub fn new(tf: Timeframe) -> Self {
        Self { tf, current: None }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.tf
    }

    /// Fold one base bar. Returns the completed bucket when this bar opens a
    /// new one, `Ok(None)` otherwise, and `Err` with the stale bucket id when
    /// the bar belongs to an already-closed bucket.
    pub fn update(&mut self, bar: &Bar) -> Result<Option<Bar>, StaleBucket> {
        let bucket_id = self.tf.bucket_id(bar.ts);

        match &mut self.current {
            None => {
                self.current = Some(BucketAcc::start(bucket_id, bar));
                Ok(None)
            }
            Some(acc) if bucket_id == acc.bucket_id => {
                acc.fold(bar);
                Ok(None)
            }
            Some(acc) if bucket_id < acc.bucket_id => Err(StaleBucket {
                tf: self.tf,
                bar_bucket: bucket_id,
                current_bucket: acc.bucket_id,
            }),
            Some(_) => {
                let closed = self.take_closed();
                self.current = Some(BucketAcc::start(bucket_id, bar));
                Ok(closed)
            }
        }
    }

    /// Look-ahead prevention: the in-progress bucket is never emitted, so a
    /// stream that simply stops produces nothing extra.
    pub fn flush(&mut self) -> Option<Bar> {
        None
    }

    pub fn reset(&mut self) {
        self.current = None;
    }

    fn take_closed(&mut self) -> Option<Bar> {
        let acc = self.current.take()?;
        let start_minutes = acc.bucket_id * self.tf.minutes();
        let ts = chrono::TimeZone::timestamp_opt(&Utc, start_minutes * 60, 0).unwrap();
        Some(Bar::new(
            ts, acc.symbol, self.tf, acc.open, acc.high, acc.low, acc.close, acc.volume,
        ))
    }
}

/// A base bar that maps to a bucket older than the in-progress one.
#[derive(Debug, Clone, Copy)]
pub struct StaleBucket {
    pub tf: Timeframe,
    pub bar_bucket: i64,
    pub current_bucket: i64,
}

/// Outcome of feeding one base bar through all target timeframes.
#[derive(Debug, Clone)]
pub enum AggregatorUpdate {
    /// Zero or more closed higher-timeframe bars, in target order.
    Closed(Vec<Bar>),
    /// The bar was consumed by the `drop` policy; the payload describes why.
    Dropped(PipelineError),
}

/// Aggregates one base stream into several higher timeframes with shared
/// ordering guardrails.
#[derive(Debug, Clone)]
pub struct MultiTimeframeAggregator {
    aggregators: Vec<TimeAggregator>,
    policy: OutOfOrderPolicy,
    strict_ordering: bool,
    max_clock_skew_secs: Option<u64>,
    last_ts: Option<DateTime<Utc>>,
}

impl MultiTimeframeAggregator {
    pub fn new(config: &AggregationConfig) -> Self {
        let aggregators = config
            .target_timeframes_minutes
            .iter()
            .filter_map(|&m| Timeframe::from_minutes(m))
            .map(TimeAggregator::new)
            .collect();
        Self {
            aggregators,
            policy: config.out_of_order_policy,
            strict_ordering: config.enable_strict_ordering,
            max_clock_skew_secs: config.max_clock_skew_secs,
            last_ts: None,
        }
    }

    pub fn timeframes(&self) -> Vec<Timeframe> {
        self.aggregators.iter().map(|a| a.timeframe()).collect()
    }

    /// Feed one base bar. Emits the closed HTF bars this bar produced, in
    /// target-timeframe order.
    pub fn update(&mut self, bar: &Bar) -> Result<AggregatorUpdate, PipelineError> {
        if let Some(last) = self.last_ts {
            if self.strict_ordering && bar.ts < last {
                let err = PipelineError::ClockSkew { bar_ts: bar.ts, last_ts: last };
                return self.apply_policy(err);
            }
            if self.strict_ordering {
                if let Some(skew) = self.max_clock_skew_secs {
                    let bound = last + chrono::Duration::seconds(skew as i64);
                    if bar.ts > bound {
                        let err = PipelineError::FutureBar { bar_ts: bar.ts, now: last };
                        return self.apply_policy(err);
                    }
                }
            }
        }

        let mut closed = Vec::new();
        for agg in &mut self.aggregators {
            match agg.update(bar) {
                Ok(Some(htf_bar)) => {
                    debug!(tf = %htf_bar.timeframe, ts = %htf_bar.ts, "closed HTF bar");
                    closed.push(htf_bar);
                }
                Ok(None) => {}
                Err(stale) => {
                    // Unreachable under strict ordering; without it, a stale
                    // bucket follows the configured policy.
                    let err = PipelineError::ClockSkew {
                        bar_ts: bar.ts,
                        last_ts: self.last_ts.unwrap_or(bar.ts),
                    };
                    warn!(
                        tf = %stale.tf,
                        bar_bucket = stale.bar_bucket,
                        current_bucket = stale.current_bucket,
                        "stale bucket"
                    );
                    return self.apply_policy(err);
                }
            }
        }

        if self.last_ts.map_or(true, |last| bar.ts > last) {
            self.last_ts = Some(bar.ts);
        }
        Ok(AggregatorUpdate::Closed(closed))
    }

    /// Look-ahead prevention: returns an empty sequence by design.
    pub fn flush(&mut self) -> Vec<Bar> {
        self.aggregators.iter_mut().filter_map(|a| a.flush()).collect()
    }

    pub fn reset(&mut self) {
        for agg in &mut self.aggregators {
            agg.reset();
        }
        self.last_ts = None;
    }

    fn apply_policy(&self, err: PipelineError) -> Result<AggregatorUpdate, PipelineError> {
        match self.policy {
            OutOfOrderPolicy::Drop => Ok(AggregatorUpdate::Dropped(err)),
            // Recalc is rejected at config validation; treat as raise.
            OutOfOrderPolicy::Raise | OutOfOrderPolicy::Recalc => Err(err),
        }
    }
}
