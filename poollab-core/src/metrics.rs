//! Per-symbol pipeline metrics.
//!
//! Append-only counters plus a handful of gauges refreshed each bar. The
//! deterministic `snapshot()` export (sorted keys, stable labels) is what a
//! metrics sink receives; metric values never enter the event log, so stage
//! latencies cannot perturb replay determinism.

use std::collections::BTreeMap;

use crate::domain::{DetectorKind, RejectReason, Timeframe, ZoneKind};

#[derive(Debug, Clone, Default)]
pub struct PipelineMetrics {
    // Ingress
    pub bars_in_total: u64,
    pub invalid_bars_total: u64,
    pub skew_dropped_total: u64,

    // Aggregation
    pub aggregator_emitted_total: BTreeMap<Timeframe, u64>,

    // Detection and pool lifecycle
    pub pools_created_total: BTreeMap<(Timeframe, DetectorKind), u64>,
    pub pools_touched_total: BTreeMap<Timeframe, u64>,
    pub pools_expired_total: BTreeMap<Timeframe, u64>,
    pub active_pools: BTreeMap<Timeframe, u64>,
    pub touched_pools: BTreeMap<Timeframe, u64>,

    // HLZ
    pub hlz_active: u64,
    pub hlz_created_total: u64,
    pub hlz_updated_total: u64,
    pub hlz_dissolved_total: u64,

    // Watcher and candidates
    pub zone_entries_total: BTreeMap<ZoneKind, u64>,
    pub candidates_spawned_total: u64,
    pub candidates_expired_total: u64,
    pub candidates_ready_total: u64,

    // Signals and sizing
    pub signals_emitted_total: u64,
    pub signals_rejected_total: BTreeMap<RejectReason, u64>,

    // Capacity refusals across components
    pub capacity_rejections_total: u64,

    // Last observed per-stage latency in nanoseconds
    pub latency_ns: BTreeMap<&'static str, u64>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr_emitted(&mut self, tf: Timeframe) {
        *self.aggregator_emitted_total.entry(tf).or_insert(0) += 1;
    }

    pub fn incr_pool_created(&mut self, tf: Timeframe, kind: DetectorKind) {
        *self.pools_created_total.entry((tf, kind)).or_insert(0) += 1;
    }

    pub fn incr_pool_touched(&mut self, tf: Timeframe) {
        *self.pools_touched_total.entry(tf).or_insert(0) += 1;
    }

    pub fn incr_pool_expired(&mut self, tf: Timeframe) {
        *self.pools_expired_total.entry(tf).or_insert(0) += 1;
    }

    pub fn incr_zone_entry(&mut self, kind: ZoneKind) {
        *self.zone_entries_total.entry(kind).or_insert(0) += 1;
    }

    pub fn incr_rejected(&mut self, reason: RejectReason) {
        *self.signals_rejected_total.entry(reason).or_insert(0) += 1;
    }

    pub fn record_latency(&mut self, stage: &'static str, nanos: u64) {
        self.latency_ns.insert(stage, nanos);
    }

    /// Flatten into named metrics with deterministic ordering.
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        out.insert("pipeline.bars_in_total".to_string(), self.bars_in_total as f64);
        out.insert(
            "pipeline.invalid_bars_total".to_string(),
            self.invalid_bars_total as f64,
        );
        out.insert(
            "pipeline.skew_dropped_total".to_string(),
            self.skew_dropped_total as f64,
        );
        for (tf, count) in &self.aggregator_emitted_total {
            out.insert(format!("aggregator.emitted_total{{tf={tf}}}"), *count as f64);
        }
        for ((tf, kind), count) in &self.pools_created_total {
            out.insert(
                format!("detectors.pools_created_total{{tf={tf},kind={kind:?}}}"),
                *count as f64,
            );
        }
        for (tf, count) in &self.pools_touched_total {
            out.insert(format!("registry.touched_total{{tf={tf}}}"), *count as f64);
        }
        for (tf, count) in &self.pools_expired_total {
            out.insert(format!("registry.expired_total{{tf={tf}}}"), *count as f64);
        }
        for (tf, count) in &self.active_pools {
            out.insert(format!("registry.active_pools{{tf={tf}}}"), *count as f64);
        }
        for (tf, count) in &self.touched_pools {
            out.insert(format!("registry.touched_pools{{tf={tf}}}"), *count as f64);
        }
        out.insert("hlz.active".to_string(), self.hlz_active as f64);
        out.insert("hlz.created_total".to_string(), self.hlz_created_total as f64);
        out.insert("hlz.updated_total".to_string(), self.hlz_updated_total as f64);
        out.insert("hlz.dissolved_total".to_string(), self.hlz_dissolved_total as f64);
        for (kind, count) in &self.zone_entries_total {
            out.insert(
                format!("zone_watcher.entries_total{{kind={kind:?}}}"),
                *count as f64,
            );
        }
        out.insert(
            "candidates.spawned_total".to_string(),
            self.candidates_spawned_total as f64,
        );
        out.insert(
            "candidates.expired_total".to_string(),
            self.candidates_expired_total as f64,
        );
        out.insert(
            "candidates.ready_total".to_string(),
            self.candidates_ready_total as f64,
        );
        out.insert("signals.emitted_total".to_string(), self.signals_emitted_total as f64);
        for (reason, count) in &self.signals_rejected_total {
            out.insert(
                format!("signals.rejected_total{{reason={reason}}}"),
                *count as f64,
            );
        }
        out.insert(
            "pipeline.capacity_rejections_total".to_string(),
            self.capacity_rejections_total as f64,
        );
        for (stage, nanos) in &self.latency_ns {
            out.insert(format!("latency_ns{{stage={stage}}}"), *nanos as f64);
        }
        out
    }
}
