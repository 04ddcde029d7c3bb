//! Pipeline driver — deterministic single-threaded dispatch.
//!
//! One `Pipeline` per symbol. Each base bar runs end-to-end through the
//! stage chain before the next is accepted:
//!
//!   indicators → aggregation → HTF detectors → pool lifecycle
//!             → overlap → zone watcher → candidate FSM → risk sizing
//!
//! Events within a bar are emitted in exactly that order, so given identical
//! configuration and input, the serialized event log is byte-identical
//! across runs and machines.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

use crate::aggregator::{AggregatorUpdate, MultiTimeframeAggregator};
use crate::candidate::CandidateEngine;
use crate::config::{OutOfOrderPolicy, PipelineConfig};
use crate::detectors::{DetectorUpdate, HtfDetectorSet};
use crate::domain::{
    Bar, DiagnosticEvent, PipelineEvent, PoolCandidateEvent, Timeframe, ZoneEnteredEvent,
};
use crate::errors::{ConfigError, PipelineError};
use crate::indicators::IndicatorPack;
use crate::metrics::PipelineMetrics;
use crate::overlap::{HlzEvent, OverlapEngine};
use crate::registry::PoolRegistry;
use crate::risk::RiskSizer;
use crate::watcher::ZoneWatcher;

/// Yields bars in non-decreasing timestamp order.
pub trait BarSource {
    fn next_bar(&mut self) -> Option<Bar>;
}

/// Receives the ordered event stream.
pub trait EventSink {
    fn on_event(&mut self, event: &PipelineEvent);
}

/// Receives sized order intents and rejects.
pub trait OrderIntentSink {
    fn on_order(&mut self, outcome: &crate::domain::OrderOutcome);
}

/// Receives metric snapshots.
pub trait MetricsSink {
    fn on_metrics(&mut self, snapshot: &BTreeMap<String, f64>);
}

/// Collecting sink for tests and offline runs.
#[derive(Debug, Default)]
pub struct VecEventSink {
    pub events: Vec<PipelineEvent>,
}

impl EventSink for VecEventSink {
    fn on_event(&mut self, event: &PipelineEvent) {
        self.events.push(event.clone());
    }
}

/// Collecting order sink for tests and offline runs.
#[derive(Debug, Default)]
pub struct VecOrderSink {
    pub outcomes: Vec<crate::domain::OrderOutcome>,
}

impl OrderIntentSink for VecOrderSink {
    fn on_order(&mut self, outcome: &crate::domain::OrderOutcome) {
        self.outcomes.push(outcome.clone());
    }
}

/// Replay source over an in-memory bar vector.
#[derive(Debug)]
pub struct VecBarSource {
    bars: std::vec::IntoIter<Bar>,
}

impl VecBarSource {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self { bars: bars.into_iter() }
    }
}

impl BarSource for VecBarSource {
    fn next_bar(&mut self) -> Option<Bar> {
        self.bars.next()
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    indicators: IndicatorPack,
    aggregator: MultiTimeframeAggregator,
    detectors: BTreeMap<Timeframe, HtfDetectorSet>,
    /// Created on the first bar so the TTL wheel starts at stream time.
    registry: Option<PoolRegistry>,
    overlap: OverlapEngine,
    watcher: ZoneWatcher,
    candidates: CandidateEngine,
    risk: RiskSizer,
    metrics: PipelineMetrics,
    last_ts: Option<DateTime<Utc>>,
    registry_capacity_rejections: u64,
}

impl Pipeline {
    /// Build a pipeline from a validated configuration.
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let detectors = config
            .detector_timeframes()
            .into_iter()
            .map(|tf| (tf, HtfDetectorSet::new(tf, &config.detectors, &config.indicators)))
            .collect();

        Ok(Self {
            indicators: IndicatorPack::new(&config.indicators),
            aggregator: MultiTimeframeAggregator::new(&config.aggregation),
            detectors,
            registry: None,
            overlap: OverlapEngine::new(config.hlz.clone()),
            watcher: ZoneWatcher::new(config.zone_watcher.clone()),
            candidates: CandidateEngine::new(config.candidate.clone()),
            risk: RiskSizer::new(config.risk.clone()),
            metrics: PipelineMetrics::new(),
            last_ts: None,
            registry_capacity_rejections: 0,
            config,
        })
    }

    /// Process one base bar end-to-end and return the events it produced,
    /// in emission order.
    pub fn feed(&mut self, bar: &Bar) -> Result<Vec<PipelineEvent>, PipelineError> {
        self.metrics.bars_in_total += 1;
        let mut events: Vec<PipelineEvent> = Vec::new();

        // Ingress validation: invalid bars are dropped, never propagated.
        if let Err(reason) = bar.validate() {
            self.metrics.invalid_bars_total += 1;
            let err = PipelineError::InvalidBar { reason: reason.to_string() };
            events.push(diagnostic(bar.ts, "ingress", err.to_string()));
            return Ok(events);
        }

        // Ordering guardrails run before any state is touched, so a dropped
        // bar leaves the pipeline exactly as it was.
        if let Some(err) = self.check_ordering(bar)? {
            self.metrics.skew_dropped_total += 1;
            events.push(diagnostic(bar.ts, "ordering", err.to_string()));
            return Ok(events);
        }

        if self.registry.is_none() {
            self.registry = Some(PoolRegistry::new(self.config.pools.clone(), bar.ts));
        }

        // 1. Indicators
        let stage_start = Instant::now();
        let snapshot = self.indicators.update(bar);
        self.metrics.record_latency("indicators", elapsed_ns(stage_start));

        // 2. Aggregation
        let stage_start = Instant::now();
        let closed = match self.aggregator.update(bar)? {
            AggregatorUpdate::Closed(closed) => closed,
            AggregatorUpdate::Dropped(err) => {
                self.metrics.skew_dropped_total += 1;
                events.push(diagnostic(bar.ts, "aggregator", err.to_string()));
                return Ok(events);
            }
        };
        self.metrics.record_latency("aggregator", elapsed_ns(stage_start));

        // 3. HTF detectors and pool creation
        let stage_start = Instant::now();
        for htf_bar in &closed {
            let tf = htf_bar.timeframe;
            self.metrics.incr_emitted(tf);
            events.push(PipelineEvent::HtfBarClosed { timeframe: tf, bar: htf_bar.clone() });

            let candidates = match self.detectors.get_mut(&tf) {
                Some(set) => match set.update(htf_bar)? {
                    DetectorUpdate::Events(candidates) => candidates,
                    DetectorUpdate::Dropped(err) => {
                        self.metrics.skew_dropped_total += 1;
                        events.push(diagnostic(htf_bar.ts, "detectors", err.to_string()));
                        continue;
                    }
                },
                None => continue,
            };

            for candidate in candidates {
                self.route_candidate(&candidate, &mut events);
            }
        }
        self.metrics.record_latency("detectors", elapsed_ns(stage_start));

        // 4. Pool lifecycle: expiries first, then touches at this bar's close
        let stage_start = Instant::now();
        let registry = self.registry.as_mut().expect("registry initialized above");
        let expired = registry.advance_time(bar.ts);
        for event in expired {
            self.metrics.incr_pool_expired(event.timeframe);
            self.watcher.on_pool_expired(&event.pool_id);
            let hlz_events = self.overlap.on_pool_expired(&event.pool_id, event.ts);
            events.push(PipelineEvent::PoolExpired(event));
            self.apply_hlz_events(hlz_events, &mut events);
        }

        let registry = self.registry.as_mut().expect("registry initialized above");
        let touched = registry.on_price(bar.ts, bar.close);
        for event in touched {
            self.metrics.incr_pool_touched(event.timeframe);
            self.watcher.on_pool_touched(&event.pool_id);
            let hlz_events = self.overlap.on_pool_touched(&event.pool_id, event.ts);
            events.push(PipelineEvent::PoolTouched(event));
            self.apply_hlz_events(hlz_events, &mut events);
        }
        self.metrics.record_latency("registry", elapsed_ns(stage_start));

        // 5. Zone entries spawn candidates
        let stage_start = Instant::now();
        let entries = self.watcher.on_bar(bar);
        for entry in &entries {
            self.metrics.incr_zone_entry(entry.zone_kind);
            events.push(PipelineEvent::ZoneEntered(entry.clone()));
            self.spawn_candidate(entry, &mut events);
        }
        self.metrics.record_latency("watcher", elapsed_ns(stage_start));

        // 6. Candidate transitions and signals
        let stage_start = Instant::now();
        let update = self.candidates.on_bar(bar, &snapshot);
        for candidate_id in &update.expired {
            self.metrics.candidates_expired_total += 1;
            events.push(PipelineEvent::CandidateExpired {
                candidate_id: candidate_id.0.clone(),
                ts: bar.ts,
            });
        }
        self.metrics.record_latency("candidates", elapsed_ns(stage_start));

        // 7. Risk sizing
        let stage_start = Instant::now();
        for signal in update.signals {
            self.metrics.candidates_ready_total += 1;
            self.metrics.signals_emitted_total += 1;
            events.push(PipelineEvent::SignalEmitted(signal.clone()));

            let outcome = self.risk.size(&signal, self.config.equity, &snapshot);
            if let crate::domain::OrderOutcome::Rejected { reason, .. } = &outcome {
                self.metrics.incr_rejected(*reason);
            }
            events.push(PipelineEvent::OrderOutcome { ts: bar.ts, outcome });
        }
        self.metrics.record_latency("risk", elapsed_ns(stage_start));

        self.last_ts = Some(bar.ts);
        self.refresh_gauges();
        Ok(events)
    }

    /// Pull bars from `source` to exhaustion, fanning events and order
    /// outcomes to the sinks. Stops at the first fatal error.
    pub fn run(
        &mut self,
        source: &mut dyn BarSource,
        event_sink: &mut dyn EventSink,
        order_sink: &mut dyn OrderIntentSink,
    ) -> Result<(), PipelineError> {
        while let Some(bar) = source.next_bar() {
            for event in self.feed(&bar)? {
                if let PipelineEvent::OrderOutcome { outcome, .. } = &event {
                    order_sink.on_order(outcome);
                }
                event_sink.on_event(&event);
            }
        }
        Ok(())
    }

    /// Look-ahead prevention: in-progress HTF buckets stay unemitted.
    pub fn flush(&mut self) -> Vec<Bar> {
        self.aggregator.flush()
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn emit_metrics(&self, sink: &mut dyn MetricsSink) {
        sink.on_metrics(&self.metrics.snapshot());
    }

    fn check_ordering(&mut self, bar: &Bar) -> Result<Option<PipelineError>, PipelineError> {
        if !self.config.aggregation.enable_strict_ordering {
            return Ok(None);
        }
        let last = match self.last_ts {
            Some(last) => last,
            None => return Ok(None),
        };
        let err = if bar.ts < last {
            Some(PipelineError::ClockSkew { bar_ts: bar.ts, last_ts: last })
        } else if let Some(skew) = self.config.aggregation.max_clock_skew_secs {
            (bar.ts > last + chrono::Duration::seconds(skew as i64))
                .then_some(PipelineError::FutureBar { bar_ts: bar.ts, now: last })
        } else {
            None
        };

        match err {
            None => Ok(None),
            Some(err) => match self.config.aggregation.out_of_order_policy {
                OutOfOrderPolicy::Drop => {
                    debug!(%err, "bar dropped by ordering guard");
                    Ok(Some(err))
                }
                OutOfOrderPolicy::Raise | OutOfOrderPolicy::Recalc => Err(err),
            },
        }
    }

    fn route_candidate(&mut self, candidate: &PoolCandidateEvent, events: &mut Vec<PipelineEvent>) {
        events.push(PipelineEvent::PoolCandidate(candidate.clone()));

        let registry = self.registry.as_mut().expect("registry initialized before detectors run");
        match registry.create(candidate) {
            Ok(Some(created)) => {
                self.metrics.incr_pool_created(candidate.timeframe, candidate.detector);
                self.watcher.on_pool_created(&created.pool);
                let hlz_events = self.overlap.on_pool_created(&created.pool, created.ts);
                events.push(PipelineEvent::PoolCreated(created));
                self.apply_hlz_events(hlz_events, events);
            }
            Ok(None) => {}
            Err(err @ PipelineError::CapacityExceeded { .. }) => {
                // Recoverable: the offending create is refused, the stream
                // continues.
                self.registry_capacity_rejections += 1;
                events.push(diagnostic(candidate.created_at, "registry", err.to_string()));
            }
            Err(err) => {
                events.push(diagnostic(candidate.created_at, "registry", err.to_string()));
            }
        }
    }

    fn apply_hlz_events(&mut self, hlz_events: Vec<HlzEvent>, events: &mut Vec<PipelineEvent>) {
        for event in hlz_events {
            match event {
                HlzEvent::Created(e) => {
                    self.metrics.hlz_created_total += 1;
                    self.watcher.on_hlz_created(&e.hlz);
                    events.push(PipelineEvent::HlzCreated(e));
                }
                HlzEvent::Updated(e) => {
                    self.metrics.hlz_updated_total += 1;
                    self.watcher.on_hlz_updated(&e.hlz);
                    events.push(PipelineEvent::HlzUpdated(e));
                }
                HlzEvent::Dissolved(e) => {
                    self.metrics.hlz_dissolved_total += 1;
                    self.watcher.on_hlz_dissolved(&e.hlz_id);
                    events.push(PipelineEvent::HlzDissolved(e));
                }
            }
        }
    }

    fn spawn_candidate(&mut self, entry: &ZoneEnteredEvent, events: &mut Vec<PipelineEvent>) {
        let (top, bottom) = match self.watcher.zone_band(&entry.zone_id) {
            Some(band) => band,
            None => return,
        };
        let candidate = self.candidates.spawn(entry, top, bottom);
        self.metrics.candidates_spawned_total += 1;
        events.push(PipelineEvent::CandidateSpawned {
            candidate_id: candidate.candidate_id.0.clone(),
            zone_id: entry.zone_id.clone(),
            ts: entry.entry_ts,
        });
    }

    fn refresh_gauges(&mut self) {
        if let Some(registry) = &self.registry {
            let counts = registry.gauge_counts();
            for tf in self.aggregator.timeframes() {
                let (active, touched) = counts.get(&tf).copied().unwrap_or((0, 0));
                self.metrics.active_pools.insert(tf, active);
                self.metrics.touched_pools.insert(tf, touched);
            }
        }
        self.metrics.hlz_active = self.overlap.active_count() as u64;
        self.metrics.capacity_rejections_total = self.registry_capacity_rejections
            + self.overlap.refused_capacity()
            + self.watcher.skipped_capacity();
    }
}

fn diagnostic(ts: DateTime<Utc>, stage: &str, detail: String) -> PipelineEvent {
    PipelineEvent::Diagnostic(DiagnosticEvent { ts, stage: stage.to_string(), detail })
}

fn elapsed_ns(start: Instant) -> u64 {
    start.elapsed().as_nanos() as u64
}
