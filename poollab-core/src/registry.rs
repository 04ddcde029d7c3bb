//! Liquidity pool registry with TTL-driven lifecycle.
//!
//! Owns every pool. O(1) CRUD via the primary id map, per-timeframe indexes
//! for isolation, a sorted interval index per timeframe for touch detection,
//! and a timing wheel for batch expiry. All iteration that feeds downstream
//! state runs in sorted order, keeping the event stream deterministic.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::domain::{
    LiquidityPool, PoolCandidateEvent, PoolCreatedEvent, PoolExpiredEvent, PoolId, PoolState,
    PoolTouchedEvent, Timeframe,
};
use crate::errors::PipelineError;
use crate::wheel::TimerWheel;

/// Interval-index entry: band widened by the hit tolerance, sorted by
/// `(bottom, id)` for deterministic traversal.
#[derive(Debug, Clone)]
struct IndexEntry {
    bottom: f64,
    top: f64,
    pool_id: PoolId,
}

#[derive(Debug, Clone)]
pub struct PoolRegistry {
    config: PoolConfig,
    pools: BTreeMap<PoolId, LiquidityPool>,
    by_tf: BTreeMap<Timeframe, BTreeSet<PoolId>>,
    /// Active pools only; touch checks never visit touched/expired pools.
    active_index: BTreeMap<Timeframe, Vec<IndexEntry>>,
    wheel: TimerWheel,
    /// Expired pools awaiting removal, in expiry order.
    grace: VecDeque<(PoolId, i64)>,
    skipped_below_floor: u64,
}

impl PoolRegistry {
    pub fn new(config: PoolConfig, start: DateTime<Utc>) -> Self {
        Self {
            config,
            pools: BTreeMap::new(),
            by_tf: BTreeMap::new(),
            active_index: BTreeMap::new(),
            wheel: TimerWheel::new(start),
            grace: VecDeque::new(),
            skipped_below_floor: 0,
        }
    }

    /// Register a detector candidate as a pool.
    ///
    /// Candidates below the per-timeframe strength floor are skipped without
    /// error; creations beyond `max_pools_per_tf` are refused with
    /// `CapacityExceeded`; duplicate ids are ignored.
    pub fn create(
        &mut self,
        candidate: &PoolCandidateEvent,
    ) -> Result<Option<PoolCreatedEvent>, PipelineError> {
        let tf = candidate.timeframe;
        let tf_config = self.config.for_timeframe(tf);

        if candidate.strength < tf_config.strength_floor {
            self.skipped_below_floor += 1;
            debug!(tf = %tf, strength = candidate.strength, "candidate below strength floor");
            return Ok(None);
        }

        let tf_pools = self.by_tf.entry(tf).or_default();
        if tf_pools.len() >= self.config.max_pools_per_tf {
            warn!(tf = %tf, cap = self.config.max_pools_per_tf, "pool capacity reached");
            return Err(PipelineError::CapacityExceeded {
                scope: format!("registry:{tf}"),
            });
        }

        let pool_id =
            PoolId::generate(tf, candidate.created_at, candidate.top, candidate.bottom);
        if self.pools.contains_key(&pool_id) {
            debug!(%pool_id, "pool already exists");
            return Ok(None);
        }

        let expires_at =
            candidate.created_at + chrono::Duration::seconds(tf_config.ttl_secs as i64);
        if self.wheel.schedule(&pool_id.0, expires_at).is_err() {
            warn!(%pool_id, "failed to schedule pool expiry");
            return Ok(None);
        }

        let pool = LiquidityPool {
            pool_id: pool_id.clone(),
            timeframe: tf,
            side: candidate.side,
            top: candidate.top,
            bottom: candidate.bottom,
            strength: candidate.strength,
            state: PoolState::Active,
            created_at: candidate.created_at,
            last_touched_at: None,
            expired_at: None,
            expires_at,
            hit_tolerance: tf_config.hit_tolerance,
        };

        tf_pools.insert(pool_id.clone());
        self.insert_active_index(&pool);
        self.pools.insert(pool_id.clone(), pool.clone());

        debug!(%pool_id, tf = %tf, %expires_at, "pool created");
        Ok(Some(PoolCreatedEvent { pool_id, ts: candidate.created_at, pool }))
    }

    /// Mark every active pool whose (tolerance-widened) band contains `price`
    /// as touched. Matches are processed in `(bottom, id)` order.
    pub fn on_price(&mut self, ts: DateTime<Utc>, price: f64) -> Vec<PoolTouchedEvent> {
        let mut touched_ids: Vec<PoolId> = Vec::new();
        for entries in self.active_index.values() {
            // Entries are sorted by bottom; everything past the first bottom
            // above `price` cannot contain it.
            let end = entries.partition_point(|e| e.bottom <= price);
            for entry in &entries[..end] {
                if entry.top >= price {
                    touched_ids.push(entry.pool_id.clone());
                }
            }
        }

        let mut events = Vec::with_capacity(touched_ids.len());
        for pool_id in touched_ids {
            let pool = match self.pools.get_mut(&pool_id) {
                Some(p) if p.state == PoolState::Active => p,
                _ => continue,
            };
            pool.state = PoolState::Touched;
            pool.last_touched_at = Some(ts);
            let tf = pool.timeframe;
            self.remove_from_active_index(tf, &pool_id);
            debug!(%pool_id, price, "pool touched");
            events.push(PoolTouchedEvent { pool_id, timeframe: tf, ts, touch_price: price });
        }
        events
    }

    /// Drive the TTL wheel to `now`: due pools transition to EXPIRED and
    /// enter the grace queue; pools whose grace has elapsed are removed.
    pub fn advance_time(&mut self, now: DateTime<Utc>) -> Vec<PoolExpiredEvent> {
        let due = self.wheel.advance(now);
        let mut events = Vec::with_capacity(due.len());

        for key in due {
            let pool_id = PoolId(key);
            let pool = match self.pools.get_mut(&pool_id) {
                Some(p) => p,
                None => continue,
            };
            let final_state = pool.state;
            pool.state = PoolState::Expired;
            pool.expired_at = Some(now);
            let tf = pool.timeframe;
            self.remove_from_active_index(tf, &pool_id);

            let cleanup_secs =
                now.timestamp() + self.config.grace_period_secs as i64;
            self.grace.push_back((pool_id.clone(), cleanup_secs));

            debug!(%pool_id, ?final_state, "pool expired");
            events.push(PoolExpiredEvent { pool_id, timeframe: tf, ts: now, final_state });
        }

        // Grace entries are queued in expiry order; drain the elapsed prefix.
        let now_secs = now.timestamp();
        while let Some((pool_id, cleanup)) = self.grace.front() {
            if *cleanup > now_secs {
                break;
            }
            let pool_id = pool_id.clone();
            self.grace.pop_front();
            if let Some(pool) = self.pools.get_mut(&pool_id) {
                pool.state = PoolState::Grace;
            }
            self.remove(&pool_id);
        }

        events
    }

    /// Offline GC: remove exactly the EXPIRED pools with `expired_at < ts`.
    /// ACTIVE and TOUCHED pools are never removed.
    pub fn purge_before(&mut self, ts: DateTime<Utc>) -> usize {
        let to_remove: Vec<PoolId> = self
            .pools
            .values()
            .filter(|p| p.state == PoolState::Expired && p.expired_at.is_some_and(|e| e < ts))
            .map(|p| p.pool_id.clone())
            .collect();
        let count = to_remove.len();
        for pool_id in to_remove {
            self.grace.retain(|(id, _)| *id != pool_id);
            self.remove(&pool_id);
        }
        count
    }

    /// Active pools, optionally restricted to one timeframe, in id order.
    pub fn query_active(&self, tf: Option<Timeframe>) -> Vec<&LiquidityPool> {
        self.pools
            .values()
            .filter(|p| p.state == PoolState::Active)
            .filter(|p| tf.map_or(true, |t| p.timeframe == t))
            .collect()
    }

    pub fn get(&self, pool_id: &PoolId) -> Option<&LiquidityPool> {
        self.pools.get(pool_id)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn count_by_state(&self, state: PoolState) -> usize {
        self.pools.values().filter(|p| p.state == state).count()
    }

    pub fn count_by_tf(&self, tf: Timeframe) -> usize {
        self.by_tf.get(&tf).map_or(0, |s| s.len())
    }

    /// Candidates skipped because their strength was below the floor.
    pub fn skipped_below_floor(&self) -> u64 {
        self.skipped_below_floor
    }

    /// Per-timeframe (active, touched) counts in one pass, for gauges.
    pub fn gauge_counts(&self) -> BTreeMap<Timeframe, (u64, u64)> {
        let mut counts: BTreeMap<Timeframe, (u64, u64)> = BTreeMap::new();
        for pool in self.pools.values() {
            let entry = counts.entry(pool.timeframe).or_insert((0, 0));
            match pool.state {
                PoolState::Active => entry.0 += 1,
                PoolState::Touched => entry.1 += 1,
                _ => {}
            }
        }
        counts
    }

    fn insert_active_index(&mut self, pool: &LiquidityPool) {
        let entries = self.active_index.entry(pool.timeframe).or_default();
        let entry = IndexEntry {
            bottom: pool.bottom - pool.hit_tolerance,
            top: pool.top + pool.hit_tolerance,
            pool_id: pool.pool_id.clone(),
        };
        let pos = entries.partition_point(|e| {
            (e.bottom, &e.pool_id) < (entry.bottom, &entry.pool_id)
        });
        entries.insert(pos, entry);
    }

    fn remove_from_active_index(&mut self, tf: Timeframe, pool_id: &PoolId) {
        if let Some(entries) = self.active_index.get_mut(&tf) {
            entries.retain(|e| e.pool_id != *pool_id);
        }
    }

    fn remove(&mut self, pool_id: &PoolId) {
        if let Some(pool) = self.pools.remove(pool_id) {
            self.wheel.cancel(&pool_id.0);
            if let Some(tf_pools) = self.by_tf.get_mut(&pool.timeframe) {
                tf_pools.remove(pool_id);
            }
            self.remove_from_active_index(pool.timeframe, pool_id);
            debug!(%pool_id, "pool removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DetectorKind, Side};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn candidate(tf: Timeframe, top: f64, bottom: f64, at: DateTime<Utc>) -> PoolCandidateEvent {
        PoolCandidateEvent {
            detector: DetectorKind::Fvg,
            timeframe: tf,
            side: Side::Bullish,
            top,
            bottom,
            strength: 0.8,
            created_at: at,
        }
    }

    fn registry_with_ttl(tf: Timeframe, ttl_secs: u64) -> PoolRegistry {
        let mut config = PoolConfig::default();
        config.timeframes.insert(
            tf,
            crate::config::PoolTimeframeConfig { ttl_secs, hit_tolerance: 0.0, strength_floor: 0.0 },
        );
        PoolRegistry::new(config, t0())
    }

    #[test]
    fn create_then_query_active() {
        let mut registry = registry_with_ttl(Timeframe::H1, 3600);
        let event = registry
            .create(&candidate(Timeframe::H1, 101.0, 100.0, t0()))
            .unwrap()
            .unwrap();
        assert_eq!(event.pool.state, PoolState::Active);
        assert_eq!(registry.query_active(None).len(), 1);
        assert_eq!(registry.query_active(Some(Timeframe::H4)).len(), 0);
    }

    #[test]
    fn duplicate_candidate_is_ignored() {
        let mut registry = registry_with_ttl(Timeframe::H1, 3600);
        let cand = candidate(Timeframe::H1, 101.0, 100.0, t0());
        assert!(registry.create(&cand).unwrap().is_some());
        assert!(registry.create(&cand).unwrap().is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn strength_floor_skips_weak_candidates() {
        let mut config = PoolConfig::default();
        config.timeframes.insert(
            Timeframe::H1,
            crate::config::PoolTimeframeConfig {
                ttl_secs: 3600,
                hit_tolerance: 0.0,
                strength_floor: 0.9,
            },
        );
        let mut registry = PoolRegistry::new(config, t0());
        let result = registry.create(&candidate(Timeframe::H1, 101.0, 100.0, t0())).unwrap();
        assert!(result.is_none());
        assert_eq!(registry.skipped_below_floor(), 1);
    }

    #[test]
    fn capacity_is_enforced_per_timeframe() {
        let mut config = PoolConfig::default();
        config.max_pools_per_tf = 2;
        let mut registry = PoolRegistry::new(config, t0());
        for i in 0..2 {
            let at = t0() + chrono::Duration::seconds(i);
            registry.create(&candidate(Timeframe::H1, 101.0, 100.0, at)).unwrap();
        }
        let at = t0() + chrono::Duration::seconds(5);
        let err = registry.create(&candidate(Timeframe::H1, 101.0, 100.0, at)).unwrap_err();
        assert!(matches!(err, PipelineError::CapacityExceeded { .. }));
        // Another timeframe is unaffected.
        assert!(registry.create(&candidate(Timeframe::H4, 101.0, 100.0, at)).unwrap().is_some());
    }

    #[test]
    fn touch_transitions_active_to_touched_once() {
        let mut registry = registry_with_ttl(Timeframe::H1, 3600);
        registry.create(&candidate(Timeframe::H1, 101.0, 100.0, t0())).unwrap();
        let ts = t0() + chrono::Duration::minutes(1);
        let events = registry.on_price(ts, 100.5);
        assert_eq!(events.len(), 1);
        assert_eq!(registry.count_by_state(PoolState::Touched), 1);
        // Second touch produces nothing.
        assert!(registry.on_price(ts + chrono::Duration::minutes(1), 100.5).is_empty());
    }

    #[test]
    fn price_outside_band_does_not_touch() {
        let mut registry = registry_with_ttl(Timeframe::H1, 3600);
        registry.create(&candidate(Timeframe::H1, 101.0, 100.0, t0())).unwrap();
        assert!(registry.on_price(t0(), 99.0).is_empty());
        assert!(registry.on_price(t0(), 102.0).is_empty());
        assert_eq!(registry.count_by_state(PoolState::Active), 1);
    }

    #[test]
    fn hit_tolerance_widens_the_band() {
        let mut config = PoolConfig::default();
        config.timeframes.insert(
            Timeframe::H1,
            crate::config::PoolTimeframeConfig {
                ttl_secs: 3600,
                hit_tolerance: 0.5,
                strength_floor: 0.0,
            },
        );
        let mut registry = PoolRegistry::new(config, t0());
        registry.create(&candidate(Timeframe::H1, 101.0, 100.0, t0())).unwrap();
        assert_eq!(registry.on_price(t0(), 101.4).len(), 1);
    }

    #[test]
    fn ttl_expiry_emits_event_and_clears_active() {
        let mut registry = registry_with_ttl(Timeframe::H1, 1);
        registry.create(&candidate(Timeframe::H1, 101.0, 100.0, t0())).unwrap();
        let events =
            registry.advance_time(t0() + chrono::Duration::microseconds(1_000_001));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].final_state, PoolState::Active);
        assert!(registry.query_active(None).is_empty());
        assert_eq!(registry.count_by_state(PoolState::Expired), 1);
    }

    #[test]
    fn timeframes_expire_independently() {
        let mut config = PoolConfig::default();
        config.timeframes.insert(
            Timeframe::H1,
            crate::config::PoolTimeframeConfig { ttl_secs: 60, hit_tolerance: 0.0, strength_floor: 0.0 },
        );
        config.timeframes.insert(
            Timeframe::H4,
            crate::config::PoolTimeframeConfig { ttl_secs: 3600, hit_tolerance: 0.0, strength_floor: 0.0 },
        );
        let mut registry = PoolRegistry::new(config, t0());
        registry.create(&candidate(Timeframe::H1, 101.0, 100.0, t0())).unwrap();
        registry.create(&candidate(Timeframe::H4, 101.0, 100.0, t0())).unwrap();

        let events = registry.advance_time(t0() + chrono::Duration::seconds(61));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timeframe, Timeframe::H1);
        assert_eq!(registry.query_active(Some(Timeframe::H4)).len(), 1);
    }

    #[test]
    fn grace_period_retains_then_removes() {
        let mut config = PoolConfig::default();
        config.grace_period_secs = 300;
        config.timeframes.insert(
            Timeframe::H1,
            crate::config::PoolTimeframeConfig { ttl_secs: 60, hit_tolerance: 0.0, strength_floor: 0.0 },
        );
        let mut registry = PoolRegistry::new(config, t0());
        registry.create(&candidate(Timeframe::H1, 101.0, 100.0, t0())).unwrap();

        registry.advance_time(t0() + chrono::Duration::seconds(61));
        assert_eq!(registry.len(), 1); // retained through grace

        registry.advance_time(t0() + chrono::Duration::seconds(61 + 301));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn advance_time_is_idempotent_over_splits() {
        let run = |splits: &[i64]| {
            let mut registry = registry_with_ttl(Timeframe::H1, 100);
            for i in 0..10 {
                let at = t0() + chrono::Duration::seconds(i);
                registry.create(&candidate(Timeframe::H1, 101.0 + i as f64, 100.0, at)).unwrap();
            }
            let mut expired = Vec::new();
            for &s in splits {
                expired.extend(registry.advance_time(t0() + chrono::Duration::seconds(s)));
            }
            expired.into_iter().map(|e| e.pool_id).collect::<Vec<_>>()
        };
        assert_eq!(run(&[200]), run(&[50, 120, 200]));
    }

    #[test]
    fn purge_before_removes_only_old_expired() {
        let mut config = PoolConfig::default();
        config.grace_period_secs = 100_000;
        config.timeframes.insert(
            Timeframe::H1,
            crate::config::PoolTimeframeConfig { ttl_secs: 60, hit_tolerance: 0.0, strength_floor: 0.0 },
        );
        let mut registry = PoolRegistry::new(config, t0());
        registry.create(&candidate(Timeframe::H1, 101.0, 100.0, t0())).unwrap();
        registry.create(&candidate(
            Timeframe::H1,
            102.0,
            100.0,
            t0() + chrono::Duration::seconds(1),
        )).unwrap();

        registry.advance_time(t0() + chrono::Duration::seconds(62));
        assert_eq!(registry.count_by_state(PoolState::Expired), 2);

        // Purge cutoff before the expiry timestamp removes nothing.
        assert_eq!(registry.purge_before(t0() + chrono::Duration::seconds(62)), 0);
        // Cutoff after removes both.
        assert_eq!(registry.purge_before(t0() + chrono::Duration::seconds(63)), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn counts_by_state_sum_to_len() {
        let mut registry = registry_with_ttl(Timeframe::H1, 120);
        for i in 0..5 {
            let at = t0() + chrono::Duration::seconds(i);
            registry.create(&candidate(Timeframe::H1, 101.0 + i as f64, 100.0 + i as f64, at)).unwrap();
        }
        registry.on_price(t0() + chrono::Duration::seconds(10), 100.5);
        let total: usize = [PoolState::Active, PoolState::Touched, PoolState::Expired, PoolState::Grace]
            .iter()
            .map(|&s| registry.count_by_state(s))
            .sum();
        assert_eq!(total, registry.len());
    }
}
