//! High-Liquidity Zone detection from overlapping pools.
//!
//! The engine never holds a pool: it mirrors the immutable attributes
//! (band, side, timeframe, strength) keyed by pool id as lifecycle events
//! arrive, and keeps per-side interval lists sorted by band bottom for
//! overlap queries. HLZ membership follows a pool's active lifetime —
//! touches retain membership, expiry drops it.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::config::HlzConfig;
use crate::domain::{
    HighLiquidityZone, HlzCreatedEvent, HlzDissolvedEvent, HlzId, HlzSide, HlzUpdatedEvent,
    LiquidityPool, PoolId, Side, Timeframe,
};

/// Mirrored pool attributes; pools never move or resize after creation.
#[derive(Debug, Clone)]
struct PoolRef {
    top: f64,
    bottom: f64,
    side: Side,
    timeframe: Timeframe,
    strength: f64,
}

/// Price interval entry in the per-side index, sorted by `(bottom, id)`.
#[derive(Debug, Clone)]
struct Interval {
    bottom: f64,
    top: f64,
    pool_id: PoolId,
}

/// HLZ lifecycle events produced by one pool event.
#[derive(Debug, Clone)]
pub enum HlzEvent {
    Created(HlzCreatedEvent),
    Updated(HlzUpdatedEvent),
    Dissolved(HlzDissolvedEvent),
}

#[derive(Debug, Clone)]
pub struct OverlapEngine {
    config: HlzConfig,
    pools: BTreeMap<PoolId, PoolRef>,
    bullish: Vec<Interval>,
    bearish: Vec<Interval>,
    active: BTreeMap<HlzId, HighLiquidityZone>,
    members: BTreeMap<HlzId, BTreeSet<PoolId>>,
    pool_to_hlzs: BTreeMap<PoolId, BTreeSet<HlzId>>,
    refused_capacity: u64,
}

impl OverlapEngine {
    pub fn new(config: HlzConfig) -> Self {
        Self {
            config,
            pools: BTreeMap::new(),
            bullish: Vec::new(),
            bearish: Vec::new(),
            active: BTreeMap::new(),
            members: BTreeMap::new(),
            pool_to_hlzs: BTreeMap::new(),
            refused_capacity: 0,
        }
    }

    /// Handle a pool creation: index it, then form or extend HLZs with every
    /// active pool whose band intersects.
    pub fn on_pool_created(
        &mut self,
        pool: &LiquidityPool,
        ts: DateTime<Utc>,
    ) -> Vec<HlzEvent> {
        let interval = Interval {
            bottom: pool.bottom,
            top: pool.top,
            pool_id: pool.pool_id.clone(),
        };
        let overlapping = self.query_overlaps(&interval, pool.side);

        self.pools.insert(
            pool.pool_id.clone(),
            PoolRef {
                top: pool.top,
                bottom: pool.bottom,
                side: pool.side,
                timeframe: pool.timeframe,
                strength: pool.strength,
            },
        );
        self.insert_interval(interval, pool.side);

        if overlapping.is_empty() {
            return Vec::new();
        }

        let mut group: BTreeSet<PoolId> = overlapping.into_iter().collect();
        group.insert(pool.pool_id.clone());
        self.process_group(group, ts)
    }

    /// Touched pools retain HLZ membership until they expire.
    pub fn on_pool_touched(&mut self, _pool_id: &PoolId, _ts: DateTime<Utc>) -> Vec<HlzEvent> {
        Vec::new()
    }

    /// Handle a pool expiry: drop its membership everywhere; HLZs falling
    /// below `min_members` dissolve the same bar.
    pub fn on_pool_expired(&mut self, pool_id: &PoolId, ts: DateTime<Utc>) -> Vec<HlzEvent> {
        let side = match self.pools.remove(pool_id) {
            Some(info) => info.side,
            None => return Vec::new(),
        };
        self.remove_interval(pool_id, side);

        let affected = self.pool_to_hlzs.remove(pool_id).unwrap_or_default();
        let mut events = Vec::new();

        for hlz_id in affected {
            let members = match self.members.get_mut(&hlz_id) {
                Some(m) => m,
                None => continue,
            };
            members.remove(pool_id);
            let remaining = members.len();

            if remaining < self.config.min_members {
                if self.active.remove(&hlz_id).is_some() {
                    debug!(%hlz_id, remaining, "HLZ dissolved");
                    events.push(HlzEvent::Dissolved(HlzDissolvedEvent {
                        hlz_id: hlz_id.clone(),
                        ts,
                        final_member_count: remaining,
                    }));
                }
                let leftover = self.members.remove(&hlz_id).unwrap_or_default();
                for member in leftover {
                    if let Some(set) = self.pool_to_hlzs.get_mut(&member) {
                        set.remove(&hlz_id);
                    }
                }
            } else if self.config.recompute_on_update {
                let prev_strength =
                    self.active.get(&hlz_id).map(|h| h.strength).unwrap_or(0.0);
                let member_ids = members.clone();
                if let Some(updated) = self.build_hlz(&hlz_id, &member_ids, ts) {
                    self.active.insert(hlz_id.clone(), updated.clone());
                    events.push(HlzEvent::Updated(HlzUpdatedEvent {
                        hlz_id: hlz_id.clone(),
                        ts,
                        hlz: updated,
                        prev_strength,
                    }));
                }
            }
        }

        events
    }

    /// Currently active HLZs, in id order.
    pub fn active_hlzs(&self) -> impl Iterator<Item = &HighLiquidityZone> {
        self.active.values()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Creations refused because `max_active_hlzs` was reached.
    pub fn refused_capacity(&self) -> u64 {
        self.refused_capacity
    }

    fn process_group(&mut self, group: BTreeSet<PoolId>, ts: DateTime<Utc>) -> Vec<HlzEvent> {
        if group.len() < self.config.min_members {
            return Vec::new();
        }

        let hlz_id = HlzId::generate(&group);

        if self.active.contains_key(&hlz_id) {
            // Same membership resolves to the same id; nothing changed.
            return Vec::new();
        }

        let candidate = match self.build_hlz(&hlz_id, &group, ts) {
            Some(hlz) => hlz,
            None => return Vec::new(),
        };

        // Band within merge tolerance of an existing same-side HLZ extends
        // that zone instead of creating a parallel one.
        if let Some(existing_id) = self.merge_target(&candidate) {
            let prev_strength =
                self.active.get(&existing_id).map(|h| h.strength).unwrap_or(0.0);
            let mut merged_members = self.members.get(&existing_id).cloned().unwrap_or_default();
            merged_members.extend(group.iter().cloned());
            if let Some(merged) = self.build_hlz(&existing_id, &merged_members, ts) {
                for member in &merged_members {
                    self.pool_to_hlzs
                        .entry(member.clone())
                        .or_default()
                        .insert(existing_id.clone());
                }
                self.members.insert(existing_id.clone(), merged_members);
                self.active.insert(existing_id.clone(), merged.clone());
                debug!(hlz_id = %existing_id, "HLZ extended by merge");
                return vec![HlzEvent::Updated(HlzUpdatedEvent {
                    hlz_id: existing_id,
                    ts,
                    hlz: merged,
                    prev_strength,
                })];
            }
            return Vec::new();
        }

        if self.active.len() >= self.config.max_active_hlzs {
            self.refused_capacity += 1;
            warn!(cap = self.config.max_active_hlzs, "HLZ capacity reached");
            return Vec::new();
        }

        for member in &group {
            self.pool_to_hlzs
                .entry(member.clone())
                .or_default()
                .insert(hlz_id.clone());
        }
        self.members.insert(hlz_id.clone(), group);
        self.active.insert(hlz_id.clone(), candidate.clone());
        debug!(%hlz_id, strength = candidate.strength, "HLZ created");

        vec![HlzEvent::Created(HlzCreatedEvent { hlz_id, ts, hlz: candidate })]
    }

    /// Assemble an HLZ from member ids: band is the intersection of member
    /// bands, strength the timeframe-weighted sum. Returns `None` when the
    /// members do not all intersect, sides mix impermissibly, or strength
    /// falls short.
    fn build_hlz(
        &self,
        hlz_id: &HlzId,
        member_ids: &BTreeSet<PoolId>,
        ts: DateTime<Utc>,
    ) -> Option<HighLiquidityZone> {
        if member_ids.len() < self.config.min_members {
            return None;
        }

        let mut bottom = f64::MIN;
        let mut top = f64::MAX;
        let mut strength = 0.0;
        let mut sides: BTreeSet<Side> = BTreeSet::new();
        let mut timeframes: BTreeSet<Timeframe> = BTreeSet::new();

        for id in member_ids {
            let info = self.pools.get(id)?;
            bottom = bottom.max(info.bottom);
            top = top.min(info.top);
            strength += self.config.weight(info.timeframe) * info.strength;
            sides.insert(info.side);
            timeframes.insert(info.timeframe);
        }

        if bottom >= top {
            return None;
        }
        if sides.len() > 1 && !self.config.side_mixing {
            return None;
        }
        if strength < self.config.min_strength {
            return None;
        }

        let side = if sides.len() == 1 {
            HlzSide::from(*sides.iter().next().expect("non-empty side set"))
        } else {
            HlzSide::Mixed
        };

        Some(HighLiquidityZone {
            hlz_id: hlz_id.clone(),
            side,
            top,
            bottom,
            strength,
            member_pool_ids: member_ids.clone(),
            timeframes,
            created_at: ts,
        })
    }

    fn merge_target(&self, candidate: &HighLiquidityZone) -> Option<HlzId> {
        let tol = self.config.merge_tolerance;
        if tol <= 0.0 {
            return None;
        }
        self.active
            .values()
            .find(|h| {
                h.side == candidate.side
                    && (h.top - candidate.top).abs() <= tol
                    && (h.bottom - candidate.bottom).abs() <= tol
            })
            .map(|h| h.hlz_id.clone())
    }

    fn side_list(&self, side: Side) -> &Vec<Interval> {
        match side {
            Side::Bullish => &self.bullish,
            Side::Bearish => &self.bearish,
        }
    }

    fn side_list_mut(&mut self, side: Side) -> &mut Vec<Interval> {
        match side {
            Side::Bullish => &mut self.bullish,
            Side::Bearish => &mut self.bearish,
        }
    }

    fn insert_interval(&mut self, interval: Interval, side: Side) {
        let list = self.side_list_mut(side);
        let pos = list.partition_point(|e| {
            (e.bottom, &e.pool_id) < (interval.bottom, &interval.pool_id)
        });
        list.insert(pos, interval);
    }

    fn remove_interval(&mut self, pool_id: &PoolId, side: Side) {
        self.side_list_mut(side).retain(|e| e.pool_id != *pool_id);
    }

    /// Ids of indexed pools whose bands strictly intersect `target`.
    fn query_overlaps(&self, target: &Interval, side: Side) -> Vec<PoolId> {
        let mut out = Vec::new();
        self.collect_overlaps(self.side_list(side), target, &mut out);
        if self.config.side_mixing {
            let other = match side {
                Side::Bullish => Side::Bearish,
                Side::Bearish => Side::Bullish,
            };
            self.collect_overlaps(self.side_list(other), target, &mut out);
        }
        out
    }

    fn collect_overlaps(&self, list: &[Interval], target: &Interval, out: &mut Vec<PoolId>) {
        for entry in list {
            if entry.bottom >= target.top {
                break; // sorted by bottom; no later entry can intersect
            }
            if entry.bottom < target.top && target.bottom < entry.top {
                out.push(entry.pool_id.clone());
            }
        }
    }
}
