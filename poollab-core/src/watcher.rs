//! Zone watcher — edge detection of price entries into tracked zones.
//!
//! Subscribes to pool and HLZ lifecycle events and checks every base bar
//! against the tracked bands. An entry fires when the bar's range intersects
//! a band the previous bar did not, at most once per zone per bar; leaving
//! the band re-arms the zone.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::ZoneWatcherConfig;
use crate::domain::{
    Bar, HighLiquidityZone, HlzId, HlzSide, LiquidityPool, PoolId, Side, ZoneEnteredEvent,
    ZoneKind,
};

/// Tracked zone state. `in_zone` holds whether the *previous* bar's range
/// intersected the band; a wick-only touch under `confirm_closure` arms the
/// zone without emitting.
#[derive(Debug, Clone)]
struct ZoneMeta {
    kind: ZoneKind,
    top: f64,
    bottom: f64,
    strength: f64,
    side: Side,
    in_zone: bool,
}

#[derive(Debug, Clone)]
pub struct ZoneWatcher {
    config: ZoneWatcherConfig,
    zones: BTreeMap<String, ZoneMeta>,
    skipped_capacity: u64,
}

impl ZoneWatcher {
    pub fn new(config: ZoneWatcherConfig) -> Self {
        Self { config, zones: BTreeMap::new(), skipped_capacity: 0 }
    }

    /// Check one base bar against every tracked zone, in zone-id order.
    pub fn on_bar(&mut self, bar: &Bar) -> Vec<ZoneEnteredEvent> {
        let tol = self.config.price_tolerance;
        let confirm = self.config.confirm_closure;
        let mut events = Vec::new();

        for (zone_id, meta) in self.zones.iter_mut() {
            let bottom = meta.bottom - tol;
            let top = meta.top + tol;
            let intersects = bar.low <= top && bar.high >= bottom;

            if intersects && !meta.in_zone {
                let confirmed = !confirm || (bar.close >= bottom && bar.close <= top);
                if confirmed {
                    debug!(%zone_id, price = bar.close, "zone entered");
                    events.push(ZoneEnteredEvent {
                        zone_id: zone_id.clone(),
                        zone_kind: meta.kind,
                        entry_ts: bar.ts,
                        entry_price: bar.close,
                        side: meta.side,
                        strength: meta.strength,
                    });
                }
            }
            meta.in_zone = intersects;
        }

        events
    }

    pub fn on_pool_created(&mut self, pool: &LiquidityPool) {
        self.track(
            pool.pool_id.0.clone(),
            ZoneMeta {
                kind: ZoneKind::Pool,
                top: pool.top,
                bottom: pool.bottom,
                strength: pool.strength,
                side: pool.side,
                in_zone: false,
            },
        );
    }

    /// Touched pools stay tracked; the zone leaves the watch set when the
    /// pool expires.
    pub fn on_pool_touched(&mut self, _pool_id: &PoolId) {}

    pub fn on_pool_expired(&mut self, pool_id: &PoolId) {
        self.zones.remove(&pool_id.0);
    }

    pub fn on_hlz_created(&mut self, hlz: &HighLiquidityZone) {
        self.track(
            hlz.hlz_id.0.clone(),
            ZoneMeta {
                kind: ZoneKind::Hlz,
                top: hlz.top,
                bottom: hlz.bottom,
                strength: hlz.strength,
                side: hlz_direction(hlz.side),
                in_zone: false,
            },
        );
    }

    pub fn on_hlz_updated(&mut self, hlz: &HighLiquidityZone) {
        if let Some(meta) = self.zones.get_mut(&hlz.hlz_id.0) {
            meta.top = hlz.top;
            meta.bottom = hlz.bottom;
            meta.strength = hlz.strength;
            meta.side = hlz_direction(hlz.side);
        }
    }

    pub fn on_hlz_dissolved(&mut self, hlz_id: &HlzId) {
        self.zones.remove(&hlz_id.0);
    }

    pub fn active_zones(&self) -> usize {
        self.zones.len()
    }

    /// Unwidened band of a tracked zone, for candidate stop hints.
    pub fn zone_band(&self, zone_id: &str) -> Option<(f64, f64)> {
        self.zones.get(zone_id).map(|m| (m.top, m.bottom))
    }

    /// Zones skipped because `max_active_zones` was reached.
    pub fn skipped_capacity(&self) -> u64 {
        self.skipped_capacity
    }

    fn track(&mut self, zone_id: String, meta: ZoneMeta) {
        if meta.strength < self.config.min_strength {
            debug!(%zone_id, strength = meta.strength, "zone below strength threshold");
            return;
        }
        if self.zones.len() >= self.config.max_active_zones
            && !self.zones.contains_key(&zone_id)
        {
            self.skipped_capacity += 1;
            warn!(%zone_id, cap = self.config.max_active_zones, "zone capacity reached");
            return;
        }
        self.zones.insert(zone_id, meta);
    }
}

/// Direction a zone trades toward. Mixed HLZs default to the long side.
fn hlz_direction(side: HlzSide) -> Side {
    match side {
        HlzSide::Bullish | HlzSide::Mixed => Side::Bullish,
        HlzSide::Bearish => Side::Bearish,
    }
}
