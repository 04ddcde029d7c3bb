//! Pool lifecycle invariants: TTL expiry, multi-timeframe isolation, bulk
//! expiry, idempotent time advancement, and purge semantics.

use chrono::{DateTime, TimeZone, Utc};
use poollab_core::config::{PoolConfig, PoolTimeframeConfig};
use poollab_core::domain::{
    DetectorKind, PoolCandidateEvent, PoolState, Side, Timeframe,
};
use poollab_core::registry::PoolRegistry;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn secs(n: i64) -> chrono::Duration {
    chrono::Duration::seconds(n)
}

fn candidate(tf: Timeframe, top: f64, bottom: f64, at: DateTime<Utc>) -> PoolCandidateEvent {
    PoolCandidateEvent {
        detector: DetectorKind::Fvg,
        timeframe: tf,
        side: Side::Bullish,
        top,
        bottom,
        strength: 0.7,
        created_at: at,
    }
}

fn registry(entries: &[(Timeframe, u64)]) -> PoolRegistry {
    let mut config = PoolConfig::default();
    for &(tf, ttl_secs) in entries {
        config.timeframes.insert(
            tf,
            PoolTimeframeConfig { ttl_secs, hit_tolerance: 0.0, strength_floor: 0.0 },
        );
    }
    PoolRegistry::new(config, t0())
}

#[test]
fn one_second_ttl_expires_just_past_the_second() {
    let mut reg = registry(&[(Timeframe::H1, 1)]);
    reg.create(&candidate(Timeframe::H1, 101.0, 100.0, t0())).unwrap();

    let events = reg.advance_time(t0() + chrono::Duration::microseconds(1_000_001));
    assert_eq!(events.len(), 1);
    assert!(reg.query_active(None).is_empty());
}

#[test]
fn h1_and_h4_pools_expire_independently() {
    // Same band, different timeframes and TTLs; only the overlap engine ever
    // sees both at once.
    let mut reg = registry(&[(Timeframe::H1, 60), (Timeframe::H4, 3600)]);
    reg.create(&candidate(Timeframe::H1, 101.0, 100.0, t0())).unwrap();
    reg.create(&candidate(Timeframe::H4, 101.0, 100.0, t0())).unwrap();

    let events = reg.advance_time(t0() + secs(61));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].timeframe, Timeframe::H1);

    let remaining = reg.query_active(None);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].timeframe, Timeframe::H4);
    assert_eq!(remaining[0].state, PoolState::Active);
}

#[test]
fn ten_thousand_pools_all_expire() {
    let mut config = PoolConfig::default();
    config.max_pools_per_tf = 10_000;
    config.timeframes.insert(
        Timeframe::H1,
        PoolTimeframeConfig { ttl_secs: 3600, hit_tolerance: 0.0, strength_floor: 0.0 },
    );
    let mut reg = PoolRegistry::new(config, t0());

    for i in 0..10_000_i64 {
        // Distinct creation second per pool keeps ids collision-free.
        let at = t0() + secs(i % 3000);
        let top = 101.0 + (i as f64) * 0.01;
        reg.create(&candidate(Timeframe::H1, top, 100.0, at)).unwrap();
    }
    assert_eq!(reg.query_active(None).len(), 10_000);

    let events = reg.advance_time(t0() + secs(3000 + 3601));
    assert_eq!(events.len(), 10_000);
    assert_eq!(reg.query_active(None).len(), 0);
}

#[test]
fn advance_time_forward_progress_is_idempotent() {
    let run = |checkpoints: &[i64]| {
        let mut reg = registry(&[(Timeframe::H1, 500)]);
        for i in 0..50 {
            reg.create(&candidate(Timeframe::H1, 101.0 + i as f64, 100.0, t0() + secs(i)))
                .unwrap();
        }
        let mut ids = Vec::new();
        for &cp in checkpoints {
            for event in reg.advance_time(t0() + secs(cp)) {
                ids.push(event.pool_id.clone());
            }
        }
        ids.sort();
        ids
    };

    assert_eq!(run(&[600]), run(&[100, 300, 600]));
    assert_eq!(run(&[600]), run(&[600, 600]));
}

#[test]
fn touched_pools_still_expire_on_ttl() {
    let mut reg = registry(&[(Timeframe::H1, 60)]);
    reg.create(&candidate(Timeframe::H1, 101.0, 100.0, t0())).unwrap();
    let touched = reg.on_price(t0() + secs(10), 100.5);
    assert_eq!(touched.len(), 1);

    let events = reg.advance_time(t0() + secs(61));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].final_state, PoolState::Touched);
}

#[test]
fn purge_never_removes_live_pools() {
    let mut config = PoolConfig::default();
    config.grace_period_secs = 100_000;
    config.timeframes.insert(
        Timeframe::H1,
        PoolTimeframeConfig { ttl_secs: 100, hit_tolerance: 0.0, strength_floor: 0.0 },
    );
    config.timeframes.insert(
        Timeframe::H4,
        PoolTimeframeConfig { ttl_secs: 50_000, hit_tolerance: 0.0, strength_floor: 0.0 },
    );
    let mut reg = PoolRegistry::new(config, t0());
    reg.create(&candidate(Timeframe::H1, 101.0, 100.0, t0())).unwrap();
    reg.create(&candidate(Timeframe::H4, 201.0, 200.0, t0())).unwrap();
    // Touch the H4 pool so all three live states are present.
    reg.on_price(t0() + secs(5), 200.5);

    reg.advance_time(t0() + secs(101)); // H1 pool expires
    assert_eq!(reg.count_by_state(PoolState::Expired), 1);

    let removed = reg.purge_before(t0() + secs(1_000));
    assert_eq!(removed, 1);
    // The touched H4 pool survives the purge.
    assert_eq!(reg.len(), 1);
    assert_eq!(reg.count_by_state(PoolState::Touched), 1);
}

#[test]
fn overlapping_bands_across_timeframes_do_not_interact() {
    let mut reg = registry(&[(Timeframe::H1, 60), (Timeframe::H4, 3600)]);
    reg.create(&candidate(Timeframe::H1, 101.0, 100.0, t0())).unwrap();
    reg.create(&candidate(Timeframe::H4, 101.0, 100.0, t0())).unwrap();

    // A touch at a shared price touches both pools, but state stays per-pool.
    let touched = reg.on_price(t0() + secs(1), 100.5);
    assert_eq!(touched.len(), 2);

    let events = reg.advance_time(t0() + secs(61));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].timeframe, Timeframe::H1);
    assert_eq!(reg.count_by_state(PoolState::Touched), 1);
}
