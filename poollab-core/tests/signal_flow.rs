//! Signal path: FVG detection values, the candidate filter chain, and the
//! full bar-to-order-intent flow through the pipeline driver.

use chrono::{DateTime, TimeZone, Utc};
use poollab_core::config::{FvgConfig, PipelineConfig, SessionWindow};
use poollab_core::detectors::FvgDetector;
use poollab_core::domain::{Bar, OrderOutcome, PipelineEvent, Side, Timeframe};
use poollab_core::pipeline::Pipeline;

fn h1_bar(hour: u32, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Bar {
    Bar::new(
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
        "BTCUSD".into(),
        Timeframe::H1,
        open,
        high,
        low,
        close,
        volume,
    )
}

/// S2: the canonical bullish FVG. B1 high 110, bullish B2 with 3x volume,
/// B3 low 114, ATR 1.0 → one bullish pool with band [110, 114].
#[test]
fn fvg_detection_reference_case() {
    let config = FvgConfig { min_gap_atr: 0.3, min_gap_pct: 0.0, min_rel_vol: 1.2 };
    let mut detector = FvgDetector::new(Timeframe::H1, config);

    let avg_vol = 1000.0;
    detector.update(&h1_bar(0, 109.0, 110.0, 108.0, 109.5, avg_vol), Some(1.0), Some(avg_vol));
    detector.update(&h1_bar(1, 110.0, 112.5, 109.8, 112.0, 3.0 * avg_vol), Some(1.0), Some(avg_vol));
    let events =
        detector.update(&h1_bar(2, 114.5, 116.0, 114.0, 115.0, avg_vol), Some(1.0), Some(avg_vol));

    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.side, Side::Bullish);
    assert_eq!(event.timeframe, Timeframe::H1);
    assert_eq!(event.bottom, 110.0);
    assert_eq!(event.top, 114.0);
    assert!(event.strength > 0.0);
    assert_eq!(event.created_at, Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap());
}

/// Pipeline configuration with short warmups so an H1 scenario fits in a
/// few synthetic hours.
fn e2e_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.equity = 100_000.0;
    config.aggregation.target_timeframes_minutes = vec![60];
    config.indicators.ema_fast_period = 2;
    config.indicators.ema_slow_period = 3;
    config.indicators.atr_period = 3;
    config.indicators.volume_sma_period = 3;
    config.indicators.regime_sensitivity = 0.0;
    config.detectors.fvg.min_gap_pct = 0.0;
    config.detectors.fvg.min_rel_vol = 0.0;
    config.candidate.volume_multiple = 1.2;
    config
}

fn flat_minute(ts: DateTime<Utc>, price: f64, volume: f64) -> Bar {
    Bar::new(ts, "BTCUSD".into(), Timeframe::M1, price, price, price, price, volume)
}

/// Minute stream whose H1 folds are: four flat hours at 100, one bullish
/// hour 110→112, one flat hour at 114.2. Closing hour 5 exposes a bullish
/// FVG with band [100, 114.2].
fn fvg_scenario_bars() -> Vec<Bar> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut bars = Vec::new();
    for hour in 0..6_i64 {
        for minute in 0..60_i64 {
            let ts = base + chrono::Duration::minutes(hour * 60 + minute);
            let price = match hour {
                0..=3 => 100.0,
                4 => {
                    if minute == 0 {
                        110.0
                    } else {
                        112.0
                    }
                }
                _ => 114.2,
            };
            bars.push(flat_minute(ts, price, 1000.0));
        }
    }
    bars
}

#[test]
fn pipeline_creates_pool_from_aggregated_fvg() {
    let mut pipeline = Pipeline::new(e2e_config()).unwrap();
    let mut all_events = Vec::new();
    for bar in fvg_scenario_bars() {
        all_events.extend(pipeline.feed(&bar).unwrap());
    }
    // Hour 5 is still in progress; the gap is not yet visible.
    assert!(!all_events.iter().any(|e| matches!(e, PipelineEvent::PoolCreated(_))));

    // The first bar of hour 6 closes hour 5 and confirms the gap.
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap();
    let events = pipeline.feed(&flat_minute(base, 113.0, 1000.0)).unwrap();

    let created: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::PoolCreated(c) => Some(c),
            _ => None,
        })
        .collect();
    assert_eq!(created.len(), 1);
    let pool = &created[0].pool;
    assert_eq!(pool.side, Side::Bullish);
    assert_eq!(pool.bottom, 100.0);
    assert!((pool.top - 114.2).abs() < 1e-9);
    assert_eq!(pool.timeframe, Timeframe::H1);

    // The same bar's close sits inside the fresh band: the zone is entered
    // and a candidate spawns on this bar.
    assert!(events.iter().any(|e| matches!(e, PipelineEvent::ZoneEntered(_))));
    assert!(events.iter().any(|e| matches!(e, PipelineEvent::CandidateSpawned { .. })));
}

#[test]
fn candidate_chain_reaches_order_intent() {
    let mut pipeline = Pipeline::new(e2e_config()).unwrap();
    for bar in fvg_scenario_bars() {
        pipeline.feed(&bar).unwrap();
    }
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap();
    // Entry bar: closes inside the zone, spawns the candidate.
    pipeline.feed(&flat_minute(base, 113.0, 1000.0)).unwrap();

    // Trigger bar: close crosses the fast EMA with a volume surge.
    let trigger = Bar::new(
        base + chrono::Duration::minutes(1),
        "BTCUSD".into(),
        Timeframe::M1,
        113.0,
        115.0,
        113.0,
        115.0,
        3000.0,
    );
    let events = pipeline.feed(&trigger).unwrap();

    let signals: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::SignalEmitted(s) => Some(s),
            _ => None,
        })
        .collect();
    assert_eq!(signals.len(), 1);
    let signal = signals[0];
    assert_eq!(signal.side, Side::Bullish);
    assert_eq!(signal.entry_hint_price, 115.0);
    // Stop: zone bottom (100) is further than any recent swing low.
    assert_eq!(signal.stop_hint_price, 100.0);

    let intents: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::OrderOutcome { outcome: OrderOutcome::Intent(i), .. } => Some(i),
            _ => None,
        })
        .collect();
    assert_eq!(intents.len(), 1);
    let intent = intents[0];
    assert_eq!(intent.side, Side::Bullish);
    assert!(intent.size > 0.0);
    assert!(intent.stop_price < intent.entry_price);
    assert!(intent.take_profit_price > intent.entry_price);

    let metrics = pipeline.metrics();
    assert_eq!(metrics.signals_emitted_total, 1);
    assert_eq!(metrics.candidates_ready_total, 1);
}

/// S5 shape at the driver level: with the session window open and every
/// filter satisfied, WAIT_EMA through READY completes on a single bar.
#[test]
fn session_window_gates_the_same_scenario() {
    let mut config = e2e_config();
    // Open window that does NOT include 06:00-07:00 UTC.
    config.candidate.sessions = vec![SessionWindow::new("ny", 12 * 60, 14 * 60 + 5)];
    let mut pipeline = Pipeline::new(config).unwrap();
    for bar in fvg_scenario_bars() {
        pipeline.feed(&bar).unwrap();
    }
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap();
    pipeline.feed(&flat_minute(base, 113.0, 1000.0)).unwrap();
    let trigger = Bar::new(
        base + chrono::Duration::minutes(1),
        "BTCUSD".into(),
        Timeframe::M1,
        113.0,
        115.0,
        113.0,
        115.0,
        3000.0,
    );
    let events = pipeline.feed(&trigger).unwrap();
    // Outside the session: the candidate parks in FILTERS, no signal.
    assert!(!events.iter().any(|e| matches!(e, PipelineEvent::SignalEmitted(_))));
}

/// Candidate expiry is exact: a candidate that would otherwise fire emits
/// nothing once the triggering bar reaches `created_at + expiry`.
#[test]
fn candidate_expiry_blocks_late_signals() {
    let mut config = e2e_config();
    config.candidate.expiry_secs = 60; // expires before the trigger bar
    let mut pipeline = Pipeline::new(config).unwrap();
    for bar in fvg_scenario_bars() {
        pipeline.feed(&bar).unwrap();
    }
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap();
    pipeline.feed(&flat_minute(base, 113.0, 1000.0)).unwrap();
    let trigger = Bar::new(
        base + chrono::Duration::minutes(1),
        "BTCUSD".into(),
        Timeframe::M1,
        113.0,
        115.0,
        113.0,
        115.0,
        3000.0,
    );
    let events = pipeline.feed(&trigger).unwrap();
    assert!(!events.iter().any(|e| matches!(e, PipelineEvent::SignalEmitted(_))));
    assert!(events.iter().any(|e| matches!(e, PipelineEvent::CandidateExpired { .. })));
    assert_eq!(pipeline.metrics().candidates_expired_total, 1);
}
