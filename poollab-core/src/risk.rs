//! Risk sizing — converts signals into sized order intents.
//!
//! Classic fixed-fractional sizing: risk a configured fraction of equity per
//! trade, with the stop distance taken from the signal's stop hint or an ATR
//! multiple, whichever is wider. Position size is capped by the maximum
//! notional fraction of equity and floored by the minimum position.

use tracing::debug;

use crate::config::RiskConfig;
use crate::domain::{IndicatorSnapshot, OrderIntent, OrderOutcome, RejectReason, Side, Signal};

#[derive(Debug, Clone)]
pub struct RiskSizer {
    config: RiskConfig,
}

impl RiskSizer {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Size a signal against the account equity and the latest snapshot.
    pub fn size(&self, signal: &Signal, equity: f64, snapshot: &IndicatorSnapshot) -> OrderOutcome {
        if equity <= 0.0 {
            return self.reject(signal, RejectReason::InsufficientEquity);
        }

        let atr = match snapshot.atr {
            Some(v) if v > 0.0 => v,
            // Unreachable once the ATR floor is active; kept as a guard.
            _ => return self.reject(signal, RejectReason::ZeroAtr),
        };

        let entry = self.slipped_entry(signal);
        let hint_distance = (entry - signal.stop_hint_price).abs();
        let atr_distance = self.config.sl_atr_multiple * atr;
        let stop_distance = hint_distance.max(atr_distance);

        let risk_budget = self.config.risk_per_trade * equity;
        let risk_size = risk_budget / stop_distance;
        let notional_cap = self.config.max_position_pct * equity / entry;
        let size = risk_size.min(notional_cap);

        if size < self.config.min_position {
            debug!(signal_id = %signal.signal_id, size, "size below minimum");
            return self.reject(signal, RejectReason::SizeBelowMinimum);
        }

        let (stop_price, take_profit_price) = match signal.side {
            Side::Bullish => (
                entry - stop_distance,
                self.slipped_exit(signal.side, entry + self.config.tp_rr * stop_distance),
            ),
            Side::Bearish => (
                entry + stop_distance,
                self.slipped_exit(signal.side, entry - self.config.tp_rr * stop_distance),
            ),
        };

        OrderOutcome::Intent(OrderIntent {
            signal_id: signal.signal_id.clone(),
            side: signal.side,
            size,
            entry_price: entry,
            stop_price,
            take_profit_price,
            risk_amount: size * stop_distance,
        })
    }

    fn reject(&self, signal: &Signal, reason: RejectReason) -> OrderOutcome {
        debug!(signal_id = %signal.signal_id, %reason, "signal rejected");
        OrderOutcome::Rejected { signal_id: signal.signal_id.clone(), reason }
    }

    /// Entry worsened by the configured slippage fraction.
    fn slipped_entry(&self, signal: &Signal) -> f64 {
        let slip = self.config.entry_slippage_pct;
        match signal.side {
            Side::Bullish => signal.entry_hint_price * (1.0 + slip),
            Side::Bearish => signal.entry_hint_price * (1.0 - slip),
        }
    }

    /// Exit hint worsened by the configured slippage fraction.
    fn slipped_exit(&self, side: Side, price: f64) -> f64 {
        let slip = self.config.exit_slippage_pct;
        match side {
            Side::Bullish => price * (1.0 - slip),
            Side::Bearish => price * (1.0 + slip),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SignalId, ZoneKind};
    use chrono::{TimeZone, Utc};

    fn signal(side: Side, entry: f64, stop: f64) -> Signal {
        Signal {
            signal_id: SignalId("sig|test|0".into()),
            side,
            entry_hint_price: entry,
            stop_hint_price: stop,
            issued_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            source_zone_id: "H1|zone".into(),
            source_zone_kind: ZoneKind::Pool,
        }
    }

    fn snapshot(atr: Option<f64>) -> IndicatorSnapshot {
        IndicatorSnapshot {
            ts: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            ema_fast: Some(100.0),
            ema_slow: Some(99.0),
            atr,
            volume_sma: Some(1000.0),
            regime: None,
            current_close: 100.0,
            current_volume: 1000.0,
            warmed_up: true,
        }
    }

    fn sizer() -> RiskSizer {
        RiskSizer::new(RiskConfig::default())
    }

    #[test]
    fn long_intent_sizing() {
        // Equity 100_000, risk 1% = 1000. Stop hint distance 4; ATR distance
        // 1.5 * 2 = 3; stop distance = 4. Risk size = 250; notional cap =
        // 10_000 / 100 = 100 → size 100.
        let outcome = sizer().size(&signal(Side::Bullish, 100.0, 96.0), 100_000.0, &snapshot(Some(2.0)));
        let intent = match outcome {
            OrderOutcome::Intent(i) => i,
            other => panic!("expected intent, got {other:?}"),
        };
        assert_eq!(intent.size, 100.0);
        assert_eq!(intent.entry_price, 100.0);
        assert_eq!(intent.stop_price, 96.0);
        // tp = entry + 2 * 4 = 108
        assert_eq!(intent.take_profit_price, 108.0);
        assert_eq!(intent.risk_amount, 400.0);
    }

    #[test]
    fn atr_distance_wins_when_wider() {
        // Stop hint distance 1; ATR distance 1.5 * 4 = 6.
        let outcome = sizer().size(&signal(Side::Bullish, 100.0, 99.0), 100_000.0, &snapshot(Some(4.0)));
        let intent = match outcome {
            OrderOutcome::Intent(i) => i,
            other => panic!("expected intent, got {other:?}"),
        };
        assert_eq!(intent.stop_price, 94.0);
    }

    #[test]
    fn short_mirrors_levels() {
        let outcome = sizer().size(&signal(Side::Bearish, 100.0, 104.0), 100_000.0, &snapshot(Some(2.0)));
        let intent = match outcome {
            OrderOutcome::Intent(i) => i,
            other => panic!("expected intent, got {other:?}"),
        };
        assert_eq!(intent.stop_price, 104.0);
        assert_eq!(intent.take_profit_price, 92.0);
    }

    #[test]
    fn zero_equity_is_rejected() {
        let outcome = sizer().size(&signal(Side::Bullish, 100.0, 96.0), 0.0, &snapshot(Some(2.0)));
        assert!(matches!(
            outcome,
            OrderOutcome::Rejected { reason: RejectReason::InsufficientEquity, .. }
        ));
    }

    #[test]
    fn missing_atr_is_rejected() {
        let outcome = sizer().size(&signal(Side::Bullish, 100.0, 96.0), 100_000.0, &snapshot(None));
        assert!(matches!(
            outcome,
            OrderOutcome::Rejected { reason: RejectReason::ZeroAtr, .. }
        ));
    }

    #[test]
    fn tiny_size_is_rejected() {
        let mut config = RiskConfig::default();
        config.min_position = 1.0;
        let sizer = RiskSizer::new(config);
        // Equity 100 → risk 1 → size 1/4 = 0.25 < 1.
        let outcome = sizer.size(&signal(Side::Bullish, 100.0, 96.0), 100.0, &snapshot(Some(2.0)));
        assert!(matches!(
            outcome,
            OrderOutcome::Rejected { reason: RejectReason::SizeBelowMinimum, .. }
        ));
    }

    #[test]
    fn slippage_worsens_entry_and_exit() {
        let mut config = RiskConfig::default();
        config.entry_slippage_pct = 0.01;
        config.exit_slippage_pct = 0.01;
        let sizer = RiskSizer::new(config);
        let outcome = sizer.size(&signal(Side::Bullish, 100.0, 96.0), 100_000.0, &snapshot(Some(2.0)));
        let intent = match outcome {
            OrderOutcome::Intent(i) => i,
            other => panic!("expected intent, got {other:?}"),
        };
        assert_eq!(intent.entry_price, 101.0);
        // Stop distance = max(101 - 96, 3) = 5; tp = (101 + 10) * 0.99.
        assert!((intent.take_profit_price - 111.0 * 0.99).abs() < 1e-9);
    }
}
