//! Signal candidate FSM engine.
//!
//! Every zone entry spawns a candidate in WAIT_EMA. On each base bar the
//! engine advances all live candidates with the bar and its indicator
//! snapshot: expiry is checked first in any state, then the EMA trigger,
//! then the filter chain. A candidate can run WAIT_EMA through READY on a
//! single bar when every guard passes at once.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use crate::buffer::RingBuffer;
use crate::config::CandidateConfig;
use crate::domain::{
    Bar, Candidate, CandidateId, CandidateState, IndicatorSnapshot, Side, Signal, SignalId,
    ZoneEnteredEvent,
};
use crate::filters::Filter;

/// Result of advancing the engine by one bar.
#[derive(Debug, Clone, Default)]
pub struct CandidateUpdate {
    pub signals: Vec<Signal>,
    pub expired: Vec<CandidateId>,
}

#[derive(Debug, Clone)]
pub struct CandidateEngine {
    config: CandidateConfig,
    /// Live candidates in spawn order; terminal candidates are dropped at
    /// the end of each bar.
    candidates: Vec<Candidate>,
    /// Last READY timestamp per side, for the spacing filter.
    last_ready: BTreeMap<Side, DateTime<Utc>>,
    /// Recent base bars for the swing stop hint.
    history: RingBuffer<Bar>,
}

impl CandidateEngine {
    pub fn new(config: CandidateConfig) -> Self {
        let lookback = config.swing_lookback.max(1);
        Self {
            config,
            candidates: Vec::new(),
            last_ready: BTreeMap::new(),
            history: RingBuffer::new(lookback),
        }
    }

    /// Spawn a candidate from a zone entry. The zone band is carried on the
    /// candidate so the stop hint survives the zone's later expiry.
    pub fn spawn(
        &mut self,
        entry: &ZoneEnteredEvent,
        zone_top: f64,
        zone_bottom: f64,
    ) -> Candidate {
        let expires_at =
            entry.entry_ts + chrono::Duration::seconds(self.config.expiry_secs as i64);
        let candidate = Candidate {
            candidate_id: CandidateId::generate(&entry.zone_id, entry.entry_ts),
            zone_id: entry.zone_id.clone(),
            zone_kind: entry.zone_kind,
            side: entry.side,
            entry_price: entry.entry_price,
            zone_top,
            zone_bottom,
            strength: entry.strength,
            state: CandidateState::WaitEma,
            created_at: entry.entry_ts,
            expires_at,
            last_bar_ts: None,
        };
        debug!(candidate_id = %candidate.candidate_id, zone_id = %entry.zone_id, "candidate spawned");
        self.candidates.push(candidate.clone());
        candidate
    }

    /// Advance every live candidate with this bar and snapshot.
    pub fn on_bar(&mut self, bar: &Bar, snapshot: &IndicatorSnapshot) -> CandidateUpdate {
        self.history.push(bar.clone());

        let mut update = CandidateUpdate::default();
        let mut candidates = std::mem::take(&mut self.candidates);

        for candidate in &mut candidates {
            // Expiry is exact and takes priority in every state.
            if bar.ts >= candidate.expires_at {
                *candidate = candidate.with_state(CandidateState::Expired, bar.ts);
                debug!(candidate_id = %candidate.candidate_id, "candidate expired");
                update.expired.push(candidate.candidate_id.clone());
                continue;
            }

            if candidate.state == CandidateState::WaitEma {
                if self.ema_trigger(candidate.side, bar, snapshot) {
                    *candidate = candidate.with_state(CandidateState::Filters, bar.ts);
                } else {
                    candidate.last_bar_ts = Some(bar.ts);
                    continue;
                }
            }

            if candidate.state == CandidateState::Filters {
                let last_ready = self.last_ready.get(&candidate.side).copied();
                let all_pass = Filter::ALL.iter().all(|f| {
                    f.evaluate(bar, snapshot, candidate.side, &self.config, last_ready)
                });
                if all_pass {
                    *candidate = candidate.with_state(CandidateState::Ready, bar.ts);
                    self.last_ready.insert(candidate.side, bar.ts);
                    let signal = self.make_signal(candidate, bar);
                    debug!(signal_id = %signal.signal_id, side = %signal.side, "signal emitted");
                    update.signals.push(signal);
                } else {
                    // Stay in FILTERS; retry on the next bar until expiry.
                    candidate.last_bar_ts = Some(bar.ts);
                }
            }
        }

        candidates.retain(|c| !c.state.is_terminal());
        self.candidates = candidates;
        update
    }

    pub fn live_count(&self) -> usize {
        self.candidates.len()
    }

    /// WAIT_EMA trigger: close beyond the fast EMA in the trade direction.
    fn ema_trigger(&self, side: Side, bar: &Bar, snapshot: &IndicatorSnapshot) -> bool {
        let ema_fast = match snapshot.ema_fast {
            Some(v) => v,
            None => return false,
        };
        match side {
            Side::Bullish => bar.close > ema_fast,
            Side::Bearish => bar.close < ema_fast,
        }
    }

    /// Price hints: entry at the close; stop at the zone's far boundary or
    /// the swing extreme over the lookback window, whichever is further.
    fn make_signal(&self, candidate: &Candidate, bar: &Bar) -> Signal {
        let stop_hint = match candidate.side {
            Side::Bullish => {
                let swing_low = self
                    .history
                    .iter()
                    .map(|b| b.low)
                    .fold(f64::MAX, f64::min);
                candidate.zone_bottom.min(swing_low)
            }
            Side::Bearish => {
                let swing_high = self
                    .history
                    .iter()
                    .map(|b| b.high)
                    .fold(f64::MIN, f64::max);
                candidate.zone_top.max(swing_high)
            }
        };

        Signal {
            signal_id: SignalId::generate(&candidate.candidate_id, bar.ts),
            side: candidate.side,
            entry_hint_price: bar.close,
            stop_hint_price: stop_hint,
            issued_at: bar.ts,
            source_zone_id: candidate.zone_id.clone(),
            source_zone_kind: candidate.zone_kind,
        }
    }
}
