//! Central coordinator for all technical indicators.
//!
//! `update` advances every indicator by exactly one bar and returns the
//! post-update snapshot. Decision stages consume the snapshot only, so no
//! stage can read indicator state the others have not seen.

use crate::config::IndicatorConfig;
use crate::domain::{Bar, IndicatorSnapshot};

use super::atr::Atr;
use super::ema::Ema;
use super::regime::RegimeClassifier;
use super::volume_sma::VolumeSma;

#[derive(Debug, Clone)]
pub struct IndicatorPack {
    ema_fast: Ema,
    ema_slow: Ema,
    atr: Atr,
    volume_sma: VolumeSma,
    regime: RegimeClassifier,
}

impl IndicatorPack {
    pub fn new(config: &IndicatorConfig) -> Self {
        Self {
            ema_fast: Ema::new(config.ema_fast_period),
            ema_slow: Ema::new(config.ema_slow_period),
            atr: Atr::new(config.atr_period, config.atr_floor),
            volume_sma: VolumeSma::new(config.volume_sma_period),
            regime: RegimeClassifier::new(config.regime_sensitivity),
        }
    }

    /// Advance all indicators by one bar and return the resulting snapshot.
    ///
    /// Feeding bars in order is the driver's responsibility; the pack itself
    /// performs no ordering checks.
    pub fn update(&mut self, bar: &Bar) -> IndicatorSnapshot {
        self.ema_fast.update(bar);
        self.ema_slow.update(bar);
        self.atr.update(bar);
        self.volume_sma.update(bar);

        let regime =
            self.regime
                .classify(self.ema_fast.value(), self.ema_slow.value(), bar.close);

        IndicatorSnapshot {
            ts: bar.ts,
            ema_fast: self.ema_fast.value(),
            ema_slow: self.ema_slow.value(),
            atr: self.atr.value(),
            volume_sma: self.volume_sma.value(),
            regime,
            current_close: bar.close,
            current_volume: bar.volume,
            warmed_up: self.is_warm(),
        }
    }

    /// True once every indicator has enough history to produce values.
    pub fn is_warm(&self) -> bool {
        self.ema_fast.is_warm()
            && self.ema_slow.is_warm()
            && self.atr.is_warm()
            && self.volume_sma.is_warm()
    }

    /// Bars required before all indicators are warm.
    pub fn warmup_bars(&self) -> usize {
        self.ema_fast
            .period()
            .max(self.ema_slow.period())
            .max(self.atr.period())
    }
}
