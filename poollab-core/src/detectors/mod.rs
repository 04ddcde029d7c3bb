//! Higher-timeframe pattern detectors.
//!
//! The detector set is closed: {FVG, Pivot}. Each enabled timeframe owns one
//! set plus an HTF-level indicator pack that feeds ATR and volume-SMA values
//! into the detectors. Detectors only ever see closed HTF bars.

pub mod fvg;
pub mod pivot;

pub use fvg::FvgDetector;
pub use pivot::{PivotDetector, PivotStrength};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::config::{DetectorConfig, IndicatorConfig, OutOfOrderPolicy};
use crate::domain::{Bar, PoolCandidateEvent, Timeframe};
use crate::errors::PipelineError;
use crate::indicators::IndicatorPack;

/// Outcome of feeding one closed HTF bar to a detector set.
#[derive(Debug, Clone)]
pub enum DetectorUpdate {
    Events(Vec<PoolCandidateEvent>),
    /// The bar was consumed by the `drop` policy.
    Dropped(PipelineError),
}

/// All detectors for a single higher timeframe, with their indicator state.
#[derive(Debug, Clone)]
pub struct HtfDetectorSet {
    tf: Timeframe,
    indicators: IndicatorPack,
    fvg: FvgDetector,
    pivot: PivotDetector,
    policy: OutOfOrderPolicy,
    last_ts: Option<DateTime<Utc>>,
}

impl HtfDetectorSet {
    pub fn new(
        tf: Timeframe,
        detector_config: &DetectorConfig,
        indicator_config: &IndicatorConfig,
    ) -> Self {
        Self {
            tf,
            indicators: IndicatorPack::new(indicator_config),
            fvg: FvgDetector::new(tf, detector_config.fvg.clone()),
            pivot: PivotDetector::new(tf, detector_config.pivot.clone()),
            policy: detector_config.out_of_order_policy,
            last_ts: None,
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.tf
    }

    /// Feed one closed HTF bar. Detection never mutates past events; an
    /// out-of-order bar is dropped or raised per policy.
    pub fn update(&mut self, bar: &Bar) -> Result<DetectorUpdate, PipelineError> {
        if let Some(last) = self.last_ts {
            if bar.ts <= last {
                let err = PipelineError::ClockSkew { bar_ts: bar.ts, last_ts: last };
                warn!(tf = %self.tf, bar_ts = %bar.ts, "out-of-order HTF bar");
                return match self.policy {
                    OutOfOrderPolicy::Drop => Ok(DetectorUpdate::Dropped(err)),
                    OutOfOrderPolicy::Raise | OutOfOrderPolicy::Recalc => Err(err),
                };
            }
        }
        self.last_ts = Some(bar.ts);

        let snapshot = self.indicators.update(bar);

        let mut events = self.fvg.update(bar, snapshot.atr, snapshot.volume_sma);
        events.extend(self.pivot.update(bar, snapshot.atr));
        Ok(DetectorUpdate::Events(events))
    }
}
