//! Fair-Value-Gap detector.
//!
//! Scans a three-bar window `B1, B2, B3` of closed HTF bars. A bullish gap
//! needs `B3.low > B1.high` with a bullish middle bar; bearish mirrors it.
//! Qualification is OR logic over ATR-scaled and percentage gap size, with
//! an optional relative-volume gate on the middle bar.

use tracing::debug;

use crate::buffer::RingBuffer;
use crate::config::FvgConfig;
use crate::domain::{Bar, DetectorKind, PoolCandidateEvent, Side, Timeframe};

#[derive(Debug, Clone)]
pub struct FvgDetector {
    tf: Timeframe,
    config: FvgConfig,
    window: RingBuffer<Bar>,
}

impl FvgDetector {
    pub fn new(tf: Timeframe, config: FvgConfig) -> Self {
        Self { tf, config, window: RingBuffer::new(3) }
    }

    /// Process one closed HTF bar. `atr` and `volume_sma` come from the
    /// HTF-level indicator pack; detection is skipped until both are warm.
    pub fn update(
        &mut self,
        bar: &Bar,
        atr: Option<f64>,
        volume_sma: Option<f64>,
    ) -> Vec<PoolCandidateEvent> {
        self.window.push(bar.clone());
        if self.window.len() < 3 {
            return Vec::new();
        }

        let atr = match atr {
            Some(v) if v > 0.0 => v,
            _ => {
                debug!(tf = %self.tf, ts = %bar.ts, "FVG skipped: ATR not ready");
                return Vec::new();
            }
        };

        let b1 = self.window.at(0).cloned();
        let b2 = self.window.at(1).cloned();
        let b3 = self.window.at(2).cloned();
        let (b1, b2, b3) = match (b1, b2, b3) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => return Vec::new(),
        };

        // Middle-bar volume gate; min_rel_vol = 0 disables it.
        if self.config.min_rel_vol > 0.0 {
            let rel_vol = match volume_sma {
                Some(sma) if sma > 0.0 => b2.volume / sma,
                _ => 0.0,
            };
            if rel_vol < self.config.min_rel_vol {
                debug!(tf = %self.tf, ts = %bar.ts, rel_vol, "FVG skipped: volume filter");
                return Vec::new();
            }
        }

        let mut events = Vec::new();

        if b3.low > b1.high && b2.is_bullish() {
            let gap = b3.low - b1.high;
            if let Some(strength) = self.qualify(gap, b1.close, atr) {
                events.push(PoolCandidateEvent {
                    detector: DetectorKind::Fvg,
                    timeframe: self.tf,
                    side: Side::Bullish,
                    top: b3.low,
                    bottom: b1.high,
                    strength,
                    created_at: b3.ts,
                });
            }
        }

        if b3.high < b1.low && b2.is_bearish() {
            let gap = b1.low - b3.high;
            if let Some(strength) = self.qualify(gap, b1.close, atr) {
                events.push(PoolCandidateEvent {
                    detector: DetectorKind::Fvg,
                    timeframe: self.tf,
                    side: Side::Bearish,
                    top: b1.low,
                    bottom: b3.high,
                    strength,
                    created_at: b3.ts,
                });
            }
        }

        events
    }

    /// OR qualification over ATR-scaled and percentage gap size. Returns the
    /// normalized strength when the gap qualifies.
    fn qualify(&self, gap: f64, reference_price: f64, atr: f64) -> Option<f64> {
        let gap_atr = gap / atr;
        let gap_pct = if reference_price > 0.0 { gap / reference_price } else { 0.0 };

        if gap_atr >= self.config.min_gap_atr || gap_pct >= self.config.min_gap_pct {
            Some(normalize_strength(gap_atr, gap_pct))
        } else {
            None
        }
    }
}

/// Map dual gap metrics into `[0, 1]`: the larger of ATR-units scaled by 2
/// and percentage scaled by 10, clamped at 1.
pub(crate) fn normalize_strength(gap_atr: f64, gap_pct: f64) -> f64 {
    (gap_atr / 2.0).max(gap_pct * 10.0).min(1.0)
}
