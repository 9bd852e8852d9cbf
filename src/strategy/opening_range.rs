//! Opening range extraction.
//!
//! The opening range is the high/low envelope (and mean volume) of the
//! bars stamped inside the first minutes of the session, both ends
//! inclusive. Pure functions over a candle slice; inputs are never mutated.

use chrono::NaiveTime;
use rust_decimal::Decimal;
use std::fmt;

use crate::types::Candle;

/// Reference range for one instrument. Invariant: `high >= low`.
#[derive(Debug, Clone, PartialEq)]
pub struct OpeningRange {
    pub high: Decimal,
    pub low: Decimal,
    pub mean_volume: Decimal,
    /// Number of bars that formed the range.
    pub bars: usize,
}

impl OpeningRange {
    /// `high - low`.
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }
}

impl fmt::Display for OpeningRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OR high={} low={} range={} mean_vol={:.0} bars={}",
            self.high,
            self.low,
            self.range(),
            self.mean_volume,
            self.bars,
        )
    }
}

/// Keep only bars stamped within `[open, close]`.
pub fn session_bars(candles: &[Candle], open: NaiveTime, close: NaiveTime) -> Vec<Candle> {
    candles
        .iter()
        .filter(|c| in_window(c, open, close))
        .cloned()
        .collect()
}

/// Compute the opening range over bars stamped within `[start, end]`.
///
/// Returns `None` when no bar falls in the window (illiquid or not yet
/// traded); callers skip the instrument.
pub fn extract(candles: &[Candle], start: NaiveTime, end: NaiveTime) -> Option<OpeningRange> {
    let mut window = candles.iter().filter(|c| in_window(c, start, end));

    let first = window.next()?;
    let mut high = first.high;
    let mut low = first.low;
    let mut volume_sum = Decimal::from(first.volume);
    let mut bars = 1usize;

    for candle in window {
        high = high.max(candle.high);
        low = low.min(candle.low);
        volume_sum += Decimal::from(candle.volume);
        bars += 1;
    }

    Some(OpeningRange {
        high,
        low,
        mean_volume: volume_sum / Decimal::from(bars),
        bars,
    })
}

fn in_window(candle: &Candle, start: NaiveTime, end: NaiveTime) -> bool {
    let t = candle.timestamp.time();
    t >= start && t <= end
}
