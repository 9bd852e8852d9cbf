//! Breakout signal evaluation.
//!
//! Compares the bar at the signal time against the opening range. A push
//! above the range high on surging volume is faded with a SELL; a break
//! below the range low on surging volume is faded with a BUY. Both sides
//! are checked independently, so one bar can yield two candidates.
//!
//! Sizing: `qty = floor(min(capital / entry, max_loss / risk))`.
//! Risk math uses unrounded prices.

use chrono::NaiveTime;
use rust_decimal::prelude::*;
use tracing::debug;

use super::opening_range::OpeningRange;
use crate::config::StrategyConfig;
use crate::types::{Candle, Candidate, Side};

/// The bar stamped exactly at `at`, if the instrument traded then.
pub fn signal_candle(candles: &[Candle], at: NaiveTime) -> Option<&Candle> {
    candles.iter().find(|c| c.timestamp.time() == at)
}

/// Whole shares affordable under both the capital and max-loss caps.
pub fn position_size(entry: Decimal, risk: Decimal, capital: Decimal, max_loss: Decimal) -> u64 {
    if entry <= Decimal::ZERO || risk <= Decimal::ZERO {
        return 0;
    }
    let by_capital = capital.checked_div(entry);
    let by_loss = max_loss.checked_div(risk);
    match (by_capital, by_loss) {
        (Some(a), Some(b)) => a.min(b).floor().to_u64().unwrap_or(0),
        _ => 0,
    }
}

/// Applies the breakout rule with a fixed set of tunables.
#[derive(Debug, Clone)]
pub struct BreakoutEvaluator {
    config: StrategyConfig,
}

impl BreakoutEvaluator {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    /// Evaluate both sides for one instrument.
    ///
    /// Returns SELL before BUY when both trigger. Candidates sized below
    /// one share are dropped.
    pub fn evaluate(&self, symbol: &str, range: &OpeningRange, candle: &Candle) -> Vec<Candidate> {
        let volume_threshold = range.mean_volume * self.config.volume_mult;
        let volume_surge = Decimal::from(candle.volume) > volume_threshold;

        let mut out = Vec::with_capacity(2);

        if volume_surge && candle.high > range.high {
            out.extend(self.sell(symbol, range, candle));
        }
        if volume_surge && candle.low < range.low {
            out.extend(self.buy(symbol, range, candle));
        }

        if out.is_empty() {
            debug!(
                symbol,
                high = %candle.high,
                low = %candle.low,
                volume = candle.volume,
                or_high = %range.high,
                or_low = %range.low,
                volume_threshold = %volume_threshold,
                "No breakout"
            );
        }
        out
    }

    fn sell(&self, symbol: &str, range: &OpeningRange, candle: &Candle) -> Option<Candidate> {
        let entry = candle.high;
        let stop_loss = entry * (Decimal::ONE + self.config.stop_pct);
        let risk = stop_loss - entry;
        let target =
            entry - risk * self.config.reward_risk - range.range() * self.config.range_target_frac;
        let score = range.range() + (candle.high - range.high);
        self.sized(symbol, Side::Sell, entry, stop_loss, risk, target, score)
    }

    fn buy(&self, symbol: &str, range: &OpeningRange, candle: &Candle) -> Option<Candidate> {
        let entry = candle.low;
        let stop_loss = entry * (Decimal::ONE - self.config.stop_pct);
        let risk = entry - stop_loss;
        let target =
            entry + risk * self.config.reward_risk + range.range() * self.config.range_target_frac;
        let score = range.range() + (range.low - candle.low);
        self.sized(symbol, Side::Buy, entry, stop_loss, risk, target, score)
    }

    #[allow(clippy::too_many_arguments)]
    fn sized(
        &self,
        symbol: &str,
        side: Side,
        entry: Decimal,
        stop_loss: Decimal,
        risk: Decimal,
        target: Decimal,
        score: Decimal,
    ) -> Option<Candidate> {
        let quantity = position_size(entry, risk, self.config.capital, self.config.max_loss);
        if quantity < 1 {
            debug!(symbol, side = %side, entry = %entry, "Signal discarded: quantity below 1");
            return None;
        }
        Some(Candidate {
            symbol: symbol.to_string(),
            side,
            entry,
            stop_loss,
            target,
            quantity,
            score,
        })
    }
}
