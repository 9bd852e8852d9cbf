//! Strategy engine — opening range, breakout evaluation, and ranking.

pub mod breakout;
pub mod opening_range;
pub mod ranker;

use std::fmt;
use tracing::{debug, info};

use crate::config::{SessionConfig, StrategyConfig};
use crate::types::{Candidate, Candle};
use breakout::BreakoutEvaluator;

// ---------------------------------------------------------------------------
// Skip reasons
// ---------------------------------------------------------------------------

/// Why an instrument produced no evaluation. None of these are errors:
/// the instrument is skipped and the scan continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The instrument was not returned by the token lookup.
    UnknownSymbol,
    /// The candle request failed.
    FetchFailed(String),
    /// The gateway returned no bars for the session.
    NoCandles,
    /// No bar inside the opening-range window.
    NoOpeningRange,
    /// No bar stamped at the signal time.
    NoSignalCandle,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnknownSymbol => write!(f, "symbol not found in instrument list"),
            SkipReason::FetchFailed(e) => write!(f, "candle fetch failed: {e}"),
            SkipReason::NoCandles => write!(f, "no candles"),
            SkipReason::NoOpeningRange => write!(f, "no opening range"),
            SkipReason::NoSignalCandle => write!(f, "no signal candle"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Pipelines session filter → opening range → breakout evaluation for one
/// instrument, and ranking across all of them.
///
/// Holds no mutable state, so one instance can be shared by concurrent
/// per-symbol evaluations.
#[derive(Debug, Clone)]
pub struct SignalPipeline {
    session: SessionConfig,
    top_n: usize,
    evaluator: BreakoutEvaluator,
}

impl SignalPipeline {
    pub fn new(session: SessionConfig, strategy: StrategyConfig) -> Self {
        Self {
            top_n: strategy.top_n,
            evaluator: BreakoutEvaluator::new(strategy),
            session,
        }
    }

    /// Evaluate one instrument's intraday series.
    ///
    /// Returns zero, one or two candidates, or the reason the instrument
    /// could not be evaluated.
    pub fn evaluate_series(
        &self,
        symbol: &str,
        candles: &[Candle],
    ) -> Result<Vec<Candidate>, SkipReason> {
        if candles.is_empty() {
            return Err(SkipReason::NoCandles);
        }

        let s = &self.session;
        let bars = opening_range::session_bars(candles, s.market_open, s.market_close);

        let range = opening_range::extract(&bars, s.range_start, s.range_end)
            .ok_or(SkipReason::NoOpeningRange)?;
        debug!(symbol, %range, "Opening range");

        let candle =
            breakout::signal_candle(&bars, s.signal_time).ok_or(SkipReason::NoSignalCandle)?;

        Ok(self.evaluator.evaluate(symbol, &range, candle))
    }

    /// Rank all candidates and keep the configured top N.
    pub fn select(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let total = candidates.len();
        let selected = ranker::rank(candidates, self.top_n);
        for (i, c) in selected.iter().enumerate() {
            info!(
                rank = i + 1,
                symbol = %c.symbol,
                side = %c.side,
                entry = %c.entry_display(),
                stop_loss = %c.stop_loss_display(),
                target = %c.target_display(),
                qty = c.quantity,
                score = %c.score,
                "Candidate selected"
            );
        }
        info!(candidates = total, selected = selected.len(), "Ranking complete");
        selected
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
