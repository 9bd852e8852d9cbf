//! Symbol scanner.
//!
//! Resolves the configured universe to instruments, fetches each one's
//! intraday series, and runs it through the signal pipeline. Fetches run
//! concurrently with a bounded width; results come back in configured
//! symbol order, so ranking ties stay deterministic.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::platforms::MarketData;
use crate::strategy::{SignalPipeline, SkipReason};
use crate::types::{Candidate, Instrument};

/// Everything one scan produced.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// All candidates in symbol order (SELL before BUY within a symbol).
    pub candidates: Vec<Candidate>,
    /// Symbols that could not be evaluated, with the reason.
    pub skipped: Vec<(String, SkipReason)>,
    /// Symbols whose series reached the breakout evaluator.
    pub evaluated: usize,
}

pub struct Scanner {
    market: Arc<dyn MarketData>,
    pipeline: SignalPipeline,
    symbols: Vec<String>,
    concurrency: usize,
}

impl Scanner {
    pub fn new(
        market: Arc<dyn MarketData>,
        pipeline: SignalPipeline,
        symbols: Vec<String>,
        concurrency: usize,
    ) -> Self {
        Self {
            market,
            pipeline,
            symbols,
            concurrency: concurrency.max(1),
        }
    }

    /// Scan every configured symbol for the session `date`.
    ///
    /// Fails only when the instrument lookup itself fails; per-symbol
    /// problems are recorded in [`ScanReport::skipped`].
    pub async fn scan(&self, date: NaiveDate) -> Result<ScanReport> {
        info!(symbols = self.symbols.len(), %date, "Starting symbol scan");

        let instruments = self
            .market
            .resolve_tokens(&self.symbols)
            .await
            .context("Instrument lookup failed")?;

        let mut report = ScanReport::default();

        // Keep configured order; symbols the lookup did not return are skipped.
        let mut resolved = Vec::with_capacity(instruments.len());
        for symbol in &self.symbols {
            match instruments.iter().find(|i| &i.symbol == symbol) {
                Some(instrument) => resolved.push(instrument.clone()),
                None => {
                    warn!(symbol = %symbol, "Symbol not in instrument list, skipping");
                    report
                        .skipped
                        .push((symbol.clone(), SkipReason::UnknownSymbol));
                }
            }
        }

        let results: Vec<(String, Result<Vec<Candidate>, SkipReason>)> = stream::iter(resolved)
            .map(|instrument| async move {
                let outcome = self.evaluate(&instrument, date).await;
                (instrument.symbol, outcome)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        for (symbol, outcome) in results {
            match outcome {
                Ok(candidates) => {
                    report.evaluated += 1;
                    if candidates.is_empty() {
                        debug!(symbol = %symbol, "No breakout");
                    }
                    report.candidates.extend(candidates);
                }
                Err(reason) => {
                    debug!(symbol = %symbol, reason = %reason, "Symbol skipped");
                    report.skipped.push((symbol, reason));
                }
            }
        }

        info!(
            evaluated = report.evaluated,
            skipped = report.skipped.len(),
            candidates = report.candidates.len(),
            "Scan complete"
        );
        Ok(report)
    }

    async fn evaluate(
        &self,
        instrument: &Instrument,
        date: NaiveDate,
    ) -> Result<Vec<Candidate>, SkipReason> {
        let candles = self
            .market
            .intraday_candles(instrument, date)
            .await
            .map_err(|e| {
                warn!(symbol = %instrument.symbol, error = %e, "Candle fetch failed");
                SkipReason::FetchFailed(format!("{e:#}"))
            })?;
        self.pipeline.evaluate_series(&instrument.symbol, &candles)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
