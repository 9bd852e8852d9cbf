//! One trading session: scan → rank → notify → (live only) execute.

use anyhow::Result;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::info;

use super::executor::{Executor, TradeReport};
use super::scanner::Scanner;
use crate::config::AppConfig;
use crate::notify::{self, Notifier};
use crate::platforms::MarketData;
use crate::strategy::SignalPipeline;
use crate::types::Candidate;

/// Process exit code when any filled entry was left without protection.
pub const EXIT_UNPROTECTED: u8 = 2;

/// How a session ended.
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    /// No symbol produced a candidate.
    NoSignal,
    /// Candidates were selected and announced; no orders were placed.
    DryRun { selected: Vec<Candidate> },
    /// Every selected candidate ran through its order lifecycle.
    Completed { reports: Vec<TradeReport> },
}

impl SessionOutcome {
    /// Filled entries whose stop-loss/target pair could not be placed.
    pub fn unprotected_count(&self) -> usize {
        match self {
            SessionOutcome::Completed { reports } => reports
                .iter()
                .filter(|r| r.outcome.is_unprotected())
                .count(),
            _ => 0,
        }
    }

    pub fn exit_code(&self) -> u8 {
        if self.unprotected_count() > 0 {
            EXIT_UNPROTECTED
        } else {
            0
        }
    }
}

pub struct Session {
    scanner: Scanner,
    pipeline: SignalPipeline,
    notifier: Arc<dyn Notifier>,
    /// Present only in live mode.
    executor: Option<Executor>,
    signal_label: String,
}

impl Session {
    pub fn new(
        scanner: Scanner,
        pipeline: SignalPipeline,
        notifier: Arc<dyn Notifier>,
        executor: Option<Executor>,
        signal_label: String,
    ) -> Self {
        Self {
            scanner,
            pipeline,
            notifier,
            executor,
            signal_label,
        }
    }

    /// Wire a session from configuration. Pass `executor = None` for dry-run.
    pub fn from_config(
        config: &AppConfig,
        market: Arc<dyn MarketData>,
        notifier: Arc<dyn Notifier>,
        executor: Option<Executor>,
    ) -> Self {
        let pipeline = SignalPipeline::new(config.session.clone(), config.strategy.clone());
        let scanner = Scanner::new(
            market,
            pipeline.clone(),
            config.session.symbols.clone(),
            config.session.scan_concurrency,
        );
        Self::new(
            scanner,
            pipeline,
            notifier,
            executor,
            config.session.signal_label(),
        )
    }

    pub fn is_live(&self) -> bool {
        self.executor.is_some()
    }

    pub async fn run(&self, date: NaiveDate) -> Result<SessionOutcome> {
        info!(live = self.is_live(), %date, signal = %self.signal_label, "Session starting");

        let report = self.scanner.scan(date).await?;
        let selected = self.pipeline.select(report.candidates);

        if selected.is_empty() {
            let text = notify::no_signal_message(&self.signal_label);
            notify::send_best_effort(self.notifier.as_ref(), &text).await;
            info!("No signal today");
            return Ok(SessionOutcome::NoSignal);
        }

        let summary = notify::summary_message(&self.signal_label, &selected, self.is_live());
        notify::send_best_effort(self.notifier.as_ref(), &summary).await;

        let Some(executor) = &self.executor else {
            info!(selected = selected.len(), "PAPER MODE — No orders placed");
            return Ok(SessionOutcome::DryRun { selected });
        };

        let reports = executor.execute_all(&selected).await;
        Ok(SessionOutcome::Completed { reports })
    }
}
