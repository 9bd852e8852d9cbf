//! Order lifecycle controller.
//!
//! For each selected candidate:
//!
//! ```text
//! NEW → ENTRY_SUBMITTED → ENTRY_FILLED → EXIT_PLACED
//!                       ↘ ENTRY_FAILED (rejected | cancelled | timeout)
//! ```
//!
//! The protective exit pair is submitted only after a COMPLETE status has
//! been observed for the entry, and at most once per candidate. Nothing is
//! retried. An exit failure after a fill leaves an open, unprotected
//! position and is reported as its own outcome.
//!
//! An [`Executor`] can only be built with a [`LivePermit`]; dry-run
//! sessions never own one.

use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::clock::{poll_until, Clock};
use crate::config::{ExecutionConfig, LivePermit};
use crate::notify::{self, Notifier};
use crate::platforms::ExecutionGateway;
use crate::types::{Candidate, OrderStatus};

// ---------------------------------------------------------------------------
// Lifecycle types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    New,
    EntrySubmitted,
    EntryFilled,
    EntryFailed,
    ExitPlaced,
}

/// Final result of one candidate's lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeOutcome {
    /// Entry filled and the stop-loss/target pair is live.
    Protected { order_id: String, exit_id: String },
    /// The broker refused the entry request outright.
    SubmissionFailed { error: String },
    /// Entry ended REJECTED, CANCELLED or UNKNOWN-TIMEOUT; no exit placed.
    EntryFailed { order_id: String, status: OrderStatus },
    /// Entry filled but the exit pair could not be placed.
    Unprotected { order_id: String, error: String },
}

impl TradeOutcome {
    pub fn final_state(&self) -> LifecycleState {
        match self {
            TradeOutcome::Protected { .. } => LifecycleState::ExitPlaced,
            TradeOutcome::SubmissionFailed { .. } => LifecycleState::New,
            TradeOutcome::EntryFailed { .. } => LifecycleState::EntryFailed,
            TradeOutcome::Unprotected { .. } => LifecycleState::EntryFilled,
        }
    }

    pub fn is_unprotected(&self) -> bool {
        matches!(self, TradeOutcome::Unprotected { .. })
    }
}

impl fmt::Display for TradeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeOutcome::Protected { order_id, exit_id } => {
                write!(f, "protected (order {order_id}, exit {exit_id})")
            }
            TradeOutcome::SubmissionFailed { error } => write!(f, "submission failed: {error}"),
            TradeOutcome::EntryFailed { order_id, status } => {
                write!(f, "entry {status} (order {order_id})")
            }
            TradeOutcome::Unprotected { order_id, error } => {
                write!(f, "UNPROTECTED (order {order_id}): {error}")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TradeReport {
    pub candidate: Candidate,
    pub outcome: TradeOutcome,
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct Executor {
    gateway: Arc<dyn ExecutionGateway>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    fill_timeout: Duration,
    concurrent: bool,
    /// Serializes order submissions on the shared account.
    submit_lock: Mutex<()>,
    _permit: LivePermit,
}

impl Executor {
    pub fn new(
        gateway: Arc<dyn ExecutionGateway>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: &ExecutionConfig,
        permit: LivePermit,
    ) -> Self {
        Self {
            gateway,
            notifier,
            clock,
            poll_interval: config.poll_interval(),
            fill_timeout: config.fill_timeout(),
            concurrent: config.concurrent,
            submit_lock: Mutex::new(()),
            _permit: permit,
        }
    }

    /// Run every candidate's lifecycle. Reports are returned in input order.
    pub async fn execute_all(&self, candidates: &[Candidate]) -> Vec<TradeReport> {
        info!(
            count = candidates.len(),
            concurrent = self.concurrent,
            "Executing candidates"
        );

        let reports = if self.concurrent {
            join_all(candidates.iter().map(|c| self.execute(c))).await
        } else {
            let mut reports = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                reports.push(self.execute(candidate).await);
            }
            reports
        };

        let protected = reports
            .iter()
            .filter(|r| matches!(r.outcome, TradeOutcome::Protected { .. }))
            .count();
        let unprotected = reports.iter().filter(|r| r.outcome.is_unprotected()).count();
        info!(
            total = reports.len(),
            protected,
            failed = reports.len() - protected - unprotected,
            unprotected,
            "Execution complete"
        );
        reports
    }

    /// Run one candidate from NEW to a terminal state.
    pub async fn execute(&self, candidate: &Candidate) -> TradeReport {
        let outcome = self.run_lifecycle(candidate).await;
        self.announce(candidate, &outcome).await;
        TradeReport {
            candidate: candidate.clone(),
            outcome,
        }
    }

    async fn run_lifecycle(&self, candidate: &Candidate) -> TradeOutcome {
        let symbol = candidate.symbol.as_str();

        // NEW → ENTRY_SUBMITTED
        let submitted = {
            let _guard = self.submit_lock.lock().await;
            self.gateway
                .place_market_order(symbol, candidate.side, candidate.quantity)
                .await
        };
        let order_id = match submitted {
            Ok(id) => id,
            Err(e) => {
                warn!(symbol, side = %candidate.side, error = %e, "Entry submission failed");
                return TradeOutcome::SubmissionFailed {
                    error: format!("{e:#}"),
                };
            }
        };
        transition(symbol, LifecycleState::New, LifecycleState::EntrySubmitted);
        info!(
            symbol,
            order_id = %order_id,
            side = %candidate.side,
            qty = candidate.quantity,
            "Entry submitted, awaiting fill"
        );

        // ENTRY_SUBMITTED → ENTRY_FILLED | ENTRY_FAILED
        let status = self.await_fill(&order_id).await;
        if status != OrderStatus::Complete {
            transition(symbol, LifecycleState::EntrySubmitted, LifecycleState::EntryFailed);
            warn!(symbol, order_id = %order_id, status = %status, "Entry not filled, no exit placed");
            return TradeOutcome::EntryFailed { order_id, status };
        }
        transition(symbol, LifecycleState::EntrySubmitted, LifecycleState::EntryFilled);

        // ENTRY_FILLED → EXIT_PLACED
        let group = candidate.exit_group();
        let placed = {
            let _guard = self.submit_lock.lock().await;
            self.gateway.place_exit_group(&group).await
        };
        match placed {
            Ok(exit_id) => {
                transition(symbol, LifecycleState::EntryFilled, LifecycleState::ExitPlaced);
                info!(symbol, order_id = %order_id, exit_id = %exit_id, %group, "Protection set");
                TradeOutcome::Protected { order_id, exit_id }
            }
            Err(e) => {
                error!(
                    alert = "UNPROTECTED_POSITION",
                    symbol,
                    order_id = %order_id,
                    side = %candidate.side,
                    qty = candidate.quantity,
                    error = %e,
                    "Exit placement failed after fill, position is unprotected"
                );
                TradeOutcome::Unprotected {
                    order_id,
                    error: format!("{e:#}"),
                }
            }
        }
    }

    /// Poll the entry until a terminal status or the fill timeout.
    async fn await_fill(&self, order_id: &str) -> OrderStatus {
        let observed = poll_until(
            self.clock.as_ref(),
            self.poll_interval,
            self.fill_timeout,
            || async move {
                match self.gateway.order_status(order_id).await {
                    Ok(status) if status.is_terminal() => Some(status),
                    Ok(_) => None,
                    Err(e) => {
                        warn!(order_id, error = %e, "Order status query failed, retrying");
                        None
                    }
                }
            },
        )
        .await;

        observed.unwrap_or_else(|| {
            warn!(
                order_id,
                timeout_secs = self.fill_timeout.as_secs(),
                "No terminal status before fill timeout"
            );
            OrderStatus::UnknownTimeout
        })
    }

    async fn announce(&self, candidate: &Candidate, outcome: &TradeOutcome) {
        let symbol = &candidate.symbol;
        let text = match outcome {
            TradeOutcome::Protected { .. } => notify::protected_message(symbol),
            TradeOutcome::SubmissionFailed { error } => {
                notify::submission_failed_message(symbol, error)
            }
            TradeOutcome::EntryFailed { order_id, status } => {
                notify::entry_failed_message(symbol, order_id, *status)
            }
            TradeOutcome::Unprotected { order_id, error } => {
                notify::unprotected_message(candidate, order_id, error)
            }
        };
        notify::send_best_effort(self.notifier.as_ref(), &text).await;
    }
}

fn transition(symbol: &str, from: LifecycleState, to: LifecycleState) {
    debug!(symbol, from = ?from, to = ?to, "Lifecycle transition");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
