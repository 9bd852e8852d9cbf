//! Operator notifications.
//!
//! Defines the `Notifier` trait, the message texts for every run outcome,
//! and a log-only fallback used when no Telegram channel is configured.
//! Delivery is best-effort: failures are logged and never interrupt trading.

pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::types::{Candidate, OrderStatus};

/// A channel that delivers plain-text messages to the operator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

/// Notifier for runs without a delivery channel. The text is already
/// logged by [`send_best_effort`], so this only traces the hand-off.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        debug!(channel = "log", chars = text.len(), "Notification kept in log");
        Ok(())
    }
}

/// Send `text`, logging (never returning) a delivery failure.
pub async fn send_best_effort(notifier: &dyn Notifier, text: &str) {
    info!(message = %text, "Notification");
    if let Err(e) = notifier.send(text).await {
        warn!(error = %e, "Notification delivery failed");
    }
}

// ---------------------------------------------------------------------------
// Message texts
// ---------------------------------------------------------------------------

pub fn no_signal_message(signal_label: &str) -> String {
    format!("❌ ORB {signal_label}\nNo valid stock today.")
}

/// Ranked trade summary with the mode footer.
pub fn summary_message(signal_label: &str, trades: &[Candidate], live: bool) -> String {
    let mut msg = format!("📊 ORB {signal_label} (SAFE GTT)\n\n");
    for trade in trades {
        msg.push_str(&trade.to_string());
        msg.push_str("\n\n");
    }
    msg.push_str(if live { "🔴 LIVE MODE" } else { "🟡 PAPER MODE" });
    msg
}

pub fn protected_message(symbol: &str) -> String {
    format!("✅ ENTRY CONFIRMED + GTT SET — {symbol}")
}

pub fn submission_failed_message(symbol: &str, error: &str) -> String {
    format!("❌ ORDER SUBMISSION FAILED — {symbol}: {error}")
}

pub fn entry_failed_message(symbol: &str, order_id: &str, status: OrderStatus) -> String {
    match status {
        OrderStatus::UnknownTimeout => format!(
            "⏱️ ENTRY NOT CONFIRMED (timeout) — {symbol} | order {order_id} | GTT NOT PLACED"
        ),
        other => format!("❌ ENTRY FAILED ({other}) — {symbol} | order {order_id} | GTT NOT PLACED"),
    }
}

pub fn unprotected_message(candidate: &Candidate, order_id: &str, error: &str) -> String {
    format!(
        "🚨 UNPROTECTED POSITION — {} {} x{} filled (order {order_id}) but GTT placement failed: {error}\nSL {} | Target {}\nMANUAL ACTION REQUIRED",
        candidate.symbol,
        candidate.side,
        candidate.quantity,
        candidate.stop_loss_display(),
        candidate.target_display(),
    )
}
