//! Broker integrations.
//!
//! Defines the `MarketData` and `ExecutionGateway` traits and provides
//! an implementation for:
//! - Kite Connect (Zerodha) — instrument lookup, intraday candles, orders, GTT

pub mod kite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::types::{Candle, ExitOrderGroup, Instrument, OrderStatus, Side};

/// Read-only market data source.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Resolve symbols to venue instruments, preserving the requested order.
    /// Unknown symbols are omitted from the result.
    async fn resolve_tokens(&self, symbols: &[String]) -> Result<Vec<Instrument>>;

    /// Intraday bars for `instrument` on the session `date`, ordered by time.
    async fn intraday_candles(&self, instrument: &Instrument, date: NaiveDate)
        -> Result<Vec<Candle>>;
}

/// Order placement and status. Only ever reached in live mode.
///
/// Implementors only submit and report; sequencing (confirm the entry
/// fill before protecting it) is the executor's job.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Submit a market entry order. Returns the broker order id.
    async fn place_market_order(&self, symbol: &str, side: Side, quantity: u64) -> Result<String>;

    /// Current status of a previously placed order.
    async fn order_status(&self, order_id: &str) -> Result<OrderStatus>;

    /// Submit a linked stop-loss/target pair (one cancels the other).
    /// Returns the broker's id for the group.
    async fn place_exit_group(&self, group: &ExitOrderGroup) -> Result<String>;
}
