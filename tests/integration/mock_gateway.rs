//! Mock broker and notifier for integration testing.
//!
//! Provides a deterministic `MarketData` + `ExecutionGateway` implementation
//! that serves canned candle series, accepts orders, replays scripted fill
//! statuses, and counts every execution call, all in-memory with no
//! external dependencies.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use orb::notify::Notifier;
use orb::platforms::{ExecutionGateway, MarketData};
use orb::types::*;

/// The trading day used by every scenario.
pub fn session_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()
}

pub fn bar(h: u32, m: u32, high: Decimal, low: Decimal, volume: u64) -> Candle {
    Candle {
        timestamp: session_date().and_hms_opt(h, m, 0).unwrap(),
        open: low,
        high,
        low,
        close: high,
        volume,
    }
}

/// A 5-minute series with an opening range of `or_high`/`or_low` at mean
/// volume 1000, followed by the 09:35 signal bar and one later bar.
pub fn orb_series(
    or_high: Decimal,
    or_low: Decimal,
    signal_high: Decimal,
    signal_low: Decimal,
    signal_volume: u64,
) -> Vec<Candle> {
    let mid_high = or_high - dec!(1);
    let mid_low = or_low + dec!(1);
    vec![
        bar(9, 15, or_high, or_low, 1000),
        bar(9, 20, mid_high, mid_low, 1000),
        bar(9, 25, mid_high, mid_low, 1000),
        bar(9, 30, mid_high, mid_low, 1000),
        bar(9, 35, signal_high, signal_low, signal_volume),
        bar(9, 40, signal_high, signal_low, 800),
    ]
}

/// An entry order the mock accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: u64,
}

/// A mock broker for deterministic testing.
///
/// Fills default to `COMPLETE` on the first poll; per-symbol status
/// scripts override that, with the last scripted status repeating.
#[derive(Default)]
pub struct MockBroker {
    instruments: Vec<Instrument>,
    series: HashMap<String, Vec<Candle>>,
    fill_scripts: Mutex<HashMap<String, Vec<OrderStatus>>>,
    failing_entries: Mutex<HashSet<String>>,
    exit_error: Mutex<Option<String>>,
    orders: Mutex<Vec<PlacedOrder>>,
    exit_groups: Mutex<Vec<ExitOrderGroup>>,
    polls: Mutex<HashMap<String, usize>>,
    execution_calls: AtomicUsize,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a symbol and the series its candle request returns.
    pub fn with_series(mut self, symbol: &str, candles: Vec<Candle>) -> Self {
        let token = self.instruments.len() as u64 + 1000;
        self.instruments.push(Instrument {
            symbol: symbol.to_string(),
            token,
        });
        self.series.insert(symbol.to_string(), candles);
        self
    }

    /// Statuses reported for `symbol`'s entry, one per poll.
    pub fn script_fill(&self, symbol: &str, statuses: Vec<OrderStatus>) {
        self.fill_scripts
            .lock()
            .unwrap()
            .insert(symbol.to_string(), statuses);
    }

    /// Refuse entry submissions for `symbol`.
    pub fn fail_entry(&self, symbol: &str) {
        self.failing_entries
            .lock()
            .unwrap()
            .insert(symbol.to_string());
    }

    /// Refuse every exit group submission.
    pub fn fail_exits(&self, msg: &str) {
        *self.exit_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn orders(&self) -> Vec<PlacedOrder> {
        self.orders.lock().unwrap().clone()
    }

    pub fn exit_groups(&self) -> Vec<ExitOrderGroup> {
        self.exit_groups.lock().unwrap().clone()
    }

    /// Status queries made for `order_id`.
    pub fn polls_for(&self, order_id: &str) -> usize {
        self.polls.lock().unwrap().get(order_id).copied().unwrap_or(0)
    }

    /// Total calls made through `ExecutionGateway`.
    pub fn execution_calls(&self) -> usize {
        self.execution_calls.load(Ordering::SeqCst)
    }

    fn symbol_for(&self, order_id: &str) -> Option<String> {
        self.orders
            .lock()
            .unwrap()
            .iter()
            .find(|o| o.order_id == order_id)
            .map(|o| o.symbol.clone())
    }
}

#[async_trait]
impl MarketData for MockBroker {
    async fn resolve_tokens(&self, symbols: &[String]) -> Result<Vec<Instrument>> {
        Ok(self
            .instruments
            .iter()
            .filter(|i| symbols.contains(&i.symbol))
            .cloned()
            .collect())
    }

    async fn intraday_candles(&self, instrument: &Instrument, _date: NaiveDate) -> Result<Vec<Candle>> {
        self.series
            .get(&instrument.symbol)
            .cloned()
            .ok_or_else(|| anyhow!("No series for {}", instrument.symbol))
    }
}

#[async_trait]
impl ExecutionGateway for MockBroker {
    async fn place_market_order(&self, symbol: &str, side: Side, quantity: u64) -> Result<String> {
        self.execution_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing_entries.lock().unwrap().contains(symbol) {
            return Err(anyhow!("InputException: order rejected for {symbol}"));
        }

        let mut orders = self.orders.lock().unwrap();
        let order_id = format!("MOCK-{}", orders.len() + 1);
        orders.push(PlacedOrder {
            order_id: order_id.clone(),
            symbol: symbol.to_string(),
            side,
            quantity,
        });
        Ok(order_id)
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderStatus> {
        self.execution_calls.fetch_add(1, Ordering::SeqCst);

        let symbol = self
            .symbol_for(order_id)
            .ok_or_else(|| anyhow!("Order not found: {order_id}"))?;

        let poll = {
            let mut polls = self.polls.lock().unwrap();
            let n = polls.entry(order_id.to_string()).or_insert(0);
            *n += 1;
            *n
        };

        let scripts = self.fill_scripts.lock().unwrap();
        let status = match scripts.get(&symbol) {
            Some(script) if !script.is_empty() => script[(poll - 1).min(script.len() - 1)],
            _ => OrderStatus::Complete,
        };
        Ok(status)
    }

    async fn place_exit_group(&self, group: &ExitOrderGroup) -> Result<String> {
        self.execution_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.exit_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{}", err));
        }
        let mut groups = self.exit_groups.lock().unwrap();
        groups.push(group.clone());
        Ok(format!("GTT-{}", groups.len()))
    }
}

/// Notifier that keeps every message.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_resolves_only_known_symbols() {
        let broker = MockBroker::new().with_series("MCX", Vec::new());
        let found = broker
            .resolve_tokens(&["MCX".to_string(), "GHOST".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].symbol, "MCX");
    }

    #[tokio::test]
    async fn test_mock_replays_fill_script() {
        let broker = MockBroker::new();
        broker.script_fill("MCX", vec![OrderStatus::Pending, OrderStatus::Complete]);
        let id = broker.place_market_order("MCX", Side::Buy, 10).await.unwrap();

        assert_eq!(broker.order_status(&id).await.unwrap(), OrderStatus::Pending);
        assert_eq!(broker.order_status(&id).await.unwrap(), OrderStatus::Complete);
        assert_eq!(broker.order_status(&id).await.unwrap(), OrderStatus::Complete);
        assert_eq!(broker.execution_calls(), 4);
        assert_eq!(broker.polls_for(&id), 3);
    }

    #[tokio::test]
    async fn test_mock_unknown_order() {
        let broker = MockBroker::new();
        let result = broker.order_status("NOPE").await;
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_mock_forced_failures() {
        let broker = MockBroker::new();
        broker.fail_entry("MCX");
        broker.fail_exits("GTT down");

        assert!(broker.place_market_order("MCX", Side::Sell, 1).await.is_err());
        assert!(broker.orders().is_empty());

        let group = ExitOrderGroup {
            symbol: "MCX".into(),
            side: Side::Buy,
            quantity: 1,
            stop_loss: dec!(101),
            target: dec!(99),
            last_price: dec!(100),
        };
        let err = broker.place_exit_group(&group).await.unwrap_err();
        assert!(err.to_string().contains("GTT down"));
        assert!(broker.exit_groups().is_empty());
    }
}
