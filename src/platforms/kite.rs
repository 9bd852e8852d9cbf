//! Kite Connect (Zerodha) integration.
//!
//! Used for both market data (instrument tokens, intraday candles) and
//! execution (market entry orders, order status, GTT exit pairs).
//!
//! API docs: https://kite.trade/docs/connect/v3/
//! Base URL: https://api.kite.trade
//! Auth: `Authorization: token {api_key}:{access_token}` + `X-Kite-Version: 3`.
//!
//! JSON responses are wrapped in `{"status": "success"|"error", "data": ...}`.
//! The instrument dump is plain CSV.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::{ExecutionGateway, MarketData};
use crate::config::{AppConfig, BrokerConfig, SessionConfig};
use crate::types::{Candle, ExitOrderGroup, Instrument, OrbError, OrderStatus, Side};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const KITE_VERSION: &str = "3";

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoricalData {
    /// `[timestamp, open, high, low, close, volume]`
    candles: Vec<CandleRow>,
}

#[derive(Debug, Deserialize)]
struct PlaceOrderData {
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct OrderHistoryEntry {
    status: String,
}

#[derive(Debug, Deserialize)]
struct GttData {
    trigger_id: u64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Kite Connect REST client.
pub struct KiteClient {
    http: Client,
    base_url: String,
    api_key: Secret<String>,
    access_token: Secret<String>,
    exchange: String,
    candle_interval: String,
    /// Product type stamped on every order (e.g. `MIS`).
    product: String,
    utc_offset: FixedOffset,
}

impl KiteClient {
    /// Create a client, resolving credentials from the env vars named in
    /// `[broker]`.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let api_key = AppConfig::resolve_secret(&cfg.broker.api_key_env)?;
        let access_token = AppConfig::resolve_secret(&cfg.broker.access_token_env)?;
        Self::with_credentials(
            &cfg.broker,
            &cfg.session,
            &cfg.execution.product,
            api_key,
            access_token,
        )
    }

    /// Create a client with explicit credentials.
    pub fn with_credentials(
        broker: &BrokerConfig,
        session: &SessionConfig,
        product: &str,
        api_key: Secret<String>,
        access_token: Secret<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(broker.request_timeout_secs))
            .user_agent("ORB/0.1.0 (opening-range-breakout)")
            .build()
            .context("Failed to build HTTP client for Kite")?;

        Ok(Self {
            http,
            base_url: broker.base_url.trim_end_matches('/').to_string(),
            api_key,
            access_token,
            exchange: session.exchange.clone(),
            candle_interval: session.candle_interval.clone(),
            product: product.to_string(),
            utc_offset: session.utc_offset()?,
        })
    }

    // -- Internal helpers ------------------------------------------------

    fn auth_header(&self) -> String {
        format!(
            "token {}:{}",
            self.api_key.expose_secret(),
            self.access_token.expose_secret()
        )
    }

    async fn get_text(&self, endpoint: &str) -> Result<String> {
        let url = format!("{}{endpoint}", self.base_url);
        debug!(url = %url, "Kite GET");

        let resp = self
            .http
            .get(&url)
            .header("X-Kite-Version", KITE_VERSION)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .with_context(|| format!("Kite {endpoint} request failed"))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(broker_error(endpoint, format!("HTTP {status}: {body}")).into());
        }
        Ok(body)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let body = self.get_text(endpoint).await?;
        unwrap_envelope(endpoint, &body)
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        form: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{endpoint}", self.base_url);
        debug!(url = %url, "Kite POST");

        let resp = self
            .http
            .post(&url)
            .header("X-Kite-Version", KITE_VERSION)
            .header("Authorization", self.auth_header())
            .form(form)
            .send()
            .await
            .with_context(|| format!("Kite {endpoint} request failed"))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            // Kite error bodies are enveloped too; prefer their message.
            let message = serde_json::from_str::<Envelope<serde_json::Value>>(&body)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or(body);
            return Err(broker_error(endpoint, format!("HTTP {status}: {message}")).into());
        }
        unwrap_envelope(endpoint, &body)
    }
}

fn broker_error(endpoint: &str, message: String) -> OrbError {
    OrbError::Broker {
        endpoint: endpoint.to_string(),
        message,
    }
}

fn unwrap_envelope<T: DeserializeOwned>(endpoint: &str, body: &str) -> Result<T> {
    let envelope: Envelope<T> = serde_json::from_str(body)
        .with_context(|| format!("Failed to parse Kite {endpoint} response"))?;

    if envelope.status != "success" {
        let kind = envelope.error_type.unwrap_or_else(|| "error".into());
        let message = envelope.message.unwrap_or_default();
        return Err(broker_error(endpoint, format!("{kind}: {message}")).into());
    }

    envelope
        .data
        .ok_or_else(|| broker_error(endpoint, "response has no data".into()).into())
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// One row of the instrument dump. Other columns are ignored.
#[derive(Debug, Deserialize)]
struct InstrumentRow {
    instrument_token: u64,
    tradingsymbol: String,
}

/// Pick the requested symbols out of the instrument CSV dump, in request order.
///
/// Columns are matched by header name. Rows that do not deserialize are
/// skipped.
pub fn parse_instruments(dump: &str, symbols: &[String]) -> Result<Vec<Instrument>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(dump.as_bytes());

    let headers = reader
        .headers()
        .context("Failed to read instrument dump header")?
        .clone();
    for column in ["instrument_token", "tradingsymbol"] {
        if !headers.iter().any(|h| h == column) {
            bail!("Instrument dump has no '{column}' column");
        }
    }

    let mut found: HashMap<String, u64> = HashMap::new();
    for row in reader.deserialize::<InstrumentRow>() {
        match row {
            Ok(row) if symbols.contains(&row.tradingsymbol) => {
                found.entry(row.tradingsymbol).or_insert(row.instrument_token);
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Skipping unreadable instrument row"),
        }
    }

    Ok(symbols
        .iter()
        .filter_map(|s| {
            found.get(s).map(|&token| Instrument {
                symbol: s.clone(),
                token,
            })
        })
        .collect())
}

type CandleRow = (String, Decimal, Decimal, Decimal, Decimal, u64);

fn parse_candle(row: CandleRow, offset: &FixedOffset) -> Result<Candle, OrbError> {
    let (ts, open, high, low, close, volume) = row;
    let at = DateTime::parse_from_str(&ts, "%Y-%m-%dT%H:%M:%S%z")
        .map_err(|e| OrbError::MalformedCandle(format!("timestamp '{ts}': {e}")))?;
    if high < low {
        return Err(OrbError::MalformedCandle(format!("{ts}: high {high} < low {low}")));
    }
    Ok(Candle {
        timestamp: at.with_timezone(offset).naive_local(),
        open,
        high,
        low,
        close,
        volume,
    })
}

/// Convert raw candle rows to session-local bars, sorted by time with
/// duplicate timestamps dropped. Malformed rows are logged and dropped.
fn to_candles(rows: Vec<CandleRow>, offset: &FixedOffset) -> Vec<Candle> {
    let mut candles: Vec<Candle> = rows
        .into_iter()
        .filter_map(|row| match parse_candle(row, offset) {
            Ok(candle) => Some(candle),
            Err(e) => {
                warn!(error = %e, "Dropping candle row");
                None
            }
        })
        .collect();

    candles.sort_by_key(|c| c.timestamp);
    candles.dedup_by_key(|c| c.timestamp);
    candles
}

/// Map a Kite order status string. Anything non-terminal is `Pending`.
pub fn map_order_status(status: &str) -> OrderStatus {
    match status {
        "COMPLETE" => OrderStatus::Complete,
        "REJECTED" => OrderStatus::Rejected,
        "CANCELLED" => OrderStatus::Cancelled,
        _ => OrderStatus::Pending,
    }
}

/// Build the GTT `condition` and `orders` payloads for a two-leg trigger.
///
/// Kite expects the lower trigger first, so legs are ordered by trigger
/// price: for a long position that is (stop, target), for a short
/// position (target, stop).
pub fn gtt_payload(
    group: &ExitOrderGroup,
    exchange: &str,
    product: &str,
) -> (serde_json::Value, serde_json::Value) {
    let (lower, upper) = if group.stop_loss <= group.target {
        (group.stop_loss, group.target)
    } else {
        (group.target, group.stop_loss)
    };

    let leg = |price: Decimal| {
        serde_json::json!({
            "exchange": exchange,
            "tradingsymbol": group.symbol,
            "transaction_type": group.side.as_str(),
            "quantity": group.quantity,
            "order_type": "MARKET",
            "product": product,
            "price": price,
        })
    };

    let condition = serde_json::json!({
        "exchange": exchange,
        "tradingsymbol": group.symbol,
        "trigger_values": [lower, upper],
        "last_price": group.last_price,
    });
    let orders = serde_json::json!([leg(lower), leg(upper)]);
    (condition, orders)
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl MarketData for KiteClient {
    async fn resolve_tokens(&self, symbols: &[String]) -> Result<Vec<Instrument>> {
        let dump = self
            .get_text(&format!("/instruments/{}", self.exchange))
            .await?;
        let instruments = parse_instruments(&dump, symbols)?;

        for symbol in symbols {
            if !instruments.iter().any(|i| &i.symbol == symbol) {
                warn!(symbol = %symbol, exchange = %self.exchange, "Symbol not in instrument list");
            }
        }
        info!(
            requested = symbols.len(),
            resolved = instruments.len(),
            "Instrument tokens resolved"
        );
        Ok(instruments)
    }

    async fn intraday_candles(
        &self,
        instrument: &Instrument,
        date: NaiveDate,
    ) -> Result<Vec<Candle>> {
        let from = format!("{} 00:00:00", date.format("%Y-%m-%d"));
        let to = format!("{} 23:59:59", date.format("%Y-%m-%d"));
        let endpoint = format!(
            "/instruments/historical/{}/{}?from={}&to={}",
            instrument.token,
            self.candle_interval,
            urlencoding::encode(&from),
            urlencoding::encode(&to),
        );

        let data: HistoricalData = self.get_json(&endpoint).await?;
        let candles = to_candles(data.candles, &self.utc_offset);
        debug!(symbol = %instrument.symbol, bars = candles.len(), "Candles fetched");
        Ok(candles)
    }
}

#[async_trait]
impl ExecutionGateway for KiteClient {
    async fn place_market_order(&self, symbol: &str, side: Side, quantity: u64) -> Result<String> {
        let form = [
            ("exchange", self.exchange.clone()),
            ("tradingsymbol", symbol.to_string()),
            ("transaction_type", side.as_str().to_string()),
            ("quantity", quantity.to_string()),
            ("product", self.product.clone()),
            ("order_type", "MARKET".to_string()),
            ("validity", "DAY".to_string()),
        ];
        let data: PlaceOrderData = self.post_form("/orders/regular", &form).await?;

        info!(
            order_id = %data.order_id,
            symbol,
            side = %side,
            qty = quantity,
            product = %self.product,
            "Kite market order placed"
        );
        Ok(data.order_id)
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderStatus> {
        let history: Vec<OrderHistoryEntry> =
            self.get_json(&format!("/orders/{order_id}")).await?;
        // History is chronological; the last entry is the current state.
        let status = history
            .last()
            .map(|h| map_order_status(&h.status))
            .unwrap_or(OrderStatus::Pending);
        debug!(order_id, status = %status, "Kite order status");
        Ok(status)
    }

    async fn place_exit_group(&self, group: &ExitOrderGroup) -> Result<String> {
        let (condition, orders) = gtt_payload(group, &self.exchange, &self.product);
        let form = [
            ("type", "two-leg".to_string()),
            ("condition", condition.to_string()),
            ("orders", orders.to_string()),
        ];
        let data: GttData = self.post_form("/gtt/triggers", &form).await?;

        info!(
            trigger_id = data.trigger_id,
            group = %group,
            "Kite GTT OCO placed"
        );
        Ok(data.trigger_id.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
