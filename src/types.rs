//! Shared types for the ORB runner.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that platform, strategy,
//! and engine modules can depend on them without circular references.

use chrono::NaiveDateTime;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decimal places used when prices are shown or sent to the broker.
pub const PRICE_DP: u32 = 2;

/// Round a price to [`PRICE_DP`] places, halves away from zero.
pub fn round_price(price: Decimal) -> Decimal {
    price.round_dp_with_strategy(PRICE_DP, RoundingStrategy::MidpointAwayFromZero)
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// A tradeable symbol with its venue token, resolved once per run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    /// Opaque venue identifier (Kite `instrument_token`).
    pub token: u64,
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.symbol, self.token)
    }
}

/// One OHLCV bar. Timestamps are session-local wall-clock time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: NaiveDateTime,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

impl fmt::Display for Candle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} O={} H={} L={} C={} V={}",
            self.timestamp.format("%H:%M"),
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
        )
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The opposite side (used for the protective exit legs).
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Wire representation shared by the broker API and notifications.
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an entry order.
///
/// `UnknownTimeout` is never reported by a gateway; the executor assigns it
/// when no terminal status was observed before the fill deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Complete,
    Rejected,
    Cancelled,
    UnknownTimeout,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "PENDING"),
            OrderStatus::Complete => write!(f, "COMPLETE"),
            OrderStatus::Rejected => write!(f, "REJECTED"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
            OrderStatus::UnknownTimeout => write!(f, "UNKNOWN-TIMEOUT"),
        }
    }
}

// ---------------------------------------------------------------------------
// Candidates & orders
// ---------------------------------------------------------------------------

/// A breakout trade ready for ranking and (optionally) execution.
///
/// Prices are kept unrounded; use the `*_display` helpers or
/// [`Candidate::exit_group`] for values rounded to [`PRICE_DP`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub symbol: String,
    pub side: Side,
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub target: Decimal,
    /// Always >= 1; zero-quantity signals are discarded by the evaluator.
    pub quantity: u64,
    /// Ranking score; higher is better.
    pub score: Decimal,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {}\nEntry: {} | SL: {} | Target: {}\nQty: {}",
            self.symbol,
            self.side,
            self.entry_display(),
            self.stop_loss_display(),
            self.target_display(),
            self.quantity,
        )
    }
}

impl Candidate {
    pub fn entry_display(&self) -> Decimal {
        round_price(self.entry)
    }

    pub fn stop_loss_display(&self) -> Decimal {
        round_price(self.stop_loss)
    }

    pub fn target_display(&self) -> Decimal {
        round_price(self.target)
    }

    /// Side of both protective exit legs.
    pub fn exit_side(&self) -> Side {
        self.side.opposite()
    }

    /// BUY: `stop_loss < entry < target`; SELL: `target < entry < stop_loss`.
    pub fn is_well_ordered(&self) -> bool {
        match self.side {
            Side::Buy => self.stop_loss < self.entry && self.entry < self.target,
            Side::Sell => self.target < self.entry && self.entry < self.stop_loss,
        }
    }

    /// The linked stop-loss/target pair protecting a filled entry.
    pub fn exit_group(&self) -> ExitOrderGroup {
        ExitOrderGroup {
            symbol: self.symbol.clone(),
            side: self.exit_side(),
            quantity: self.quantity,
            stop_loss: self.stop_loss_display(),
            target: self.target_display(),
            last_price: self.entry_display(),
        }
    }
}

/// A one-cancels-other pair of exit triggers for a filled position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitOrderGroup {
    pub symbol: String,
    /// Side of both legs (opposite of the entry).
    pub side: Side,
    pub quantity: u64,
    pub stop_loss: Decimal,
    pub target: Decimal,
    /// Reference price the triggers are placed against.
    pub last_price: Decimal,
}

impl fmt::Display for ExitOrderGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} x{} SL={} TGT={} (ref {})",
            self.side, self.symbol, self.quantity, self.stop_loss, self.target, self.last_price,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for ORB.
#[derive(Debug, thiserror::Error)]
pub enum OrbError {
    #[error("Broker error ({endpoint}): {message}")]
    Broker { endpoint: String, message: String },

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Instrument not found: {0}")]
    InstrumentNotFound(String),

    #[error("Malformed candle: {0}")]
    MalformedCandle(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
