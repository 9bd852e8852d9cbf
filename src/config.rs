//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (broker credentials, Telegram token) are referenced by env-var
//! name in the config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use chrono::{FixedOffset, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::Secret;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::types::OrbError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub strategy: StrategyConfig,
    pub execution: ExecutionConfig,
    pub broker: BrokerConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

/// Trading-session timing and the symbol universe.
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub symbols: Vec<String>,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    /// Session-local offset from UTC (IST = +330).
    #[serde(default = "default_utc_offset")]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_market_open")]
    pub market_open: NaiveTime,
    #[serde(default = "default_market_close")]
    pub market_close: NaiveTime,
    #[serde(default = "default_market_open")]
    pub range_start: NaiveTime,
    #[serde(default = "default_range_end")]
    pub range_end: NaiveTime,
    #[serde(default = "default_signal_time")]
    pub signal_time: NaiveTime,
    /// Signals are not evaluated before this wall-clock time.
    #[serde(default = "default_time_gate")]
    pub time_gate: NaiveTime,
    #[serde(default = "default_gate_check_secs")]
    pub gate_check_secs: u64,
    #[serde(default = "default_candle_interval")]
    pub candle_interval: String,
    /// Maximum symbols fetched concurrently during the scan.
    #[serde(default = "default_scan_concurrency")]
    pub scan_concurrency: usize,
}

/// Breakout tunables.
#[derive(Debug, Deserialize, Clone)]
pub struct StrategyConfig {
    /// Capital deployable per trade.
    pub capital: Decimal,
    /// Maximum acceptable loss per trade.
    pub max_loss: Decimal,
    /// Reward:risk multiplier for the target.
    pub reward_risk: Decimal,
    /// Volume-surge threshold as a multiple of the opening-range mean.
    pub volume_mult: Decimal,
    /// Stop distance as a fraction of entry (0.005 = 0.5%).
    #[serde(default = "default_stop_pct")]
    pub stop_pct: Decimal,
    /// Fraction of the opening range added beyond the reward:risk target.
    #[serde(default = "default_range_target_frac")]
    pub range_target_frac: Decimal,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExecutionConfig {
    /// `true` places REAL orders.
    #[serde(default)]
    pub live: bool,
    #[serde(default = "default_product")]
    pub product: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_fill_timeout_secs")]
    pub fill_timeout_secs: u64,
    /// Run candidate lifecycles concurrently instead of one after another.
    #[serde(default)]
    pub concurrent: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_url")]
    pub base_url: String,
    pub api_key_env: String,
    pub access_token_env: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AlertsConfig {
    pub telegram_bot_token_env: Option<String>,
    pub telegram_chat_id_env: Option<String>,
}

fn default_exchange() -> String {
    "NSE".to_string()
}
fn default_utc_offset() -> i32 {
    330
}
fn default_market_open() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 15, 0).unwrap_or_default()
}
fn default_market_close() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 30, 0).unwrap_or_default()
}
fn default_range_end() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default()
}
fn default_signal_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 35, 0).unwrap_or_default()
}
fn default_time_gate() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 36, 0).unwrap_or_default()
}
fn default_gate_check_secs() -> u64 {
    5
}
fn default_candle_interval() -> String {
    "5minute".to_string()
}
fn default_scan_concurrency() -> usize {
    4
}
fn default_stop_pct() -> Decimal {
    dec!(0.005)
}
fn default_range_target_frac() -> Decimal {
    dec!(0.2)
}
fn default_top_n() -> usize {
    2
}
fn default_product() -> String {
    "MIS".to_string()
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_fill_timeout_secs() -> u64 {
    20
}
fn default_broker_url() -> String {
    "https://api.kite.trade".to_string()
}
fn default_request_timeout_secs() -> u64 {
    15
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(contents).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would make the run meaningless or unsafe.
    pub fn validate(&self) -> Result<(), OrbError> {
        let s = &self.session;
        let st = &self.strategy;
        let ex = &self.execution;

        if s.symbols.is_empty() {
            return Err(OrbError::Config("session.symbols is empty".into()));
        }
        if s.range_start > s.range_end {
            return Err(OrbError::Config(
                "session.range_start must not be after session.range_end".into(),
            ));
        }
        if s.signal_time <= s.range_end {
            return Err(OrbError::Config(
                "session.signal_time must be after session.range_end".into(),
            ));
        }
        if s.scan_concurrency == 0 {
            return Err(OrbError::Config("session.scan_concurrency must be >= 1".into()));
        }
        for (name, value) in [
            ("capital", st.capital),
            ("max_loss", st.max_loss),
            ("reward_risk", st.reward_risk),
            ("volume_mult", st.volume_mult),
            ("stop_pct", st.stop_pct),
        ] {
            if value <= Decimal::ZERO {
                return Err(OrbError::Config(format!("strategy.{name} must be positive")));
            }
        }
        if st.stop_pct >= Decimal::ONE {
            return Err(OrbError::Config("strategy.stop_pct must be below 1".into()));
        }
        if st.range_target_frac < Decimal::ZERO {
            return Err(OrbError::Config(
                "strategy.range_target_frac must not be negative".into(),
            ));
        }
        if st.top_n == 0 {
            return Err(OrbError::Config("strategy.top_n must be >= 1".into()));
        }
        if ex.poll_interval_ms == 0 {
            return Err(OrbError::Config("execution.poll_interval_ms must be >= 1".into()));
        }
        if ex.fill_timeout() < ex.poll_interval() {
            return Err(OrbError::Config(
                "execution.fill_timeout_secs is shorter than the poll interval".into(),
            ));
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve an environment variable into a secret.
    pub fn resolve_secret(env_name: &str) -> Result<Secret<String>> {
        Self::resolve_env(env_name).map(Secret::new)
    }
}

impl SessionConfig {
    /// Session-local offset from UTC.
    pub fn utc_offset(&self) -> Result<FixedOffset, OrbError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            OrbError::Config(format!(
                "session.utc_offset_minutes out of range: {}",
                self.utc_offset_minutes
            ))
        })
    }

    /// Label used in notifications, e.g. `9:35`.
    pub fn signal_label(&self) -> String {
        self.signal_time.format("%-H:%M").to_string()
    }
}

impl ExecutionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn fill_timeout(&self) -> Duration {
        Duration::from_secs(self.fill_timeout_secs)
    }

    /// The only way to obtain a [`LivePermit`]; `None` in dry-run mode.
    pub fn live_permit(&self) -> Option<LivePermit> {
        self.live.then_some(LivePermit { _private: () })
    }
}

/// Proof that live trading was enabled in configuration.
///
/// Required to construct an order executor. It cannot be built outside
/// this module, so a dry-run configuration can never reach the broker.
#[derive(Debug)]
pub struct LivePermit {
    _private: (),
}

impl AlertsConfig {
    /// Telegram credentials, if both env vars are named and set.
    pub fn telegram_credentials(&self) -> Option<(Secret<String>, String)> {
        let token_env = self.telegram_bot_token_env.as_deref()?;
        let chat_env = self.telegram_chat_id_env.as_deref()?;
        let token = std::env::var(token_env).ok().filter(|t| !t.is_empty())?;
        let chat_id = std::env::var(chat_env).ok().filter(|c| !c.is_empty())?;
        Some((Secret::new(token), chat_id))
    }
}
