//! ORB — Opening-range-breakout intraday runner
//!
//! Entry point. Loads configuration, initialises structured logging,
//! waits for the session time gate, then runs one scan → rank → notify →
//! (live) execute pass and exits.

use anyhow::Result;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use orb::config;
use orb::engine::clock::{wait_until, Clock, SystemClock};
use orb::engine::executor::Executor;
use orb::engine::session::{Session, SessionOutcome};
use orb::notify::telegram::TelegramNotifier;
use orb::notify::{LogNotifier, Notifier};
use orb::platforms::kite::KiteClient;

const BANNER: &str = r#"
  ___  ____  ____
 / _ \|  _ \| __ )
| | | | |_) |  _ \
| |_| |  _ <| |_) |
 \___/|_| \_\____/

  Opening Range Breakout — intraday runner
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("ORB_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        config = %config_path,
        symbols = cfg.session.symbols.len(),
        live = cfg.execution.live,
        top_n = cfg.strategy.top_n,
        capital = %cfg.strategy.capital,
        max_loss = %cfg.strategy.max_loss,
        "ORB starting up"
    );

    // -- Initialise components -------------------------------------------

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(cfg.session.utc_offset()?));
    let kite = Arc::new(KiteClient::from_config(&cfg)?);

    let notifier: Arc<dyn Notifier> = match cfg.alerts.telegram_credentials() {
        Some((token, chat_id)) => {
            info!("Telegram alerts enabled");
            Arc::new(TelegramNotifier::new(token, chat_id)?)
        }
        None => {
            warn!("Telegram not configured — notifications go to the log only");
            Arc::new(LogNotifier)
        }
    };

    // Order placement is only reachable through a live permit.
    let executor = cfg.execution.live_permit().map(|permit| {
        warn!(product = %cfg.execution.product, "LIVE MODE — real orders will be placed");
        Executor::new(
            kite.clone(),
            notifier.clone(),
            clock.clone(),
            &cfg.execution,
            permit,
        )
    });
    if executor.is_none() {
        info!("PAPER MODE — signals only");
    }

    let session = Session::from_config(&cfg, kite, notifier, executor);

    // -- Run -------------------------------------------------------------

    wait_until(
        clock.as_ref(),
        cfg.session.time_gate,
        Duration::from_secs(cfg.session.gate_check_secs),
    )
    .await;

    let date = clock.now().date();
    let run_id = Uuid::new_v4();
    let outcome = session
        .run(date)
        .instrument(info_span!("session", %run_id, %date))
        .await?;

    report(&outcome);
    Ok(ExitCode::from(outcome.exit_code()))
}

/// Final log line(s) for the run.
fn report(outcome: &SessionOutcome) {
    match outcome {
        SessionOutcome::NoSignal => info!("Run finished: no signal"),
        SessionOutcome::DryRun { selected } => {
            info!(selected = selected.len(), "Run finished: paper mode")
        }
        SessionOutcome::Completed { reports } => {
            for r in reports {
                info!(symbol = %r.candidate.symbol, outcome = %r.outcome, "Trade result");
            }
            let unprotected = outcome.unprotected_count();
            if unprotected > 0 {
                error!(unprotected, trades = reports.len(), "Run finished: live, manual action required");
            } else {
                info!(trades = reports.len(), "Run finished: live");
            }
        }
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("orb=info"));

    if std::env::var("ORB_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
