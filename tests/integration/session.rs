//! End-to-end session scenarios against the in-memory broker.

use rust_decimal_macros::dec;
use std::sync::Arc;

use orb::config::AppConfig;
use orb::engine::clock::ManualClock;
use orb::engine::executor::{Executor, TradeOutcome, TradeReport};
use orb::engine::session::{Session, SessionOutcome, EXIT_UNPROTECTED};
use orb::types::{OrderStatus, Side};

use crate::mock_gateway::{orb_series, session_date, MockBroker, RecordingNotifier};

fn config(symbols: &[&str], live: bool, concurrent: bool) -> AppConfig {
    let list = symbols
        .iter()
        .map(|s| format!("\"{s}\""))
        .collect::<Vec<_>>()
        .join(", ");
    AppConfig::from_toml(&format!(
        r#"
        [session]
        symbols = [{list}]

        [strategy]
        capital = 120000.0
        max_loss = 1000.0
        reward_risk = 1.1
        volume_mult = 1.2
        top_n = 2

        [execution]
        live = {live}
        concurrent = {concurrent}

        [broker]
        api_key_env = "KITE_API_KEY"
        access_token_env = "KITE_ACCESS_TOKEN"
        "#
    ))
    .unwrap()
}

fn session(cfg: &AppConfig, broker: &Arc<MockBroker>, notifier: &Arc<RecordingNotifier>) -> Session {
    let clock = Arc::new(ManualClock::new(
        session_date().and_hms_opt(9, 36, 0).unwrap(),
    ));
    let executor = cfg.execution.live_permit().map(|permit| {
        Executor::new(
            broker.clone(),
            notifier.clone(),
            clock.clone(),
            &cfg.execution,
            permit,
        )
    });
    Session::from_config(cfg, broker.clone(), notifier.clone(), executor)
}

/// MCX breaks the high (SELL, score 7), NYKAA breaks the low (BUY, score 8),
/// SOBHA breaks the high (SELL, score 6), ARVIND stays quiet.
fn universe() -> MockBroker {
    MockBroker::new()
        .with_series("MCX", orb_series(dec!(105), dec!(100), dec!(107), dec!(103), 1300))
        .with_series("NYKAA", orb_series(dec!(205), dec!(200), dec!(204), dec!(197), 2000))
        .with_series("SOBHA", orb_series(dec!(55), dec!(50), dec!(56), dec!(52), 1500))
        .with_series("ARVIND", orb_series(dec!(105), dec!(100), dec!(106), dec!(101), 1000))
}

const SYMBOLS: [&str; 4] = ["MCX", "NYKAA", "SOBHA", "ARVIND"];

fn reports(outcome: SessionOutcome) -> Vec<TradeReport> {
    match outcome {
        SessionOutcome::Completed { reports } => reports,
        other => panic!("expected a completed live session, got {other:?}"),
    }
}

#[tokio::test]
async fn test_no_candidates_sends_single_message_and_never_trades() {
    let broker = Arc::new(
        MockBroker::new()
            .with_series("ARVIND", orb_series(dec!(105), dec!(100), dec!(106), dec!(101), 1000))
            .with_series("MCX", Vec::new()),
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let cfg = config(&["ARVIND", "MCX", "GHOST"], true, false);

    let outcome = session(&cfg, &broker, &notifier).run(session_date()).await.unwrap();

    assert!(matches!(outcome, SessionOutcome::NoSignal));
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(notifier.messages(), vec!["❌ ORB 9:35\nNo valid stock today."]);
    assert_eq!(broker.execution_calls(), 0);
}

#[tokio::test]
async fn test_dry_run_announces_without_touching_gateway() {
    let broker = Arc::new(universe());
    let notifier = Arc::new(RecordingNotifier::default());
    let cfg = config(&SYMBOLS, false, false);

    let s = session(&cfg, &broker, &notifier);
    assert!(!s.is_live());
    let outcome = s.run(session_date()).await.unwrap();

    let SessionOutcome::DryRun { selected } = &outcome else {
        panic!("expected dry run, got {outcome:?}");
    };
    assert_eq!(selected.len(), 2);
    assert_eq!(selected[0].symbol, "NYKAA");
    assert_eq!(selected[1].symbol, "MCX");

    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("📊 ORB 9:35 (SAFE GTT)"));
    assert!(messages[0].contains("MCX | SELL\nEntry: 107 | SL: 107.54 | Target: 105.41\nQty: 1121"));
    assert!(messages[0].ends_with("🟡 PAPER MODE"));
    assert_eq!(broker.execution_calls(), 0);
    assert!(broker.orders().is_empty());
}

#[tokio::test]
async fn test_live_session_enters_then_protects_top_two() {
    let broker = Arc::new(universe());
    let notifier = Arc::new(RecordingNotifier::default());
    let cfg = config(&SYMBOLS, true, false);

    let outcome = session(&cfg, &broker, &notifier).run(session_date()).await.unwrap();
    assert_eq!(outcome.exit_code(), 0);
    let reports = reports(outcome);
    assert_eq!(reports.len(), 2);
    assert!(reports
        .iter()
        .all(|r| matches!(r.outcome, TradeOutcome::Protected { .. })));

    let orders = broker.orders();
    assert_eq!(orders.len(), 2);
    assert_eq!((orders[0].symbol.as_str(), orders[0].side, orders[0].quantity), ("NYKAA", Side::Buy, 609));
    assert_eq!((orders[1].symbol.as_str(), orders[1].side, orders[1].quantity), ("MCX", Side::Sell, 1121));

    let exits = broker.exit_groups();
    assert_eq!(exits.len(), 2);
    assert_eq!(exits[0].side, Side::Sell);
    assert_eq!(exits[0].stop_loss, dec!(196.02));
    assert_eq!(exits[0].target, dec!(199.08));
    assert_eq!(exits[1].side, Side::Buy);
    assert_eq!(exits[1].quantity, 1121);
    assert_eq!(exits[1].stop_loss, dec!(107.54));
    assert_eq!(exits[1].target, dec!(105.41));

    let messages = notifier.messages();
    assert_eq!(messages.len(), 3);
    assert!(messages[0].ends_with("🔴 LIVE MODE"));
    assert_eq!(messages[1], "✅ ENTRY CONFIRMED + GTT SET — NYKAA");
    assert_eq!(messages[2], "✅ ENTRY CONFIRMED + GTT SET — MCX");
}

#[tokio::test]
async fn test_rejected_entry_gets_no_exit() {
    let broker = Arc::new(universe());
    broker.script_fill("NYKAA", vec![OrderStatus::Pending, OrderStatus::Rejected]);
    let notifier = Arc::new(RecordingNotifier::default());
    let cfg = config(&SYMBOLS, true, false);

    let reports = reports(session(&cfg, &broker, &notifier).run(session_date()).await.unwrap());

    assert_eq!(
        reports[0].outcome,
        TradeOutcome::EntryFailed {
            order_id: "MOCK-1".into(),
            status: OrderStatus::Rejected
        }
    );
    assert!(matches!(reports[1].outcome, TradeOutcome::Protected { .. }));

    let exits = broker.exit_groups();
    assert_eq!(exits.len(), 1);
    assert_eq!(exits[0].symbol, "MCX");
    assert!(notifier.messages()[1].contains("ENTRY FAILED (REJECTED) — NYKAA"));
}

#[tokio::test]
async fn test_fill_timeout_polls_for_twenty_seconds() {
    let broker = Arc::new(
        MockBroker::new()
            .with_series("MCX", orb_series(dec!(105), dec!(100), dec!(107), dec!(103), 1300)),
    );
    broker.script_fill("MCX", vec![OrderStatus::Pending]);
    let notifier = Arc::new(RecordingNotifier::default());
    let cfg = config(&["MCX"], true, false);

    let reports = reports(session(&cfg, &broker, &notifier).run(session_date()).await.unwrap());

    assert_eq!(
        reports[0].outcome,
        TradeOutcome::EntryFailed {
            order_id: "MOCK-1".into(),
            status: OrderStatus::UnknownTimeout
        }
    );
    // One submission plus one status query per second of the timeout.
    assert_eq!(broker.execution_calls(), 21);
    assert!(broker.exit_groups().is_empty());
    assert!(notifier.messages()[1].contains("(timeout)"));
}

#[tokio::test]
async fn test_submission_failure_moves_on() {
    let broker = Arc::new(universe());
    broker.fail_entry("NYKAA");
    let notifier = Arc::new(RecordingNotifier::default());
    let cfg = config(&SYMBOLS, true, false);

    let reports = reports(session(&cfg, &broker, &notifier).run(session_date()).await.unwrap());

    assert!(matches!(reports[0].outcome, TradeOutcome::SubmissionFailed { .. }));
    assert!(matches!(reports[1].outcome, TradeOutcome::Protected { .. }));
    assert_eq!(broker.orders().len(), 1);
    assert!(notifier.messages()[1].starts_with("❌ ORDER SUBMISSION FAILED — NYKAA"));
}

#[tokio::test]
async fn test_exit_failure_is_loud_and_sets_exit_code() {
    let broker = Arc::new(universe());
    broker.fail_exits("GTT service unavailable");
    let notifier = Arc::new(RecordingNotifier::default());
    let cfg = config(&SYMBOLS, true, false);

    let outcome = session(&cfg, &broker, &notifier).run(session_date()).await.unwrap();
    assert_eq!(outcome.exit_code(), EXIT_UNPROTECTED);

    let reports = reports(outcome);
    assert!(reports.iter().all(|r| r.outcome.is_unprotected()));
    let messages = notifier.messages();
    assert!(messages[1].starts_with("🚨 UNPROTECTED POSITION — NYKAA"));
    assert!(messages[2].contains("MANUAL ACTION REQUIRED"));
}

#[tokio::test]
async fn test_concurrent_lifecycles_keep_rank_order() {
    let broker = Arc::new(universe());
    broker.script_fill("NYKAA", vec![OrderStatus::Pending, OrderStatus::Pending, OrderStatus::Complete]);
    let notifier = Arc::new(RecordingNotifier::default());
    let cfg = config(&SYMBOLS, true, true);

    let reports = reports(session(&cfg, &broker, &notifier).run(session_date()).await.unwrap());

    assert_eq!(reports[0].candidate.symbol, "NYKAA");
    assert_eq!(reports[1].candidate.symbol, "MCX");
    assert!(reports
        .iter()
        .all(|r| matches!(r.outcome, TradeOutcome::Protected { .. })));
    assert_eq!(broker.exit_groups().len(), 2);
}

#[tokio::test]
async fn test_concurrent_fill_timeouts_poll_independently() {
    let broker = Arc::new(universe());
    broker.script_fill("NYKAA", vec![OrderStatus::Pending]);
    broker.script_fill("MCX", vec![OrderStatus::Pending]);
    let notifier = Arc::new(RecordingNotifier::default());
    let cfg = config(&SYMBOLS, true, true);

    let reports = reports(session(&cfg, &broker, &notifier).run(session_date()).await.unwrap());

    assert!(reports.iter().all(|r| matches!(
        r.outcome,
        TradeOutcome::EntryFailed { status: OrderStatus::UnknownTimeout, .. }
    )));
    // Each entry gets its own 20 one-second polls.
    assert_eq!(broker.polls_for("MOCK-1"), 20);
    assert_eq!(broker.polls_for("MOCK-2"), 20);
    assert_eq!(broker.execution_calls(), 2 + 2 * 20);
    assert!(broker.exit_groups().is_empty());
}

#[tokio::test]
async fn test_equal_scores_keep_configured_order() {
    let same = || orb_series(dec!(105), dec!(100), dec!(107), dec!(103), 1300);
    let broker = Arc::new(
        MockBroker::new()
            .with_series("SOBHA", same())
            .with_series("MCX", same())
            .with_series("GNFC", same()),
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let cfg = config(&["GNFC", "SOBHA", "MCX"], false, false);

    let outcome = session(&cfg, &broker, &notifier).run(session_date()).await.unwrap();
    let SessionOutcome::DryRun { selected } = outcome else {
        panic!("expected dry run");
    };
    let symbols: Vec<_> = selected.iter().map(|c| c.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["GNFC", "SOBHA"]);
}
