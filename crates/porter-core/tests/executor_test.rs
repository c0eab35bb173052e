//! Integration tests for the command executor: the start → confirm →
//! poll → verify protocol against a scripted mock robot.
#![allow(clippy::unwrap_used)]

mod support;

use std::time::{Duration, Instant};

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use porter_api::models::RobotCommand;
use porter_core::{CommandExecutor, CommandOutcome, ConnectionHealth};

use support::{
    Script, Toggle, accepted, error_definitions_body, fast_settings, idle_slot, ok_json, rejected,
    robot_info_body, running_slot, verdict, wait_for_health,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn executor_against(server: &MockServer) -> CommandExecutor {
    CommandExecutor::new(support::connect(server), fast_settings())
}

async fn mount_start(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/api/command"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_slot_script(server: &MockServer, script: Script) {
    Mock::given(method("GET"))
        .and(path("/api/command/state"))
        .respond_with(script)
        .mount(server)
        .await;
}

async fn mount_result(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/command/result"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

// ── Happy path ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_command_runs_to_verified_completion() {
    let server = MockServer::start().await;
    mount_start(&server, accepted("cmd-1")).await;
    // One registration probe, then two completion polls.
    mount_slot_script(
        &server,
        Script::new(vec![
            ok_json(running_slot("cmd-1")),
            ok_json(running_slot("cmd-1")),
            ok_json(idle_slot()),
        ]),
    )
    .await;
    mount_result(&server, verdict("cmd-1", true, 0)).await;

    let executor = executor_against(&server);
    let outcome = executor
        .execute(
            RobotCommand::MoveShelf {
                shelf_id: "S01".into(),
                location_id: "L1".into(),
            },
            Some("tray -> kitchen".into()),
            Duration::from_secs(5),
        )
        .await;

    match &outcome {
        CommandOutcome::Success {
            ok,
            action,
            target,
            elapsed,
        } => {
            assert!(*ok);
            assert_eq!(action, "move_shelf");
            assert_eq!(target.as_deref(), Some("tray -> kitchen"));
            assert!(*elapsed > 0.0);
        }
        other => panic!("expected success, got: {other:?}"),
    }

    let metrics = executor.metrics();
    assert_eq!(metrics.poll_count, 2);
    assert_eq!(metrics.poll_success_count, 2);
    assert_eq!(metrics.poll_failure_count, 0);
    assert_eq!(metrics.poll_rtt_ms.len(), 2);

    executor.reset_metrics();
    assert_eq!(executor.metrics().poll_count, 0);
    assert!(executor.metrics().poll_rtt_ms.is_empty());
}

#[tokio::test]
async fn test_poll_errors_are_tolerated_and_counted() {
    let server = MockServer::start().await;
    mount_start(&server, accepted("cmd-2")).await;
    mount_slot_script(
        &server,
        Script::new(vec![
            ok_json(running_slot("cmd-2")),
            ResponseTemplate::new(500),
            ok_json(idle_slot()),
        ]),
    )
    .await;
    mount_result(&server, verdict("cmd-2", true, 0)).await;

    let executor = executor_against(&server);
    let outcome = executor
        .execute(RobotCommand::ReturnHome, None, Duration::from_secs(5))
        .await;

    assert!(outcome.is_ok(), "expected success, got: {outcome:?}");
    let metrics = executor.metrics();
    assert_eq!(metrics.poll_failure_count, 1);
    assert_eq!(metrics.poll_success_count, 1);
    assert_eq!(metrics.poll_count, 2);
    assert_eq!(metrics.poll_rtt_ms.len(), 1);
}

// ── Start failures ──────────────────────────────────────────────────

#[tokio::test]
async fn test_robot_rejection_is_enriched_from_the_error_table() {
    let server = MockServer::start().await;
    mount_start(&server, rejected(10253)).await;
    support::mount_json(&server, "/api/error_definitions", error_definitions_body()).await;

    let executor = executor_against(&server);
    let outcome = executor
        .execute(
            RobotCommand::MoveShelf {
                shelf_id: "S99".into(),
                location_id: "L1".into(),
            },
            Some("ghost -> kitchen".into()),
            Duration::from_secs(2),
        )
        .await;

    match &outcome {
        CommandOutcome::Robot {
            ok,
            error_code,
            error,
            action,
            target,
        } => {
            assert!(!*ok);
            assert_eq!(*error_code, 10253);
            assert_eq!(error, "error_code=10253: Shelf not found");
            assert_eq!(action, "move_shelf");
            assert_eq!(target.as_deref(), Some("ghost -> kitchen"));
        }
        other => panic!("expected robot failure, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_enrichment_falls_back_to_the_bare_code() {
    let server = MockServer::start().await;
    mount_start(&server, rejected(10253)).await;
    Mock::given(method("GET"))
        .and(path("/api/error_definitions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let executor = executor_against(&server);
    let outcome = executor
        .execute(RobotCommand::ReturnHome, None, Duration::from_secs(2))
        .await;

    assert_eq!(outcome.error_code(), Some(10253));
    match &outcome {
        CommandOutcome::Robot { error, .. } => assert_eq!(error, "error_code=10253"),
        other => panic!("expected robot failure, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_enrichment_uses_the_description_when_the_title_is_empty() {
    let server = MockServer::start().await;
    mount_start(&server, rejected(30020)).await;
    support::mount_json(&server, "/api/error_definitions", error_definitions_body()).await;

    let executor = executor_against(&server);
    let outcome = executor
        .execute(RobotCommand::ReturnHome, None, Duration::from_secs(2))
        .await;

    match &outcome {
        CommandOutcome::Robot { error, .. } => assert_eq!(
            error,
            "error_code=30020: Drive motor reported an overcurrent condition."
        ),
        other => panic!("expected robot failure, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_code_keeps_the_bare_form() {
    let server = MockServer::start().await;
    mount_start(&server, rejected(77777)).await;
    support::mount_json(&server, "/api/error_definitions", error_definitions_body()).await;

    let executor = executor_against(&server);
    let outcome = executor
        .execute(RobotCommand::ReturnHome, None, Duration::from_secs(2))
        .await;

    match &outcome {
        CommandOutcome::Robot { error, .. } => assert_eq!(error, "error_code=77777"),
        other => panic!("expected robot failure, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_permanent_start_failure_fails_after_one_attempt() {
    let server = MockServer::start().await;
    let start = Script::new(vec![
        ResponseTemplate::new(400).set_body_json(json!({ "message": "unsupported command" })),
    ]);
    let starts = start.counter();
    Mock::given(method("POST"))
        .and(path("/api/command"))
        .respond_with(start)
        .mount(&server)
        .await;

    let executor = executor_against(&server);
    let outcome = executor
        .execute(RobotCommand::ReturnHome, None, Duration::from_secs(5))
        .await;

    match &outcome {
        CommandOutcome::Transport {
            ok,
            error,
            retryable,
            attempts,
            action,
        } => {
            assert!(!*ok);
            assert!(!*retryable);
            assert_eq!(*attempts, 1);
            assert_eq!(action, "return_home");
            assert_eq!(error, "Robot API error (HTTP 400): unsupported command");
        }
        other => panic!("expected transport failure, got: {other:?}"),
    }
    assert_eq!(starts.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_transient_start_failures_retry_until_the_deadline() {
    let server = MockServer::start().await;
    let start = Script::new(vec![ResponseTemplate::new(503)]);
    let starts = start.counter();
    Mock::given(method("POST"))
        .and(path("/api/command"))
        .respond_with(start)
        .mount(&server)
        .await;

    let executor = executor_against(&server);
    let outcome = executor
        .execute(RobotCommand::ReturnHome, None, Duration::from_millis(300))
        .await;

    assert_eq!(
        serde_json::to_value(&outcome).unwrap(),
        json!({
            "ok": false,
            "error": "TIMEOUT",
            "timeout": 0.3,
            "action": "return_home",
        })
    );
    assert!(
        starts.load(std::sync::atomic::Ordering::SeqCst) >= 2,
        "expected several start attempts before the deadline"
    );
}

#[tokio::test]
async fn test_start_lands_after_transient_failures() {
    let server = MockServer::start().await;
    let start = Script::new(vec![
        ResponseTemplate::new(503),
        ResponseTemplate::new(503),
        ok_json(accepted("cmd-3")),
    ]);
    let starts = start.counter();
    Mock::given(method("POST"))
        .and(path("/api/command"))
        .respond_with(start)
        .mount(&server)
        .await;
    mount_slot_script(
        &server,
        Script::new(vec![ok_json(running_slot("cmd-3")), ok_json(idle_slot())]),
    )
    .await;
    mount_result(&server, verdict("cmd-3", true, 0)).await;

    let executor = executor_against(&server);
    let outcome = executor
        .execute(
            RobotCommand::MoveToPose {
                x: 1.0,
                y: 2.0,
                yaw: 0.5,
            },
            Some("(1.00, 2.00, 0.50)".into()),
            Duration::from_secs(5),
        )
        .await;

    assert!(outcome.is_ok(), "expected success, got: {outcome:?}");
    assert_eq!(outcome.action(), "move_to_pose");
    assert_eq!(starts.load(std::sync::atomic::Ordering::SeqCst), 3);
}

// ── Completion and verification ─────────────────────────────────────

#[tokio::test]
async fn test_deadline_without_completion_times_out() {
    let server = MockServer::start().await;
    mount_start(&server, accepted("cmd-4")).await;
    mount_slot_script(&server, Script::new(vec![ok_json(running_slot("cmd-4"))])).await;

    let executor = executor_against(&server);
    let started = Instant::now();
    let outcome = executor
        .execute(
            RobotCommand::MoveToLocation {
                location_id: "L1".into(),
            },
            Some("kitchen".into()),
            Duration::from_millis(400),
        )
        .await;
    let elapsed = started.elapsed();

    assert_eq!(
        serde_json::to_value(&outcome).unwrap(),
        json!({
            "ok": false,
            "error": "TIMEOUT",
            "timeout": 0.4,
            "action": "move_to_location",
        })
    );
    assert!(elapsed >= Duration::from_millis(400));
    assert!(
        elapsed < Duration::from_millis(1500),
        "deadline overshot: {elapsed:?}"
    );
}

#[tokio::test]
async fn test_stale_result_keeps_polling_until_ours_is_posted() {
    let server = MockServer::start().await;
    mount_start(&server, accepted("cmd-5")).await;
    mount_slot_script(
        &server,
        Script::new(vec![ok_json(running_slot("cmd-5")), ok_json(idle_slot())]),
    )
    .await;
    let results = Script::new(vec![
        ok_json(verdict("cmd-0", true, 0)),
        ok_json(verdict("cmd-5", true, 0)),
    ]);
    let result_hits = results.counter();
    Mock::given(method("GET"))
        .and(path("/api/command/result"))
        .respond_with(results)
        .mount(&server)
        .await;

    let executor = executor_against(&server);
    let outcome = executor
        .execute(RobotCommand::ReturnHome, None, Duration::from_secs(5))
        .await;

    assert!(outcome.is_ok(), "expected success, got: {outcome:?}");
    assert_eq!(result_hits.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_preemption_surfaces_the_cancellation() {
    let server = MockServer::start().await;
    mount_start(&server, accepted("cmd-a")).await;
    // The slot id flips to another command: someone preempted us.
    mount_slot_script(
        &server,
        Script::new(vec![
            ok_json(running_slot("cmd-a")),
            ok_json(running_slot("cmd-a")),
            ok_json(running_slot("cmd-b")),
        ]),
    )
    .await;
    mount_result(&server, verdict("cmd-a", false, 20001)).await;
    support::mount_json(&server, "/api/error_definitions", error_definitions_body()).await;

    let executor = executor_against(&server);
    let outcome = executor
        .execute(
            RobotCommand::MoveToLocation {
                location_id: "L1".into(),
            },
            Some("kitchen".into()),
            Duration::from_secs(5),
        )
        .await;

    match &outcome {
        CommandOutcome::Robot {
            error_code,
            error,
            target,
            ..
        } => {
            assert_eq!(*error_code, 20001);
            assert_eq!(error, "error_code=20001: Command cancelled");
            assert_eq!(target.as_deref(), Some("kitchen"));
        }
        other => panic!("expected robot failure, got: {other:?}"),
    }
}

// ── Registration window ─────────────────────────────────────────────

#[tokio::test]
async fn test_registration_expiry_proceeds_to_completion_polls() {
    let server = MockServer::start().await;
    mount_start(&server, accepted("cmd-6")).await;
    // The slot never shows our command; the window must expire without
    // failing the execution.
    support::mount_idle_slot(&server).await;
    mount_result(&server, verdict("cmd-6", true, 0)).await;

    let executor = executor_against(&server);
    let started = Instant::now();
    let outcome = executor
        .execute(RobotCommand::ReturnHome, None, Duration::from_secs(5))
        .await;

    assert!(outcome.is_ok(), "expected success, got: {outcome:?}");
    // The whole registration window was spent probing before the first
    // completion poll.
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_slow_registration_confirms_before_the_window_closes() {
    let server = MockServer::start().await;
    mount_start(&server, accepted("cmd-7")).await;
    mount_slot_script(
        &server,
        Script::new(vec![
            ok_json(idle_slot()),
            ok_json(idle_slot()),
            ok_json(idle_slot()),
            ok_json(running_slot("cmd-7")),
            ok_json(idle_slot()),
        ]),
    )
    .await;
    mount_result(&server, verdict("cmd-7", true, 0)).await;

    let executor = executor_against(&server);
    let started = Instant::now();
    let outcome = executor
        .execute(RobotCommand::ReturnHome, None, Duration::from_secs(5))
        .await;

    assert!(outcome.is_ok(), "expected success, got: {outcome:?}");
    assert!(
        started.elapsed() < Duration::from_millis(190),
        "registration should have confirmed well before the window closed"
    );
}

// ── Link health gate ────────────────────────────────────────────────

#[tokio::test]
async fn test_disconnected_link_fails_without_sending() {
    let server = MockServer::start().await;
    let health = Toggle::new(robot_info_body());
    Mock::given(method("GET"))
        .and(path("/api/robot_info"))
        .respond_with(health.clone())
        .mount(&server)
        .await;

    let conn = support::connect(&server);
    conn.start_monitoring(Duration::from_millis(15)).await;
    health.set_healthy(false);
    wait_for_health(&conn, ConnectionHealth::Disconnected, Duration::from_secs(2)).await;

    let executor = CommandExecutor::new(conn.clone(), fast_settings());
    let outcome = executor
        .execute(RobotCommand::ReturnHome, None, Duration::from_millis(300))
        .await;

    match &outcome {
        CommandOutcome::Disconnected {
            ok,
            error,
            elapsed,
            action,
        } => {
            assert!(!*ok);
            assert_eq!(error, "DISCONNECTED");
            assert_eq!(action, "return_home");
            assert!(*elapsed >= 0.3);
        }
        other => panic!("expected disconnected, got: {other:?}"),
    }
    conn.stop_monitoring().await;
}

#[tokio::test]
async fn test_reconnect_during_the_wait_lets_the_command_run() {
    let server = MockServer::start().await;
    let health = Toggle::new(robot_info_body());
    Mock::given(method("GET"))
        .and(path("/api/robot_info"))
        .respond_with(health.clone())
        .mount(&server)
        .await;
    mount_start(&server, accepted("cmd-8")).await;
    mount_slot_script(
        &server,
        Script::new(vec![ok_json(running_slot("cmd-8")), ok_json(idle_slot())]),
    )
    .await;
    mount_result(&server, verdict("cmd-8", true, 0)).await;

    let conn = support::connect(&server);
    conn.start_monitoring(Duration::from_millis(15)).await;
    health.set_healthy(false);
    wait_for_health(&conn, ConnectionHealth::Disconnected, Duration::from_secs(2)).await;

    let restore = health.clone();
    let flipper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        restore.set_healthy(true);
    });

    let executor = CommandExecutor::new(conn.clone(), fast_settings());
    let outcome = executor
        .execute(RobotCommand::ReturnHome, None, Duration::from_secs(3))
        .await;
    flipper.await.unwrap();

    assert!(
        outcome.is_ok(),
        "expected success after reconnect, got: {outcome:?}"
    );
    conn.stop_monitoring().await;
}
