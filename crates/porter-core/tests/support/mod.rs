//! Shared fixtures for porter-core integration tests: scripted wiremock
//! responders, a controllable mock robot, and millisecond-scale tunings
//! so whole command lifecycles fit inside a test.
#![allow(dead_code, clippy::unwrap_used)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use porter_api::TransportConfig;
use porter_core::{
    ConnectionHealth, ConnectionRegistry, ControllerSettings, RetryPolicy, RobotConnection,
};

// ── Responders ──────────────────────────────────────────────────────

/// Serves a fixed sequence of responses, repeating the last once the
/// script runs out. Counts every request it serves.
pub struct Script {
    responses: Vec<ResponseTemplate>,
    served: Arc<AtomicUsize>,
}

impl Script {
    pub fn new(responses: Vec<ResponseTemplate>) -> Self {
        assert!(!responses.is_empty(), "a script needs at least one response");
        Self {
            responses,
            served: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared hit counter; grab before mounting.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.served)
    }
}

impl Respond for Script {
    fn respond(&self, _: &Request) -> ResponseTemplate {
        let served = self.served.fetch_add(1, Ordering::SeqCst);
        let index = served.min(self.responses.len() - 1);
        self.responses[index].clone()
    }
}

/// Responds 200 with whatever JSON value it currently holds. Tests keep
/// a clone and mutate the value mid-flight to play a robot whose state
/// moves while a command is executing.
#[derive(Clone)]
pub struct SharedValue {
    value: Arc<Mutex<Value>>,
    served: Arc<AtomicUsize>,
}

impl SharedValue {
    pub fn new(initial: Value) -> Self {
        Self {
            value: Arc::new(Mutex::new(initial)),
            served: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set(&self, value: Value) {
        *self.value.lock().unwrap() = value;
    }

    pub fn hits(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }
}

impl Respond for SharedValue {
    fn respond(&self, _: &Request) -> ResponseTemplate {
        self.served.fetch_add(1, Ordering::SeqCst);
        let value = self.value.lock().unwrap().clone();
        ResponseTemplate::new(200).set_body_json(value)
    }
}

/// Responds 200 with `body` while healthy, 500 otherwise. Flips the
/// link-health probe without tearing sockets down.
#[derive(Clone)]
pub struct Toggle {
    healthy: Arc<AtomicBool>,
    body: Value,
}

impl Toggle {
    pub fn new(body: Value) -> Self {
        Self {
            healthy: Arc::new(AtomicBool::new(true)),
            body,
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

impl Respond for Toggle {
    fn respond(&self, _: &Request) -> ResponseTemplate {
        if self.healthy.load(Ordering::SeqCst) {
            ResponseTemplate::new(200).set_body_json(self.body.clone())
        } else {
            ResponseTemplate::new(500)
        }
    }
}

// ── Tunings ─────────────────────────────────────────────────────────

pub fn fast_settings() -> ControllerSettings {
    ControllerSettings {
        fast_interval: Duration::from_millis(20),
        slow_interval: Duration::from_millis(200),
        poll_interval: Duration::from_millis(25),
        retry_delay: Duration::from_millis(25),
        command_timeout: Duration::from_secs(5),
        registration_window: Duration::from_millis(200),
        registration_probe: Duration::from_millis(10),
        health_interval: Duration::from_millis(40),
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
    }
}

/// A connection to the mock server, built through the registry the way
/// production callers get theirs.
pub fn connect(server: &MockServer) -> RobotConnection {
    ConnectionRegistry::new(TransportConfig::default(), fast_retry())
        .get(&server.address().to_string())
        .unwrap()
}

// ── Robot JSON bodies ───────────────────────────────────────────────

pub fn pose_body(x: f64, y: f64, theta: f64) -> Value {
    json!({ "x": x, "y": y, "theta": theta })
}

pub fn battery_body(percentage: i32) -> Value {
    json!({ "percentage": percentage, "power_status": "discharging" })
}

pub fn robot_info_body() -> Value {
    json!({ "serial_number": "PTR-0117", "version": "3.4.1" })
}

/// The slot as an idle robot reports it: `pending` with an empty id.
pub fn idle_slot() -> Value {
    json!({ "state": "pending", "command_id": "" })
}

pub fn running_slot(command_id: &str) -> Value {
    json!({ "state": "running", "command_id": command_id })
}

pub fn accepted(command_id: &str) -> Value {
    json!({ "result": { "success": true, "error_code": 0 }, "command_id": command_id })
}

pub fn rejected(error_code: i32) -> Value {
    json!({ "result": { "success": false, "error_code": error_code }, "command_id": "" })
}

pub fn verdict(command_id: &str, success: bool, error_code: i32) -> Value {
    json!({ "result": { "success": success, "error_code": error_code }, "command_id": command_id })
}

pub fn error_definitions_body() -> Value {
    json!([
        {
            "code": 10253,
            "title": "Shelf not found",
            "description": "The requested shelf is not registered on the current map."
        },
        {
            "code": 20001,
            "title": "Command cancelled",
            "description": "The command was cancelled before completion."
        },
        {
            "code": 30020,
            "title": "",
            "description": "Drive motor reported an overcurrent condition."
        },
    ])
}

// ── Standard mounts ─────────────────────────────────────────────────

pub fn ok_json(body: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

pub async fn mount_json(server: &MockServer, route: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Locations and shelves for name resolution: kitchen/dock plus one
/// shelf named tray.
pub async fn mount_catalog(server: &MockServer) {
    mount_json(
        server,
        "/api/locations",
        json!([
            {
                "id": "L1",
                "name": "kitchen",
                "location_type": "shelf_spot",
                "pose": { "x": 3.0, "y": 1.5, "theta": 0.0 }
            },
            {
                "id": "L2",
                "name": "dock",
                "location_type": "charger",
                "pose": { "x": 0.0, "y": 0.0, "theta": 3.14 }
            },
        ]),
    )
    .await;
    mount_json(
        server,
        "/api/shelves",
        json!([
            { "id": "S01", "name": "tray", "home_location_id": "L2" },
        ]),
    )
    .await;
}

/// Pose, battery, robot info, and an empty moving-shelf read. Mount
/// after any per-test responders for the same routes; earlier mounts
/// win.
pub async fn mount_telemetry(server: &MockServer) {
    mount_json(server, "/api/pose", pose_body(1.0, 2.0, 0.5)).await;
    mount_json(server, "/api/battery", battery_body(87)).await;
    mount_json(server, "/api/robot_info", robot_info_body()).await;
    mount_json(server, "/api/moving_shelf", json!({ "shelf_id": "" })).await;
}

pub async fn mount_idle_slot(server: &MockServer) {
    mount_json(server, "/api/command/state", idle_slot()).await;
}

// ── Waiting ─────────────────────────────────────────────────────────

/// Poll `pred` every few milliseconds until it holds; panic after
/// `deadline`.
pub async fn wait_until(deadline: Duration, mut pred: impl FnMut() -> bool, what: &str) {
    let started = Instant::now();
    while !pred() {
        assert!(
            started.elapsed() < deadline,
            "timed out after {deadline:?} waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wait until the connection's health probe reports `want`.
pub async fn wait_for_health(conn: &RobotConnection, want: ConnectionHealth, deadline: Duration) {
    let started = Instant::now();
    while conn.health() != want {
        assert!(
            started.elapsed() < deadline,
            "health never reached {want:?} within {deadline:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
