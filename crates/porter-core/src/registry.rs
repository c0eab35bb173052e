// Connection and controller registries
//
// Process-wide caches keyed by normalized robot address. A registry is
// an owned object handed down from the composition root -- there is no
// global state, and tests can run as many isolated registries as they
// like.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::info;

use porter_api::TransportConfig;

use crate::config::ControllerSettings;
use crate::connection::{DEFAULT_PORT, RobotConnection};
use crate::controller::RobotController;
use crate::error::CoreError;
use crate::retry::RetryPolicy;

/// Append the default control port when `address` has none.
///
/// Purely syntactic: `"10.0.0.5"` becomes `"10.0.0.5:26400"`, anything
/// already containing a colon passes through untouched.
pub fn normalize_target(address: &str) -> String {
    if address.contains(':') {
        address.to_owned()
    } else {
        format!("{address}:{DEFAULT_PORT}")
    }
}

// ── Connection registry ─────────────────────────────────────────────

/// Cache of one shared [`RobotConnection`] per robot address.
///
/// Every caller naming the same normalized address gets a handle to the
/// same connection, so the resolver is built once and the health probe
/// runs once per robot.
pub struct ConnectionRegistry {
    transport: TransportConfig,
    retry: RetryPolicy,
    connections: DashMap<String, RobotConnection>,
}

impl ConnectionRegistry {
    pub fn new(transport: TransportConfig, retry: RetryPolicy) -> Self {
        Self {
            transport,
            retry,
            connections: DashMap::new(),
        }
    }

    /// The shared connection for `address`, created on first use.
    pub fn get(&self, address: &str) -> Result<RobotConnection, CoreError> {
        let target = normalize_target(address);
        if let Some(existing) = self.connections.get(&target) {
            return Ok(existing.clone());
        }
        // The entry lock makes creation atomic under concurrent callers.
        match self.connections.entry(target) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let conn = RobotConnection::connect(
                    entry.key().clone(),
                    &self.transport,
                    self.retry.clone(),
                )?;
                entry.insert(conn.clone());
                Ok(conn)
            }
        }
    }

    /// Evict the connection for `address`, stopping its health probe.
    /// Unknown addresses are a no-op.
    pub async fn remove(&self, address: &str) {
        let target = normalize_target(address);
        if let Some((_, conn)) = self.connections.remove(&target) {
            conn.stop_monitoring().await;
            info!(target = %target, "connection evicted");
        }
    }

    /// Evict every cached connection.
    pub async fn clear(&self) {
        let targets: Vec<String> = self
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for target in targets {
            self.remove(&target).await;
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(TransportConfig::default(), RetryPolicy::default())
    }
}

// ── Controller registry ─────────────────────────────────────────────

/// One started [`RobotController`] per robot, keyed like the connection
/// cache.
///
/// `start` is idempotent per normalized address; `stop` tears the
/// controller down but leaves the underlying connection cached for the
/// next start.
pub struct ControllerRegistry {
    connections: ConnectionRegistry,
    settings: ControllerSettings,
    controllers: DashMap<String, RobotController>,
}

impl ControllerRegistry {
    pub fn new(connections: ConnectionRegistry, settings: ControllerSettings) -> Self {
        Self {
            connections,
            settings,
            controllers: DashMap::new(),
        }
    }

    /// The underlying connection cache.
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Start (or fetch the already running) controller for `address`.
    pub async fn start(&self, address: &str) -> Result<RobotController, CoreError> {
        let target = normalize_target(address);
        if let Some(existing) = self.controllers.get(&target) {
            return Ok(existing.clone());
        }
        let conn = self.connections.get(&target)?;
        let controller = match self.controllers.entry(target) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let controller = RobotController::new(conn, self.settings.clone());
                entry.insert(controller.clone());
                controller
            }
        };
        controller.start().await;
        Ok(controller)
    }

    /// The running controller for `address`, if any.
    pub fn get(&self, address: &str) -> Option<RobotController> {
        self.controllers
            .get(&normalize_target(address))
            .map(|entry| entry.clone())
    }

    /// Stop and drop the controller for `address`. No-op when absent.
    pub async fn stop(&self, address: &str) {
        if let Some((target, controller)) = self.controllers.remove(&normalize_target(address)) {
            controller.stop().await;
            info!(target = %target, "controller stopped and evicted");
        }
    }

    /// Stop every running controller.
    pub async fn stop_all(&self) {
        let targets: Vec<String> = self
            .controllers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for target in targets {
            self.stop(&target).await;
        }
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}
