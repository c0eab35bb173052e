// Robot connection
//
// One shared handle per robot: the HTTP client, the lazily-built name
// resolver, and the link-health probe. Handles are cheap to clone and
// all clones share the same inner state, so the connection registry can
// hand the same robot to every caller.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, OnceCell, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use porter_api::models::Pose;
use porter_api::{RobotClient, TransportConfig};

use crate::error::CoreError;
use crate::resolver::Resolver;
use crate::retry::{RetryError, RetryPolicy, call_with_retry};

/// Default robot control port, appended when a target address has none.
pub const DEFAULT_PORT: u16 = 26400;

/// How long `stop_monitoring` waits for the probe task to wind down.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Liveness of the link to one robot, as judged by the health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionHealth {
    Connected,
    Disconnected,
}

/// One successful liveness round-trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PingReport {
    pub serial_number: String,
    pub version: String,
    pub pose: Pose,
}

struct MonitorHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// A shared connection to one robot.
///
/// Created by [`ConnectionRegistry`](crate::registry::ConnectionRegistry);
/// clones share the client, resolver, and health channel.
#[derive(Clone)]
pub struct RobotConnection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    target: String,
    client: RobotClient,
    retry: RetryPolicy,
    resolver: OnceCell<Resolver>,
    health: watch::Sender<ConnectionHealth>,
    monitor: Mutex<Option<MonitorHandle>>,
}

impl RobotConnection {
    /// Open a handle to the robot at `target` (`host:port`).
    ///
    /// Purely local: no traffic flows until the first call.
    pub(crate) fn connect(
        target: String,
        transport: &TransportConfig,
        retry: RetryPolicy,
    ) -> Result<Self, CoreError> {
        let client =
            RobotClient::new(&target, transport).map_err(|e| CoreError::InvalidTarget {
                target: target.clone(),
                reason: e.to_string(),
            })?;
        info!(target = %target, "opening robot connection");
        let (health, _) = watch::channel(ConnectionHealth::Connected);
        Ok(Self {
            inner: Arc::new(ConnectionInner {
                target,
                client,
                retry,
                resolver: OnceCell::new(),
                health,
                monitor: Mutex::new(None),
            }),
        })
    }

    pub fn target(&self) -> &str {
        &self.inner.target
    }

    pub fn client(&self) -> &RobotClient {
        &self.inner.client
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry
    }

    /// Identity check: do two handles share the same inner connection?
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ── Name resolution ──────────────────────────────────────────────

    /// Build the name-resolution tables if they don't exist yet.
    ///
    /// Returns `true` once the tables are in place. A failed fetch logs
    /// a warning and returns `false`; the next call tries again.
    /// Concurrent callers coalesce onto a single fetch.
    pub async fn ensure_resolver(&self) -> bool {
        let result = self
            .inner
            .resolver
            .get_or_try_init(|| async {
                let locations =
                    call_with_retry(&self.inner.retry, || self.inner.client.list_locations())
                        .await?;
                let shelves =
                    call_with_retry(&self.inner.retry, || self.inner.client.list_shelves()).await?;
                let resolver = Resolver::new(&locations, &shelves);
                info!(
                    target = %self.inner.target,
                    locations = resolver.location_count(),
                    shelves = resolver.shelf_count(),
                    "resolver ready"
                );
                Ok::<_, RetryError>(resolver)
            })
            .await;

        match result {
            Ok(_) => true,
            Err(err) => {
                warn!(
                    target = %self.inner.target,
                    error = %err,
                    "resolver build failed, names will pass through unresolved"
                );
                false
            }
        }
    }

    /// Resolve a location name or id for use in a command. Falls back to
    /// pass-through when the tables can't be built.
    pub async fn resolve_location(&self, name_or_id: &str) -> String {
        self.ensure_resolver().await;
        match self.inner.resolver.get() {
            Some(resolver) => resolver.resolve_location(name_or_id),
            None => name_or_id.to_owned(),
        }
    }

    /// Resolve a shelf name or id, with the same fallback rules as
    /// [`resolve_location`](Self::resolve_location).
    pub async fn resolve_shelf(&self, name_or_id: &str) -> String {
        self.ensure_resolver().await;
        match self.inner.resolver.get() {
            Some(resolver) => resolver.resolve_shelf(name_or_id),
            None => name_or_id.to_owned(),
        }
    }

    // ── Liveness ─────────────────────────────────────────────────────

    /// One verified round-trip: identity plus current pose.
    pub async fn ping(&self) -> Result<PingReport, CoreError> {
        let info =
            call_with_retry(&self.inner.retry, || self.inner.client.get_robot_info()).await?;
        let pose = call_with_retry(&self.inner.retry, || self.inner.client.get_pose()).await?;
        Ok(PingReport {
            serial_number: info.serial_number,
            version: info.version,
            pose,
        })
    }

    /// Current link health, as of the last probe.
    pub fn health(&self) -> ConnectionHealth {
        *self.inner.health.borrow()
    }

    /// Subscribe to health transitions.
    pub fn subscribe_health(&self) -> watch::Receiver<ConnectionHealth> {
        self.inner.health.subscribe()
    }

    /// Wait until the probe reports the link up, bounded by `timeout`.
    /// Returns immediately when already connected.
    pub async fn wait_for_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.inner.health.subscribe();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|h| *h == ConnectionHealth::Connected)).await,
            Ok(Ok(_))
        )
    }

    // ── Health monitoring ────────────────────────────────────────────

    /// Start the background health probe. No-op while one is running.
    pub async fn start_monitoring(&self, interval: Duration) {
        let mut guard = self.inner.monitor.lock().await;
        if let Some(handle) = guard.as_ref() {
            if !handle.task.is_finished() {
                debug!(target = %self.inner.target, "health monitor already running");
                return;
            }
        }
        let cancel = CancellationToken::new();
        let task = tokio::spawn(health_probe_task(self.clone(), interval, cancel.clone()));
        *guard = Some(MonitorHandle { cancel, task });
        info!(target = %self.inner.target, ?interval, "health monitor started");
    }

    /// Stop the probe and wait (bounded) for it to exit. No-op when not
    /// running.
    pub async fn stop_monitoring(&self) {
        let handle = self.inner.monitor.lock().await.take();
        if let Some(MonitorHandle { cancel, task }) = handle {
            cancel.cancel();
            if tokio::time::timeout(STOP_GRACE, task).await.is_err() {
                warn!(target = %self.inner.target, "health monitor did not stop, detaching");
            }
            debug!(target = %self.inner.target, "health monitor stopped");
        }
    }
}

impl std::fmt::Debug for RobotConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobotConnection")
            .field("target", &self.inner.target)
            .field("health", &self.health())
            .finish_non_exhaustive()
    }
}

// ── Background health probe ─────────────────────────────────────────

/// Probe the robot on a fixed cadence and publish transitions.
///
/// A single failed probe marks the link down; the next success marks it
/// back up. The first tick fires immediately so a freshly started
/// monitor settles without waiting a full interval. Only cancellation
/// ends the loop.
async fn health_probe_task(
    conn: RobotConnection,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let healthy = conn.inner.client.get_robot_info().await.is_ok();
                let next = if healthy {
                    ConnectionHealth::Connected
                } else {
                    ConnectionHealth::Disconnected
                };
                conn.inner.health.send_if_modified(|current| {
                    if *current == next {
                        return false;
                    }
                    match next {
                        ConnectionHealth::Disconnected => {
                            warn!(target = %conn.inner.target, "robot unreachable");
                        }
                        ConnectionHealth::Connected => {
                            info!(target = %conn.inner.target, "robot reachable again");
                        }
                    }
                    *current = next;
                    true
                });
            }
        }
    }
    debug!(target = %conn.inner.target, "health probe exited");
}
