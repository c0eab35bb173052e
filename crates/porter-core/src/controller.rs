// Robot controller
//
// The per-robot facade: owns the state-poller task, starts the link
// probe, and fronts the command executor with name resolution and
// shelf-drop arming. Cheap to clone; all clones share one inner, and
// dropping the last clone cancels whatever is still running.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use porter_api::models::RobotCommand;

use crate::config::ControllerSettings;
use crate::connection::{PingReport, RobotConnection};
use crate::error::CoreError;
use crate::executor::CommandExecutor;
use crate::metrics::ExecutionMetrics;
use crate::outcome::CommandOutcome;
use crate::poller::{PollerShared, STOP_GRACE, ShelfDropCallback, state_poll_task};
use crate::state::RobotState;

/// Full lifecycle for one robot: background state polling, link-health
/// monitoring, and command execution.
///
/// Commands are not reentrant: two overlapping calls race for the
/// robot's single command slot and the winner is undefined. Callers
/// issue one command at a time per robot.
#[derive(Clone)]
pub struct RobotController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    conn: RobotConnection,
    settings: ControllerSettings,
    executor: CommandExecutor,
    poller: Arc<PollerShared>,
    cancel: CancellationToken,
    poll_task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        // Non-blocking: background tasks observe the token and exit.
        self.cancel.cancel();
    }
}

impl RobotController {
    /// Create a controller. Background polling does not start until
    /// [`start`](Self::start).
    pub fn new(conn: RobotConnection, settings: ControllerSettings) -> Self {
        Self::with_shelf_callback(conn, settings, None)
    }

    /// Create a controller with a shelf-drop callback, invoked once per
    /// detected drop with the dropped shelf's id.
    pub fn with_shelf_callback(
        conn: RobotConnection,
        settings: ControllerSettings,
        on_shelf_dropped: Option<ShelfDropCallback>,
    ) -> Self {
        let poller = Arc::new(PollerShared::new(on_shelf_dropped));
        let executor = CommandExecutor::new(conn.clone(), settings.clone());
        Self {
            inner: Arc::new(ControllerInner {
                conn,
                settings,
                executor,
                poller,
                cancel: CancellationToken::new(),
                poll_task: Mutex::new(None),
            }),
        }
    }

    pub fn target(&self) -> &str {
        self.inner.conn.target()
    }

    pub fn connection(&self) -> &RobotConnection {
        &self.inner.conn
    }

    /// Identity check: do two handles share the same inner controller?
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start the state poller and the link-health probe. No-op while
    /// already running.
    pub async fn start(&self) {
        let mut guard = self.inner.poll_task.lock().await;
        if let Some((_, task)) = guard.as_ref() {
            if !task.is_finished() {
                debug!(target = %self.target(), "controller already running");
                return;
            }
        }
        self.inner
            .conn
            .start_monitoring(self.inner.settings.health_interval)
            .await;
        let cancel = self.inner.cancel.child_token();
        let task = tokio::spawn(state_poll_task(
            self.inner.conn.clone(),
            self.inner.settings.clone(),
            Arc::clone(&self.inner.poller),
            cancel.clone(),
        ));
        *guard = Some((cancel, task));
        info!(target = %self.target(), "controller started");
    }

    /// Stop polling and health monitoring. Waits (bounded) for the
    /// in-flight tick, so no poll lands after this returns. No-op when
    /// not running.
    pub async fn stop(&self) {
        let handle = self.inner.poll_task.lock().await.take();
        let was_running = handle.is_some();
        if let Some((cancel, task)) = handle {
            cancel.cancel();
            if tokio::time::timeout(STOP_GRACE, task).await.is_err() {
                warn!(target = %self.target(), "state poller did not stop in time, detaching");
            }
        }
        self.inner.conn.stop_monitoring().await;
        if was_running {
            info!(target = %self.target(), "controller stopped");
        }
    }

    // ── State, metrics, liveness ─────────────────────────────────────

    /// Copy-on-read snapshot of the robot state. Safe to hold; it never
    /// mutates under the caller.
    pub fn state(&self) -> Arc<RobotState> {
        self.inner.poller.snapshot()
    }

    /// Poll statistics for the most recent command execution.
    pub fn metrics(&self) -> ExecutionMetrics {
        self.inner.executor.metrics()
    }

    /// Clear poll statistics.
    pub fn reset_metrics(&self) {
        self.inner.executor.reset_metrics();
    }

    /// Clear a latched shelf drop (flag and carried-shelf id).
    pub fn reset_shelf_monitor(&self) {
        self.inner.poller.reset_shelf_monitor();
    }

    /// One verified round-trip to the robot.
    pub async fn ping(&self) -> Result<PingReport, CoreError> {
        self.inner.conn.ping().await
    }

    // ── Commands ─────────────────────────────────────────────────────
    //
    // Each resolves caller-supplied names to robot ids, runs the
    // executor, and echoes the original name as the outcome's target.

    /// Send the robot to a named location (or a raw location id).
    pub async fn move_to_location(
        &self,
        location: &str,
        timeout: Option<Duration>,
    ) -> CommandOutcome {
        let location_id = self.inner.conn.resolve_location(location).await;
        let command = RobotCommand::MoveToLocation { location_id };
        self.run(command, Some(location.to_owned()), timeout).await
    }

    /// Send the robot to an explicit map pose. `yaw` is radians.
    pub async fn move_to_pose(
        &self,
        x: f64,
        y: f64,
        yaw: f64,
        timeout: Option<Duration>,
    ) -> CommandOutcome {
        let command = RobotCommand::MoveToPose { x, y, yaw };
        self.run(command, Some(format!("({x:.2}, {y:.2}, {yaw:.2})")), timeout)
            .await
    }

    /// Carry a shelf to a location. Arms shelf-drop monitoring before
    /// the command starts so no carry window goes unwatched.
    pub async fn move_shelf(
        &self,
        shelf: &str,
        location: &str,
        timeout: Option<Duration>,
    ) -> CommandOutcome {
        let shelf_id = self.inner.conn.resolve_shelf(shelf).await;
        let location_id = self.inner.conn.resolve_location(location).await;
        self.inner.poller.arm_shelf_monitor();
        let command = RobotCommand::MoveShelf {
            shelf_id,
            location_id,
        };
        self.run(command, Some(format!("{shelf} -> {location}")), timeout)
            .await
    }

    /// Return a shelf to its home location. `None` targets whichever
    /// shelf the robot is carrying. A verified completion disarms
    /// shelf-drop monitoring; failures leave it armed because the robot
    /// may still be carrying.
    pub async fn return_shelf(
        &self,
        shelf: Option<&str>,
        timeout: Option<Duration>,
    ) -> CommandOutcome {
        let shelf_id = match shelf {
            Some(name) => self.inner.conn.resolve_shelf(name).await,
            None => String::new(),
        };
        let command = RobotCommand::ReturnShelf { shelf_id };
        let outcome = self.run(command, shelf.map(str::to_owned), timeout).await;
        if outcome.is_ok() {
            self.inner.poller.disarm_shelf_monitor();
        }
        outcome
    }

    /// Send the robot back to its charger.
    pub async fn return_home(&self, timeout: Option<Duration>) -> CommandOutcome {
        self.run(RobotCommand::ReturnHome, None, timeout).await
    }

    async fn run(
        &self,
        command: RobotCommand,
        target: Option<String>,
        timeout: Option<Duration>,
    ) -> CommandOutcome {
        let timeout = timeout.unwrap_or(self.inner.settings.command_timeout);
        self.inner.executor.execute(command, target, timeout).await
    }
}

impl std::fmt::Debug for RobotController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobotController")
            .field("target", &self.target())
            .finish_non_exhaustive()
    }
}
