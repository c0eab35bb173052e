// State poller
//
// One owned task per controller keeps `RobotState` fresh: pose and
// command-slot activity on the fast cadence, battery on the slow one,
// and, while armed, the carried-shelf watch. Health transitions from
// the connection probe are mirrored into the snapshot by the same loop,
// so there is exactly one writer. The loop never exits on error; only
// cancellation ends it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use porter_api::models::CommandState;

use crate::config::ControllerSettings;
use crate::connection::{ConnectionHealth, RobotConnection};
use crate::state::RobotState;

/// Invoked once per detected drop, with the id of the shelf that went
/// missing. Runs on the poller task: keep it quick.
pub type ShelfDropCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// How long `stop` waits for an in-flight tick before detaching.
pub(crate) const STOP_GRACE: Duration = Duration::from_secs(5);

// ── Shared poller state ─────────────────────────────────────────────

/// State shared between the poll task and the controller surface.
///
/// Writers mutate the working copy under a short-held lock and publish
/// a full clone; readers load the published `Arc` and never contend.
pub(crate) struct PollerShared {
    working: Mutex<RobotState>,
    snapshot: ArcSwap<RobotState>,
    monitor_armed: AtomicBool,
    on_shelf_dropped: Option<ShelfDropCallback>,
}

impl PollerShared {
    pub(crate) fn new(on_shelf_dropped: Option<ShelfDropCallback>) -> Self {
        Self {
            working: Mutex::new(RobotState::default()),
            snapshot: ArcSwap::from_pointee(RobotState::default()),
            monitor_armed: AtomicBool::new(false),
            on_shelf_dropped,
        }
    }

    /// Latest published snapshot. The caller owns the copy; nothing
    /// aliases the poller's working state.
    pub(crate) fn snapshot(&self) -> Arc<RobotState> {
        self.snapshot.load_full()
    }

    /// Apply `f` to the working state and publish the result whole.
    /// A poisoned lock means a panicked tick; recover with the last
    /// value rather than killing the poller.
    pub(crate) fn update(&self, f: impl FnOnce(&mut RobotState)) {
        let mut guard = self.working.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
        self.snapshot.store(Arc::new(guard.clone()));
    }

    // ── Shelf-drop monitoring ────────────────────────────────────────

    /// Start watching the carried shelf on the fast cadence.
    pub(crate) fn arm_shelf_monitor(&self) {
        self.monitor_armed.store(true, Ordering::SeqCst);
        debug!("shelf-drop monitoring armed");
    }

    /// Stop watching and forget the carried shelf. Used when a carry
    /// ends normally.
    pub(crate) fn disarm_shelf_monitor(&self) {
        self.monitor_armed.store(false, Ordering::SeqCst);
        self.update(|state| state.moving_shelf_id = None);
        debug!("shelf-drop monitoring disarmed");
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.monitor_armed.load(Ordering::SeqCst)
    }

    /// Clear a latched drop so the next carry starts clean. Does not
    /// re-arm anything.
    pub(crate) fn reset_shelf_monitor(&self) {
        self.update(|state| {
            state.shelf_dropped = false;
            state.moving_shelf_id = None;
        });
    }

    /// Record one observation of the robot's carried shelf.
    ///
    /// A present→absent transition while armed is a drop: latch the
    /// flag, disarm, and fire the callback exactly once.
    pub(crate) fn observe_moving_shelf(&self, observed: Option<String>) {
        let dropped = {
            let mut guard = self.working.lock().unwrap_or_else(PoisonError::into_inner);
            match observed {
                Some(id) => {
                    if guard.moving_shelf_id.as_deref() != Some(id.as_str()) {
                        guard.moving_shelf_id = Some(id);
                        self.snapshot.store(Arc::new(guard.clone()));
                    }
                    None
                }
                None => guard.moving_shelf_id.take().inspect(|_| {
                    guard.shelf_dropped = true;
                    self.snapshot.store(Arc::new(guard.clone()));
                }),
            }
        };

        if let Some(shelf_id) = dropped {
            self.monitor_armed.store(false, Ordering::SeqCst);
            warn!(shelf_id = %shelf_id, "carried shelf no longer detected");
            if let Some(callback) = &self.on_shelf_dropped {
                callback(&shelf_id);
            }
        }
    }
}

// ── Poll task ───────────────────────────────────────────────────────

/// The controller's background loop.
///
/// The first tick fires immediately, so a freshly started controller
/// has a populated snapshot within one round-trip. While the link is
/// down, ticks skip remote calls; the health transition back to
/// connected forces a full refresh instead.
pub(crate) async fn state_poll_task(
    conn: RobotConnection,
    settings: ControllerSettings,
    shared: Arc<PollerShared>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(settings.fast_interval);
    let mut health_rx = conn.subscribe_health();
    let mut health_alive = true;
    let mut last_battery: Option<Instant> = None;

    // The probe may have marked the link down before this task
    // subscribed; transitions only fire for changes after that point.
    if *health_rx.borrow_and_update() == ConnectionHealth::Disconnected {
        shared.update(|state| {
            state.connection = ConnectionHealth::Disconnected;
            state.disconnected_at = Some(Utc::now());
        });
    }

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = health_rx.changed(), if health_alive => {
                if changed.is_ok() {
                    let health = *health_rx.borrow_and_update();
                    apply_health_transition(&conn, &shared, health, &mut last_battery, &settings)
                        .await;
                } else {
                    health_alive = false;
                }
            }
            _ = interval.tick() => {
                if conn.health() == ConnectionHealth::Connected {
                    poll_tick(&conn, &shared, &mut last_battery, &settings).await;
                }
            }
        }
    }
    debug!(target = %conn.target(), "state poller exited");
}

/// Mirror a probe transition into the snapshot. Reconnects force a full
/// refresh so the snapshot reflects the robot as it is now, not as it
/// was before the outage.
async fn apply_health_transition(
    conn: &RobotConnection,
    shared: &PollerShared,
    health: ConnectionHealth,
    last_battery: &mut Option<Instant>,
    settings: &ControllerSettings,
) {
    match health {
        ConnectionHealth::Disconnected => {
            warn!(target = %conn.target(), "link lost, pausing state polls");
            shared.update(|state| {
                state.connection = ConnectionHealth::Disconnected;
                state.disconnected_at = Some(Utc::now());
            });
        }
        ConnectionHealth::Connected => {
            info!(target = %conn.target(), "link restored, refreshing state");
            shared.update(|state| {
                state.connection = ConnectionHealth::Connected;
                state.last_reconnect_at = Some(Utc::now());
            });
            *last_battery = None;
            poll_tick(conn, shared, last_battery, settings).await;
        }
    }
}

/// One full pass: fast pair, slow lane when due, drop watch when armed.
async fn poll_tick(
    conn: &RobotConnection,
    shared: &PollerShared,
    last_battery: &mut Option<Instant>,
    settings: &ControllerSettings,
) {
    // Fast pair: pose + command-slot activity, published together.
    let pose = conn.client().get_pose().await;
    let slot = conn.client().get_command_state().await;
    if pose.is_ok() || slot.is_ok() {
        shared.update(|state| {
            if let Ok(pose) = &pose {
                state.pose_x = pose.x;
                state.pose_y = pose.y;
                state.pose_theta = pose.theta;
            }
            if let Ok(slot) = &slot {
                state.is_command_running = slot.state == CommandState::Running;
            }
            state.last_updated = Some(Utc::now());
        });
    }
    if let Err(err) = &pose {
        debug!(error = %err, "pose poll failed");
    }
    if let Err(err) = &slot {
        debug!(error = %err, "command-slot poll failed");
    }

    // Slow lane: battery. Failed reads retry on the next fast tick.
    if last_battery.is_none_or(|at| at.elapsed() >= settings.slow_interval) {
        match conn.client().get_battery_info().await {
            Ok(battery) => {
                *last_battery = Some(Instant::now());
                shared.update(|state| state.battery_pct = battery.percentage);
            }
            Err(err) => debug!(error = %err, "battery poll failed"),
        }
    }

    // Drop watch: only while a carry command has armed it.
    if shared.is_armed() {
        match conn.client().get_moving_shelf().await {
            Ok(moving) => {
                let observed = if moving.shelf_id.is_empty() {
                    None
                } else {
                    Some(moving.shelf_id)
                };
                shared.observe_moving_shelf(observed);
            }
            Err(err) => debug!(error = %err, "moving-shelf poll failed"),
        }
    }
}
