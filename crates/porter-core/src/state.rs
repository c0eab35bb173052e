// Robot state snapshot
//
// One value type, refreshed by the state poller, copied out to readers.
// Readers never see a half-updated struct: the poller builds the next
// copy under its working lock and publishes it whole.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::connection::ConnectionHealth;

/// Point-in-time view of one robot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RobotState {
    /// Battery charge percentage, refreshed on the slow cadence.
    pub battery_pct: i32,
    /// Map-frame pose, refreshed on the fast cadence.
    pub pose_x: f64,
    pub pose_y: f64,
    pub pose_theta: f64,
    /// Whether a command currently occupies the robot's command slot.
    pub is_command_running: bool,
    /// When the fast-cadence fields last refreshed successfully.
    pub last_updated: Option<DateTime<Utc>>,
    /// Shelf the robot is carrying, tracked while drop monitoring is
    /// armed. `None` when empty-handed or unmonitored.
    pub moving_shelf_id: Option<String>,
    /// Latched when a carried shelf goes missing. Cleared only by an
    /// explicit monitor reset.
    pub shelf_dropped: bool,
    /// Link liveness as of the last health probe.
    pub connection: ConnectionHealth,
    /// When the link was last observed going down.
    pub disconnected_at: Option<DateTime<Utc>>,
    /// When the link last came back.
    pub last_reconnect_at: Option<DateTime<Utc>>,
}

impl Default for RobotState {
    fn default() -> Self {
        Self {
            battery_pct: 0,
            pose_x: 0.0,
            pose_y: 0.0,
            pose_theta: 0.0,
            is_command_running: false,
            last_updated: None,
            moving_shelf_id: None,
            shelf_dropped: false,
            connection: ConnectionHealth::Connected,
            disconnected_at: None,
            last_reconnect_at: None,
        }
    }
}
