// Robot control API wire types
//
// Models mirror the JSON the robot serves verbatim; higher-level semantics
// (name resolution, outcome shaping) live in porter-core. Fields use
// `#[serde(default)]` where firmware is known to omit them.

use serde::{Deserialize, Serialize};

// ── Geometry ─────────────────────────────────────────────────────────

/// 2D pose in the map frame. `theta` is radians, counter-clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub theta: f64,
}

// ── Robot status ─────────────────────────────────────────────────────

/// Battery charge and charging status from `api/battery`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryInfo {
    /// Charge percentage, 0-100.
    pub percentage: i32,
    /// `"charging"`, `"discharging"`, or firmware-specific strings.
    #[serde(default)]
    pub power_status: String,
}

/// Identity block from `api/robot_info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotInfo {
    pub serial_number: String,
    #[serde(default)]
    pub version: String,
}

/// Shelf currently docked under the robot, from `api/moving_shelf`.
/// `shelf_id` is empty when the robot is not carrying anything.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MovingShelf {
    #[serde(default)]
    pub shelf_id: String,
}

// ── Map inventory ────────────────────────────────────────────────────

/// A named destination registered on the robot's map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location_type: String,
    #[serde(default)]
    pub pose: Pose,
}

/// A shelf the robot can dock under and carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shelf {
    pub id: String,
    pub name: String,
    /// Location the shelf is returned to by a bare return command.
    #[serde(default)]
    pub home_location_id: String,
}

// ── Commands ─────────────────────────────────────────────────────────

/// A command the robot can execute.
///
/// Serialized with an internal `type` tag, matching the robot's command
/// envelope. A [`RobotCommand::ReturnShelf`] with an empty `shelf_id`
/// targets whichever shelf the robot is currently carrying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RobotCommand {
    /// Drive to a registered location by id.
    MoveToLocation { location_id: String },
    /// Drive to an explicit map pose. `yaw` is radians.
    MoveToPose { x: f64, y: f64, yaw: f64 },
    /// Pick up a shelf and carry it to a location.
    MoveShelf {
        shelf_id: String,
        location_id: String,
    },
    /// Return a shelf to its home location.
    ReturnShelf {
        #[serde(default)]
        shelf_id: String,
    },
    /// Drive back to the charger.
    ReturnHome,
}

impl RobotCommand {
    /// Short action name used in result envelopes and logs.
    pub fn action(&self) -> &'static str {
        match self {
            Self::MoveToLocation { .. } => "move_to_location",
            Self::MoveToPose { .. } => "move_to_pose",
            Self::MoveShelf { .. } => "move_shelf",
            Self::ReturnShelf { .. } => "return_shelf",
            Self::ReturnHome => "return_home",
        }
    }
}

/// Lifecycle state of the robot's single command slot.
///
/// The idle slot reports `pending` with an empty command id, so state
/// alone never proves anything about a specific command -- always pair
/// it with the id from [`CommandStateResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    #[default]
    Unspecified,
    Pending,
    Running,
    /// Firmware states this client does not know about.
    #[serde(other)]
    Unknown,
}

impl CommandState {
    /// Returns `true` while the slot is occupied (pending or running).
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

/// Immediate or final verdict for one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    /// Robot error code; `0` when `success` is `true`.
    #[serde(default)]
    pub error_code: i32,
}

/// Body for `POST api/command`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartCommandRequest {
    pub command: RobotCommand,
    /// Cancel whatever occupies the slot before starting. The slot holds
    /// one command, so this is how preemption happens.
    pub cancel_all: bool,
    /// Free-form label shown on the robot's own UI. Optional.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
}

/// Response to `POST api/command`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartCommandResponse {
    pub result: CommandResult,
    /// Identifier assigned to the accepted command; empty on rejection.
    #[serde(default)]
    pub command_id: String,
}

/// Response to `GET api/command/state`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommandStateResponse {
    #[serde(default)]
    pub state: CommandState,
    /// Id of the command occupying the slot; empty when idle.
    #[serde(default)]
    pub command_id: String,
}

/// Response to `GET api/command/result`: verdict of the most recently
/// finished command, tagged with its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastCommandResult {
    pub result: CommandResult,
    #[serde(default)]
    pub command_id: String,
}

// ── Error definitions ────────────────────────────────────────────────

/// One entry of the robot's error-code table from `api/error_definitions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDefinition {
    pub code: i32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}
