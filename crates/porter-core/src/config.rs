// Runtime controller configuration
//
// Tuning knobs for the poller and executor, constructed by the caller
// (or translated from porter-config profiles). Core never reads config
// files.

use std::time::Duration;

/// Timing configuration for a [`RobotController`](crate::RobotController).
///
/// Defaults are tuned for a robot on local Wi-Fi: second-scale command
/// polling, half-minute battery refresh, and a two-minute command budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Fast poll cadence: pose and command-slot activity. Default: 1s.
    pub fast_interval: Duration,
    /// Slow poll cadence: battery. Default: 30s.
    pub slow_interval: Duration,
    /// Delay between completion polls inside command execution. Default: 1s.
    pub poll_interval: Duration,
    /// Delay between deadline-bounded start retries. Default: 1s.
    pub retry_delay: Duration,
    /// Command deadline used when the caller passes none. Default: 120s.
    pub command_timeout: Duration,
    /// Window granted for a started command to appear in the robot's
    /// command slot. Default: 5s.
    pub registration_window: Duration,
    /// Probe cadence inside the registration window. Default: 200ms.
    pub registration_probe: Duration,
    /// Cadence of the connection health probe. Default: 5s.
    pub health_interval: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            fast_interval: Duration::from_secs(1),
            slow_interval: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            retry_delay: Duration::from_secs(1),
            command_timeout: Duration::from_secs(120),
            registration_window: Duration::from_secs(5),
            registration_probe: Duration::from_millis(200),
            health_interval: Duration::from_secs(5),
        }
    }
}
