// Command outcomes
//
// The single result shape every command path produces. Failures are
// data, not `Err`: nothing on the command path escapes as a Rust error,
// so callers handle one envelope instead of two channels. The serialized
// form is the integration contract with tool layers and scripts:
//
//   { "ok": true,  "action": ..., "target": ..., "elapsed": ... }
//   { "ok": false, "error": ...,  "retryable": ..., "attempts": ..., "action": ... }
//   { "ok": false, "error_code": ..., "error": ..., "action": ..., "target": ... }
//   { "ok": false, "error": "TIMEOUT", "timeout": ..., "action": ... }
//   { "ok": false, "error": "DISCONNECTED", "elapsed": ..., "action": ... }

use serde::Serialize;
use std::time::Duration;

/// Result of one command execution.
///
/// Which variant you get tells you *where* the command died: `Transport`
/// never reached the robot, `Robot` ran and failed on the machine,
/// `Timeout` ran out of deadline without a verified result, and
/// `Disconnected` never saw the link come back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandOutcome {
    /// The command ran to a verified completion.
    Success {
        ok: bool,
        action: String,
        /// The caller-supplied destination or shelf, as originally named.
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        /// Seconds from invocation to verified completion.
        elapsed: f64,
    },

    /// Transport gave out before the robot accepted the command.
    Transport {
        ok: bool,
        error: String,
        /// `false` means the failure was permanent and only one attempt
        /// was made.
        retryable: bool,
        attempts: u32,
        action: String,
    },

    /// The robot accepted the command and reported a domain failure.
    Robot {
        ok: bool,
        error_code: i32,
        /// `error_code=<N>: <description>` when the error table was
        /// reachable, bare `error_code=<N>` otherwise.
        error: String,
        action: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },

    /// The overall deadline passed without a verified completion.
    Timeout {
        ok: bool,
        error: String,
        /// The configured deadline, in seconds.
        timeout: f64,
        action: String,
    },

    /// The link stayed down for the whole deadline.
    Disconnected {
        ok: bool,
        error: String,
        elapsed: f64,
        action: String,
    },
}

impl CommandOutcome {
    pub fn success(action: &str, target: Option<String>, elapsed: f64) -> Self {
        Self::Success {
            ok: true,
            action: action.to_owned(),
            target,
            elapsed,
        }
    }

    pub fn transport_failure(action: &str, error: String, retryable: bool, attempts: u32) -> Self {
        Self::Transport {
            ok: false,
            error,
            retryable,
            attempts,
            action: action.to_owned(),
        }
    }

    pub fn robot_failure(
        action: &str,
        target: Option<String>,
        error_code: i32,
        error: String,
    ) -> Self {
        Self::Robot {
            ok: false,
            error_code,
            error,
            action: action.to_owned(),
            target,
        }
    }

    pub fn timeout(action: &str, timeout: Duration) -> Self {
        Self::Timeout {
            ok: false,
            error: "TIMEOUT".to_owned(),
            timeout: timeout.as_secs_f64(),
            action: action.to_owned(),
        }
    }

    pub fn disconnected(action: &str, elapsed: f64) -> Self {
        Self::Disconnected {
            ok: false,
            error: "DISCONNECTED".to_owned(),
            elapsed,
            action: action.to_owned(),
        }
    }

    /// Returns `true` only for a verified success.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The robot error code, when the robot itself reported failure.
    pub fn error_code(&self) -> Option<i32> {
        match self {
            Self::Robot { error_code, .. } => Some(*error_code),
            _ => None,
        }
    }

    /// The action name this outcome belongs to.
    pub fn action(&self) -> &str {
        match self {
            Self::Success { action, .. }
            | Self::Transport { action, .. }
            | Self::Robot { action, .. }
            | Self::Timeout { action, .. }
            | Self::Disconnected { action, .. } => action,
        }
    }
}
