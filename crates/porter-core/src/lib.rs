// porter-core: Command execution and state synchronization on top of porter-api.
//
// - `registry` / `connection`: shared per-robot connections with link-health
//   monitoring and one-time name resolution
// - `executor`: the four-phase command protocol (start, confirm, poll, verify)
// - `poller`: the background state loop feeding copy-on-read snapshots
// - `controller`: the per-robot facade most consumers want

pub mod config;
pub mod connection;
pub mod controller;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod outcome;
pub mod poller;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod state;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::ControllerSettings;
pub use connection::{ConnectionHealth, DEFAULT_PORT, PingReport, RobotConnection};
pub use controller::RobotController;
pub use error::CoreError;
pub use executor::CommandExecutor;
pub use metrics::ExecutionMetrics;
pub use outcome::CommandOutcome;
pub use poller::ShelfDropCallback;
pub use registry::{ConnectionRegistry, ControllerRegistry, normalize_target};
pub use resolver::Resolver;
pub use retry::{DeadlineError, RetryError, RetryPolicy, call_until_deadline, call_with_retry};
pub use state::RobotState;
