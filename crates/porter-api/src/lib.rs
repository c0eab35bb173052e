//! Async Rust client for the Porter robot's on-board HTTP control API.
//!
//! This crate is the wire layer only: typed endpoint calls, error
//! classification, and transport configuration. Command execution,
//! retry policy, and state polling live in `porter-core`.

pub mod client;
pub mod error;
pub mod models;
pub mod transport;

// ── Primary re-exports ──
pub use client::RobotClient;
pub use error::{Error, ErrorKind};
pub use transport::TransportConfig;
