// Core error types
//
// Construction and plumbing failures only. The command path never
// returns these: execution failures are data, captured in
// `CommandOutcome`.

use thiserror::Error;

use crate::retry::RetryError;

/// Top-level error type for the `porter-core` crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The robot address could not be turned into a usable base URL.
    #[error("Invalid robot target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    /// A direct API call failed outside the command path.
    #[error(transparent)]
    Api(#[from] porter_api::Error),

    /// A retried call gave up.
    #[error(transparent)]
    Retry(#[from] RetryError),
}
