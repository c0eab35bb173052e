use thiserror::Error;

/// Top-level error type for the `porter-api` crate.
///
/// Covers every failure mode of a robot API call: transport, URL
/// construction, non-2xx statuses, and body decoding. `porter-core`
/// classifies these via [`Error::kind`] to drive its retry decisions.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Robot API ───────────────────────────────────────────────────
    /// Non-2xx status from the robot, with a best-effort message pulled
    /// from the response body.
    #[error("Robot API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

/// Coarse failure classification, modeled on RPC status codes.
///
/// The first three kinds describe conditions that tend to clear on their
/// own (robot rebooting, Wi-Fi blip, momentary overload) and are worth
/// retrying. The rest are permanent: the request itself is wrong, or
/// retrying cannot change the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Robot unreachable: connection refused, DNS failure, 502/503.
    Unavailable,
    /// The request timed out, client-side or via 504.
    DeadlineExceeded,
    /// The robot is shedding load (429).
    ResourceExhausted,
    /// The request was malformed (400/422).
    InvalidArgument,
    /// The addressed resource does not exist (404).
    NotFound,
    /// Anything else.
    Other,
}

impl ErrorKind {
    /// Returns `true` for kinds worth retrying with backoff.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Unavailable | Self::DeadlineExceeded | Self::ResourceExhausted
        )
    }
}

impl Error {
    /// Classify this error for retry decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(e) => {
                if e.is_timeout() {
                    ErrorKind::DeadlineExceeded
                } else if e.is_connect() {
                    ErrorKind::Unavailable
                } else {
                    ErrorKind::Other
                }
            }
            Self::Api { status, .. } => match status {
                429 => ErrorKind::ResourceExhausted,
                400 | 422 => ErrorKind::InvalidArgument,
                404 => ErrorKind::NotFound,
                502 | 503 => ErrorKind::Unavailable,
                504 => ErrorKind::DeadlineExceeded,
                _ => ErrorKind::Other,
            },
            Self::InvalidUrl(_) | Self::Deserialization { .. } => ErrorKind::Other,
        }
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}
