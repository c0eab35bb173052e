// Robot control API client
//
// Thin wrapper around `reqwest::Client`: URL construction, JSON decode,
// and uniform error mapping. Methods are deliberately mechanical -- one
// endpoint, one typed response. Retry, polling, and outcome shaping all
// live in porter-core.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::{
    BatteryInfo, CommandStateResponse, ErrorDefinition, LastCommandResult, Location, MovingShelf,
    Pose, RobotInfo, Shelf, StartCommandRequest, StartCommandResponse,
};
use crate::transport::TransportConfig;

/// Async client for one robot's on-board HTTP API.
///
/// Cheap to clone; clones share the same connection pool.
#[derive(Debug, Clone)]
pub struct RobotClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RobotClient {
    /// Create a client for the robot at `target` (a `host:port` pair).
    pub fn new(target: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let base_url = Url::parse(&format!("http://{target}/"))?;
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Create a client from a pre-built `reqwest::Client` and base URL.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Request plumbing ─────────────────────────────────────────────

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.endpoint(path)?;
        debug!(%url, "GET");
        let response = self.http.get(url).send().await.map_err(Error::Transport)?;
        Self::decode(response).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, Error> {
        let url = self.endpoint(path)?;
        debug!(%url, "POST");
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;
        Self::decode(response).await
    }

    /// Decode a JSON body, mapping non-2xx statuses to [`Error::Api`]
    /// with a best-effort message pulled from the body.
    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, Error> {
        let status = response.status();
        let body = response.text().await.map_err(Error::Transport)?;

        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: extract_message(&body, status),
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    // ── Command slot ─────────────────────────────────────────────────

    /// Submit a command to the robot's single command slot.
    pub async fn start_command(
        &self,
        request: &StartCommandRequest,
    ) -> Result<StartCommandResponse, Error> {
        self.post("api/command", request).await
    }

    /// State of the command slot. The id is empty when the robot is idle.
    pub async fn get_command_state(&self) -> Result<CommandStateResponse, Error> {
        self.get("api/command/state").await
    }

    /// Verdict of the most recently finished command.
    pub async fn get_last_command_result(&self) -> Result<LastCommandResult, Error> {
        self.get("api/command/result").await
    }

    // ── Map inventory ────────────────────────────────────────────────

    /// All destinations registered on the robot's map.
    pub async fn list_locations(&self) -> Result<Vec<Location>, Error> {
        self.get("api/locations").await
    }

    /// All shelves the robot knows about.
    pub async fn list_shelves(&self) -> Result<Vec<Shelf>, Error> {
        self.get("api/shelves").await
    }

    // ── Robot status ─────────────────────────────────────────────────

    /// Current map-frame pose.
    pub async fn get_pose(&self) -> Result<Pose, Error> {
        self.get("api/pose").await
    }

    /// Battery charge and charging status.
    pub async fn get_battery_info(&self) -> Result<BatteryInfo, Error> {
        self.get("api/battery").await
    }

    /// Shelf currently being carried, if any.
    pub async fn get_moving_shelf(&self) -> Result<MovingShelf, Error> {
        self.get("api/moving_shelf").await
    }

    /// Serial number and firmware version. Doubles as the liveness probe.
    pub async fn get_robot_info(&self) -> Result<RobotInfo, Error> {
        self.get("api/robot_info").await
    }

    // ── Error definitions ────────────────────────────────────────────

    /// The robot's error-code table, used to turn numeric codes into
    /// readable text.
    pub async fn get_error_definitions(&self) -> Result<Vec<ErrorDefinition>, Error> {
        self.get("api/error_definitions").await
    }
}

/// Pull a human-readable message out of an error response body.
/// Falls back to the raw body, then the status line.
fn extract_message(body: &str, status: reqwest::StatusCode) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error", "detail"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                return text.to_owned();
            }
        }
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() && trimmed.len() <= 200 {
        return trimmed.to_owned();
    }
    status
        .canonical_reason()
        .unwrap_or("unknown error")
        .to_owned()
}
