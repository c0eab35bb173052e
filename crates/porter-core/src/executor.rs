// Command executor
//
// Drives one command through the robot's single command slot under one
// shared deadline:
//
//   1. start:   submit, retrying transient failures until the deadline
//   2. confirm: wait (bounded) for the slot to report our command id
//   3. poll:    watch the slot until it leaves pending/running or the
//               id changes, then verify the posted result is ours
//   4. give up: deadline spent without a verified result
//
// The slot id is the authoritative completion signal. The idle slot
// reports `pending` with an empty id, and a *different* id means we
// were preempted, so state alone proves nothing.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use porter_api::models::{CommandResult, RobotCommand, StartCommandRequest};

use crate::config::ControllerSettings;
use crate::connection::{ConnectionHealth, RobotConnection};
use crate::metrics::ExecutionMetrics;
use crate::outcome::CommandOutcome;
use crate::retry::{DeadlineError, call_until_deadline, call_with_retry};

/// Verdict of one result-endpoint read during completion handling.
enum ResultVerdict {
    /// The posted result belongs to our command.
    Ours(CommandResult),
    /// Someone else's result is posted; ours may still be coming.
    NotOurs,
    /// The fetch burned the rest of the deadline.
    DeadlineSpent,
}

/// Runs the start → confirm → poll → verify protocol for one command.
///
/// Not reentrant per connection: two concurrent calls race for the
/// robot's single command slot and the loser observes a cancellation or
/// times out. Callers serialize invocations; the controller does so by
/// construction.
pub struct CommandExecutor {
    conn: RobotConnection,
    settings: ControllerSettings,
    metrics: Mutex<ExecutionMetrics>,
}

impl CommandExecutor {
    pub fn new(conn: RobotConnection, settings: ControllerSettings) -> Self {
        Self {
            conn,
            settings,
            metrics: Mutex::new(ExecutionMetrics::default()),
        }
    }

    /// Execute `command` to a verified completion, failure, or timeout.
    ///
    /// `target` is the caller's original name for the destination or
    /// shelf; it is echoed into the outcome untouched. Every failure
    /// mode comes back as a [`CommandOutcome`], never an `Err`.
    pub async fn execute(
        &self,
        command: RobotCommand,
        target: Option<String>,
        timeout: Duration,
    ) -> CommandOutcome {
        let action = command.action();
        let started = Instant::now();
        let deadline = started + timeout;

        debug!(action, ?target, timeout_secs = timeout.as_secs_f64(), "executing command");

        // The probe may already know the link is down. Spend the budget
        // waiting for it to come back rather than on doomed sends.
        if self.conn.health() == ConnectionHealth::Disconnected {
            info!(action, "link down, waiting for reconnect");
            if !self.conn.wait_for_connected(timeout).await {
                let elapsed = started.elapsed().as_secs_f64();
                warn!(action, elapsed, "link stayed down past the deadline");
                return CommandOutcome::disconnected(action, elapsed);
            }
        }

        // Phase 1: start.
        let request = StartCommandRequest {
            command,
            cancel_all: true,
            title: String::new(),
        };
        let accepted = match call_until_deadline(
            || self.conn.client().start_command(&request),
            deadline,
            self.settings.retry_delay,
        )
        .await
        {
            Ok(response) => response,
            Err(DeadlineError::Permanent { source, attempts }) => {
                warn!(action, error = %source, "start rejected permanently");
                return CommandOutcome::transport_failure(
                    action,
                    source.to_string(),
                    false,
                    attempts,
                );
            }
            Err(DeadlineError::Expired { last, attempts }) => {
                warn!(action, error = %last, attempts, "start never landed before the deadline");
                return CommandOutcome::timeout(action, timeout);
            }
        };

        if !accepted.result.success {
            let error = self.enrich_error(accepted.result.error_code).await;
            warn!(action, code = accepted.result.error_code, "robot rejected the command");
            return CommandOutcome::robot_failure(
                action,
                target,
                accepted.result.error_code,
                error,
            );
        }
        let command_id = accepted.command_id;
        debug!(action, command_id = %command_id, "command accepted");

        // Phase 2: confirm registration. Expiry is survivable.
        self.confirm_registration(&command_id, deadline).await;

        // Phases 3 and 4: poll to completion or deadline.
        self.poll_to_completion(action, target, &command_id, started, deadline, timeout)
            .await
    }

    /// Wait (bounded) until the robot's command slot reports the id we
    /// just started.
    ///
    /// Expiry gets a warning, not a failure: a slow robot may publish
    /// the slot late, and completion polling verifies the result id
    /// anyway.
    async fn confirm_registration(&self, command_id: &str, deadline: Instant) {
        let window_end = deadline.min(Instant::now() + self.settings.registration_window);
        loop {
            if Instant::now() >= window_end {
                warn!(command_id, "command not visible in slot, proceeding to completion polls");
                return;
            }
            match self.conn.client().get_command_state().await {
                Ok(slot) if slot.command_id == command_id && slot.state.is_active() => {
                    debug!(command_id, state = ?slot.state, "command registered");
                    return;
                }
                Ok(_) => {}
                Err(err) => debug!(error = %err, "registration probe failed"),
            }
            tokio::time::sleep(self.settings.registration_probe).await;
        }
    }

    /// Poll the command slot until completion, verify the posted result,
    /// and shape the outcome.
    async fn poll_to_completion(
        &self,
        action: &str,
        target: Option<String>,
        command_id: &str,
        started: Instant,
        deadline: Instant,
        timeout: Duration,
    ) -> CommandOutcome {
        while Instant::now() < deadline {
            let poll_started = Instant::now();
            match self.conn.client().get_command_state().await {
                Ok(slot) => {
                    self.record_poll_success(poll_started.elapsed());
                    let completed = !slot.state.is_active() || slot.command_id != command_id;
                    if completed {
                        debug!(
                            command_id,
                            slot_id = %slot.command_id,
                            state = ?slot.state,
                            "completion signal"
                        );
                        match self.fetch_result_verdict(command_id, deadline).await {
                            ResultVerdict::Ours(result) if result.success => {
                                let elapsed = started.elapsed().as_secs_f64();
                                info!(action, command_id, elapsed, "command completed");
                                return CommandOutcome::success(action, target, elapsed);
                            }
                            ResultVerdict::Ours(result) => {
                                let error = self.enrich_error(result.error_code).await;
                                warn!(
                                    action,
                                    command_id,
                                    code = result.error_code,
                                    "command failed on the robot"
                                );
                                return CommandOutcome::robot_failure(
                                    action,
                                    target,
                                    result.error_code,
                                    error,
                                );
                            }
                            ResultVerdict::NotOurs => {
                                debug!(command_id, "posted result is not ours, continuing to poll");
                            }
                            ResultVerdict::DeadlineSpent => break,
                        }
                    }
                }
                Err(err) => {
                    self.record_poll_failure();
                    debug!(error = %err, "completion poll failed");
                }
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }

        warn!(action, command_id, timeout_secs = timeout.as_secs_f64(), "command timed out");
        CommandOutcome::timeout(action, timeout)
    }

    /// Read the last-result endpoint (retrying transport failures until
    /// the deadline) and check whose result is posted.
    async fn fetch_result_verdict(&self, command_id: &str, deadline: Instant) -> ResultVerdict {
        match call_until_deadline(
            || self.conn.client().get_last_command_result(),
            deadline,
            self.settings.retry_delay,
        )
        .await
        {
            Ok(last) if last.command_id == command_id => ResultVerdict::Ours(last.result),
            Ok(_) => ResultVerdict::NotOurs,
            Err(DeadlineError::Permanent { source, .. }) => {
                // Can't verify right now; treat like a foreign result and
                // let the next completion signal try again.
                debug!(error = %source, "result fetch failed, continuing to poll");
                ResultVerdict::NotOurs
            }
            Err(DeadlineError::Expired { .. }) => ResultVerdict::DeadlineSpent,
        }
    }

    /// Best-effort expansion of a robot error code into readable text.
    ///
    /// The code must survive even when the table fetch fails, so the
    /// fallback is the bare `error_code=<N>` form.
    async fn enrich_error(&self, code: i32) -> String {
        match call_with_retry(self.conn.retry_policy(), || {
            self.conn.client().get_error_definitions()
        })
        .await
        {
            Ok(definitions) => match definitions.iter().find(|def| def.code == code) {
                Some(def) => {
                    let text = if def.title.is_empty() {
                        def.description.as_str()
                    } else {
                        def.title.as_str()
                    };
                    if text.is_empty() {
                        format!("error_code={code}")
                    } else {
                        format!("error_code={code}: {text}")
                    }
                }
                None => format!("error_code={code}"),
            },
            Err(err) => {
                debug!(error = %err, code, "error-definition fetch failed, using bare code");
                format!("error_code={code}")
            }
        }
    }

    // ── Metrics ──────────────────────────────────────────────────────

    /// Poll statistics for the most recent invocation. Meaningful once
    /// `execute` has returned.
    pub fn metrics(&self) -> ExecutionMetrics {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Clear poll statistics. Callers decide the boundary between runs.
    pub fn reset_metrics(&self) {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
    }

    fn record_poll_success(&self, rtt: Duration) {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_success(rtt);
    }

    fn record_poll_failure(&self) {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_failure();
    }
}
