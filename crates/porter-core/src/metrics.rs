// Execution metrics
//
// Poll statistics for one `execute()` invocation. Single-writer by
// construction: only the in-flight execution records into the set, and
// callers read it after the outcome comes back. Reading mid-flight is
// harmless but shows a torn window of the run.

use std::time::Duration;

/// Completion-poll statistics accumulated during one command execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionMetrics {
    /// Round-trip time of each successful completion poll, milliseconds.
    pub poll_rtt_ms: Vec<f64>,
    /// Total completion polls issued.
    pub poll_count: u32,
    /// Polls that returned a usable slot state.
    pub poll_success_count: u32,
    /// Polls that died at the transport layer.
    pub poll_failure_count: u32,
}

impl ExecutionMetrics {
    pub fn record_success(&mut self, rtt: Duration) {
        self.poll_count += 1;
        self.poll_success_count += 1;
        self.poll_rtt_ms.push(rtt.as_secs_f64() * 1000.0);
    }

    pub fn record_failure(&mut self) {
        self.poll_count += 1;
        self.poll_failure_count += 1;
    }

    /// Clear everything. Called between invocations; never implicit.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Mean poll round-trip time, when any poll succeeded.
    pub fn mean_rtt_ms(&self) -> Option<f64> {
        if self.poll_rtt_ms.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let count = self.poll_rtt_ms.len() as f64;
        Some(self.poll_rtt_ms.iter().sum::<f64>() / count)
    }
}
