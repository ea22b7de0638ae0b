//! Engine timing configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeouts, retry policy and pacing for one device.
///
/// All durations are milliseconds so the struct reads naturally from YAML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deadline for a regular request (milliseconds).
    pub command_timeout_ms: u64,

    /// Deadline for handshake requests (milliseconds).
    /// The first exchange after connecting can be slow.
    pub init_timeout_ms: u64,

    /// Deadline for set-datetime (milliseconds). Expiry is expected.
    pub datetime_timeout_ms: u64,

    /// Additional attempts after a timed-out or failed request.
    pub max_retries: u32,

    /// Pause between attempts (milliseconds).
    pub retry_delay_ms: u64,

    /// Additional attempts at reading the device identifier.
    pub details_retries: u32,

    /// Pause between consecutive telemetry requests (milliseconds).
    pub request_spacing_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            command_timeout_ms: 10_000,
            init_timeout_ms: 30_000,
            datetime_timeout_ms: 5_000,
            max_retries: 2,
            retry_delay_ms: 2_000,
            details_retries: 5,
            request_spacing_ms: 500,
        }
    }
}

impl EngineConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn datetime_timeout(&self) -> Duration {
        Duration::from_millis(self.datetime_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_spacing(&self) -> Duration {
        Duration::from_millis(self.request_spacing_ms)
    }

    /// Retry policy for regular requests.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay())
    }

    /// Retry policy for the device-details step of the handshake.
    pub fn details_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.details_retries, self.retry_delay())
    }

    /// Set the regular request deadline.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the handshake request deadline.
    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the set-datetime deadline.
    pub fn with_datetime_timeout(mut self, timeout: Duration) -> Self {
        self.datetime_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the retry count and delay for regular requests.
    pub fn with_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.max_retries = retries;
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the retry count for the device-details step.
    pub fn with_details_retries(mut self, retries: u32) -> Self {
        self.details_retries = retries;
        self
    }

    /// Set the pause between telemetry requests.
    pub fn with_request_spacing(mut self, spacing: Duration) -> Self {
        self.request_spacing_ms = spacing.as_millis() as u64;
        self
    }
}

/// How many more times to try a request, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first.
    pub retries: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration) -> Self {
        RetryPolicy { retries, delay }
    }

    /// A single attempt.
    pub fn none() -> Self {
        RetryPolicy::new(0, Duration::ZERO)
    }

    /// Total attempts including the first.
    pub fn attempts(&self) -> u32 {
        self.retries + 1
    }
}
