//! Repeated fetch cycles on a fixed interval.
//!
//! A failed cycle is logged and the next one starts from scratch: the device
//! drops its session on failure and reconnects on the following fetch.

use std::future::Future;
use std::time::Duration;

use petkit_engine::{DeviceProtocol, FetchResult};
use petkit_protocol::Telemetry;
use tracing::{info, warn};

/// How to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Pause between the end of one cycle and the start of the next.
    pub interval: Duration,
    /// Stop after this many cycles. `None` polls until shutdown.
    pub max_cycles: Option<u64>,
}

impl PollOptions {
    pub fn new(interval: Duration) -> Self {
        PollOptions {
            interval,
            max_cycles: None,
        }
    }

    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }
}

/// Counts from a finished polling run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub cycles: u64,
    pub successes: u64,
    pub failures: u64,
}

/// Poll `device` until `shutdown` resolves or the cycle limit is reached,
/// handing each result to `on_cycle`. The device is released on return.
pub async fn run_poll<S, F>(
    device: &mut dyn DeviceProtocol,
    options: PollOptions,
    shutdown: S,
    mut on_cycle: F,
) -> PollSummary
where
    S: Future<Output = ()>,
    F: FnMut(u64, &FetchResult<Telemetry>),
{
    tokio::pin!(shutdown);
    let mut summary = PollSummary::default();

    loop {
        let result = tokio::select! {
            result = device.fetch_telemetry() => result,
            _ = &mut shutdown => break,
        };

        summary.cycles += 1;
        match &result {
            Ok(telemetry) => {
                summary.successes += 1;
                info!(
                    "Poll[{}]: cycle {} returned {} fields",
                    device.name(),
                    summary.cycles,
                    telemetry.field_count()
                );
            }
            Err(e) => {
                summary.failures += 1;
                warn!(
                    "Poll[{}]: cycle {} failed, will reconnect: {}",
                    device.name(),
                    summary.cycles,
                    e
                );
            }
        }
        on_cycle(summary.cycles, &result);

        if options.max_cycles.is_some_and(|max| summary.cycles >= max) {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(options.interval) => {}
            _ = &mut shutdown => break,
        }
    }

    device.release().await;
    info!(
        "Poll[{}]: stopped after {} cycles ({} failed)",
        device.name(),
        summary.cycles,
        summary.failures
    );
    summary
}
