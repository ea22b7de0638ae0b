//! One polling cycle: handshake if needed, then state, config and battery.

use petkit_metrics::metric_defs;
use petkit_protocol::{decode_battery, decode_device_config, decode_device_state, Request, Telemetry};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::FetchResult;
use crate::session::Session;

/// Where a device is in its fetch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    Idle,
    Connecting,
    Initializing,
    Fetching,
}

/// Telemetry queries issued each cycle, in order.
const QUERIES: [(Request, fn(&[u8]) -> Telemetry); 3] = [
    (Request::GetDeviceState, decode_device_state),
    (Request::GetDeviceConfig, decode_device_config),
    (Request::GetBattery, decode_battery),
];

/// Run the handshake if needed, then fetch telemetry.
pub async fn fetch_telemetry(session: &mut Session, config: &EngineConfig) -> FetchResult<Telemetry> {
    session.ensure_initialized(config).await?;
    request_telemetry(session, config).await
}

/// Fetch telemetry from an initialized session.
///
/// A request that times out leaves its fields out. A lost link or a write
/// that keeps failing aborts the cycle. Pushes received before the cycle
/// starts fill fields the fresh responses leave empty; anything arriving
/// during the cycle waits for the next one.
pub async fn request_telemetry(session: &Session, config: &EngineConfig) -> FetchResult<Telemetry> {
    let mut telemetry = session.correlator().take_unsolicited();
    let mut fresh = Telemetry::default();
    let mut failed = 0;

    for (index, (request, decode)) in QUERIES.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(config.request_spacing()).await;
        }
        match session
            .request(request, config.command_timeout(), config.retry_policy())
            .await
        {
            Ok(payload) => {
                let update = decode(&payload);
                debug!(
                    "{}: response {} decoded {} fields",
                    session.name(),
                    request.code(),
                    update.field_count()
                );
                fresh.merge(update);
            }
            Err(e) if e.aborts_cycle() => {
                record_cycle(session, "failed");
                return Err(e.into());
            }
            Err(e) => {
                warn!(
                    "{}: request {} failed, omitting its fields: {}",
                    session.name(),
                    request.code(),
                    e
                );
                failed += 1;
            }
        }
    }

    telemetry.merge(fresh);
    if let Some(id) = session.device_identifier() {
        telemetry.device_id = Some(id.to_hex());
    }

    record_cycle(session, if failed == 0 { "complete" } else { "partial" });
    metrics::gauge!(
        metric_defs::FETCH_FIELDS.name,
        &session.correlator().labels().to_labels()
    )
    .set(telemetry.field_count() as f64);
    Ok(telemetry)
}

fn record_cycle(session: &Session, outcome: &'static str) {
    metrics::counter!(
        metric_defs::FETCH_CYCLES.name,
        &session
            .correlator()
            .labels()
            .with(&[("outcome", outcome.to_string())])
    )
    .increment(1);
}
