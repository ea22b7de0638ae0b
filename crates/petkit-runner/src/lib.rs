//! Runner for Petkit smart fountains.
//!
//! Wires the engine to a real Bluetooth adapter (or the scripted fountain in
//! simulation mode) and provides the pieces behind the `petkit` binary:
//! configuration loading, device construction and the polling loop.

pub mod ble;
pub mod config;
pub mod error;
pub mod poll;

use std::sync::Arc;

use petkit_engine::testing::ScriptedTransport;
use petkit_engine::{DeviceProtocol, DeviceRegistry, DeviceSpec, Transport};
use tracing::info;

pub use ble::{open_adapter, scan, BtleplugTransport, DiscoveredDevice};
pub use config::{ConfigError, ConfigResult, RunnerConfig};
pub use error::{RunnerError, RunnerResult};
pub use poll::{run_poll, PollOptions, PollSummary};

/// Name given to the device in simulation mode.
pub const SIMULATED_DEVICE_NAME: &str = "simulated";

/// Open the transport the config points at, or a simulated fountain.
pub async fn open_transport(
    config: &RunnerConfig,
    simulate: bool,
) -> RunnerResult<Arc<dyn Transport>> {
    if simulate {
        info!("Runner: using simulated fountain");
        return Ok(Arc::new(ScriptedTransport::fountain()));
    }
    let address = config.require_address()?;
    let adapter = open_adapter(config.adapter_index).await?;
    Ok(Arc::new(BtleplugTransport::new(
        adapter,
        address,
        config.scan_timeout(),
    )))
}

/// Build the configured device type on `transport`.
pub fn build_device(
    registry: &DeviceRegistry,
    config: &RunnerConfig,
    transport: Arc<dyn Transport>,
) -> RunnerResult<Box<dyn DeviceProtocol>> {
    let name = config
        .address
        .clone()
        .unwrap_or_else(|| SIMULATED_DEVICE_NAME.to_string());
    let device = registry.create(
        &config.device_type,
        DeviceSpec {
            name,
            transport,
            config: config.engine.clone(),
        },
    )?;
    Ok(device)
}
