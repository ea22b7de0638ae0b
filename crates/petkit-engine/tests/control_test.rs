//! Integration tests for setting changes.
//!
//! Power and mode rewrite the state block, do-not-disturb rewrites the config
//! block. Each control reads the current block first so untouched bytes are
//! written back unchanged.

use std::sync::Arc;

use petkit_engine::testing::{ScriptedTransport, SIMULATED_CONFIG, SIMULATED_STATE};
use petkit_engine::{
    Control, ControlError, DeviceProtocol, DeviceRegistry, DeviceSpec, EngineConfig, PetkitFountain,
    PETKIT_FOUNTAIN,
};
use petkit_protocol::{
    Frame, FountainMode, Switch, CMD_GET_DEVICE_CONFIG, CMD_GET_DEVICE_STATE, CMD_RESET_FILTER,
    CMD_SET_DEVICE_CONFIG, CMD_SET_DEVICE_MODE,
};

/// Helper to build an initialized fountain and clear the handshake writes.
async fn ready_fountain(transport: &ScriptedTransport) -> PetkitFountain {
    let mut device = PetkitFountain::new("kitchen", Arc::new(transport.clone()), EngineConfig::default());
    device.ensure_initialized().await.expect("handshake should complete");
    transport.clear_writes();
    device
}

/// The last frame written.
fn last_write(transport: &ScriptedTransport) -> Frame {
    transport.writes().pop().expect("something was written")
}

// ============================================================================
// State Block
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_set_power_off() {
    let transport = ScriptedTransport::fountain();
    let mut device = ready_fountain(&transport).await;

    device.set_power(Switch::Off).await.expect("set power");

    assert_eq!(
        transport.written_commands(),
        vec![CMD_GET_DEVICE_STATE, CMD_SET_DEVICE_MODE]
    );
    let mut expected = SIMULATED_STATE.to_vec();
    expected[0] = 0;
    assert_eq!(last_write(&transport).payload, expected);
}

#[tokio::test(start_paused = true)]
async fn test_set_mode_normal() {
    let transport = ScriptedTransport::fountain();
    let mut device = ready_fountain(&transport).await;

    device.set_mode(FountainMode::Normal).await.expect("set mode");

    let frame = last_write(&transport);
    assert_eq!(frame.command, CMD_SET_DEVICE_MODE);
    assert_eq!(frame.payload[0], SIMULATED_STATE[0]);
    assert_eq!(frame.payload[1], 1);
    assert_eq!(&frame.payload[2..], &SIMULATED_STATE[2..]);
}

#[tokio::test(start_paused = true)]
async fn test_short_state_block_rejected() {
    let transport = ScriptedTransport::fountain();
    transport.respond(CMD_GET_DEVICE_STATE, vec![1, 2, 3]);
    let mut device = ready_fountain(&transport).await;

    let result = device.set_power(Switch::On).await;
    assert_eq!(
        result,
        Err(ControlError::InvalidPayload {
            command: CMD_GET_DEVICE_STATE,
            expected: 12,
            actual: 3
        })
    );
    assert!(!transport.written_commands().contains(&CMD_SET_DEVICE_MODE));
}

// ============================================================================
// Config Block
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_set_dnd_on() {
    let transport = ScriptedTransport::fountain();
    let mut device = ready_fountain(&transport).await;

    device.set_dnd(Switch::On).await.expect("set dnd");

    assert_eq!(
        transport.written_commands(),
        vec![CMD_GET_DEVICE_CONFIG, CMD_SET_DEVICE_CONFIG]
    );
    let mut expected = SIMULATED_CONFIG.to_vec();
    expected[8] = 1;
    assert_eq!(last_write(&transport).payload, expected);
}

#[tokio::test(start_paused = true)]
async fn test_reset_filter() {
    let transport = ScriptedTransport::fountain();
    let mut device = ready_fountain(&transport).await;

    device.reset_filter().await.expect("reset filter");

    let frame = last_write(&transport);
    assert_eq!(transport.writes().len(), 1);
    assert_eq!(frame.command, CMD_RESET_FILTER);
    assert_eq!(frame.payload, vec![0, 0]);
}

// ============================================================================
// Through the Registry
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_control_through_trait_object() {
    let transport = ScriptedTransport::fountain();
    let registry = DeviceRegistry::with_defaults();
    let mut device = registry
        .create(
            PETKIT_FOUNTAIN,
            DeviceSpec {
                name: "hall".to_string(),
                transport: Arc::new(transport.clone()),
                config: EngineConfig::default(),
            },
        )
        .expect("fountain is registered");

    device
        .control(Control::Power(Switch::Off))
        .await
        .expect("control should apply");

    let frame = last_write(&transport);
    assert_eq!(frame.command, CMD_SET_DEVICE_MODE);
    assert_eq!(frame.payload[0], 0);
    assert_eq!(transport.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_control_connects_on_demand() {
    let transport = ScriptedTransport::fountain();
    let mut device =
        PetkitFountain::new("kitchen", Arc::new(transport.clone()), EngineConfig::default());

    device.reset_filter().await.expect("reset filter");

    let commands = transport.written_commands();
    assert_eq!(commands.len(), 5);
    assert_eq!(commands[4], CMD_RESET_FILTER);
}
