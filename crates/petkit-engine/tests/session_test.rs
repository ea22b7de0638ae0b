//! Integration tests for the per-connection handshake.
//!
//! Uses the scripted fountain, which answers get-device-details and leaves
//! init, sync and set-datetime unanswered the way hardware does.

use std::sync::Arc;
use std::time::Duration;

use petkit_engine::testing::{Reply, ScriptedTransport, SIMULATED_IDENTIFIER};
use petkit_engine::{
    CorrelationError, EngineConfig, HandshakeError, HandshakeState, Session, Transport,
};
use petkit_metrics::DeviceLabels;
use petkit_protocol::{
    CMD_DEVICE_SYNC, CMD_GET_DEVICE_DETAILS, CMD_INIT_DEVICE, CMD_SET_DATETIME,
};

/// Helper to open a session on a scripted transport.
async fn open(transport: &ScriptedTransport) -> Session {
    let shared: Arc<dyn Transport> = Arc::new(transport.clone());
    Session::open(shared, "test", DeviceLabels::new("test", "petkit_fountain"))
        .await
        .expect("session should open")
}

/// Short timeouts so failing handshakes finish quickly.
fn quick_config() -> EngineConfig {
    EngineConfig::default()
        .with_init_timeout(Duration::from_secs(1))
        .with_datetime_timeout(Duration::from_secs(1))
        .with_retries(2, Duration::from_millis(100))
}

// ============================================================================
// Successful Handshake
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_handshake_sequence() {
    let transport = ScriptedTransport::fountain();
    let mut session = open(&transport).await;
    assert_eq!(session.state(), &HandshakeState::Uninitialized);

    session
        .ensure_initialized(&EngineConfig::default())
        .await
        .expect("handshake should complete");

    assert!(session.is_initialized());
    assert_eq!(
        transport.written_commands(),
        vec![CMD_GET_DEVICE_DETAILS, CMD_INIT_DEVICE, CMD_DEVICE_SYNC, CMD_SET_DATETIME]
    );

    let id = session.device_identifier().expect("identifier recorded");
    assert_eq!(id.as_bytes(), &SIMULATED_IDENTIFIER);
    let secret = session.secret().expect("secret derived");
    assert_eq!(secret.as_bytes(), &[6, 5, 4, 3, 2, 1, 0, 0]);

    let writes = transport.writes();
    assert_eq!(
        writes[1].payload,
        vec![0, 0, 1, 2, 3, 4, 5, 6, 0, 0, 6, 5, 4, 3, 2, 1, 0, 0]
    );
    assert_eq!(writes[2].payload, vec![0, 0, 6, 5, 4, 3, 2, 1, 0, 0]);
    assert_eq!(writes[3].payload.len(), 7);

    // Sequence numbers run 0..=3 across the handshake
    let sequences: Vec<u8> = writes.iter().map(|f| f.sequence).collect();
    assert_eq!(sequences, vec![0, 1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_handshake_runs_once() {
    let transport = ScriptedTransport::fountain();
    let mut session = open(&transport).await;
    let config = quick_config();

    session.ensure_initialized(&config).await.expect("first handshake");
    transport.clear_writes();
    session.ensure_initialized(&config).await.expect("already ready");

    assert!(transport.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_short_details_payload_retried() {
    let transport = ScriptedTransport::fountain();
    transport.respond_once(CMD_GET_DEVICE_DETAILS, Reply::Payload(vec![1, 2, 3]));
    let mut session = open(&transport).await;

    session
        .ensure_initialized(&quick_config())
        .await
        .expect("second details attempt should succeed");

    let commands = transport.written_commands();
    assert_eq!(&commands[..2], &[CMD_GET_DEVICE_DETAILS, CMD_GET_DEVICE_DETAILS]);
    assert_eq!(commands.len(), 5);
}

// ============================================================================
// Failed Handshake
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_details_unavailable() {
    let transport = ScriptedTransport::new();
    let mut session = open(&transport).await;
    let config = quick_config().with_details_retries(2);

    let result = session.ensure_initialized(&config).await;
    assert_eq!(result, Err(HandshakeError::DetailsUnavailable { attempts: 3 }));
    assert_eq!(
        session.state(),
        &HandshakeState::Failed(HandshakeError::DetailsUnavailable { attempts: 3 })
    );
    assert_eq!(transport.written_commands(), vec![CMD_GET_DEVICE_DETAILS; 3]);
    assert!(session.device_identifier().is_none());

    // A failed session does not try again
    transport.clear_writes();
    let again = session.ensure_initialized(&config).await;
    assert_eq!(again, Err(HandshakeError::DetailsUnavailable { attempts: 3 }));
    assert!(transport.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_handshake() {
    let transport = ScriptedTransport::fountain();
    transport.respond_with(CMD_INIT_DEVICE, Reply::Disconnect);
    let mut session = open(&transport).await;

    let result = session.ensure_initialized(&quick_config()).await;
    assert_eq!(
        result,
        Err(HandshakeError::Transport(CorrelationError::Disconnected))
    );
    assert!(matches!(session.state(), HandshakeState::Failed(_)));
    assert!(session.correlator().is_closed());
    assert_eq!(
        transport.written_commands(),
        vec![CMD_GET_DEVICE_DETAILS, CMD_INIT_DEVICE]
    );
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_failure_disconnects() {
    let transport = ScriptedTransport::fountain();
    transport.fail_subscribe(Some("notify refused"));
    let shared: Arc<dyn Transport> = Arc::new(transport.clone());

    let result = Session::open(shared, "test", DeviceLabels::new("test", "petkit_fountain")).await;
    assert!(result.is_err());
    assert_eq!(transport.connect_count(), 1);
    assert_eq!(transport.disconnect_count(), 1);
    assert!(!transport.is_connected());
}
