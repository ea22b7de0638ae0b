//! Per-connection session and the initialization handshake.
//!
//! A fountain ignores telemetry requests until it has been handed a secret
//! derived from its own identifier. The handshake runs once per connection:
//!
//! 1. Read the device identifier (get-device-details, retried)
//! 2. Derive the secret and send init-device
//! 3. Send device-sync with the secret
//! 4. Set the clock (the device never answers this)
//!
//! A session never outlives its connection; after a reconnect the caller
//! builds a new one.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use petkit_metrics::{metric_defs, DeviceLabels};
use petkit_protocol::{DeviceIdentifier, Request, Secret, FRAME_TYPE_DEFAULT};
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, RetryPolicy};
use crate::correlator::{Correlator, Exchange};
use crate::error::{CorrelationError, CorrelationResult, HandshakeError, HandshakeResult, TransportResult};
use crate::transport::{Link, Transport};

// ============================================================================
// Handshake State
// ============================================================================

/// Progress through the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing sent yet.
    Uninitialized,
    /// Waiting for the device identifier.
    DetailsRequested,
    /// Identifier known, secret derived, init sent.
    SecretDerived,
    /// Sync sent.
    SyncRequested,
    /// Clock set.
    ClockSet,
    /// Telemetry requests will be answered.
    Ready,
    /// Handshake failed; this session is unusable.
    Failed(HandshakeError),
}

// ============================================================================
// Session
// ============================================================================

/// State for one live connection to one fountain.
#[derive(Debug)]
pub struct Session {
    name: String,
    link: Link,
    correlator: Correlator,
    state: HandshakeState,
    device_identifier: Option<DeviceIdentifier>,
    secret: Option<Secret>,
}

impl Session {
    /// Connect, subscribe to notifications and return a fresh session.
    pub async fn open(
        transport: Arc<dyn Transport>,
        name: impl Into<String>,
        labels: DeviceLabels,
    ) -> TransportResult<Session> {
        let name = name.into();
        let handle = transport.connect().await?;
        let link = Link::new(transport, handle);
        let correlator = Correlator::new(name.clone(), labels);

        if let Err(e) = link.subscribe(correlator.event_callback()).await {
            warn!("{}: subscribe failed on {}: {}", name, link.handle(), e);
            link.disconnect().await;
            return Err(e);
        }

        debug!("{}: connected as {}", name, link.handle());
        Ok(Session::new(name, link, correlator))
    }

    /// Wrap an already subscribed link.
    pub fn new(name: impl Into<String>, link: Link, correlator: Correlator) -> Self {
        Session {
            name: name.into(),
            link,
            correlator,
            state: HandshakeState::Uninitialized,
            device_identifier: None,
            secret: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state == HandshakeState::Ready
    }

    pub fn device_identifier(&self) -> Option<DeviceIdentifier> {
        self.device_identifier
    }

    pub fn secret(&self) -> Option<Secret> {
        self.secret
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    /// Send a request and wait for its response, retrying per `policy`.
    pub async fn request(
        &self,
        request: &Request,
        timeout: Duration,
        policy: RetryPolicy,
    ) -> CorrelationResult<Vec<u8>> {
        let exchange = Exchange::for_request(request, timeout);
        self.correlator
            .send_with_retry(&self.link, &exchange, policy)
            .await
    }

    /// Send a request the device does not acknowledge.
    pub async fn send(&self, request: &Request) -> CorrelationResult<()> {
        self.correlator
            .send(
                &self.link,
                request.code(),
                FRAME_TYPE_DEFAULT,
                &request.encode_payload(),
            )
            .await
    }

    /// Run the handshake unless it already completed on this connection.
    pub async fn ensure_initialized(&mut self, config: &EngineConfig) -> HandshakeResult<()> {
        match &self.state {
            HandshakeState::Ready => return Ok(()),
            HandshakeState::Failed(reason) => return Err(reason.clone()),
            _ => {}
        }

        let labels = self.correlator.labels().to_labels();
        match self.run_handshake(config).await {
            Ok(()) => {
                self.state = HandshakeState::Ready;
                metrics::counter!(metric_defs::HANDSHAKE_COMPLETED.name, &labels).increment(1);
                info!(
                    "{}: initialized device {}",
                    self.name,
                    self.device_identifier
                        .map(|id| id.to_hex())
                        .unwrap_or_default()
                );
                Ok(())
            }
            Err(e) => {
                warn!("{}: handshake failed in {:?}: {}", self.name, self.state, e);
                self.state = HandshakeState::Failed(e.clone());
                metrics::counter!(metric_defs::HANDSHAKE_FAILED.name, &labels).increment(1);
                Err(e)
            }
        }
    }

    async fn run_handshake(&mut self, config: &EngineConfig) -> HandshakeResult<()> {
        self.state = HandshakeState::DetailsRequested;
        let id = self.request_details(config).await?;
        let secret = id.derive_secret();
        self.device_identifier = Some(id);
        self.secret = Some(secret);
        debug!("{}: device identifier {}", self.name, id);

        self.state = HandshakeState::SecretDerived;
        let init = Request::InitDevice {
            device_identifier: id,
            secret,
        };
        self.tolerate_timeout(&init, config.init_timeout()).await?;

        self.state = HandshakeState::SyncRequested;
        self.tolerate_timeout(&Request::DeviceSync { secret }, config.init_timeout())
            .await?;

        let clock = Request::SetDateTime {
            timestamp: Local::now().naive_local(),
        };
        self.tolerate_timeout(&clock, config.datetime_timeout()).await?;
        self.state = HandshakeState::ClockSet;
        Ok(())
    }

    async fn request_details(&self, config: &EngineConfig) -> HandshakeResult<DeviceIdentifier> {
        let policy = config.details_policy();
        let exchange = Exchange::for_request(&Request::GetDeviceDetails, config.init_timeout());

        for attempt in 1..=policy.attempts() {
            if attempt > 1 {
                tokio::time::sleep(policy.delay).await;
            }
            match self
                .correlator
                .send_and_await(&self.link, &exchange)
                .await
            {
                Ok(payload) => match DeviceIdentifier::from_payload(&payload) {
                    Some(id) => return Ok(id),
                    None => warn!(
                        "{}: device details too short ({} bytes), attempt {}/{}",
                        self.name,
                        payload.len(),
                        attempt,
                        policy.attempts()
                    ),
                },
                Err(e) if e.is_retryable() => warn!(
                    "{}: device details attempt {}/{} failed: {}",
                    self.name,
                    attempt,
                    policy.attempts(),
                    e
                ),
                Err(e) => return Err(e.into()),
            }
        }

        Err(HandshakeError::DetailsUnavailable {
            attempts: policy.attempts(),
        })
    }

    /// One attempt; no response is logged and accepted.
    async fn tolerate_timeout(&self, request: &Request, timeout: Duration) -> HandshakeResult<()> {
        let exchange = Exchange::for_request(request, timeout);
        match self
            .correlator
            .send_and_await(&self.link, &exchange)
            .await
        {
            Ok(_) => Ok(()),
            Err(CorrelationError::Timeout { .. }) => {
                debug!(
                    "{}: no response to command {}, continuing",
                    self.name,
                    request.code()
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Disconnect and consume the session.
    pub async fn close(self) {
        debug!("{}: closing {}", self.name, self.link.handle());
        self.link.disconnect().await;
    }
}
