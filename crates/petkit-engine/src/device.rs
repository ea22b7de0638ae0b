//! Device-level API: connect on demand, handshake, fetch and control.

use std::sync::Arc;

use async_trait::async_trait;
use petkit_metrics::DeviceLabels;
use petkit_protocol::{
    FountainMode, Request, Switch, Telemetry, DEVICE_CONFIG_MIN_LEN, DEVICE_STATE_LEN,
};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{ControlError, ControlResult, FetchError, FetchResult, TransportError};
use crate::fetch::{request_telemetry, FetchPhase};
use crate::session::Session;
use crate::transport::Transport;

/// Registry name of [`PetkitFountain`].
pub const PETKIT_FOUNTAIN: &str = "petkit_fountain";

/// A setting change a device can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Power(Switch),
    Mode(FountainMode),
    DoNotDisturb(Switch),
    ResetFilter,
}

impl Control {
    pub fn name(&self) -> &'static str {
        match self {
            Control::Power(_) => "power",
            Control::Mode(_) => "mode",
            Control::DoNotDisturb(_) => "dnd",
            Control::ResetFilter => "reset_filter",
        }
    }
}

/// A device the engine can poll.
#[async_trait]
pub trait DeviceProtocol: Send {
    /// Registry name of the implementation.
    fn device_type(&self) -> &'static str;

    /// Name used in logs.
    fn name(&self) -> &str;

    /// Connect if needed and complete the handshake.
    async fn ensure_initialized(&mut self) -> FetchResult<()>;

    /// Run one fetch cycle. On failure the connection is dropped and the
    /// next call starts over.
    async fn fetch_telemetry(&mut self) -> FetchResult<Telemetry>;

    /// Apply a setting change.
    async fn control(&mut self, control: Control) -> ControlResult<()> {
        Err(ControlError::Unsupported(control.name()))
    }

    /// Drop the connection, if any.
    async fn release(&mut self);
}

// ============================================================================
// Petkit Fountain
// ============================================================================

/// A Petkit smart fountain reached through a [`Transport`].
pub struct PetkitFountain {
    name: String,
    transport: Arc<dyn Transport>,
    config: EngineConfig,
    labels: DeviceLabels,
    session: Option<Session>,
    phase: FetchPhase,
}

impl PetkitFountain {
    pub fn new(name: impl Into<String>, transport: Arc<dyn Transport>, config: EngineConfig) -> Self {
        let name = name.into();
        PetkitFountain {
            labels: DeviceLabels::new(name.clone(), PETKIT_FOUNTAIN),
            name,
            transport,
            config,
            session: None,
            phase: FetchPhase::Idle,
        }
    }

    pub fn phase(&self) -> FetchPhase {
        self.phase
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The live session, if connected.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn log_name(&self) -> String {
        format!("PetkitFountain[{}]", self.name)
    }

    /// Connect if needed and run the handshake. Leaves the phase at
    /// `Initializing` for the caller to move on from.
    async fn prepare(&mut self) -> FetchResult<()> {
        if self
            .session
            .as_ref()
            .is_some_and(|s| s.correlator().is_closed())
        {
            debug!("{}: link was lost, reconnecting", self.log_name());
            self.drop_session().await;
        }

        if self.session.is_none() {
            self.phase = FetchPhase::Connecting;
            let session =
                Session::open(self.transport.clone(), self.log_name(), self.labels.clone()).await?;
            self.session = Some(session);
        }

        self.phase = FetchPhase::Initializing;
        let Some(session) = self.session.as_mut() else {
            return Err(FetchError::Connect(TransportError::NotConnected));
        };
        session.ensure_initialized(&self.config).await?;
        Ok(())
    }

    async fn drop_session(&mut self) {
        self.phase = FetchPhase::Idle;
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }

    /// Run `prepare`, dropping the session if it fails.
    async fn initialize(&mut self) -> FetchResult<()> {
        if let Err(e) = self.prepare().await {
            warn!("{}: {}", self.log_name(), e);
            self.drop_session().await;
            return Err(e);
        }
        Ok(())
    }

    fn live_session(&self) -> FetchResult<&Session> {
        self.session
            .as_ref()
            .ok_or(FetchError::Connect(TransportError::NotConnected))
    }

    /// Read a block, check its length, edit it and write it back.
    async fn rewrite_block(
        &mut self,
        read: Request,
        min_len: usize,
        edit: impl FnOnce(Vec<u8>) -> Request + Send,
    ) -> ControlResult<()> {
        let timeout = self.config.command_timeout();
        let policy = self.config.retry_policy();
        self.initialize().await?;
        self.phase = FetchPhase::Idle;
        let session = self.live_session()?;

        let block = session.request(&read, timeout, policy).await?;
        if block.len() < min_len {
            return Err(ControlError::InvalidPayload {
                command: read.code(),
                expected: min_len,
                actual: block.len(),
            });
        }
        session.send(&edit(block)).await?;
        Ok(())
    }

    /// Turn the pump on or off.
    pub async fn set_power(&mut self, power: Switch) -> ControlResult<()> {
        info!("{}: setting power {}", self.log_name(), power.as_str());
        self.rewrite_block(Request::GetDeviceState, DEVICE_STATE_LEN, move |mut state| {
            state[0] = power.to_raw();
            Request::SetDeviceState { state }
        })
        .await
    }

    /// Switch between smart and normal pumping.
    pub async fn set_mode(&mut self, mode: FountainMode) -> ControlResult<()> {
        info!("{}: setting mode {}", self.log_name(), mode.as_str());
        self.rewrite_block(Request::GetDeviceState, DEVICE_STATE_LEN, move |mut state| {
            state[1] = mode.to_raw();
            Request::SetDeviceState { state }
        })
        .await
    }

    /// Enable or disable do-not-disturb.
    pub async fn set_dnd(&mut self, dnd: Switch) -> ControlResult<()> {
        info!("{}: setting do-not-disturb {}", self.log_name(), dnd.as_str());
        self.rewrite_block(Request::GetDeviceConfig, DEVICE_CONFIG_MIN_LEN, move |mut config| {
            config[8] = dnd.to_raw();
            Request::SetDeviceConfig { config }
        })
        .await
    }

    /// Reset the filter life counter.
    pub async fn reset_filter(&mut self) -> ControlResult<()> {
        info!("{}: resetting filter", self.log_name());
        self.initialize().await?;
        self.phase = FetchPhase::Idle;
        self.live_session()?.send(&Request::ResetFilter).await?;
        Ok(())
    }
}

#[async_trait]
impl DeviceProtocol for PetkitFountain {
    fn device_type(&self) -> &'static str {
        PETKIT_FOUNTAIN
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_initialized(&mut self) -> FetchResult<()> {
        self.initialize().await?;
        self.phase = FetchPhase::Idle;
        Ok(())
    }

    async fn fetch_telemetry(&mut self) -> FetchResult<Telemetry> {
        self.initialize().await?;

        self.phase = FetchPhase::Fetching;
        let result = match self.live_session() {
            Ok(session) => request_telemetry(session, &self.config).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(telemetry) => {
                self.phase = FetchPhase::Idle;
                debug!(
                    "{}: fetched {} fields",
                    self.log_name(),
                    telemetry.field_count()
                );
                Ok(telemetry)
            }
            Err(e) => {
                warn!("{}: fetch aborted: {}", self.log_name(), e);
                self.drop_session().await;
                Err(e)
            }
        }
    }

    async fn control(&mut self, control: Control) -> ControlResult<()> {
        match control {
            Control::Power(power) => self.set_power(power).await,
            Control::Mode(mode) => self.set_mode(mode).await,
            Control::DoNotDisturb(dnd) => self.set_dnd(dnd).await,
            Control::ResetFilter => self.reset_filter().await,
        }
    }

    async fn release(&mut self) {
        self.drop_session().await;
    }
}

impl std::fmt::Debug for PetkitFountain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PetkitFountain")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("connected", &self.session.is_some())
            .finish()
    }
}
