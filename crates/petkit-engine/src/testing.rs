//! In-memory transport driven by a per-command script.
//!
//! Used by the test suites and by the runner's `--simulate` mode. Each write
//! is parsed as a frame and answered according to the script: a queued reply
//! for that command if there is one, otherwise its standing reply, otherwise
//! nothing. Replies are delivered from inside `write`, which is how a real
//! stack behaves when the device answers quickly.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use petkit_protocol::{
    build_frame, parse_frame, Frame, CMD_GET_BATTERY, CMD_GET_DEVICE_CONFIG, CMD_GET_DEVICE_DETAILS,
    CMD_GET_DEVICE_STATE,
};

use crate::error::{TransportError, TransportResult};
use crate::transport::{ConnectionHandle, EventCallback, Transport, TransportEvent};

/// Identifier the simulated fountain reports.
pub const SIMULATED_IDENTIFIER: [u8; 6] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
/// State block the simulated fountain reports: on, smart, no warnings,
/// 5 filter days left, 60 minutes of runtime, running.
pub const SIMULATED_STATE: [u8; 12] = [1, 2, 0, 0, 0, 5, 0x3C, 0, 0, 0, 1, 0];
/// Config block the simulated fountain reports: LED on at 60, DND off, unlocked.
pub const SIMULATED_CONFIG: [u8; 14] = [3, 3, 1, 60, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
/// Battery level the simulated fountain reports.
pub const SIMULATED_BATTERY: u8 = 100;

/// How to answer one write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Answer with a well-formed frame echoing the request's sequence and code.
    Payload(Vec<u8>),
    /// Deliver these bytes verbatim as the notification.
    Raw(Vec<u8>),
    /// Say nothing.
    Silent,
    /// Drop the link instead of answering.
    Disconnect,
    /// Fail the write.
    WriteError(String),
}

#[derive(Default)]
struct Script {
    queued: HashMap<u8, VecDeque<Reply>>,
    standing: HashMap<u8, Reply>,
    callback: Option<EventCallback>,
    writes: Vec<Frame>,
    connected: bool,
    connects: u32,
    disconnects: u32,
    fail_connect: Option<String>,
    fail_subscribe: Option<String>,
}

/// A scripted peripheral. Clones share the same script and history.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    /// A peripheral that answers nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// A fountain that completes the handshake and answers every telemetry
    /// request. Init, sync and set-datetime go unanswered, as on real hardware.
    pub fn fountain() -> Self {
        let transport = Self::new();
        transport.respond(CMD_GET_DEVICE_DETAILS, SIMULATED_IDENTIFIER.to_vec());
        transport.respond(CMD_GET_DEVICE_STATE, SIMULATED_STATE.to_vec());
        transport.respond(CMD_GET_DEVICE_CONFIG, SIMULATED_CONFIG.to_vec());
        transport.respond(CMD_GET_BATTERY, vec![SIMULATED_BATTERY]);
        transport
    }

    /// Always answer `command` with `payload`.
    pub fn respond(&self, command: u8, payload: Vec<u8>) {
        self.respond_with(command, Reply::Payload(payload));
    }

    /// Always answer `command` with `reply`.
    pub fn respond_with(&self, command: u8, reply: Reply) {
        self.script.lock().standing.insert(command, reply);
    }

    /// Answer the next write of `command` with `reply`, ahead of the standing reply.
    pub fn respond_once(&self, command: u8, reply: Reply) {
        self.script
            .lock()
            .queued
            .entry(command)
            .or_default()
            .push_back(reply);
    }

    /// Stop answering `command`.
    pub fn silence(&self, command: u8) {
        let mut script = self.script.lock();
        script.standing.remove(&command);
        script.queued.remove(&command);
    }

    /// Make the next connects fail, or succeed again with `None`.
    pub fn fail_connect(&self, reason: Option<&str>) {
        self.script.lock().fail_connect = reason.map(str::to_string);
    }

    /// Make the next subscriptions fail, or succeed again with `None`.
    pub fn fail_subscribe(&self, reason: Option<&str>) {
        self.script.lock().fail_subscribe = reason.map(str::to_string);
    }

    /// Push a notification nobody asked for.
    pub fn notify(&self, bytes: Vec<u8>) {
        self.deliver(TransportEvent::Notification(bytes));
    }

    /// Drop the link from the device side.
    pub fn drop_link(&self) {
        self.script.lock().connected = false;
        self.deliver(TransportEvent::Disconnected);
    }

    /// Every frame written so far.
    pub fn writes(&self) -> Vec<Frame> {
        self.script.lock().writes.clone()
    }

    /// Command codes of every frame written so far.
    pub fn written_commands(&self) -> Vec<u8> {
        self.script.lock().writes.iter().map(|f| f.command).collect()
    }

    pub fn clear_writes(&self) {
        self.script.lock().writes.clear();
    }

    pub fn connect_count(&self) -> u32 {
        self.script.lock().connects
    }

    pub fn disconnect_count(&self) -> u32 {
        self.script.lock().disconnects
    }

    pub fn is_connected(&self) -> bool {
        self.script.lock().connected
    }

    fn deliver(&self, event: TransportEvent) {
        let callback = self.script.lock().callback.clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self) -> TransportResult<ConnectionHandle> {
        let mut script = self.script.lock();
        if let Some(reason) = &script.fail_connect {
            return Err(TransportError::Connect(reason.clone()));
        }
        script.connects += 1;
        script.connected = true;
        script.callback = None;
        Ok(ConnectionHandle::new(u64::from(script.connects), "scripted"))
    }

    async fn write(&self, _handle: &ConnectionHandle, data: &[u8]) -> TransportResult<()> {
        let event = {
            let mut script = self.script.lock();
            if !script.connected {
                return Err(TransportError::NotConnected);
            }
            let frame = parse_frame(data).map_err(|e| TransportError::Write(e.to_string()))?;

            let reply = script
                .queued
                .get_mut(&frame.command)
                .and_then(VecDeque::pop_front)
                .or_else(|| script.standing.get(&frame.command).cloned())
                .unwrap_or(Reply::Silent);

            let event = match reply {
                Reply::Payload(payload) => Some(TransportEvent::Notification(build_frame(
                    frame.sequence,
                    frame.command,
                    frame.frame_type,
                    &payload,
                ))),
                Reply::Raw(bytes) => Some(TransportEvent::Notification(bytes)),
                Reply::Silent => None,
                Reply::Disconnect => {
                    script.connected = false;
                    Some(TransportEvent::Disconnected)
                }
                Reply::WriteError(reason) => {
                    script.writes.push(frame);
                    return Err(TransportError::Write(reason));
                }
            };
            script.writes.push(frame);
            event
        };

        if let Some(event) = event {
            self.deliver(event);
        }
        Ok(())
    }

    async fn subscribe_notifications(
        &self,
        _handle: &ConnectionHandle,
        callback: EventCallback,
    ) -> TransportResult<()> {
        let mut script = self.script.lock();
        if let Some(reason) = &script.fail_subscribe {
            return Err(TransportError::Subscribe(reason.clone()));
        }
        script.callback = Some(callback);
        Ok(())
    }

    async fn disconnect(&self, _handle: &ConnectionHandle) {
        let mut script = self.script.lock();
        script.connected = false;
        script.disconnects += 1;
        script.callback = None;
    }
}
