//! The narrow transport interface the engine drives.
//!
//! A transport knows how to reach one peripheral: connect, write a frame to
//! the command characteristic, and deliver notifications. It knows nothing
//! about frames, sequences or the handshake.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportResult;

/// Opaque handle for one live connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionHandle {
    id: u64,
    address: String,
}

impl ConnectionHandle {
    pub fn new(id: u64, address: impl Into<String>) -> Self {
        ConnectionHandle {
            id,
            address: address.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Peripheral address this handle is connected to.
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.address, self.id)
    }
}

/// Something the peripheral did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Raw bytes from the notify characteristic.
    Notification(Vec<u8>),
    /// The link dropped.
    Disconnected,
}

/// Receives events for one connection, in order.
pub type EventCallback = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// Connection primitives provided by a platform BLE stack.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection to the peripheral.
    async fn connect(&self) -> TransportResult<ConnectionHandle>;

    /// Write one frame. Returns once the write is handed to the stack.
    async fn write(&self, handle: &ConnectionHandle, data: &[u8]) -> TransportResult<()>;

    /// Deliver notifications and link loss for this connection to `callback`.
    async fn subscribe_notifications(
        &self,
        handle: &ConnectionHandle,
        callback: EventCallback,
    ) -> TransportResult<()>;

    /// Close the connection. Errors are logged by the implementation.
    async fn disconnect(&self, handle: &ConnectionHandle);
}

/// A transport bound to one open connection.
#[derive(Clone)]
pub struct Link {
    transport: Arc<dyn Transport>,
    handle: ConnectionHandle,
}

impl Link {
    pub fn new(transport: Arc<dyn Transport>, handle: ConnectionHandle) -> Self {
        Link { transport, handle }
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub async fn write(&self, data: &[u8]) -> TransportResult<()> {
        self.transport.write(&self.handle, data).await
    }

    pub async fn subscribe(&self, callback: EventCallback) -> TransportResult<()> {
        self.transport
            .subscribe_notifications(&self.handle, callback)
            .await
    }

    pub async fn disconnect(&self) {
        self.transport.disconnect(&self.handle).await
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link").field("handle", &self.handle).finish()
    }
}
