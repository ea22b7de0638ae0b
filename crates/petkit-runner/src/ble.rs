//! [`Transport`] over a local Bluetooth adapter, using btleplug.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use parking_lot::Mutex;
use petkit_engine::{
    ConnectionHandle, EventCallback, Transport, TransportError, TransportEvent, TransportResult,
};
use petkit_protocol::{
    identify_model, FountainModel, NOTIFY_CHARACTERISTIC_UUID, WRITE_CHARACTERISTIC_UUID,
};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How often the peripheral list is checked while scanning.
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Open the local adapter at `index`.
pub async fn open_adapter(index: usize) -> TransportResult<Adapter> {
    let manager = Manager::new()
        .await
        .map_err(|e| TransportError::Adapter(e.to_string()))?;
    let adapters = manager
        .adapters()
        .await
        .map_err(|e| TransportError::Adapter(e.to_string()))?;
    let count = adapters.len();
    adapters.into_iter().nth(index).ok_or_else(|| {
        TransportError::Adapter(format!("no adapter at index {} ({} found)", index, count))
    })
}

// ============================================================================
// Scanning
// ============================================================================

/// A peripheral seen during a scan.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredDevice {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i16>,
    /// Set when the advertisement identifies a known fountain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'static FountainModel>,
}

impl DiscoveredDevice {
    pub fn is_fountain(&self) -> bool {
        self.model.is_some()
    }
}

/// Scan for `duration` and report everything seen.
pub async fn scan(adapter: &Adapter, duration: Duration) -> TransportResult<Vec<DiscoveredDevice>> {
    adapter
        .start_scan(ScanFilter::default())
        .await
        .map_err(|e| TransportError::Adapter(e.to_string()))?;
    tokio::time::sleep(duration).await;

    let peripherals = adapter
        .peripherals()
        .await
        .map_err(|e| TransportError::Adapter(e.to_string()));
    if let Err(e) = adapter.stop_scan().await {
        warn!("scan: failed to stop scanning: {}", e);
    }

    let mut devices = Vec::new();
    for peripheral in peripherals? {
        let Ok(Some(props)) = peripheral.properties().await else {
            continue;
        };
        let model = props
            .service_data
            .values()
            .find_map(|data| identify_model(data));
        devices.push(DiscoveredDevice {
            address: peripheral.address().to_string(),
            name: props.local_name,
            rssi: props.rssi,
            model,
        });
    }
    devices.sort_by(|a, b| b.rssi.cmp(&a.rssi));
    Ok(devices)
}

// ============================================================================
// Transport
// ============================================================================

struct Connection {
    peripheral: Peripheral,
    write_char: Characteristic,
    notify_char: Characteristic,
    tasks: Vec<JoinHandle<()>>,
}

/// Talks to one fountain, found by address, through a local adapter.
pub struct BtleplugTransport {
    adapter: Adapter,
    address: String,
    scan_timeout: Duration,
    connections: Mutex<HashMap<u64, Connection>>,
    next_id: AtomicU64,
}

impl BtleplugTransport {
    pub fn new(adapter: Adapter, address: impl Into<String>, scan_timeout: Duration) -> Self {
        BtleplugTransport {
            adapter,
            address: address.into(),
            scan_timeout,
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn log_name(&self) -> String {
        format!("BtleplugTransport[{}]", self.address)
    }

    /// Scan until the configured address shows up or the scan times out.
    async fn find_peripheral(&self) -> TransportResult<Peripheral> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| TransportError::Adapter(e.to_string()))?;

        let deadline = tokio::time::Instant::now() + self.scan_timeout;
        let found = loop {
            if let Some(peripheral) = self.known_peripheral().await? {
                break Some(peripheral);
            }
            if tokio::time::Instant::now() >= deadline {
                break None;
            }
            tokio::time::sleep(SCAN_POLL_INTERVAL).await;
        };

        if let Err(e) = self.adapter.stop_scan().await {
            debug!("{}: failed to stop scanning: {}", self.log_name(), e);
        }
        found.ok_or_else(|| {
            TransportError::Connect(format!(
                "{} not found within {:?}",
                self.address, self.scan_timeout
            ))
        })
    }

    async fn known_peripheral(&self) -> TransportResult<Option<Peripheral>> {
        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| TransportError::Adapter(e.to_string()))?;
        Ok(peripherals
            .into_iter()
            .find(|p| p.address().to_string().eq_ignore_ascii_case(&self.address)))
    }

    fn connection_parts(
        &self,
        handle: &ConnectionHandle,
    ) -> TransportResult<(Peripheral, Characteristic, Characteristic)> {
        let connections = self.connections.lock();
        let connection = connections
            .get(&handle.id())
            .ok_or(TransportError::NotConnected)?;
        Ok((
            connection.peripheral.clone(),
            connection.write_char.clone(),
            connection.notify_char.clone(),
        ))
    }
}

fn find_characteristic(
    characteristics: &BTreeSet<Characteristic>,
    uuid: &str,
) -> TransportResult<Characteristic> {
    let wanted =
        Uuid::parse_str(uuid).map_err(|_| TransportError::CharacteristicNotFound(uuid.to_string()))?;
    characteristics
        .iter()
        .find(|c| c.uuid == wanted)
        .cloned()
        .ok_or_else(|| TransportError::CharacteristicNotFound(uuid.to_string()))
}

#[async_trait]
impl Transport for BtleplugTransport {
    async fn connect(&self) -> TransportResult<ConnectionHandle> {
        let peripheral = self.find_peripheral().await?;

        let connected = peripheral.is_connected().await.unwrap_or(false);
        if !connected {
            peripheral
                .connect()
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;
        }

        let characteristics = match peripheral.discover_services().await {
            Ok(()) => peripheral.characteristics(),
            Err(e) => {
                let _ = peripheral.disconnect().await;
                return Err(TransportError::Connect(e.to_string()));
            }
        };
        let chars = find_characteristic(&characteristics, WRITE_CHARACTERISTIC_UUID).and_then(
            |write| {
                find_characteristic(&characteristics, NOTIFY_CHARACTERISTIC_UUID)
                    .map(|notify| (write, notify))
            },
        );
        let (write_char, notify_char) = match chars {
            Ok(chars) => chars,
            Err(e) => {
                let _ = peripheral.disconnect().await;
                return Err(e);
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.connections.lock().insert(
            id,
            Connection {
                peripheral,
                write_char,
                notify_char,
                tasks: Vec::new(),
            },
        );
        info!("{}: connected", self.log_name());
        Ok(ConnectionHandle::new(id, self.address.clone()))
    }

    async fn write(&self, handle: &ConnectionHandle, data: &[u8]) -> TransportResult<()> {
        let (peripheral, write_char, _) = self.connection_parts(handle)?;
        peripheral
            .write(&write_char, data, WriteType::WithoutResponse)
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    async fn subscribe_notifications(
        &self,
        handle: &ConnectionHandle,
        callback: EventCallback,
    ) -> TransportResult<()> {
        let (peripheral, _, notify_char) = self.connection_parts(handle)?;

        peripheral
            .subscribe(&notify_char)
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;
        let mut notifications = peripheral
            .notifications()
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;
        let mut events = self
            .adapter
            .events()
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        let notify_uuid = notify_char.uuid;
        let on_notify = callback.clone();
        let reader = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid == notify_uuid {
                    on_notify(TransportEvent::Notification(notification.value));
                }
            }
            // Stream ends when the peripheral goes away
            on_notify(TransportEvent::Disconnected);
        });

        let peripheral_id = peripheral.id();
        let watcher = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(id) = event {
                    if id == peripheral_id {
                        callback(TransportEvent::Disconnected);
                        break;
                    }
                }
            }
        });

        match self.connections.lock().get_mut(&handle.id()) {
            Some(connection) => connection.tasks.extend([reader, watcher]),
            None => {
                reader.abort();
                watcher.abort();
                return Err(TransportError::NotConnected);
            }
        }
        debug!("{}: subscribed to notifications", self.log_name());
        Ok(())
    }

    async fn disconnect(&self, handle: &ConnectionHandle) {
        let Some(connection) = self.connections.lock().remove(&handle.id()) else {
            return;
        };
        for task in &connection.tasks {
            task.abort();
        }
        if let Err(e) = connection.peripheral.disconnect().await {
            warn!("{}: disconnect failed: {}", self.log_name(), e);
        } else {
            info!("{}: disconnected", self.log_name());
        }
    }
}
