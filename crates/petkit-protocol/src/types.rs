//! Common types used in the protocol.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::*;

/// The 6-byte identifier a fountain reports from get-device-details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentifier(pub [u8; DEVICE_IDENTIFIER_LEN]);

impl DeviceIdentifier {
    /// Create a new identifier from bytes.
    pub fn new(bytes: [u8; DEVICE_IDENTIFIER_LEN]) -> Self {
        DeviceIdentifier(bytes)
    }

    /// Take the identifier from the front of a details payload.
    /// Returns None if the payload is too short.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        let bytes = payload.get(..DEVICE_IDENTIFIER_LEN)?;
        let mut id = [0u8; DEVICE_IDENTIFIER_LEN];
        id.copy_from_slice(bytes);
        Some(DeviceIdentifier(id))
    }

    /// The identifier right-padded with zeros to the secret length.
    pub fn padded(&self) -> [u8; SECRET_LEN] {
        let mut padded = [0u8; SECRET_LEN];
        padded[..DEVICE_IDENTIFIER_LEN].copy_from_slice(&self.0);
        padded
    }

    /// Derive the per-device secret: the identifier reversed, zero-padded to 8 bytes.
    pub fn derive_secret(&self) -> Secret {
        let mut secret = [0u8; SECRET_LEN];
        for (dst, src) in secret.iter_mut().zip(self.0.iter().rev()) {
            *dst = *src;
        }
        Secret(secret)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; DEVICE_IDENTIFIER_LEN] {
        &self.0
    }

    /// Get the bytes as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for DeviceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// The 8-byte secret derived from a [`DeviceIdentifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Secret(pub [u8; SECRET_LEN]);

impl Secret {
    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }
}

/// An on/off switch as reported by the fountain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    /// Decode from a raw byte: 1 is on, anything else is off.
    pub fn from_raw(raw: u8) -> Self {
        if raw == 1 {
            Switch::On
        } else {
            Switch::Off
        }
    }

    /// Byte written back to the device.
    pub fn to_raw(self) -> u8 {
        match self {
            Switch::On => 1,
            Switch::Off => 0,
        }
    }

    pub fn is_on(self) -> bool {
        self == Switch::On
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Switch::On => "On",
            Switch::Off => "Off",
        }
    }
}

impl From<bool> for Switch {
    fn from(on: bool) -> Self {
        if on {
            Switch::On
        } else {
            Switch::Off
        }
    }
}

/// Pump operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FountainMode {
    /// Intermittent pumping driven by the device schedule.
    Smart,
    /// Continuous pumping.
    Normal,
}

impl FountainMode {
    /// Decode from a raw byte: [`MODE_SMART`] is smart, anything else is normal.
    pub fn from_raw(raw: u8) -> Self {
        if raw == MODE_SMART {
            FountainMode::Smart
        } else {
            FountainMode::Normal
        }
    }

    /// Byte written back to the device.
    pub fn to_raw(self) -> u8 {
        match self {
            FountainMode::Smart => MODE_SMART,
            FountainMode::Normal => MODE_NORMAL,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FountainMode::Smart => "Smart",
            FountainMode::Normal => "Normal",
        }
    }
}

/// Whether the pump is currently moving water.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunningStatus {
    Running,
    Idle,
}

impl RunningStatus {
    /// Decode from a raw byte: 1 is running, anything else is idle.
    pub fn from_raw(raw: u8) -> Self {
        if raw == 1 {
            RunningStatus::Running
        } else {
            RunningStatus::Idle
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunningStatus::Running => "Running",
            RunningStatus::Idle => "Idle",
        }
    }
}
