//! Requests that can be sent to the fountain.

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::constants::*;
use crate::frame::Frame;
use crate::types::*;

/// Requests that can be sent to the fountain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Read the device identifier. First step of the handshake.
    GetDeviceDetails,

    /// Hand the device its identifier and derived secret.
    InitDevice {
        /// Identifier from get-device-details.
        device_identifier: DeviceIdentifier,
        /// Secret derived from the identifier.
        secret: Secret,
    },

    /// Confirm the derived secret.
    DeviceSync {
        /// Secret derived from the identifier.
        secret: Secret,
    },

    /// Set the device clock.
    SetDateTime {
        /// Local wall-clock time.
        timestamp: NaiveDateTime,
    },

    /// Read the running state.
    GetDeviceState,

    /// Read the configuration block.
    GetDeviceConfig,

    /// Read the battery level.
    GetBattery,

    /// Read firmware information.
    GetDeviceInfo,

    /// Read the device type.
    GetDeviceType,

    /// Write a full state block (see get-device-state).
    SetDeviceState {
        /// State bytes as read, with the desired fields modified.
        state: Vec<u8>,
    },

    /// Write a full config block (see get-device-config).
    SetDeviceConfig {
        /// Config bytes as read, with the desired fields modified.
        config: Vec<u8>,
    },

    /// Reset the filter life counter.
    ResetFilter,
}

impl Request {
    /// Get the command code for this request.
    pub fn code(&self) -> u8 {
        match self {
            Request::GetDeviceDetails => CMD_GET_DEVICE_DETAILS,
            Request::InitDevice { .. } => CMD_INIT_DEVICE,
            Request::DeviceSync { .. } => CMD_DEVICE_SYNC,
            Request::SetDateTime { .. } => CMD_SET_DATETIME,
            Request::GetDeviceState => CMD_GET_DEVICE_STATE,
            Request::GetDeviceConfig => CMD_GET_DEVICE_CONFIG,
            Request::GetBattery => CMD_GET_BATTERY,
            Request::GetDeviceInfo => CMD_GET_DEVICE_INFO,
            Request::GetDeviceType => CMD_GET_DEVICE_TYPE,
            Request::SetDeviceState { .. } => CMD_SET_DEVICE_MODE,
            Request::SetDeviceConfig { .. } => CMD_SET_DEVICE_CONFIG,
            Request::ResetFilter => CMD_RESET_FILTER,
        }
    }

    /// Response code to wait for, or None if the device does not answer.
    ///
    /// Writes are unacknowledged. Set-datetime is awaited but usually times out.
    pub fn response_code(&self) -> Option<u8> {
        match self {
            Request::SetDeviceState { .. }
            | Request::SetDeviceConfig { .. }
            | Request::ResetFilter => None,
            other => Some(other.code()),
        }
    }

    /// Encode the request payload.
    pub fn encode_payload(&self) -> Vec<u8> {
        match self {
            Request::InitDevice {
                device_identifier,
                secret,
            } => {
                let mut buf = Vec::with_capacity(2 + 2 * SECRET_LEN);
                buf.extend_from_slice(&EMPTY_REQUEST_PAYLOAD);
                buf.extend_from_slice(&device_identifier.padded());
                buf.extend_from_slice(secret.as_bytes());
                buf
            }

            Request::DeviceSync { secret } => {
                let mut buf = Vec::with_capacity(2 + SECRET_LEN);
                buf.extend_from_slice(&EMPTY_REQUEST_PAYLOAD);
                buf.extend_from_slice(secret.as_bytes());
                buf
            }

            Request::SetDateTime { timestamp } => datetime_payload(timestamp).to_vec(),

            Request::SetDeviceState { state } => state.clone(),

            Request::SetDeviceConfig { config } => config.clone(),

            Request::GetDeviceDetails
            | Request::GetDeviceState
            | Request::GetDeviceConfig
            | Request::GetBattery
            | Request::GetDeviceInfo
            | Request::GetDeviceType
            | Request::ResetFilter => EMPTY_REQUEST_PAYLOAD.to_vec(),
        }
    }

    /// Build the frame for this request.
    pub fn to_frame(&self, sequence: u8) -> Frame {
        Frame::new(sequence, self.code(), FRAME_TYPE_DEFAULT, self.encode_payload())
    }
}

/// Clock payload: the four-digit year split into two two-digit bytes, then
/// month, day, hour, minute, second.
pub fn datetime_payload(timestamp: &NaiveDateTime) -> [u8; 7] {
    let year = timestamp.year().rem_euclid(10_000) as u32;
    [
        (year / 100) as u8,
        (year % 100) as u8,
        timestamp.month() as u8,
        timestamp.day() as u8,
        timestamp.hour() as u8,
        timestamp.minute() as u8,
        timestamp.second() as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .and_then(|date| date.and_hms_opt(h, mi, s))
            .expect("valid timestamp")
    }

    #[test]
    fn test_datetime_payload() {
        assert_eq!(
            datetime_payload(&at(2026, 3, 9, 14, 5, 59)),
            [20, 26, 3, 9, 14, 5, 59]
        );
        assert_eq!(datetime_payload(&at(2000, 1, 1, 0, 0, 0)), [20, 0, 1, 1, 0, 0, 0]);
        assert_eq!(
            datetime_payload(&at(1999, 12, 31, 23, 59, 58)),
            [19, 99, 12, 31, 23, 59, 58]
        );
    }

    #[test]
    fn test_handshake_payloads() {
        let id = DeviceIdentifier::new([1, 2, 3, 4, 5, 6]);
        let secret = id.derive_secret();

        let init = Request::InitDevice {
            device_identifier: id,
            secret,
        };
        assert_eq!(init.code(), 73);
        assert_eq!(
            init.encode_payload(),
            vec![0, 0, 1, 2, 3, 4, 5, 6, 0, 0, 6, 5, 4, 3, 2, 1, 0, 0]
        );

        let sync = Request::DeviceSync { secret };
        assert_eq!(sync.code(), 86);
        assert_eq!(sync.encode_payload(), vec![0, 0, 6, 5, 4, 3, 2, 1, 0, 0]);
    }

    #[test]
    fn test_query_payloads() {
        for request in [
            Request::GetDeviceDetails,
            Request::GetDeviceState,
            Request::GetDeviceConfig,
            Request::GetBattery,
            Request::ResetFilter,
        ] {
            assert_eq!(request.encode_payload(), vec![0, 0]);
        }
    }

    #[test]
    fn test_response_codes() {
        assert_eq!(Request::GetDeviceState.response_code(), Some(210));
        assert_eq!(Request::GetBattery.response_code(), Some(66));
        assert_eq!(
            Request::SetDateTime {
                timestamp: at(2026, 1, 1, 0, 0, 0)
            }
            .response_code(),
            Some(84)
        );
        assert_eq!(Request::ResetFilter.response_code(), None);
        assert_eq!(Request::SetDeviceState { state: vec![1; 12] }.response_code(), None);
    }

    #[test]
    fn test_to_frame() {
        let frame = Request::GetDeviceDetails.to_frame(200);
        assert_eq!(frame.sequence, 200);
        assert_eq!(frame.command, CMD_GET_DEVICE_DETAILS);
        assert_eq!(frame.frame_type, FRAME_TYPE_DEFAULT);
        assert_eq!(frame.encode(), vec![0x55, 0xAA, 6, 200, 213, 1, 0, 0, 6 ^ 200 ^ 213 ^ 1]);
    }
}
