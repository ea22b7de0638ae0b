//! Decoded telemetry and the payload decoders that produce it.
//!
//! Each response payload fills in the fields it carries. Fields whose bytes
//! are absent stay `None` and are omitted when serialized, so a short payload
//! degrades to fewer fields instead of wrong ones.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::constants::*;
use crate::types::*;

/// Telemetry gathered from one or more responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Telemetry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<Switch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<FountainMode>,
    /// Pump breakdown warning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warn_breakdown: Option<bool>,
    /// Water reservoir empty warning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warn_water: Option<bool>,
    /// Filter replacement warning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warn_filter: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_days_remaining: Option<u8>,
    /// Remaining filter life as 0..=100, derived from the days remaining.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_percent: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pump_runtime_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running_status: Option<RunningStatus>,
    /// Do-not-disturb switch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dnd: Option<Switch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub led_switch: Option<Switch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub led_brightness: Option<u8>,
    /// Child lock on the physical button.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
    /// Battery level in percent, as reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<u8>,
    /// Hex device identifier learned during the handshake.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// A single telemetry value in generic form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TelemetryValue {
    Bool(bool),
    Text(String),
    Integer(u64),
}

macro_rules! merge_fields {
    ($dst:ident, $src:ident, $($field:ident),+ $(,)?) => {
        $(
            if $src.$field.is_some() {
                $dst.$field = $src.$field;
            }
        )+
    };
}

impl Telemetry {
    /// Returns true if no field is set.
    pub fn is_empty(&self) -> bool {
        self.field_count() == 0
    }

    /// Number of fields that are set.
    pub fn field_count(&self) -> usize {
        self.to_map().len()
    }

    /// Overlay every field that is set in `other`.
    pub fn merge(&mut self, other: Telemetry) {
        merge_fields!(
            self,
            other,
            power,
            mode,
            warn_breakdown,
            warn_water,
            warn_filter,
            filter_days_remaining,
            filter_percent,
            pump_runtime_seconds,
            running_status,
            dnd,
            led_switch,
            led_brightness,
            locked,
            battery,
            device_id,
        );
    }

    /// Flatten into a name → value map of the fields that are set.
    pub fn to_map(&self) -> BTreeMap<&'static str, TelemetryValue> {
        let mut map = BTreeMap::new();
        let mut text = |name: &'static str, value: Option<&'static str>| {
            if let Some(v) = value {
                map.insert(name, TelemetryValue::Text(v.to_string()));
            }
        };
        text("power", self.power.map(Switch::as_str));
        text("mode", self.mode.map(FountainMode::as_str));
        text("running_status", self.running_status.map(RunningStatus::as_str));
        text("dnd", self.dnd.map(Switch::as_str));
        text("led_switch", self.led_switch.map(Switch::as_str));

        let flags = [
            ("warn_breakdown", self.warn_breakdown),
            ("warn_water", self.warn_water),
            ("warn_filter", self.warn_filter),
            ("locked", self.locked),
        ];
        for (name, value) in flags {
            if let Some(v) = value {
                map.insert(name, TelemetryValue::Bool(v));
            }
        }

        let numbers = [
            ("filter_days_remaining", self.filter_days_remaining.map(u64::from)),
            ("filter_percent", self.filter_percent.map(u64::from)),
            ("pump_runtime_seconds", self.pump_runtime_seconds),
            ("led_brightness", self.led_brightness.map(u64::from)),
            ("battery", self.battery.map(u64::from)),
        ];
        for (name, value) in numbers {
            if let Some(v) = value {
                map.insert(name, TelemetryValue::Integer(v));
            }
        }

        if let Some(id) = &self.device_id {
            map.insert("device_id", TelemetryValue::Text(id.clone()));
        }
        map
    }
}

/// Remaining filter life in percent of a [`FILTER_LIFE_DAYS`] cycle.
pub fn filter_percent(days_remaining: u8) -> u8 {
    if days_remaining == 0 {
        return 0;
    }
    let fraction = f64::from(days_remaining.min(FILTER_LIFE_DAYS)) / f64::from(FILTER_LIFE_DAYS);
    (fraction * 100.0).round() as u8
}

/// Decode a get-device-state (210) payload.
pub fn decode_device_state(payload: &[u8]) -> Telemetry {
    let byte = |i: usize| payload.get(i).copied();

    let days = byte(5);
    let runtime_minutes = payload
        .get(6..10)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));

    Telemetry {
        power: byte(0).map(Switch::from_raw),
        mode: byte(1).map(FountainMode::from_raw),
        warn_breakdown: byte(2).map(|b| b != 0),
        warn_water: byte(3).map(|b| b != 0),
        warn_filter: byte(4).map(|b| b != 0),
        filter_days_remaining: days,
        filter_percent: days.map(filter_percent),
        pump_runtime_seconds: runtime_minutes.map(|m| u64::from(m) * 60),
        running_status: byte(10).map(RunningStatus::from_raw),
        ..Telemetry::default()
    }
}

/// Decode a get-device-config (211) payload.
///
/// ```text
/// 0 smart on   1 smart off   2 led switch   3 led brightness
/// 4-7 led schedule           8 dnd switch   9-12 dnd schedule
/// 13 child lock
/// ```
pub fn decode_device_config(payload: &[u8]) -> Telemetry {
    let byte = |i: usize| payload.get(i).copied();
    Telemetry {
        led_switch: byte(2).map(Switch::from_raw),
        led_brightness: byte(3),
        dnd: byte(8).map(Switch::from_raw),
        locked: byte(13).map(|b| b == 1),
        ..Telemetry::default()
    }
}

/// Decode a get-battery (66) payload.
pub fn decode_battery(payload: &[u8]) -> Telemetry {
    Telemetry {
        battery: payload.first().copied(),
        ..Telemetry::default()
    }
}

/// Decode any telemetry-bearing response by command code.
///
/// Returns None for codes that carry no telemetry.
pub fn decode_response(command: u8, payload: &[u8]) -> Option<Telemetry> {
    match command {
        CMD_GET_DEVICE_STATE => Some(decode_device_state(payload)),
        CMD_GET_DEVICE_CONFIG => Some(decode_device_config(payload)),
        CMD_GET_BATTERY => Some(decode_battery(payload)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATE: [u8; 12] = [0x01, 0x02, 0x00, 0x00, 0x00, 0x05, 0x3C, 0x00, 0x00, 0x00, 0x01, 0x00];

    #[test]
    fn test_filter_percent_boundaries() {
        assert_eq!(filter_percent(0), 0);
        assert_eq!(filter_percent(30), 100);
        assert_eq!(filter_percent(45), 100);
        assert_eq!(filter_percent(5), 17);
        assert_eq!(filter_percent(15), 50);
        assert_eq!(filter_percent(255), 100);
    }

    #[test]
    fn test_decode_full_state() {
        let t = decode_device_state(&STATE);
        assert_eq!(t.power, Some(Switch::On));
        assert_eq!(t.mode, Some(FountainMode::Smart));
        assert_eq!(t.warn_breakdown, Some(false));
        assert_eq!(t.warn_water, Some(false));
        assert_eq!(t.warn_filter, Some(false));
        assert_eq!(t.filter_days_remaining, Some(5));
        assert_eq!(t.filter_percent, Some(17));
        assert_eq!(t.pump_runtime_seconds, Some(3600));
        assert_eq!(t.running_status, Some(RunningStatus::Running));
        assert_eq!(t.dnd, None);
    }

    #[test]
    fn test_decode_state_warnings_nonzero() {
        let mut state = STATE;
        state[2] = 1;
        state[3] = 2;
        state[4] = 0xFF;
        let t = decode_device_state(&state);
        assert_eq!(t.warn_breakdown, Some(true));
        assert_eq!(t.warn_water, Some(true));
        assert_eq!(t.warn_filter, Some(true));
    }

    #[test]
    fn test_decode_short_state_omits_fields() {
        let t = decode_device_state(&STATE[..8]);
        assert_eq!(t.power, Some(Switch::On));
        assert_eq!(t.filter_days_remaining, Some(5));
        assert_eq!(t.filter_percent, Some(17));
        assert_eq!(t.pump_runtime_seconds, None);
        assert_eq!(t.running_status, None);

        let t = decode_device_state(&STATE[..10]);
        assert_eq!(t.pump_runtime_seconds, Some(3600));
        assert_eq!(t.running_status, None);

        assert!(decode_device_state(&[]).is_empty());
    }

    #[test]
    fn test_decode_runtime_little_endian() {
        let mut state = STATE;
        state[6..10].copy_from_slice(&0x0001_0002u32.to_le_bytes());
        let t = decode_device_state(&state);
        assert_eq!(t.pump_runtime_seconds, Some(0x0001_0002u64 * 60));
    }

    #[test]
    fn test_decode_config() {
        let config = [0, 0, 1, 80, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1];
        let t = decode_device_config(&config);
        assert_eq!(t.led_switch, Some(Switch::On));
        assert_eq!(t.led_brightness, Some(80));
        assert_eq!(t.dnd, Some(Switch::On));
        assert_eq!(t.locked, Some(true));

        let t = decode_device_config(&config[..9]);
        assert_eq!(t.dnd, Some(Switch::On));
        assert_eq!(t.locked, None);

        let t = decode_device_config(&config[..8]);
        assert_eq!(t.dnd, None);
    }

    #[test]
    fn test_decode_battery() {
        assert_eq!(decode_battery(&[87, 0]).battery, Some(87));
        assert_eq!(decode_battery(&[]).battery, None);
    }

    #[test]
    fn test_decode_response_dispatch() {
        assert!(decode_response(CMD_GET_BATTERY, &[50]).is_some());
        assert!(decode_response(CMD_GET_DEVICE_STATE, &STATE).is_some());
        assert!(decode_response(CMD_SET_DATETIME, &[]).is_none());
        assert!(decode_response(CMD_GET_DEVICE_DETAILS, &[1, 2, 3, 4, 5, 6]).is_none());
    }

    #[test]
    fn test_merge_keeps_existing_fields() {
        let mut t = decode_device_state(&STATE);
        t.merge(decode_battery(&[42]));
        t.merge(Telemetry::default());
        assert_eq!(t.power, Some(Switch::On));
        assert_eq!(t.battery, Some(42));

        t.merge(decode_battery(&[41]));
        assert_eq!(t.battery, Some(41));
    }

    #[test]
    fn test_to_map_and_json() {
        let mut t = decode_device_state(&STATE);
        t.merge(decode_battery(&[90]));
        t.device_id = Some("010203040506".to_string());

        let map = t.to_map();
        assert_eq!(map["power"], TelemetryValue::Text("On".to_string()));
        assert_eq!(map["warn_water"], TelemetryValue::Bool(false));
        assert_eq!(map["battery"], TelemetryValue::Integer(90));
        assert!(!map.contains_key("dnd"));
        assert_eq!(t.field_count(), map.len());

        let json = serde_json::to_value(&t).expect("serializable");
        assert_eq!(json["mode"], "Smart");
        assert_eq!(json["pump_runtime_seconds"], 3600);
        assert_eq!(json["running_status"], "Running");
        assert!(json.get("dnd").is_none());
    }
}
