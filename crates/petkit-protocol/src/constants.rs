//! Protocol constants
//!
//! These constants define the framing, command codes, and GATT identifiers
//! used by the Petkit fountain protocol.

// ============================================================================
// Framing
// ============================================================================

/// Two-byte magic that opens every frame.
pub const FRAME_MAGIC: [u8; 2] = [0x55, 0xAA];
/// Bytes before the payload: magic, length, sequence, command, type.
pub const FRAME_HEADER_LEN: usize = 6;
/// Smallest buffer the parser will look at.
pub const MIN_FRAME_LEN: usize = FRAME_HEADER_LEN;
/// Difference between the declared length byte and the payload length.
pub const LENGTH_OFFSET: usize = 4;
/// Magic plus the length byte itself; the declared length counts everything after.
pub const UNCOUNTED_PREFIX_LEN: usize = 3;
/// Largest payload that fits in the one-byte length field.
pub const MAX_PAYLOAD_LEN: usize = 251;
/// Frame type used for every request and response.
pub const FRAME_TYPE_DEFAULT: u8 = 1;

// ============================================================================
// Command Codes (responses carry the same code)
// ============================================================================

/// Read the battery level.
pub const CMD_GET_BATTERY: u8 = 66;
/// Hand the device its identifier and derived secret.
pub const CMD_INIT_DEVICE: u8 = 73;
/// Set the device clock.
pub const CMD_SET_DATETIME: u8 = 84;
/// Confirm the derived secret.
pub const CMD_DEVICE_SYNC: u8 = 86;
/// Read firmware information.
pub const CMD_GET_DEVICE_INFO: u8 = 200;
/// Read the device type.
pub const CMD_GET_DEVICE_TYPE: u8 = 201;
/// Read the running state.
pub const CMD_GET_DEVICE_STATE: u8 = 210;
/// Read the configuration block.
pub const CMD_GET_DEVICE_CONFIG: u8 = 211;
/// Read the device identifier used for key derivation.
pub const CMD_GET_DEVICE_DETAILS: u8 = 213;
/// Write the running state (power, mode).
pub const CMD_SET_DEVICE_MODE: u8 = 220;
/// Write the configuration block.
pub const CMD_SET_DEVICE_CONFIG: u8 = 221;
/// Reset the filter life counter.
pub const CMD_RESET_FILTER: u8 = 222;

/// Payload sent with every parameterless request.
pub const EMPTY_REQUEST_PAYLOAD: [u8; 2] = [0, 0];

// ============================================================================
// Handshake
// ============================================================================

/// Length of the identifier returned by get-device-details.
pub const DEVICE_IDENTIFIER_LEN: usize = 6;
/// Length of the derived secret and of the padded identifier.
pub const SECRET_LEN: usize = 8;

// ============================================================================
// Telemetry
// ============================================================================

/// Nominal filter life in days.
pub const FILTER_LIFE_DAYS: u8 = 30;
/// Length of a complete device-state payload.
pub const DEVICE_STATE_LEN: usize = 12;
/// Shortest config payload that still carries the do-not-disturb byte.
pub const DEVICE_CONFIG_MIN_LEN: usize = 9;
/// Mode byte value for smart mode.
pub const MODE_SMART: u8 = 2;
/// Mode byte value written for normal mode.
pub const MODE_NORMAL: u8 = 1;

// ============================================================================
// GATT
// ============================================================================

/// Characteristic that accepts request frames.
pub const WRITE_CHARACTERISTIC_UUID: &str = "0000aaa2-0000-1000-8000-00805f9b34fb";
/// Characteristic that emits response and push frames.
pub const NOTIFY_CHARACTERISTIC_UUID: &str = "0000aaa1-0000-1000-8000-00805f9b34fb";
/// Offset of the model code within advertisement service data.
pub const ADVERTISEMENT_MODEL_OFFSET: usize = 5;
