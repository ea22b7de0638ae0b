//! Frame encoding/decoding utilities.
//!
//! Every request and notification is a single self-contained frame:
//!
//! ```text
//! +------+------+-----+-----+-----+------+-----------------+----------+
//! | 0x55 | 0xAA | len | seq | cmd | type | payload[0..N]   | checksum |
//! +------+------+-----+-----+-----+------+-----------------+----------+
//! ```
//!
//! - `len` = N + 4 (sequence, command, type and checksum are counted)
//! - `checksum` = XOR of every byte from `len` through the last payload byte

use bytes::BufMut;

use crate::constants::*;
use crate::error::{FrameError, FrameResult};

/// A decoded protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sequence number (wraps mod 256).
    pub sequence: u8,
    /// Command or response code.
    pub command: u8,
    /// Frame type, always [`FRAME_TYPE_DEFAULT`] in practice.
    pub frame_type: u8,
    /// Command payload.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a new frame.
    pub fn new(sequence: u8, command: u8, frame_type: u8, payload: impl Into<Vec<u8>>) -> Self {
        Frame {
            sequence,
            command,
            frame_type,
            payload: payload.into(),
        }
    }

    /// Checksum this frame carries on the wire.
    pub fn checksum(&self) -> u8 {
        let header = [
            (self.payload.len() + LENGTH_OFFSET) as u8,
            self.sequence,
            self.command,
            self.frame_type,
        ];
        xor_checksum(&header) ^ xor_checksum(&self.payload)
    }

    /// Encode the frame to bytes.
    ///
    /// # Panics
    ///
    /// Panics if the payload does not fit in the length byte.
    pub fn encode(&self) -> Vec<u8> {
        build_frame(self.sequence, self.command, self.frame_type, &self.payload)
    }

    /// Decode a frame from a notification.
    pub fn decode(data: &[u8]) -> FrameResult<Frame> {
        parse_frame(data)
    }
}

/// Build a frame from its parts.
///
/// # Panics
///
/// Panics if `payload` is longer than [`MAX_PAYLOAD_LEN`].
pub fn build_frame(sequence: u8, command: u8, frame_type: u8, payload: &[u8]) -> Vec<u8> {
    assert!(
        payload.len() <= MAX_PAYLOAD_LEN,
        "payload of {} bytes exceeds the {} byte limit",
        payload.len(),
        MAX_PAYLOAD_LEN
    );

    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + payload.len() + 1);
    buf.put_slice(&FRAME_MAGIC);
    buf.put_u8((payload.len() + LENGTH_OFFSET) as u8);
    buf.put_u8(sequence);
    buf.put_u8(command);
    buf.put_u8(frame_type);
    buf.put_slice(payload);
    let checksum = xor_checksum(&buf[2..]);
    buf.put_u8(checksum);
    buf
}

/// Parse a frame, validating length, magic, declared length and checksum in that order.
///
/// Bytes past the declared length are ignored.
pub fn parse_frame(data: &[u8]) -> FrameResult<Frame> {
    if data.len() < MIN_FRAME_LEN {
        return Err(FrameError::FrameTooShort {
            expected: MIN_FRAME_LEN,
            actual: data.len(),
        });
    }

    if data[..2] != FRAME_MAGIC {
        return Err(FrameError::BadMagic(data[0], data[1]));
    }

    let declared = data[2];
    if (declared as usize) < LENGTH_OFFSET {
        return Err(FrameError::InvalidLength(declared));
    }

    let needed = declared as usize + UNCOUNTED_PREFIX_LEN;
    if data.len() < needed {
        return Err(FrameError::Truncated {
            declared,
            needed,
            actual: data.len(),
        });
    }

    let frame = &data[..needed];
    let carried = frame[needed - 1];
    let computed = xor_checksum(&frame[2..needed - 1]);
    if carried != computed {
        return Err(FrameError::ChecksumMismatch {
            expected: computed,
            actual: carried,
        });
    }

    Ok(Frame {
        sequence: frame[3],
        command: frame[4],
        frame_type: frame[5],
        payload: frame[FRAME_HEADER_LEN..needed - 1].to_vec(),
    })
}

fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_layout() {
        let bytes = build_frame(7, CMD_GET_DEVICE_STATE, FRAME_TYPE_DEFAULT, &[0, 0]);
        assert_eq!(bytes.len(), 9);
        assert_eq!(&bytes[..6], &[0x55, 0xAA, 6, 7, 210, 1]);
        assert_eq!(&bytes[6..8], &[0, 0]);
        assert_eq!(bytes[8], 6 ^ 7 ^ 210 ^ 1);
    }

    #[test]
    fn test_round_trip() {
        for len in [0usize, 1, 2, 16, 100, MAX_PAYLOAD_LEN] {
            let payload: Vec<u8> = (0..len).map(|i| (i * 37) as u8).collect();
            let bytes = build_frame(0xFE, 0x42, 3, &payload);
            let frame = parse_frame(&bytes).expect("should parse");
            assert_eq!(frame, Frame::new(0xFE, 0x42, 3, payload));
            assert_eq!(frame.checksum(), bytes[bytes.len() - 1]);
        }
    }

    #[test]
    #[should_panic]
    fn test_build_rejects_oversized_payload() {
        build_frame(0, 1, 1, &[0u8; MAX_PAYLOAD_LEN + 1]);
    }

    #[test]
    fn test_checksum_bit_flips() {
        let bytes = build_frame(1, CMD_GET_BATTERY, FRAME_TYPE_DEFAULT, &[0, 0]);
        let last = bytes.len() - 1;
        for bit in 0..8 {
            let mut corrupted = bytes.clone();
            corrupted[last] ^= 1 << bit;
            assert!(matches!(
                parse_frame(&corrupted),
                Err(FrameError::ChecksumMismatch { .. })
            ));
        }
    }

    #[test]
    fn test_payload_corruption_detected() {
        let mut bytes = build_frame(1, CMD_GET_DEVICE_CONFIG, FRAME_TYPE_DEFAULT, &[1, 2, 3, 4]);
        bytes[7] ^= 0x10;
        assert!(matches!(
            parse_frame(&bytes),
            Err(FrameError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_too_short() {
        assert_eq!(
            parse_frame(&[0x55, 0xAA, 4, 0, 1]),
            Err(FrameError::FrameTooShort {
                expected: 6,
                actual: 5
            })
        );
        assert!(matches!(
            parse_frame(&[]),
            Err(FrameError::FrameTooShort { actual: 0, .. })
        ));
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = build_frame(0, 1, 1, &[0, 0]);
        bytes[1] = 0xAB;
        assert_eq!(parse_frame(&bytes), Err(FrameError::BadMagic(0x55, 0xAB)));
    }

    #[test]
    fn test_truncated() {
        let bytes = build_frame(9, CMD_GET_DEVICE_STATE, FRAME_TYPE_DEFAULT, &[1; 12]);
        for cut in MIN_FRAME_LEN..bytes.len() {
            assert!(
                matches!(parse_frame(&bytes[..cut]), Err(FrameError::Truncated { .. })),
                "cut at {} should be truncated",
                cut
            );
        }
    }

    #[test]
    fn test_invalid_declared_length() {
        let bytes = [0x55, 0xAA, 2, 0, 1, 1, 0];
        assert_eq!(parse_frame(&bytes), Err(FrameError::InvalidLength(2)));
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let mut bytes = build_frame(3, CMD_GET_BATTERY, FRAME_TYPE_DEFAULT, &[80]);
        bytes.extend_from_slice(&[0xDE, 0xAD]);
        let frame = parse_frame(&bytes).expect("should parse");
        assert_eq!(frame.payload, vec![80]);
    }

    #[test]
    fn test_error_reasons() {
        assert_eq!(FrameError::BadMagic(0, 0).reason(), "bad_magic");
        assert_eq!(
            FrameError::ChecksumMismatch {
                expected: 0,
                actual: 1
            }
            .reason(),
            "checksum"
        );
    }
}
