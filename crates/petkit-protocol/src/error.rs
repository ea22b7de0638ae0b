//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when parsing a notification into a frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer is shorter than a frame header.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Expected minimum length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// First two bytes are not the frame magic.
    #[error("bad magic: 0x{0:02X} 0x{1:02X}")]
    BadMagic(u8, u8),

    /// Declared length is smaller than the fixed fields it must cover.
    #[error("invalid declared length {0}")]
    InvalidLength(u8),

    /// Buffer ends before the declared length.
    #[error("truncated frame: declared {declared} bytes, need {needed}, got {actual}")]
    Truncated {
        /// Declared length byte.
        declared: u8,
        /// Total bytes the declared length implies.
        needed: usize,
        /// Actual length received.
        actual: usize,
    },

    /// XOR checksum does not match.
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch {
        /// Checksum computed over the frame.
        expected: u8,
        /// Checksum byte carried by the frame.
        actual: u8,
    },
}

impl FrameError {
    /// Short label used when counting dropped frames.
    pub fn reason(&self) -> &'static str {
        match self {
            FrameError::FrameTooShort { .. } => "too_short",
            FrameError::BadMagic(..) => "bad_magic",
            FrameError::InvalidLength(_) => "invalid_length",
            FrameError::Truncated { .. } => "truncated",
            FrameError::ChecksumMismatch { .. } => "checksum",
        }
    }
}

/// Result alias for frame parsing.
pub type FrameResult<T> = Result<T, FrameError>;
