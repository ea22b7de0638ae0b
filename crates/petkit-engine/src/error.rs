//! Engine error types.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by a [`Transport`](crate::Transport) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Could not establish a connection.
    #[error("connect failed: {0}")]
    Connect(String),

    /// A write to the command characteristic failed.
    #[error("write failed: {0}")]
    Write(String),

    /// Could not subscribe to notifications.
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// The link is not (or no longer) connected.
    #[error("not connected")]
    NotConnected,

    /// A required GATT characteristic is missing.
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(String),

    /// The platform adapter reported an error.
    #[error("adapter error: {0}")]
    Adapter(String),
}

/// Errors from a single request/response exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorrelationError {
    /// No matching response before the deadline.
    #[error("timed out after {timeout:?} waiting for response {expected} to command {command}")]
    Timeout {
        /// Command that was sent.
        command: u8,
        /// Response code that was awaited.
        expected: u8,
        /// Deadline that elapsed.
        timeout: Duration,
    },

    /// Another request is already waiting on this response code.
    #[error("a request is already waiting for response {0}")]
    AlreadyPending(u8),

    /// The link dropped while the request was outstanding.
    #[error("link disconnected while waiting for a response")]
    Disconnected,

    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl CorrelationError {
    /// True for failures worth repeating: a timeout or a failed write.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CorrelationError::Timeout { .. } | CorrelationError::Transport(TransportError::Write(_))
        )
    }

    /// True when the link is gone and nothing more can be sent on it.
    pub fn is_link_lost(&self) -> bool {
        matches!(
            self,
            CorrelationError::Disconnected | CorrelationError::Transport(TransportError::NotConnected)
        )
    }

    /// True when a fetch cycle cannot go on: the link is gone or the
    /// transport still fails once retries run out.
    pub fn aborts_cycle(&self) -> bool {
        self.is_link_lost() || matches!(self, CorrelationError::Transport(_))
    }
}

/// Errors from the initialization handshake.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// The device never returned a usable identifier.
    #[error("device details unavailable after {attempts} attempts")]
    DetailsUnavailable {
        /// Attempts made.
        attempts: u32,
    },

    /// The link failed mid-handshake.
    #[error("transport failure during handshake: {0}")]
    Transport(#[from] CorrelationError),
}

/// Errors that abort a fetch cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Could not connect or subscribe.
    #[error("connect failed: {0}")]
    Connect(#[from] TransportError),

    /// The handshake failed.
    #[error("initialization failed: {0}")]
    InitFailed(#[from] HandshakeError),

    /// The link was lost during the cycle.
    #[error("transport failure during fetch: {0}")]
    Transport(#[from] CorrelationError),
}

/// Errors from a control command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// Could not bring up an initialized session.
    #[error(transparent)]
    Session(#[from] FetchError),

    /// Reading the current block or writing the new one failed.
    #[error("control exchange failed: {0}")]
    Exchange(#[from] CorrelationError),

    /// The block read back is too short to modify safely.
    #[error("response {command} payload too short: need {expected} bytes, got {actual}")]
    InvalidPayload {
        /// Response code of the block.
        command: u8,
        /// Minimum length required.
        expected: usize,
        /// Length received.
        actual: usize,
    },

    /// The device type does not support this control.
    #[error("{0} is not supported by this device")]
    Unsupported(&'static str),
}

/// Errors from the device registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No factory registered for this device type.
    #[error("unknown device type '{0}'")]
    UnknownDeviceType(String),
}

pub type TransportResult<T> = Result<T, TransportError>;
pub type CorrelationResult<T> = Result<T, CorrelationError>;
pub type HandshakeResult<T> = Result<T, HandshakeError>;
pub type FetchResult<T> = Result<T, FetchError>;
pub type ControlResult<T> = Result<T, ControlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let timeout = CorrelationError::Timeout {
            command: 210,
            expected: 210,
            timeout: Duration::from_secs(10),
        };
        assert!(timeout.is_retryable());
        assert!(CorrelationError::Transport(TransportError::Write("busy".into())).is_retryable());
        assert!(!CorrelationError::Disconnected.is_retryable());
        assert!(!CorrelationError::AlreadyPending(210).is_retryable());
        assert!(!CorrelationError::Transport(TransportError::NotConnected).is_retryable());
    }

    #[test]
    fn test_link_lost_classification() {
        assert!(CorrelationError::Disconnected.is_link_lost());
        assert!(CorrelationError::Transport(TransportError::NotConnected).is_link_lost());
        assert!(!CorrelationError::AlreadyPending(66).is_link_lost());
    }

    #[test]
    fn test_cycle_abort_classification() {
        assert!(CorrelationError::Disconnected.aborts_cycle());
        assert!(CorrelationError::Transport(TransportError::NotConnected).aborts_cycle());
        assert!(CorrelationError::Transport(TransportError::Write("busy".into())).aborts_cycle());
        assert!(!CorrelationError::AlreadyPending(66).aborts_cycle());
        let timeout = CorrelationError::Timeout {
            command: 211,
            expected: 211,
            timeout: Duration::from_secs(10),
        };
        assert!(!timeout.aborts_cycle());
    }

    #[test]
    fn test_error_messages() {
        let err = FetchError::InitFailed(HandshakeError::DetailsUnavailable { attempts: 6 });
        assert_eq!(
            err.to_string(),
            "initialization failed: device details unavailable after 6 attempts"
        );
        let err = ControlError::InvalidPayload {
            command: 210,
            expected: 12,
            actual: 4,
        };
        assert_eq!(err.to_string(), "response 210 payload too short: need 12 bytes, got 4");
    }
}
