//! Error Types
//!
//! One error enum per failure domain, unified into [`SyncError`] at the
//! crate boundary. Connection failures are deliberately NOT part of the
//! consumer-facing result types: they surface as a status transition on
//! the hub watch channel, never as an `Err` (see `ConnectionStatus`).

use thiserror::Error;

pub use crate::channel::ChannelError;

// ----------------------------------------------------------------------------
// REST Collaborator Errors
// ----------------------------------------------------------------------------

/// Failure of a request/response call against the marketplace backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request never produced an HTTP response.
    #[error("request failed: {message}")]
    Transport { message: String },

    /// The server answered with a non-success status.
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body did not match the expected shape.
    #[error("response decode failed: {message}")]
    Decode { message: String },

    /// The request exceeded its deadline.
    #[error("request timed out after {millis}ms")]
    Timeout { millis: u64 },
}

impl ApiError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Whether a fresh attempt could plausibly succeed. Client-side
    /// contract violations (4xx) are not retryable; everything else is.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Decode { .. } => false,
        }
    }
}

// ----------------------------------------------------------------------------
// Push Channel Errors
// ----------------------------------------------------------------------------

/// Failure while establishing or holding a hub connection.
///
/// These drive the reconnect state machine; they are logged and folded
/// into `ConnectionStatus`, never returned to subscribers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// The hub rejected the handshake. `fatal` marks rejections that no
    /// amount of retrying will fix (bad credentials, unknown hub).
    #[error("handshake failed: {reason}")]
    Handshake { reason: String, fatal: bool },

    /// The hub endpoint could not be reached at all.
    #[error("hub unreachable: {message}")]
    Unreachable { message: String },

    /// An established session dropped mid-stream.
    #[error("transport dropped: {message}")]
    Dropped { message: String },
}

impl ConnectError {
    pub fn handshake(reason: impl Into<String>, fatal: bool) -> Self {
        Self::Handshake {
            reason: reason.into(),
            fatal,
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }

    pub fn dropped(message: impl Into<String>) -> Self {
        Self::Dropped {
            message: message.into(),
        }
    }

    /// Fatal errors stop the retry schedule instead of feeding it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Handshake { fatal: true, .. })
    }
}

// ----------------------------------------------------------------------------
// Unified Error
// ----------------------------------------------------------------------------

/// Top-level error for the synchronization engine.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Connection error: {0}")]
    Connect(#[from] ConnectError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl SyncError {
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Result alias for engine-level operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result alias for REST collaborator calls.
pub type ApiResult<T> = Result<T, ApiError>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_retryability() {
        assert!(ApiError::transport("connection refused").is_retryable());
        assert!(ApiError::Timeout { millis: 3000 }.is_retryable());
        assert!(ApiError::status(503, "unavailable").is_retryable());
        assert!(!ApiError::status(404, "no such conversation").is_retryable());
        assert!(!ApiError::decode("missing field `messageId`").is_retryable());
    }

    #[test]
    fn connect_error_fatality() {
        assert!(ConnectError::handshake("token rejected", true).is_fatal());
        assert!(!ConnectError::handshake("server busy", false).is_fatal());
        assert!(!ConnectError::unreachable("dns failure").is_fatal());
        assert!(!ConnectError::dropped("read reset").is_fatal());
    }

    #[test]
    fn unified_error_display() {
        let err: SyncError = ApiError::status(500, "boom").into();
        assert_eq!(err.to_string(), "API error: server returned 500: boom");

        let err = SyncError::config_error("empty backoff schedule");
        assert_eq!(
            err.to_string(),
            "Configuration error: empty backoff schedule"
        );
    }
}
