//! Notifier error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, NotifierError>;

/// Coarse classification of a [`NotifierError`].
///
/// Connection and notify failures are environmental and get absorbed unless
/// the notifier runs in debug mode. Configuration failures are caller
/// defects and are always returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The notification socket could not be resolved or connected.
    Connection,
    /// A message could not be delivered.
    Notify,
    /// A periodic task could not be configured or started.
    Configuration,
    /// A periodic task terminated abnormally.
    Task,
}

/// Errors that can occur while talking to the service manager.
#[derive(Error, Debug)]
pub enum NotifierError {
    /// No notification socket address was configured (`NOTIFY_SOCKET` unset).
    #[error("Notification socket address is not set")]
    SocketNotConfigured,

    /// The notification socket address is malformed.
    #[error("Invalid notification socket address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Opening or connecting the datagram socket failed.
    #[error("Failed to connect to notification socket {address:?}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// A send was attempted before a successful `connect`.
    #[error("Not connected to the notification socket")]
    NotConnected,

    /// The datagram could not be written.
    #[error("Failed to send notification: {0}")]
    Send(#[source] std::io::Error),

    /// A state message cannot be encoded on the wire.
    #[error("Invalid state message: {0}")]
    InvalidState(String),

    /// The periodic interval could not be determined.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A periodic task is already active on this notifier.
    #[error("A periodic notification task is already running")]
    TaskAlreadyRunning,

    /// The periodic task panicked or was aborted unexpectedly.
    #[error("Periodic notification task failed: {0}")]
    TaskFailed(String),
}

impl NotifierError {
    /// Create an invalid address error.
    pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SocketNotConfigured | Self::InvalidAddress { .. } | Self::Connect { .. } => {
                ErrorKind::Connection
            }
            Self::NotConnected | Self::Send(_) | Self::InvalidState(_) => ErrorKind::Notify,
            Self::Configuration(_) | Self::TaskAlreadyRunning => ErrorKind::Configuration,
            Self::TaskFailed(_) => ErrorKind::Task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_connected_is_distinct_from_send_failure() {
        let usage = NotifierError::NotConnected;
        let io = NotifierError::Send(std::io::Error::from(std::io::ErrorKind::ConnectionRefused));

        assert_eq!(usage.kind(), ErrorKind::Notify);
        assert_eq!(io.kind(), ErrorKind::Notify);
        assert!(matches!(usage, NotifierError::NotConnected));
        assert!(matches!(io, NotifierError::Send(_)));
    }

    #[test]
    fn kinds() {
        assert_eq!(
            NotifierError::SocketNotConfigured.kind(),
            ErrorKind::Connection
        );
        assert_eq!(
            NotifierError::invalid_address("@", "empty abstract name").kind(),
            ErrorKind::Connection
        );
        assert_eq!(
            NotifierError::TaskAlreadyRunning.kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            NotifierError::TaskFailed("boom".into()).kind(),
            ErrorKind::Task
        );
    }
}
