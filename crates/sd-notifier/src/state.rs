//! Typed notification states.
//!
//! Each state renders as one `KEY=VALUE` line. Several states may share a
//! datagram, separated by newlines.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;

use crate::error::{NotifierError, Result};

/// A single state assignment understood by the service manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyState {
    /// Startup finished (`READY=1`).
    Ready,
    /// Reloading configuration (`RELOADING=1`).
    Reloading,
    /// Beginning shutdown (`STOPPING=1`).
    Stopping,
    /// Free-form status line (`STATUS=...`).
    Status(String),
    /// Failure reported as an errno value (`ERRNO=...`).
    Errno(i32),
    /// Main process id of the service (`MAINPID=...`).
    MainPid(u32),
    /// Watchdog keep-alive (`WATCHDOG=1`).
    Watchdog,
    /// Ask the service manager to act as if the watchdog expired
    /// (`WATCHDOG=trigger`).
    WatchdogTrigger,
    /// Reset the watchdog timeout (`WATCHDOG_USEC=...`).
    WatchdogUsec(Duration),
    /// Extend the current start/stop timeout (`EXTEND_TIMEOUT_USEC=...`).
    ExtendTimeoutUsec(Duration),
    /// Any other assignment.
    Custom { key: String, value: String },
}

impl NotifyState {
    pub fn status(text: impl Into<String>) -> Self {
        Self::Status(text.into())
    }

    pub fn custom(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Custom {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Check that the state fits on one protocol line.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Status(text) if text.contains('\n') => Err(NotifierError::invalid_state(
                "STATUS value must not contain a newline",
            )),
            Self::Custom { key, value } => {
                if key.is_empty() || key.contains(['=', '\n']) {
                    return Err(NotifierError::invalid_state(format!(
                        "invalid state key {key:?}"
                    )));
                }
                if value.contains('\n') {
                    return Err(NotifierError::invalid_state(format!(
                        "{key} value must not contain a newline"
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Encode a single state as a datagram payload.
    pub fn encode(&self) -> Result<Bytes> {
        self.validate()?;
        Ok(Bytes::from(self.to_string()))
    }

    /// Encode several states into one datagram payload.
    pub fn encode_all(states: &[NotifyState]) -> Result<Bytes> {
        let mut lines = Vec::with_capacity(states.len());
        for state in states {
            state.validate()?;
            lines.push(state.to_string());
        }
        Ok(Bytes::from(lines.join("\n")))
    }
}

impl fmt::Display for NotifyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => f.write_str("READY=1"),
            Self::Reloading => f.write_str("RELOADING=1"),
            Self::Stopping => f.write_str("STOPPING=1"),
            Self::Status(text) => write!(f, "STATUS={text}"),
            Self::Errno(errno) => write!(f, "ERRNO={errno}"),
            Self::MainPid(pid) => write!(f, "MAINPID={pid}"),
            Self::Watchdog => f.write_str("WATCHDOG=1"),
            Self::WatchdogTrigger => f.write_str("WATCHDOG=trigger"),
            Self::WatchdogUsec(d) => write!(f, "WATCHDOG_USEC={}", d.as_micros()),
            Self::ExtendTimeoutUsec(d) => write!(f, "EXTEND_TIMEOUT_USEC={}", d.as_micros()),
            Self::Custom { key, value } => write!(f, "{key}={value}"),
        }
    }
}
