//! Notifier configuration.
//!
//! The protocol is driven by environment variables set by the service
//! manager. They are read once into a [`NotifierConfig`] so the notifier
//! itself never touches the process environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{NotifierError, Result};

/// Address of the service manager's notification socket.
pub const NOTIFY_SOCKET_ENV: &str = "NOTIFY_SOCKET";
/// Watchdog interval expected by the service manager, in microseconds.
pub const WATCHDOG_USEC_ENV: &str = "WATCHDOG_USEC";
/// Process the watchdog interval is addressed to.
pub const WATCHDOG_PID_ENV: &str = "WATCHDOG_PID";

/// Configuration for a [`Notifier`](crate::Notifier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Return connection and send failures to the caller instead of
    /// absorbing them.
    #[serde(default)]
    pub debug: bool,
    /// Maximum consecutive warnings logged for absorbed failures.
    /// Zero disables warnings.
    #[serde(default = "default_warn_limit")]
    pub warn_limit: u32,
    /// Raw notification socket address. A leading `@` selects the
    /// abstract namespace.
    #[serde(default)]
    pub notify_socket: Option<String>,
    /// Raw watchdog interval in microseconds. Parsed lazily when a
    /// periodic task needs it.
    #[serde(default)]
    pub watchdog_usec: Option<String>,
    /// Start the watchdog keep-alive task on [`Notifier::enter`](crate::Notifier::enter).
    #[serde(default)]
    pub auto_watchdog: bool,
}

fn default_warn_limit() -> u32 {
    3
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            debug: false,
            warn_limit: default_warn_limit(),
            notify_socket: None,
            watchdog_usec: None,
            auto_watchdog: false,
        }
    }
}

impl NotifierConfig {
    /// Build a configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// A `WATCHDOG_PID` naming another process means the watchdog is not
    /// meant for us, so the interval is dropped.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let notify_socket = lookup(NOTIFY_SOCKET_ENV);
        let mut watchdog_usec = lookup(WATCHDOG_USEC_ENV);

        if let Some(pid) = lookup(WATCHDOG_PID_ENV) {
            let ours = std::process::id();
            if pid.trim().parse::<u32>().ok() != Some(ours) {
                debug!(
                    watchdog_pid = %pid,
                    pid = ours,
                    "Ignoring WATCHDOG_USEC addressed to another process"
                );
                watchdog_usec = None;
            }
        }

        Self {
            notify_socket,
            watchdog_usec,
            ..Self::default()
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_warn_limit(mut self, warn_limit: u32) -> Self {
        self.warn_limit = warn_limit;
        self
    }

    pub fn with_notify_socket(mut self, address: impl Into<String>) -> Self {
        self.notify_socket = Some(address.into());
        self
    }

    /// Set the watchdog interval as the service manager would, in microseconds.
    pub fn with_watchdog_usec(mut self, usec: u64) -> Self {
        self.watchdog_usec = Some(usec.to_string());
        self
    }

    pub fn with_auto_watchdog(mut self, enabled: bool) -> Self {
        self.auto_watchdog = enabled;
        self
    }

    /// The watchdog interval declared by the service manager.
    ///
    /// Fails if the value is missing, unparsable or zero.
    pub fn watchdog_interval(&self) -> Result<Duration> {
        let raw = self.watchdog_usec.as_deref().ok_or_else(|| {
            NotifierError::configuration(
                "unable to determine watchdog interval: \
                 WATCHDOG_USEC is not set and no interval was given",
            )
        })?;

        let usec: u64 = raw.trim().parse().map_err(|e| {
            NotifierError::configuration(format!("invalid WATCHDOG_USEC {raw:?}: {e}"))
        })?;

        if usec == 0 {
            return Err(NotifierError::configuration(
                "WATCHDOG_USEC must be greater than zero",
            ));
        }

        Ok(Duration::from_micros(usec))
    }
}
