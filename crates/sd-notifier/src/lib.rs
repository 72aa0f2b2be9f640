//! # sd-notifier
//!
//! Client side of the service manager notification protocol (`sd_notify`).
//! A service reports readiness, status and watchdog keep-alives to its
//! supervisor by sending short `KEY=VALUE` datagrams to the socket named in
//! `NOTIFY_SOCKET`.
//!
//! ## Features
//!
//! - Abstract-namespace (`@name`) and filesystem socket addresses
//! - Best-effort sends: failures are absorbed and logged a bounded number
//!   of times unless debug mode is on
//! - Periodic notifications and a watchdog keep-alive task that starts once
//!   the service reports ready
//! - Scoped lifecycle that always cancels the task and closes the socket
//!
//! ```no_run
//! use sd_notifier::{Notifier, NotifierConfig};
//!
//! # async fn run() -> sd_notifier::Result<()> {
//! let mut notifier = Notifier::new(NotifierConfig::from_env().with_auto_watchdog(true));
//! notifier
//!     .scoped(async |notifier| {
//!         notifier.ready().await?;
//!         notifier.status("Serving").await
//!     })
//!     .await??;
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//!
//! MIT OR Apache-2.0
//!
//! ## Authors
//!
//! - hua0512
//!

#![cfg(unix)]

pub mod address;
pub mod config;
pub mod error;
pub mod notifier;
pub mod periodic;
pub mod state;

#[cfg(test)]
mod test_utils;

pub use address::NotifyAddress;
pub use config::{NOTIFY_SOCKET_ENV, NotifierConfig, WATCHDOG_PID_ENV, WATCHDOG_USEC_ENV};
pub use error::{ErrorKind, NotifierError, Result};
pub use notifier::Notifier;
pub use periodic::PeriodicMessage;
pub use state::NotifyState;
