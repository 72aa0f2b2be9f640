//! The notifier: connection management, message transmission and the
//! scoped lifecycle.
//!
//! Failures are absorbed by default so a service behaves the same whether
//! or not it runs under a service manager. Each absorbed failure may log a
//! warning, up to `warn_limit` in a row; any successful send resets the
//! streak.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::net::UnixDatagram;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::address::NotifyAddress;
use crate::config::NotifierConfig;
use crate::error::{NotifierError, Result};
use crate::periodic::{self, PeriodicMessage, PeriodicTask};
use crate::state::NotifyState;

/// State shared between the notifier and its periodic task.
pub(crate) struct Shared {
    debug: bool,
    warn_limit: u32,
    warnings: AtomicU32,
    socket: RwLock<Option<Arc<UnixDatagram>>>,
    ready_tx: watch::Sender<bool>,
}

impl Shared {
    fn new(config: &NotifierConfig) -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            debug: config.debug,
            warn_limit: config.warn_limit,
            warnings: AtomicU32::new(0),
            socket: RwLock::new(None),
            ready_tx,
        }
    }

    /// Send one datagram, applying the failure policy.
    pub(crate) async fn notify(&self, message: &[u8]) -> Result<()> {
        match self.send(message).await {
            Ok(()) => {
                self.warnings.store(0, Ordering::SeqCst);
                Ok(())
            }
            Err(err) => self.absorb(err),
        }
    }

    async fn send(&self, message: &[u8]) -> Result<()> {
        let socket = self
            .socket
            .read()
            .clone()
            .ok_or(NotifierError::NotConnected)?;

        let sent = socket.send(message).await.map_err(NotifierError::Send)?;
        if sent != message.len() {
            return Err(NotifierError::Send(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("incomplete datagram: sent {sent} of {} bytes", message.len()),
            )));
        }
        Ok(())
    }

    /// Return the error in debug mode, otherwise log it while the streak
    /// is below the limit and swallow it.
    pub(crate) fn absorb(&self, err: NotifierError) -> Result<()> {
        if self.debug {
            return Err(err);
        }

        let limit = self.warn_limit;
        let claimed = self
            .warnings
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < limit).then_some(n + 1)
            })
            .is_ok();

        if claimed {
            warn!(error = %err, "Failed to notify service manager");
        }
        Ok(())
    }

    pub(crate) fn subscribe_ready(&self) -> watch::Receiver<bool> {
        self.ready_tx.subscribe()
    }
}

/// Client for the service manager notification socket.
///
/// Construction does no I/O. Call [`connect`](Self::connect) (or
/// [`enter`](Self::enter)) before sending, and [`exit`](Self::exit) when
/// done. [`scoped`](Self::scoped) pairs the two.
pub struct Notifier {
    config: NotifierConfig,
    shared: Arc<Shared>,
    task: Option<PeriodicTask>,
    // Error left behind by a task that finished before being replaced.
    task_error: Option<NotifierError>,
}

impl Notifier {
    pub fn new(config: NotifierConfig) -> Self {
        let shared = Arc::new(Shared::new(&config));
        Self {
            config,
            shared,
            task: None,
            task_error: None,
        }
    }

    /// Create a notifier configured from the process environment.
    pub fn from_env() -> Self {
        Self::new(NotifierConfig::from_env())
    }

    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.shared.socket.read().is_some()
    }

    /// Whether `READY=1` has been sent.
    pub fn is_ready(&self) -> bool {
        *self.shared.ready_tx.borrow()
    }

    /// Length of the current warning streak.
    pub fn warnings_emitted(&self) -> u32 {
        self.shared.warnings.load(Ordering::SeqCst)
    }

    /// Connect to the notification socket.
    ///
    /// Any previous connection is released first. Outside debug mode a
    /// failure is logged (when warnings are enabled) and the notifier is
    /// left disconnected.
    pub async fn connect(&self) -> Result<()> {
        self.shared.socket.write().take();

        match self.open() {
            Ok((address, socket)) => {
                debug!(%address, "Connected to notification socket");
                *self.shared.socket.write() = Some(Arc::new(socket));
                Ok(())
            }
            Err(err) if self.config.debug => Err(err),
            Err(err) => {
                if self.config.warn_limit > 0 {
                    warn!(error = %err, "Failed to connect to notification socket");
                }
                Ok(())
            }
        }
    }

    fn open(&self) -> Result<(NotifyAddress, UnixDatagram)> {
        let raw = self
            .config
            .notify_socket
            .as_deref()
            .ok_or(NotifierError::SocketNotConfigured)?;
        let address = NotifyAddress::parse(raw)?;
        let socket = address.connect().map_err(|source| NotifierError::Connect {
            address: raw.to_string(),
            source,
        })?;
        Ok((address, socket))
    }

    /// Close the connection. Does nothing when not connected.
    pub async fn disconnect(&self) {
        let socket = self.shared.socket.write().take();
        if socket.is_some() {
            debug!("Disconnected from notification socket");
        }
    }

    /// Send a raw payload as one datagram.
    pub async fn notify(&self, message: impl AsRef<[u8]>) -> Result<()> {
        self.shared.notify(message.as_ref()).await
    }

    /// Send a typed state.
    pub async fn send_state(&self, state: &NotifyState) -> Result<()> {
        match state.encode() {
            Ok(payload) => self.shared.notify(&payload).await,
            Err(err) => self.shared.absorb(err),
        }
    }

    /// Send several states in a single datagram.
    pub async fn send_states(&self, states: &[NotifyState]) -> Result<()> {
        match NotifyState::encode_all(states) {
            Ok(payload) => self.shared.notify(&payload).await,
            Err(err) => self.shared.absorb(err),
        }
    }

    /// Send `READY=1` and release a waiting watchdog task.
    ///
    /// The service counts as ready even if the send fails, so the watchdog
    /// starts either way.
    pub async fn ready(&self) -> Result<()> {
        let sent = self.send_state(&NotifyState::Ready).await;
        self.shared.ready_tx.send_replace(true);
        sent
    }

    /// Send `STATUS=<text>`.
    pub async fn status(&self, text: &str) -> Result<()> {
        self.send_state(&NotifyState::status(text)).await
    }

    pub async fn watchdog(&self) -> Result<()> {
        self.send_state(&NotifyState::Watchdog).await
    }

    pub async fn stopping(&self) -> Result<()> {
        self.send_state(&NotifyState::Stopping).await
    }

    pub async fn reloading(&self) -> Result<()> {
        self.send_state(&NotifyState::Reloading).await
    }

    /// Repeat a message at a fixed interval, starting immediately.
    ///
    /// Without an explicit interval the service manager's `WATCHDOG_USEC`
    /// is used as is. Interval errors are always returned, and nothing is
    /// spawned in that case.
    pub fn notify_regularly(
        &mut self,
        interval: Option<Duration>,
        message: PeriodicMessage,
    ) -> Result<()> {
        self.ensure_idle()?;
        let period = match interval {
            Some(period) => period,
            None => self.config.watchdog_interval()?,
        };
        let period = periodic::validate_period(period)?;

        let shared = self.shared.clone();
        self.task = Some(PeriodicTask::spawn(move |token| {
            periodic::repeat(shared, period, message, token)
        }));
        info!(period_ms = period.as_millis() as u64, "Started periodic notifications");
        Ok(())
    }

    /// Send `WATCHDOG=1` periodically once the service is ready.
    ///
    /// Without an explicit interval, half of `WATCHDOG_USEC` is used so the
    /// service manager sees two keep-alives per timeout.
    pub fn start_watchdog(&mut self, interval: Option<Duration>) -> Result<()> {
        self.ensure_idle()?;
        let period = match interval {
            Some(period) => period,
            None => self.config.watchdog_interval()? / 2,
        };
        let period = periodic::validate_period(period)?;

        let shared = self.shared.clone();
        self.task = Some(PeriodicTask::spawn(move |token| {
            periodic::watchdog(shared, period, token)
        }));
        info!(period_ms = period.as_millis() as u64, "Started watchdog keep-alive");
        Ok(())
    }

    /// Whether a periodic task is still running.
    pub fn is_periodic_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancel the periodic task and wait for it to finish.
    ///
    /// Returns the task's own error, if it stopped on one. An error from
    /// an earlier task that finished before a new one was started is
    /// reported here too.
    pub async fn stop_periodic(&mut self) -> Result<()> {
        let stopped = match self.task.take() {
            Some(task) => task.stop().await,
            None => Ok(()),
        };
        match self.task_error.take() {
            Some(err) => Err(err),
            None => stopped,
        }
    }

    fn ensure_idle(&mut self) -> Result<()> {
        if self.is_periodic_running() {
            return Err(NotifierError::TaskAlreadyRunning);
        }
        if let Some(task) = self.task.take()
            && let Err(err) = task.reap()
        {
            debug!(error = %err, "Previous periodic task had failed");
            self.task_error.get_or_insert(err);
        }
        Ok(())
    }

    /// Connect and, if configured, start the watchdog.
    pub async fn enter(&mut self) -> Result<()> {
        self.connect().await?;

        if self.config.auto_watchdog
            && let Err(err) = self.start_watchdog(None)
        {
            self.disconnect().await;
            return Err(err);
        }
        Ok(())
    }

    /// Stop the periodic task, then disconnect.
    ///
    /// The connection is released even if the task reports an error.
    pub async fn exit(&mut self) -> Result<()> {
        let stopped = self.stop_periodic().await;
        self.disconnect().await;
        stopped
    }

    /// Run `body` between [`enter`](Self::enter) and [`exit`](Self::exit).
    ///
    /// `exit` runs whatever `body` returns; an exit error takes precedence
    /// over the body's output.
    pub async fn scoped<T, F>(&mut self, body: F) -> Result<T>
    where
        F: AsyncFnOnce(&mut Notifier) -> T,
    {
        self.enter().await?;
        let output = body(&mut *self).await;
        self.exit().await?;
        Ok(output)
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.cancel();
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .field("warnings_emitted", &self.warnings_emitted())
            .field("periodic_running", &self.is_periodic_running())
            .finish()
    }
}
