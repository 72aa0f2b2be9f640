//! Periodic notifications and the watchdog keep-alive.
//!
//! Both modes run as a single spawned task bound to a
//! [`CancellationToken`]. Cancellation is observed while sleeping, while
//! waiting for readiness and while a send is pending, so stopping the task
//! never leaves a send racing the socket teardown.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{NotifierError, Result};
use crate::notifier::Shared;

const WATCHDOG_MESSAGE: &[u8] = b"WATCHDOG=1";

/// Longest interval accepted; the timer adds it to `Instant::now()`.
const MAX_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Payload sent on every tick of [`Notifier::notify_regularly`](crate::Notifier::notify_regularly).
#[derive(Default)]
pub enum PeriodicMessage {
    /// An empty datagram.
    #[default]
    Empty,
    /// The same payload every tick.
    Fixed(Bytes),
    /// A payload produced fresh for each tick.
    Callback(Box<dyn FnMut() -> Bytes + Send>),
}

impl PeriodicMessage {
    pub fn fixed(payload: impl Into<Bytes>) -> Self {
        Self::Fixed(payload.into())
    }

    pub fn callback<F, B>(mut f: F) -> Self
    where
        F: FnMut() -> B + Send + 'static,
        B: Into<Bytes>,
    {
        Self::Callback(Box::new(move || f().into()))
    }

    fn next_payload(&mut self) -> Bytes {
        match self {
            Self::Empty => Bytes::new(),
            Self::Fixed(payload) => payload.clone(),
            Self::Callback(f) => f(),
        }
    }
}

impl std::fmt::Debug for PeriodicMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Fixed(payload) => f.debug_tuple("Fixed").field(payload).finish(),
            Self::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// Reject intervals the timer cannot tick at.
pub(crate) fn validate_period(period: Duration) -> Result<Duration> {
    if period.is_zero() {
        return Err(NotifierError::configuration(
            "periodic notification interval must be greater than zero",
        ));
    }
    if period > MAX_PERIOD {
        return Err(NotifierError::configuration(format!(
            "periodic notification interval {period:?} exceeds the maximum of {MAX_PERIOD:?}"
        )));
    }
    Ok(period)
}

/// Handle to a running periodic task.
pub(crate) struct PeriodicTask {
    handle: JoinHandle<Result<()>>,
    token: CancellationToken,
}

impl PeriodicTask {
    pub(crate) fn spawn<F, Fut>(make: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let token = CancellationToken::new();
        let handle = tokio::spawn(make(token.clone()));
        Self { handle, token }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancel and wait for the task to terminate.
    pub(crate) async fn stop(self) -> Result<()> {
        self.token.cancel();
        settle(self.handle.await)
    }

    /// Collect the outcome of a task that has already finished.
    pub(crate) fn reap(self) -> Result<()> {
        self.token.cancel();
        match self.handle.now_or_never() {
            Some(joined) => settle(joined),
            None => Ok(()),
        }
    }
}

fn settle(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    match joined {
        Ok(result) => result,
        Err(join_error) if join_error.is_cancelled() => Ok(()),
        Err(join_error) => Err(NotifierError::TaskFailed(join_error.to_string())),
    }
}

/// Send `message` every `period`, starting immediately.
pub(crate) async fn repeat(
    shared: Arc<Shared>,
    period: Duration,
    mut message: PeriodicMessage,
    token: CancellationToken,
) -> Result<()> {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let payload = message.next_payload();
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            result = shared.notify(&payload) => result?,
        }
        trace!(len = payload.len(), "Sent periodic notification");
    }

    debug!("Periodic notifications stopped");
    Ok(())
}

/// Wait for readiness, then send `WATCHDOG=1` every `period`.
pub(crate) async fn watchdog(
    shared: Arc<Shared>,
    period: Duration,
    token: CancellationToken,
) -> Result<()> {
    let mut ready = shared.subscribe_ready();

    tokio::select! {
        biased;
        _ = token.cancelled() => return Ok(()),
        became_ready = async { ready.wait_for(|ready| *ready).await.is_ok() } => {
            if !became_ready {
                return Ok(());
            }
        }
    }
    debug!(period_ms = period.as_millis() as u64, "Service ready, watchdog armed");

    let start = Instant::now()
        .checked_add(period)
        .ok_or_else(|| NotifierError::configuration("watchdog interval overflows the timer"))?;
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            result = shared.notify(WATCHDOG_MESSAGE) => result?,
        }
        trace!("Sent watchdog keep-alive");
    }

    debug!("Watchdog stopped");
    Ok(())
}
