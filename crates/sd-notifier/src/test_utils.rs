use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tempfile::TempDir;
use tokio::net::UnixDatagram;
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

/// Counts `WARN` events emitted while its guard is alive.
#[derive(Clone, Default)]
pub struct WarnCounter(Arc<AtomicUsize>);

impl WarnCounter {
    /// Install a thread-local subscriber that counts warnings and writes
    /// everything to the test output.
    pub fn install() -> (Self, DefaultGuard) {
        let counter = Self::default();
        let guard = tracing_subscriber::registry()
            .with(counter.clone())
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .set_default();
        (counter, guard)
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Bind a peer datagram socket on a fresh filesystem path.
pub fn bind_peer() -> (TempDir, PathBuf, UnixDatagram) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("notify.sock");
    let peer = UnixDatagram::bind(&path).expect("Failed to bind peer socket");
    (dir, path, peer)
}

/// Receive one datagram or panic after two seconds.
pub async fn recv_timeout(peer: &UnixDatagram) -> Vec<u8> {
    let mut buf = vec![0u8; 4096];
    let n = tokio::time::timeout(Duration::from_secs(2), peer.recv(&mut buf))
        .await
        .expect("Timed out waiting for datagram")
        .expect("Failed to receive datagram");
    buf.truncate(n);
    buf
}

/// Discard everything already queued on the peer.
pub fn drain(peer: &UnixDatagram) -> usize {
    let mut buf = [0u8; 4096];
    let mut count = 0;
    while peer.try_recv(&mut buf).is_ok() {
        count += 1;
    }
    count
}
