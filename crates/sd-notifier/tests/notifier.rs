//! End-to-end tests against a peer bound in the abstract namespace.
//!
//! These play the service manager's side: bind a datagram socket, point the
//! notifier at it and check what arrives.

#![cfg(target_os = "linux")]

use std::os::linux::net::SocketAddrExt;
use std::os::unix::net::{SocketAddr, UnixDatagram as StdUnixDatagram};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use sd_notifier::{ErrorKind, Notifier, NotifierConfig, NotifierError, PeriodicMessage};
use tokio::net::UnixDatagram;

static NEXT_SOCKET: AtomicU32 = AtomicU32::new(0);

/// Bind a peer at a unique abstract name and return it with its `@name` address.
fn abstract_peer(prefix: &str) -> (UnixDatagram, String) {
    let name = format!(
        "{prefix}-{}-{}",
        std::process::id(),
        NEXT_SOCKET.fetch_add(1, Ordering::SeqCst)
    );
    let addr = SocketAddr::from_abstract_name(name.as_bytes()).expect("Invalid abstract name");
    let socket = StdUnixDatagram::bind_addr(&addr).expect("Failed to bind abstract socket");
    socket.set_nonblocking(true).unwrap();
    let peer = UnixDatagram::from_std(socket).expect("Failed to register socket");
    (peer, format!("@{name}"))
}

async fn recv(peer: &UnixDatagram, within: Duration) -> Vec<u8> {
    let mut buf = vec![0u8; 4096];
    let n = tokio::time::timeout(within, peer.recv(&mut buf))
        .await
        .expect("Timed out waiting for datagram")
        .expect("Failed to receive datagram");
    buf.truncate(n);
    buf
}

fn pending(peer: &UnixDatagram) -> usize {
    let mut buf = [0u8; 4096];
    let mut count = 0;
    while peer.try_recv(&mut buf).is_ok() {
        count += 1;
    }
    count
}

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_no_errors_without_environment() {
        let mut notifier = Notifier::new(NotifierConfig::from_lookup(|_| None));

        notifier
            .scoped(async |notifier| {
                notifier.ready().await.unwrap();
                notifier.status("Testing").await.unwrap();
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sends_ready_then_status() {
        let (peer, address) = abstract_peer("testsock");
        let mut notifier = Notifier::new(NotifierConfig::default().with_notify_socket(address));

        notifier
            .scoped(async |notifier| {
                notifier.ready().await.unwrap();
                notifier.status("Testing").await.unwrap();
            })
            .await
            .unwrap();

        assert_eq!(recv(&peer, Duration::from_secs(1)).await, b"READY=1");
        assert_eq!(recv(&peer, Duration::from_secs(1)).await, b"STATUS=Testing");
        assert_eq!(pending(&peer), 0);
    }

    #[tokio::test]
    async fn test_abstract_address_is_not_a_path() {
        let (peer, address) = abstract_peer("abcd");
        assert!(!std::path::Path::new(&address).exists());

        let notifier = Notifier::new(
            NotifierConfig::default()
                .with_debug(true)
                .with_notify_socket(address),
        );
        notifier.connect().await.unwrap();
        notifier.notify(b"MAINPID=1").await.unwrap();

        assert_eq!(recv(&peer, Duration::from_secs(1)).await, b"MAINPID=1");
    }

    #[tokio::test]
    async fn test_connect_to_unbound_abstract_name() {
        let address = format!("@unbound-{}", std::process::id());

        let strict = Notifier::new(
            NotifierConfig::default()
                .with_debug(true)
                .with_notify_socket(address.clone()),
        );
        let err = strict.connect().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);

        let quiet = Notifier::new(NotifierConfig::default().with_notify_socket(address));
        quiet.connect().await.unwrap();
        assert!(!quiet.is_connected());
        quiet.ready().await.unwrap();
    }

    #[tokio::test]
    async fn test_exit_cancels_task_and_closes_connection() {
        let (peer, address) = abstract_peer("exit");
        let mut notifier = Notifier::new(
            NotifierConfig::default()
                .with_debug(true)
                .with_notify_socket(address),
        );

        notifier.enter().await.unwrap();
        notifier
            .notify_regularly(
                Some(Duration::from_millis(10)),
                PeriodicMessage::fixed("STATUS=busy"),
            )
            .unwrap();
        assert_eq!(recv(&peer, Duration::from_secs(1)).await, b"STATUS=busy");

        notifier.exit().await.unwrap();
        assert!(!notifier.is_connected());
        assert!(!notifier.is_periodic_running());
        pending(&peer);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(pending(&peer), 0);

        notifier.disconnect().await;
        assert!(matches!(
            notifier.status("after").await,
            Err(NotifierError::NotConnected)
        ));
    }
}

mod watchdog_tests {
    use super::*;

    #[tokio::test]
    async fn test_watchdog_uses_half_interval() {
        let (peer, address) = abstract_peer("watchdog");
        let mut notifier = Notifier::new(
            NotifierConfig::default()
                .with_notify_socket(address)
                .with_watchdog_usec(1_000_000)
                .with_auto_watchdog(true),
        );

        notifier
            .scoped(async |notifier| {
                assert!(notifier.is_periodic_running());
                notifier.ready().await.unwrap();
                let ready_at = Instant::now();

                assert_eq!(recv(&peer, Duration::from_secs(1)).await, b"READY=1");
                notifier.status("Testing").await.unwrap();
                assert_eq!(recv(&peer, Duration::from_secs(1)).await, b"STATUS=Testing");

                assert_eq!(recv(&peer, Duration::from_millis(900)).await, b"WATCHDOG=1");
                assert!(ready_at.elapsed() >= Duration::from_millis(450));
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_watchdog_without_interval_is_configuration_error() {
        let (_peer, address) = abstract_peer("noenv");
        let mut notifier = Notifier::new(NotifierConfig::default().with_notify_socket(address));
        notifier.connect().await.unwrap();

        let err = notifier.start_watchdog(None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!notifier.is_periodic_running());
    }
}
