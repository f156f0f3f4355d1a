//! Packet receiver
//!
//! One task per socket copies every datagram into the shared bounded queue.
//! A full queue blocks the receiver; a read error ends it.

use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

/// Read buffer per receiver
pub const READ_BUFFER_SIZE: usize = 64 * 1024;

/// One datagram as read from a socket
#[derive(Debug, Clone)]
pub struct RawDatagram {
    /// Sender address
    pub from: SocketAddr,
    /// Exactly the received bytes
    pub payload: Bytes,
}

/// Spawn the receive loop for one socket
pub fn spawn_receiver(
    ifname: String,
    socket: Arc<UdpSocket>,
    queue: mpsc::Sender<RawDatagram>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let (len, from) = tokio::select! {
                result = socket.recv_from(&mut buf) => match result {
                    Ok(received) => received,
                    Err(e) => {
                        error!(ifname = %ifname, error = %e, "Receive failed, stopping receiver");
                        break;
                    }
                },
                _ = shutdown.changed() => break,
            };

            trace!(ifname = %ifname, from = %from, len, "Datagram received");
            let datagram = RawDatagram {
                from,
                payload: Bytes::copy_from_slice(&buf[..len]),
            };

            tokio::select! {
                sent = queue.send(datagram) => {
                    if sent.is_err() {
                        debug!(ifname = %ifname, "Queue closed, stopping receiver");
                        break;
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!(ifname = %ifname, "Receiver stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::wait_for;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn test_forwards_exact_bytes() {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr = socket.local_addr().unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        let (stop, shutdown) = watch::channel(false);

        let handle = spawn_receiver("lo".to_string(), socket, tx, shutdown);

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"hello", addr).await.unwrap();

        let datagram = rx.recv().await.unwrap();
        assert_eq!(&datagram.payload[..], b"hello");
        assert_eq!(datagram.from, client.local_addr().unwrap());

        stop.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_full_queue_blocks_receiver() {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr = socket.local_addr().unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        let queue = tx.clone();
        let (stop, shutdown) = watch::channel(false);

        let handle = spawn_receiver("lo".to_string(), socket, tx, shutdown);

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"one", addr).await.unwrap();
        client.send_to(b"two", addr).await.unwrap();

        // "two" stays with the receiver while the single slot is taken
        assert!(wait_for(TIMEOUT, || queue.capacity() == 0).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(queue.capacity(), 0);
        assert!(!handle.is_finished());

        assert_eq!(&rx.recv().await.unwrap().payload[..], b"one");
        let second = tokio::time::timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(&second.payload[..], b"two");

        stop.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_releases_blocked_receiver() {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr = socket.local_addr().unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let queue = tx.clone();
        let (stop, shutdown) = watch::channel(false);

        let handle = spawn_receiver("lo".to_string(), socket, tx, shutdown);

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"one", addr).await.unwrap();
        client.send_to(b"two", addr).await.unwrap();
        assert!(wait_for(TIMEOUT, || queue.capacity() == 0).await);

        stop.send(true).unwrap();
        tokio::time::timeout(TIMEOUT, handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_read_error_stops_only_that_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let (stop, shutdown) = watch::channel(false);

        // A connected socket whose peer is gone reports the ICMP error on recv
        let gone = UdpSocket::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let failing = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        failing.connect(gone).await.unwrap();
        failing.send(b"ping").await.unwrap();
        let failing = spawn_receiver(
            "failing".to_string(),
            Arc::new(failing),
            tx.clone(),
            shutdown.clone(),
        );

        let healthy = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr = healthy.local_addr().unwrap();
        let healthy = spawn_receiver("healthy".to_string(), healthy, tx, shutdown);

        tokio::time::timeout(TIMEOUT, failing).await.unwrap().unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"still here", addr).await.unwrap();
        let datagram = tokio::time::timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(&datagram.payload[..], b"still here");
        assert!(!healthy.is_finished());

        stop.send(true).unwrap();
        healthy.await.unwrap();
    }
}
