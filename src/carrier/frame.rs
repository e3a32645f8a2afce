//! Framed message carrier over a reliable byte stream.
//!
//! Wire framing is a 32-bit network-byte-order payload length followed by
//! that many payload bytes. Message boundaries are preserved; partial reads
//! and writes are resumed by the async I/O primitives. The carrier is
//! single-use: after close no further traffic flows and the close
//! notification is delivered exactly once, after all prior inbound messages.
//!
//! Buffers handed to [`CarrierHandle::send`] are immutable [`Bytes`]; a
//! caller cannot mutate a payload between enqueue and write completion.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

use crate::domain_types::{PayloadLimit, QueueCapacity};
use crate::error::CarrierError;

/// Why a carrier stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The remote end closed the stream.
    PeerClosed,
    /// An inbound frame exceeded the payload ceiling.
    Oversize { size: usize, limit: usize },
    /// Read or write failure on the socket.
    Io(String),
    /// This end asked for teardown.
    LocalClose,
}

/// Inbound carrier traffic, in order, ending with exactly one `Closed`.
#[derive(Debug)]
pub enum CarrierEvent {
    Message(Bytes),
    Closed(CloseReason),
}

/// Receiving side of a carrier.
pub struct CarrierInbox {
    events: mpsc::Receiver<CarrierEvent>,
}

impl CarrierInbox {
    /// Next inbound event. After `Closed` is returned the inbox only yields
    /// `Closed(LocalClose)` again, so loops can treat it as terminal.
    pub async fn next(&mut self) -> CarrierEvent {
        match self.events.recv().await {
            Some(ev) => ev,
            None => CarrierEvent::Closed(CloseReason::LocalClose),
        }
    }
}

/// Sending side of a carrier. Cheap to clone.
#[derive(Clone)]
pub struct CarrierHandle {
    peer: SocketAddr,
    payload_limit: PayloadLimit,
    writer: mpsc::Sender<Bytes>,
    shutdown: watch::Sender<bool>,
    closed: Arc<AtomicBool>,
}

impl CarrierHandle {
    /// Enqueues one message. Fails with `Backpressure` when the writer
    /// queue is at its high-water mark, and with `Closed` after teardown.
    pub fn send(&self, payload: Bytes) -> Result<(), CarrierError> {
        if payload.len() > self.payload_limit.as_usize() {
            return Err(CarrierError::OversizeFrame {
                size: payload.len(),
                limit: self.payload_limit.as_usize(),
            });
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(CarrierError::Closed);
        }
        match self.writer.try_send(payload) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(CarrierError::Backpressure),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(CarrierError::Closed),
        }
    }

    /// Initiates teardown. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.shutdown.send_replace(true);
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

/// Splits a connected stream into a carrier pair and spawns its I/O tasks.
pub fn spawn_carrier(
    stream: TcpStream,
    payload_limit: PayloadLimit,
    queue_capacity: QueueCapacity,
) -> std::io::Result<(CarrierHandle, CarrierInbox)> {
    let peer = stream.peer_addr()?;
    stream.set_nodelay(true).ok();
    let (read_half, write_half) = stream.into_split();

    let (event_tx, event_rx) = mpsc::channel(queue_capacity.as_usize());
    let (write_tx, write_rx) = mpsc::channel(queue_capacity.as_usize());
    let (shutdown_tx, _) = watch::channel(false);
    let closed = Arc::new(AtomicBool::new(false));

    let handle = CarrierHandle {
        peer,
        payload_limit,
        writer: write_tx,
        shutdown: shutdown_tx.clone(),
        closed: Arc::clone(&closed),
    };

    tokio::spawn(reader_task(
        read_half,
        peer,
        payload_limit,
        event_tx,
        shutdown_tx.clone(),
        Arc::clone(&closed),
    ));
    tokio::spawn(writer_task(write_half, write_rx, shutdown_tx, closed));

    Ok((handle, CarrierInbox { events: event_rx }))
}

async fn reader_task(
    mut read_half: OwnedReadHalf,
    peer: SocketAddr,
    payload_limit: PayloadLimit,
    events: mpsc::Sender<CarrierEvent>,
    shutdown: watch::Sender<bool>,
    closed: Arc<AtomicBool>,
) {
    let mut stop = shutdown.subscribe();
    let reason = loop {
        let frame = tokio::select! {
            _ = stop.wait_for(|&v| v) => break CloseReason::LocalClose,
            frame = read_frame(&mut read_half, payload_limit) => frame,
        };
        match frame {
            Ok(Some(payload)) => {
                trace!(%peer, bytes = payload.len(), "frame in");
                if events.send(CarrierEvent::Message(payload)).await.is_err() {
                    break CloseReason::LocalClose;
                }
            }
            Ok(None) => break CloseReason::PeerClosed,
            Err(ReadFrameError::Oversize { size, limit }) => {
                warn!(%peer, size, limit, "oversize frame, dropping connection");
                break CloseReason::Oversize { size, limit };
            }
            Err(ReadFrameError::Io(e)) => break CloseReason::Io(e.to_string()),
        }
    };
    debug!(%peer, ?reason, "carrier read side done");
    closed.store(true, Ordering::Release);
    shutdown.send_replace(true);
    let _ = events.send(CarrierEvent::Closed(reason)).await;
}

async fn writer_task(
    mut write_half: OwnedWriteHalf,
    mut queue: mpsc::Receiver<Bytes>,
    shutdown: watch::Sender<bool>,
    closed: Arc<AtomicBool>,
) {
    let mut stop = shutdown.subscribe();
    loop {
        let payload = tokio::select! {
            _ = stop.wait_for(|&v| v) => break,
            payload = queue.recv() => match payload {
                Some(p) => p,
                None => break,
            },
        };
        let len = u32::try_from(payload.len()).expect("payload below u32 ceiling");
        if let Err(e) = write_half.write_all(&len.to_be_bytes()).await {
            debug!("carrier write failed: {e}");
            break;
        }
        if let Err(e) = write_half.write_all(&payload).await {
            debug!("carrier write failed: {e}");
            break;
        }
    }
    closed.store(true, Ordering::Release);
    shutdown.send_replace(true);
    let _ = write_half.shutdown().await;
}

enum ReadFrameError {
    Oversize { size: usize, limit: usize },
    Io(std::io::Error),
}

/// Reads one length-prefixed frame. `Ok(None)` is a clean end of stream at
/// a frame boundary.
async fn read_frame(
    read_half: &mut OwnedReadHalf,
    payload_limit: PayloadLimit,
) -> Result<Option<Bytes>, ReadFrameError> {
    let mut len_buf = [0u8; 4];
    match read_half.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(ReadFrameError::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 || len > payload_limit.as_usize() {
        return Err(ReadFrameError::Oversize {
            size: len,
            limit: payload_limit.as_usize(),
        });
    }
    let mut payload = vec![0u8; len];
    read_half
        .read_exact(&mut payload)
        .await
        .map_err(ReadFrameError::Io)?;
    Ok(Some(Bytes::from(payload)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn carrier_pair() -> ((CarrierHandle, CarrierInbox), (CarrierHandle, CarrierInbox)) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr);
        let server = listener.accept();
        let (client, server) = tokio::join!(client, server);
        let limit = PayloadLimit::default();
        let cap = QueueCapacity::try_new(16).unwrap();
        (
            spawn_carrier(client.unwrap(), limit, cap).unwrap(),
            spawn_carrier(server.unwrap().0, limit, cap).unwrap(),
        )
    }

    #[tokio::test]
    async fn messages_preserve_boundaries_and_order() {
        let ((a_tx, _a_rx), (_b_tx, mut b_rx)) = carrier_pair().await;
        for i in 0..10u8 {
            a_tx.send(Bytes::from(vec![i; (i as usize) + 1])).unwrap();
        }
        for i in 0..10u8 {
            match b_rx.next().await {
                CarrierEvent::Message(m) => {
                    assert_eq!(m.len(), (i as usize) + 1);
                    assert!(m.iter().all(|&b| b == i));
                }
                CarrierEvent::Closed(r) => panic!("closed early: {r:?}"),
            }
        }
    }

    #[tokio::test]
    async fn close_is_delivered_after_messages() {
        let ((a_tx, _a_rx), (_b_tx, mut b_rx)) = carrier_pair().await;
        a_tx.send(Bytes::from_static(b"last")).unwrap();
        // Give the writer task a tick to flush before closing.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        a_tx.close();
        let mut saw_message = false;
        loop {
            match b_rx.next().await {
                CarrierEvent::Message(m) => {
                    assert_eq!(&m[..], b"last");
                    saw_message = true;
                }
                CarrierEvent::Closed(_) => break,
            }
        }
        assert!(saw_message);
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let ((a_tx, _a_rx), _b) = carrier_pair().await;
        a_tx.close();
        assert!(matches!(
            a_tx.send(Bytes::from_static(b"x")),
            Err(CarrierError::Closed)
        ));
    }

    #[tokio::test]
    async fn oversize_outbound_rejected_locally() {
        let ((a_tx, _a_rx), _b) = carrier_pair().await;
        let too_big = Bytes::from(vec![0u8; PayloadLimit::default().as_usize() + 1]);
        assert!(matches!(
            a_tx.send(too_big),
            Err(CarrierError::OversizeFrame { .. })
        ));
    }

    #[tokio::test]
    async fn oversize_inbound_drops_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr);
        let server = listener.accept();
        let (client, server) = tokio::join!(client, server);
        let mut raw = client.unwrap();
        let (_srv_tx, mut srv_rx) = spawn_carrier(
            server.unwrap().0,
            PayloadLimit::try_new(64).unwrap(),
            QueueCapacity::try_new(4).unwrap(),
        )
        .unwrap();

        // Hand-rolled oversize header on the raw socket.
        raw.write_all(&1_000_000u32.to_be_bytes()).await.unwrap();
        match srv_rx.next().await {
            CarrierEvent::Closed(CloseReason::Oversize { size, limit }) => {
                assert_eq!(size, 1_000_000);
                assert_eq!(limit, 64);
            }
            other => panic!("expected oversize close, got {other:?}"),
        }
    }
}
