//! Accepting side of the carrier: bind, accept, admission-check.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{debug, warn};

use crate::carrier::frame::{CarrierHandle, CarrierInbox, spawn_carrier};
use crate::context::ProcessContext;
use crate::domain_types::{PayloadLimit, QueueCapacity};

/// Listens for inbound carriers and drops peers the permit list rejects.
pub struct CarrierListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    context: ProcessContext,
    payload_limit: PayloadLimit,
    queue_capacity: QueueCapacity,
}

impl CarrierListener {
    pub async fn bind(
        addr: SocketAddr,
        context: ProcessContext,
        payload_limit: PayloadLimit,
        queue_capacity: QueueCapacity,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        debug!(%local_addr, "listener bound");
        Ok(Self {
            listener,
            local_addr,
            context,
            payload_limit,
            queue_capacity,
        })
    }

    /// The bound address, with the kernel-assigned port filled in.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts the next permitted connection. Rejected peers are logged,
    /// closed immediately, and never surface to the caller.
    pub async fn accept(&self) -> std::io::Result<(CarrierHandle, CarrierInbox, SocketAddr)> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            if !self.context.peer_is_permitted(peer) {
                warn!(%peer, "rejected connection attempt");
                drop(stream);
                continue;
            }
            debug!(%peer, "accepted connection");
            let (handle, inbox) = spawn_carrier(stream, self.payload_limit, self.queue_capacity)?;
            return Ok((handle, inbox, peer));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carrier::frame::CarrierEvent;
    use bytes::Bytes;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn accepts_loopback_peer_for_local_context() {
        let listener = CarrierListener::bind(
            "127.0.0.1:0".parse().unwrap(),
            ProcessContext::local(),
            PayloadLimit::default(),
            QueueCapacity::try_new(8).unwrap(),
        )
        .await
        .unwrap();
        let addr = listener.local_addr();

        let client = tokio::spawn(async move {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (tx, _rx) = spawn_carrier(
                stream,
                PayloadLimit::default(),
                QueueCapacity::try_new(8).unwrap(),
            )
            .unwrap();
            tx.send(Bytes::from_static(b"hi")).unwrap();
            // Keep the carrier alive until the server has read the frame.
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        });

        let (_tx, mut rx, peer) = listener.accept().await.unwrap();
        assert!(peer.ip().is_loopback());
        match rx.next().await {
            CarrierEvent::Message(m) => assert_eq!(&m[..], b"hi"),
            CarrierEvent::Closed(r) => panic!("unexpected close: {r:?}"),
        }
        client.await.unwrap();
    }
}
