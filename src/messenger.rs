//! The messenger binds one carrier into a bidirectional request/response
//! dispatcher.
//!
//! Outbound requests get a monotonically increasing sequence number, an
//! entry in the outstanding-request table and a deadline. Inbound requests
//! are dispatched through a [`CommandMap`]; inbound replies are matched to
//! outstanding entries by seqno. When the carrier closes, every outstanding
//! request fails with `TRANSPORT_FAILED` and the owning manager is told of
//! the death.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::carrier::{CarrierEvent, CarrierHandle, CarrierInbox, CloseReason};
use crate::command_map::CommandMap;
use crate::error::{XrlError, XrlErrorCode};
use crate::wire::{ReplyEnvelope, WireMessage};
use crate::xrl::Xrl;

static NEXT_MESSENGER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one messenger (one connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessengerId(u64);

impl MessengerId {
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    fn fresh() -> Self {
        Self(NEXT_MESSENGER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for MessengerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "msgr-{}", self.0)
    }
}

/// Caller identity handed to command handlers.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    pub messenger: MessengerId,
    pub peer: SocketAddr,
}

/// Lifecycle notice delivered to the messenger's manager.
#[derive(Debug)]
pub struct MessengerDeath {
    pub id: MessengerId,
    pub reason: CloseReason,
}

/// Sending half of a messenger. Cheap to clone; all clones share the seqno
/// counter and outstanding table.
#[derive(Clone)]
pub struct MessengerHandle {
    id: MessengerId,
    peer: SocketAddr,
    carrier: CarrierHandle,
    next_seqno: Arc<AtomicU32>,
    outstanding: Arc<DashMap<u32, oneshot::Sender<ReplyEnvelope>>>,
    request_timeout: Duration,
}

impl MessengerHandle {
    #[must_use]
    pub fn id(&self) -> MessengerId {
        self.id
    }

    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.carrier.is_closed()
    }

    /// Number of requests awaiting replies. Outside of transient dispatch
    /// windows this is zero on an idle, healthy messenger.
    #[must_use]
    pub fn outstanding_requests(&self) -> usize {
        self.outstanding.len()
    }

    /// Sends a request and waits for its reply or deadline.
    ///
    /// The returned `Ok` envelope still carries an application-level result
    /// code; transport-level failures (`TIMEOUT`, `TRANSPORT_FAILED`) come
    /// back as `Err`.
    pub async fn request(&self, xrl: &Xrl) -> Result<ReplyEnvelope, XrlError> {
        let seqno = self.next_seqno.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.outstanding.insert(seqno, reply_tx);

        let frame = WireMessage::request(seqno, xrl).encode();
        if let Err(e) = self.carrier.send(frame) {
            self.outstanding.remove(&seqno);
            return Err(XrlError::new(XrlErrorCode::TransportFailed, e.to_string()));
        }
        trace!(id = %self.id, seqno, %xrl, "request out");

        match tokio::time::timeout(self.request_timeout, reply_rx).await {
            Ok(Ok(envelope)) => Ok(envelope),
            // Dispatch task dropped the sender: carrier died mid-flight.
            Ok(Err(_)) => Err(XrlError::bare(XrlErrorCode::TransportFailed)),
            Err(_) => {
                // Late replies will hit the unknown-seqno discard path.
                self.outstanding.remove(&seqno);
                Err(XrlError::new(
                    XrlErrorCode::Timeout,
                    format!("no reply to seqno {seqno} within {:?}", self.request_timeout),
                ))
            }
        }
    }

    /// Fire-and-forget wire traffic (hello, bye).
    pub fn send_message(&self, msg: &WireMessage) -> Result<(), XrlError> {
        self.carrier
            .send(msg.encode())
            .map_err(|e| XrlError::new(XrlErrorCode::TransportFailed, e.to_string()))
    }

    /// Initiates teardown of the underlying carrier.
    pub fn close(&self) {
        self.carrier.close();
    }
}

/// Binds a carrier to a command map and spawns the dispatch task.
///
/// `death_tx` is the manager hook: exactly one death notice is delivered
/// when the carrier closes for any reason.
pub fn spawn_messenger(
    carrier: CarrierHandle,
    inbox: CarrierInbox,
    commands: Arc<CommandMap>,
    request_timeout: Duration,
    death_tx: mpsc::UnboundedSender<MessengerDeath>,
) -> MessengerHandle {
    let handle = MessengerHandle {
        id: MessengerId::fresh(),
        peer: carrier.peer_addr(),
        carrier,
        next_seqno: Arc::new(AtomicU32::new(1)),
        outstanding: Arc::new(DashMap::new()),
        request_timeout,
    };
    tokio::spawn(dispatch_task(handle.clone(), inbox, commands, death_tx));
    handle
}

async fn dispatch_task(
    handle: MessengerHandle,
    mut inbox: CarrierInbox,
    commands: Arc<CommandMap>,
    death_tx: mpsc::UnboundedSender<MessengerDeath>,
) {
    let id = handle.id;
    let reason = loop {
        match inbox.next().await {
            CarrierEvent::Message(payload) => match WireMessage::decode(&payload) {
                Ok(WireMessage::Request { seqno, xrl }) => {
                    handle_request(&handle, &commands, seqno, &xrl);
                }
                Ok(WireMessage::Reply {
                    seqno,
                    error,
                    note,
                    args,
                }) => match handle.outstanding.remove(&seqno) {
                    Some((_, reply_tx)) => match ReplyEnvelope::from_wire(error, note, &args) {
                        Ok(envelope) => {
                            trace!(%id, seqno, "reply in");
                            let _ = reply_tx.send(envelope);
                        }
                        Err(e) => {
                            warn!(%id, seqno, "undecodable reply args: {e}, dropping connection");
                            handle.carrier.close();
                        }
                    },
                    None => {
                        // Usually a reply that lost its race with the
                        // deadline; harmless.
                        debug!(%id, seqno, "reply for unknown seqno discarded");
                    }
                },
                Ok(WireMessage::Hello) => trace!(%id, "hello in"),
                Ok(WireMessage::Bye { reason }) => {
                    debug!(%id, %reason, "peer said bye");
                    handle.carrier.close();
                }
                Err(e) => {
                    warn!(%id, "peer sent undecodable frame: {e}, dropping connection");
                    handle.carrier.close();
                }
            },
            CarrierEvent::Closed(reason) => break reason,
        }
    };

    // Fail everything in flight; the table must drain within this tick.
    let pending: Vec<u32> = handle.outstanding.iter().map(|e| *e.key()).collect();
    for seqno in pending {
        if let Some((_, reply_tx)) = handle.outstanding.remove(&seqno) {
            let _ = reply_tx.send(ReplyEnvelope::failed(XrlError::new(
                XrlErrorCode::TransportFailed,
                format!("carrier closed: {reason:?}"),
            )));
        }
    }
    debug!(%id, ?reason, "messenger death");
    let _ = death_tx.send(MessengerDeath { id, reason });
}

fn handle_request(handle: &MessengerHandle, commands: &CommandMap, seqno: u32, xrl_text: &str) {
    let Ok(xrl) = xrl_text.parse::<Xrl>() else {
        warn!(id = %handle.id, "malformed xrl in request, dropping connection");
        handle.carrier.close();
        return;
    };
    let ctx = RequestContext {
        messenger: handle.id,
        peer: handle.peer,
    };
    trace!(id = %handle.id, seqno, %xrl, "request in");
    let reply = match commands.dispatch(&ctx, &xrl) {
        Ok(args) => WireMessage::ok_reply(seqno, &args),
        Err(error) => WireMessage::reply(seqno, &error, &crate::xrl::XrlArgs::new()),
    };
    if let Err(e) = handle.carrier.send(reply.encode()) {
        warn!(id = %handle.id, seqno, "failed to send reply: {e}, dropping connection");
        handle.carrier.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carrier::spawn_carrier;
    use crate::domain_types::{PayloadLimit, QueueCapacity};
    use crate::xrl::{AtomValue, XrlArgs};
    use tokio::net::{TcpListener, TcpStream};

    async fn messenger_pair(
        a_cmds: Arc<CommandMap>,
        b_cmds: Arc<CommandMap>,
    ) -> (
        MessengerHandle,
        MessengerHandle,
        mpsc::UnboundedReceiver<MessengerDeath>,
        mpsc::UnboundedReceiver<MessengerDeath>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let limit = PayloadLimit::default();
        let cap = QueueCapacity::try_new(64).unwrap();
        let (a_car, a_inbox) = spawn_carrier(client.unwrap(), limit, cap).unwrap();
        let (b_car, b_inbox) = spawn_carrier(server.unwrap().0, limit, cap).unwrap();
        let (a_death_tx, a_death_rx) = mpsc::unbounded_channel();
        let (b_death_tx, b_death_rx) = mpsc::unbounded_channel();
        let timeout = Duration::from_millis(500);
        let a = spawn_messenger(a_car, a_inbox, a_cmds, timeout, a_death_tx);
        let b = spawn_messenger(b_car, b_inbox, b_cmds, timeout, b_death_tx);
        (a, b, a_death_rx, b_death_rx)
    }

    #[tokio::test]
    async fn request_reply_round_trip() {
        let b_cmds = Arc::new(CommandMap::new());
        b_cmds
            .add(
                "get_int32",
                Arc::new(|_ctx, _xrl| Ok(XrlArgs::new().with("an_int32", AtomValue::I32(123_456)))),
            )
            .unwrap();
        let (a, _b, _ad, _bd) = messenger_pair(Arc::new(CommandMap::new()), b_cmds).await;

        let xrl: Xrl = "b/get_int32".parse().unwrap();
        let reply = a.request(&xrl).await.unwrap();
        assert!(reply.error.is_okay());
        assert_eq!(reply.args.get_i32("an_int32"), Some(123_456));
        assert_eq!(a.outstanding_requests(), 0);
    }

    #[tokio::test]
    async fn unknown_command_gets_no_such_method() {
        let (a, _b, _ad, _bd) =
            messenger_pair(Arc::new(CommandMap::new()), Arc::new(CommandMap::new())).await;
        let xrl: Xrl = "b/nowhere".parse().unwrap();
        let reply = a.request(&xrl).await.unwrap();
        assert_eq!(reply.error.code, XrlErrorCode::NoSuchMethod);
    }

    #[tokio::test]
    async fn close_fails_outstanding_with_transport_failed() {
        // No handler on b and no reply will come: park a request by pointing
        // at a command whose handler stalls forever. Simplest stall: b has
        // no dispatch at all because we close before it can reply.
        let b_cmds = Arc::new(CommandMap::new());
        let (a, b, _ad, mut b_death) = messenger_pair(Arc::new(CommandMap::new()), b_cmds).await;

        // Close b's carrier; a's in-flight request must fail with transport
        // error rather than waiting for the deadline.
        let xrl: Xrl = "b/anything".parse().unwrap();
        let request = a.request(&xrl);
        b.close();
        let result = request.await;
        match result {
            Ok(envelope) => assert_eq!(envelope.error.code, XrlErrorCode::NoSuchMethod),
            Err(e) => assert!(
                matches!(e.code, XrlErrorCode::TransportFailed | XrlErrorCode::Timeout),
                "unexpected {e:?}"
            ),
        }
        assert_eq!(a.outstanding_requests(), 0);

        let death = b_death.recv().await.unwrap();
        assert_eq!(death.id, b.id());
    }

    #[tokio::test]
    async fn timeout_removes_outstanding_entry() {
        // b's command map stalls by never being consulted: we make a handler
        // that sleeps longer than the deadline via a detached task. Handlers
        // are sync, so emulate a dead peer by just not registering anything
        // and pausing b's dispatch with a slow handler on a different call.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let limit = PayloadLimit::default();
        let cap = QueueCapacity::try_new(8).unwrap();
        let (a_car, a_inbox) = spawn_carrier(client.unwrap(), limit, cap).unwrap();
        // Server side never spawns a messenger: requests vanish.
        let (_b_car, _b_inbox) = spawn_carrier(server.unwrap().0, limit, cap).unwrap();
        let (death_tx, _death_rx) = mpsc::unbounded_channel();
        let a = spawn_messenger(
            a_car,
            a_inbox,
            Arc::new(CommandMap::new()),
            Duration::from_millis(100),
            death_tx,
        );

        let xrl: Xrl = "b/void".parse().unwrap();
        let err = a.request(&xrl).await.unwrap_err();
        assert_eq!(err.code, XrlErrorCode::Timeout);
        assert_eq!(a.outstanding_requests(), 0);
    }

    #[tokio::test]
    async fn thousand_requests_leave_no_orphans() {
        let b_cmds = Arc::new(CommandMap::new());
        b_cmds
            .add("hello", Arc::new(|_ctx, _xrl| Ok(XrlArgs::new())))
            .unwrap();
        let (a, b, _ad, _bd) = messenger_pair(Arc::new(CommandMap::new()), b_cmds).await;

        let xrl: Xrl = "b/hello".parse().unwrap();
        for _ in 0..1000 {
            let reply = a.request(&xrl).await.unwrap();
            assert!(reply.error.is_okay());
        }
        assert_eq!(a.outstanding_requests(), 0);
        assert_eq!(b.outstanding_requests(), 0);
    }
}
