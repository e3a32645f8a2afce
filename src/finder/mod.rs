//! The Finder: process-wide directory and event bus.
//!
//! One Finder serves a routing suite. Each connecting process gets a
//! messenger; directory operations arrive as ordinary requests and are
//! answered from the registry. Asynchronous traffic back to clients
//! (birth/death events, cache invalidation hints, liveness hellos) drains
//! through a per-messenger FIFO queue so one slow client cannot reorder or
//! stall another's notifications.

pub mod commands;
pub mod registry;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::carrier::{CarrierHandle, CarrierInbox, CarrierListener};
use crate::command_map::CommandMap;
use crate::config::FabricConfig;
use crate::context::ProcessContext;
use crate::finder::commands::{PeerQueues, deliver_effects, install_finder_commands};
use crate::finder::registry::Registry;
use crate::messenger::{MessengerDeath, MessengerHandle, MessengerId, spawn_messenger};
use crate::wire::WireMessage;
use crate::xrl::Xrl;

/// The Finder server.
pub struct Finder {
    config: FabricConfig,
    listener: CarrierListener,
    registry: Arc<Mutex<Registry>>,
    commands: Arc<CommandMap>,
    peer_queues: Arc<PeerQueues>,
    peers: HashMap<MessengerId, MessengerHandle>,
    death_tx: mpsc::UnboundedSender<MessengerDeath>,
    death_rx: mpsc::UnboundedReceiver<MessengerDeath>,
}

impl Finder {
    /// Binds the Finder's listener. The registry starts empty: the Finder is
    /// stateless across restarts and clients re-register on reconnect.
    pub async fn bind(config: FabricConfig, context: ProcessContext) -> std::io::Result<Self> {
        let listener = CarrierListener::bind(
            config.finder_endpoint,
            context,
            config.payload_limit,
            config.writer_queue_capacity,
        )
        .await?;

        let registry = Arc::new(Mutex::new(Registry::new()));
        let peer_queues = Arc::new(PeerQueues::new());
        let commands = Arc::new(CommandMap::new());
        install_finder_commands(&commands, &registry, &peer_queues);

        let (death_tx, death_rx) = mpsc::unbounded_channel();
        info!(addr = %listener.local_addr(), "finder listening");
        Ok(Self {
            config,
            listener,
            registry,
            commands,
            peer_queues,
            peers: HashMap::new(),
            death_tx,
            death_rx,
        })
    }

    /// The listening address, with any kernel-assigned port filled in.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Serves until the listener fails. Normally spawned as a task.
    pub async fn run(mut self) {
        let mut hello = tokio::time::interval(self.config.hello_interval.as_duration());
        hello.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((carrier, inbox, peer)) => {
                        debug!(%peer, "finder client connected");
                        self.add_peer(carrier, inbox);
                    }
                    Err(e) => {
                        warn!("finder listener failed: {e}");
                        break;
                    }
                },
                Some(death) = self.death_rx.recv() => self.handle_death(death),
                _ = hello.tick() => self.send_hellos(),
            }
        }
    }

    fn add_peer(&mut self, carrier: CarrierHandle, inbox: CarrierInbox) {
        let handle = spawn_messenger(
            carrier,
            inbox,
            Arc::clone(&self.commands),
            self.config.request_timeout.as_duration(),
            self.death_tx.clone(),
        );
        let id = handle.id();

        // Per-messenger outbound queue: pushed Xrls go out one at a time,
        // each waiting for its reply, preserving generation order.
        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel::<Xrl>();
        self.peer_queues.insert(id, queue_tx);
        let out_handle = handle.clone();
        tokio::spawn(async move {
            while let Some(xrl) = queue_rx.recv().await {
                if let Err(e) = out_handle.request(&xrl).await {
                    debug!(%id, "push to client failed: {e}");
                }
            }
        });

        self.peers.insert(id, handle);
    }

    fn handle_death(&mut self, death: MessengerDeath) {
        debug!(id = %death.id, reason = ?death.reason, "finder client gone");
        self.peers.remove(&death.id);
        self.peer_queues.remove(death.id);

        let effects = {
            let mut registry = self.registry.lock().expect("registry lock");
            registry.messenger_death(death.id);
            registry.drain_effects()
        };
        deliver_effects(&self.peer_queues, effects);
    }

    fn send_hellos(&self) {
        for handle in self.peers.values() {
            // Best effort; a full queue or dead carrier surfaces through the
            // death path soon enough.
            let _ = handle.send_message(&WireMessage::Hello);
        }
    }
}
