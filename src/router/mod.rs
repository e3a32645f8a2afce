//! The per-process XRL router.
//!
//! An [`XrlRouter`] owns a listener for inbound resolved RPCs, a command map
//! of local handlers, a resolution cache, and the connection to the Finder.
//! Outbound sends resolve through the cache (miss goes to the Finder),
//! dispatch over a per-endpoint client messenger, and return the reply's
//! result code and arguments.

mod link;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, warn};

use crate::carrier::{CarrierListener, spawn_carrier};
use crate::command_map::{CommandMap, XrlHandler};
use crate::config::FabricConfig;
use crate::context::ProcessContext;
use crate::domain_types::{ClassName, CommandName, TargetName};
use crate::error::{RouterError, XrlError, XrlErrorCode};
use crate::finder::commands::{
    EVENT_BIRTH_COMMAND, EVENT_DEATH_COMMAND, REMOVE_TARGET_COMMAND, REMOVE_XRL_COMMAND,
};
use crate::finder::registry::EventKind;
use crate::messenger::{MessengerDeath, MessengerHandle, spawn_messenger};
use crate::xrl::{AtomValue, ResolvedXrl, Xrl, XrlArgs};

/// A birth or death observed through a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLifecycleEvent {
    pub kind: EventKind,
    pub class: String,
    pub instance: String,
}

/// State shared between the router façade, its listener task and the
/// Finder-link task.
pub(crate) struct RouterShared {
    pub(crate) name: TargetName,
    pub(crate) class: ClassName,
    pub(crate) singleton: bool,
    pub(crate) config: FabricConfig,
    pub(crate) commands: Arc<CommandMap>,
    pub(crate) listener_addr: SocketAddr,
    /// Commands advertised at the Finder, in registration order.
    pub(crate) advertised: Mutex<Vec<CommandName>>,
    /// Live Finder messenger, or `None` while reconnecting.
    pub(crate) finder: RwLock<Option<MessengerHandle>>,
    /// `target/command` -> ordered resolutions. Purged on Finder hints.
    pub(crate) resolution_cache: DashMap<String, Vec<ResolvedXrl>>,
    pub(crate) pending_sends: AtomicUsize,
    pub(crate) pending_resolves: AtomicUsize,
    pub(crate) ready_tx: watch::Sender<bool>,
    pub(crate) events_tx: broadcast::Sender<TargetLifecycleEvent>,
    pub(crate) shutdown_tx: watch::Sender<bool>,
}

impl RouterShared {
    pub(crate) fn purge_target(&self, target: &str) {
        let prefix = format!("{target}/");
        self.resolution_cache
            .retain(|key, _| !key.starts_with(&prefix));
    }
}

/// XRL transmission and reception point for one process-level entity.
pub struct XrlRouter {
    shared: Arc<RouterShared>,
    /// Client messengers to other routers, keyed by endpoint.
    endpoints: Arc<tokio::sync::Mutex<HashMap<SocketAddr, MessengerHandle>>>,
    endpoint_death_tx: mpsc::UnboundedSender<MessengerDeath>,
}

impl XrlRouter {
    /// Opens the listener, installs the Finder-push handlers and starts the
    /// Finder link. The router is usable for local dispatch immediately;
    /// [`XrlRouter::wait_until_ready`] gates on registration completing.
    pub async fn new(
        config: FabricConfig,
        context: ProcessContext,
        name: TargetName,
        class: ClassName,
        singleton: bool,
    ) -> Result<Self, RouterError> {
        let commands = Arc::new(CommandMap::new());

        let listener = CarrierListener::bind(
            SocketAddr::new(context.preferred_addr(), 0),
            context.clone(),
            config.payload_limit,
            config.writer_queue_capacity,
        )
        .await
        .map_err(RouterError::Bind)?;
        let listener_addr = listener.local_addr();

        let (ready_tx, _) = watch::channel(false);
        let (shutdown_tx, _) = watch::channel(false);
        let (events_tx, _) = broadcast::channel(256);

        let shared = Arc::new(RouterShared {
            name,
            class,
            singleton,
            config,
            commands,
            listener_addr,
            advertised: Mutex::new(Vec::new()),
            finder: RwLock::new(None),
            resolution_cache: DashMap::new(),
            pending_sends: AtomicUsize::new(0),
            pending_resolves: AtomicUsize::new(0),
            ready_tx,
            events_tx,
            shutdown_tx,
        });

        install_push_handlers(&shared);

        // Inbound resolved RPCs: every accepted carrier becomes a messenger
        // over the shared command map. Deaths need no bookkeeping here.
        let (inbound_death_tx, mut inbound_death_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move { while inbound_death_rx.recv().await.is_some() {} });
        {
            let shared = Arc::clone(&shared);
            let mut stop = shared.shutdown_tx.subscribe();
            tokio::spawn(async move {
                loop {
                    let accepted = tokio::select! {
                        _ = stop.wait_for(|&v| v) => break,
                        accepted = listener.accept() => accepted,
                    };
                    match accepted {
                        Ok((carrier, inbox, peer)) => {
                            debug!(%peer, "inbound rpc connection");
                            let _ = spawn_messenger(
                                carrier,
                                inbox,
                                Arc::clone(&shared.commands),
                                shared.config.request_timeout.as_duration(),
                                inbound_death_tx.clone(),
                            );
                        }
                        Err(e) => {
                            warn!("router listener failed: {e}");
                            break;
                        }
                    }
                }
            });
        }

        // Client-messenger deaths: drop the endpoint entry so the next send
        // reconnects.
        let endpoints: Arc<tokio::sync::Mutex<HashMap<SocketAddr, MessengerHandle>>> =
            Arc::new(tokio::sync::Mutex::new(HashMap::new()));
        let (endpoint_death_tx, mut endpoint_death_rx) = mpsc::unbounded_channel::<MessengerDeath>();
        {
            let endpoints = Arc::clone(&endpoints);
            tokio::spawn(async move {
                while let Some(death) = endpoint_death_rx.recv().await {
                    let mut map = endpoints.lock().await;
                    map.retain(|_, handle| handle.id() != death.id);
                }
            });
        }

        tokio::spawn(link::run_finder_link(Arc::clone(&shared)));

        Ok(Self {
            shared,
            endpoints,
            endpoint_death_tx,
        })
    }

    #[must_use]
    pub fn name(&self) -> &TargetName {
        &self.shared.name
    }

    /// The endpoint other routers dispatch resolved RPCs to.
    #[must_use]
    pub fn listener_addr(&self) -> SocketAddr {
        self.shared.listener_addr
    }

    /// True while a Finder messenger is up.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.shared
            .finder
            .read()
            .expect("finder slot lock")
            .as_ref()
            .is_some_and(|h| !h.is_closed())
    }

    /// True if any sends or resolves are in flight.
    #[must_use]
    pub fn pending(&self) -> bool {
        self.shared.pending_sends.load(Ordering::Relaxed) != 0
            || self.shared.pending_resolves.load(Ordering::Relaxed) != 0
    }

    /// Completes once the router is registered, advertised and enabled at
    /// the Finder. This is the one sanctioned startup synchronization point.
    pub async fn wait_until_ready(&self) {
        let mut ready = self.shared.ready_tx.subscribe();
        let _ = ready.wait_for(|&v| v).await;
    }

    /// Lifecycle events observed through watches registered with
    /// [`XrlRouter::watch_class`] / [`XrlRouter::watch_instance`].
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<TargetLifecycleEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Registers a local command handler and advertises it at the Finder.
    pub async fn add_handler(
        &self,
        command: CommandName,
        handler: XrlHandler,
    ) -> Result<(), RouterError> {
        self.shared
            .commands
            .add(command.to_string(), handler)
            .map_err(|e| RouterError::Command(e.to_string()))?;
        self.shared
            .advertised
            .lock()
            .expect("advertised lock")
            .push(command.clone());

        // Already connected: advertise right away. Otherwise the link task
        // will advertise at handshake time.
        let finder = self
            .shared
            .finder
            .read()
            .expect("finder slot lock")
            .clone();
        if let Some(finder) = finder {
            link::advertise_command(&self.shared, &finder, &command)
                .await
                .map_err(RouterError::ResolveFailed)?;
        }
        Ok(())
    }

    /// Asks the Finder to watch a class; events arrive via
    /// [`XrlRouter::subscribe_events`].
    pub async fn watch_class(&self, class: &ClassName) -> Result<(), XrlError> {
        let args = XrlArgs::new()
            .with("target", AtomValue::Text(self.shared.name.to_string()))
            .with("class", AtomValue::Text(class.to_string()));
        self.finder_call("watch_class", args).await.map(|_| ())
    }

    /// Asks the Finder to watch a single instance.
    pub async fn watch_instance(&self, instance: &TargetName) -> Result<(), XrlError> {
        let args = XrlArgs::new()
            .with("target", AtomValue::Text(self.shared.name.to_string()))
            .with("instance", AtomValue::Text(instance.to_string()));
        self.finder_call("watch_instance", args).await.map(|_| ())
    }

    /// Sends one Xrl and waits for the reply. Application-level failures
    /// (`COMMAND_FAILED` and friends) surface as `Err` with the peer's note;
    /// `Ok` carries the reply arguments.
    pub async fn send(&self, xrl: &Xrl) -> Result<XrlArgs, XrlError> {
        let resolved = self.resolve(xrl).await?;

        self.shared.pending_sends.fetch_add(1, Ordering::Relaxed);
        let result = self.dispatch(xrl, &resolved).await;
        self.shared.pending_sends.fetch_sub(1, Ordering::Relaxed);

        match result {
            Ok(envelope) if envelope.error.is_okay() => Ok(envelope.args),
            Ok(envelope) => Err(envelope.error),
            Err(e) => Err(e),
        }
    }

    /// Graceful teardown: disable at the Finder, drop the link, stop the
    /// listener.
    pub async fn shutdown(&self) {
        let args = XrlArgs::new()
            .with("target", AtomValue::Text(self.shared.name.to_string()))
            .with("enabled", AtomValue::Bool(false));
        let _ = self.finder_call("set_client_enabled", args).await;

        self.shared.shutdown_tx.send_replace(true);
        if let Some(finder) = self.shared.finder.read().expect("finder slot lock").as_ref() {
            let _ = finder.send_message(&crate::wire::WireMessage::Bye {
                reason: "router shutdown".to_string(),
            });
            finder.close();
        }
        let endpoints = self.endpoints.lock().await;
        for handle in endpoints.values() {
            handle.close();
        }
    }

    /// Resolution: probe the cache, fall back to the Finder, take the head.
    async fn resolve(&self, xrl: &Xrl) -> Result<ResolvedXrl, XrlError> {
        let key = xrl.string_no_args();
        if let Some(hit) = self.shared.resolution_cache.get(&key) {
            if let Some(head) = hit.value().first() {
                return Ok(head.clone());
            }
        }

        let Some(finder) = self.shared.finder.read().expect("finder slot lock").clone() else {
            // Reconnecting: only cached sends may proceed.
            return Err(XrlError::new(
                XrlErrorCode::NoFinder,
                format!("no finder connection to resolve {key}"),
            ));
        };

        self.shared.pending_resolves.fetch_add(1, Ordering::Relaxed);
        let result = resolve_via_finder(&finder, &key).await;
        self.shared.pending_resolves.fetch_sub(1, Ordering::Relaxed);

        let list = result?;
        let head = list
            .first()
            .cloned()
            .ok_or_else(|| XrlError::new(XrlErrorCode::ResolveFailed, "empty resolution list"))?;
        self.shared.resolution_cache.insert(key, list);
        Ok(head)
    }

    /// Ships the resolved call over the matching protocol-family client.
    async fn dispatch(
        &self,
        xrl: &Xrl,
        resolved: &ResolvedXrl,
    ) -> Result<crate::wire::ReplyEnvelope, XrlError> {
        if resolved.family().as_str() != "stcp" {
            return Err(XrlError::new(
                XrlErrorCode::ResolveFailed,
                format!("unsupported protocol family {}", resolved.family()),
            ));
        }
        let messenger = self.endpoint_messenger(resolved.endpoint()).await?;
        let wire_xrl = Xrl::new(
            xrl.target().clone(),
            resolved.command().clone(),
            xrl.args().clone(),
        );
        messenger.request(&wire_xrl).await
    }

    async fn endpoint_messenger(
        &self,
        endpoint: SocketAddr,
    ) -> Result<MessengerHandle, XrlError> {
        let mut map = self.endpoints.lock().await;
        if let Some(handle) = map.get(&endpoint) {
            if !handle.is_closed() {
                return Ok(handle.clone());
            }
            map.remove(&endpoint);
        }

        let stream = tokio::net::TcpStream::connect(endpoint)
            .await
            .map_err(|e| XrlError::new(XrlErrorCode::TransportFailed, e.to_string()))?;
        let (carrier, inbox) = spawn_carrier(
            stream,
            self.shared.config.payload_limit,
            self.shared.config.writer_queue_capacity,
        )
        .map_err(|e| XrlError::new(XrlErrorCode::TransportFailed, e.to_string()))?;
        let handle = spawn_messenger(
            carrier,
            inbox,
            Arc::clone(&self.shared.commands),
            self.shared.config.request_timeout.as_duration(),
            self.endpoint_death_tx.clone(),
        );
        map.insert(endpoint, handle.clone());
        Ok(handle)
    }

    /// One request on the Finder messenger, mapped to `Err` on non-OKAY.
    async fn finder_call(&self, command: &str, args: XrlArgs) -> Result<XrlArgs, XrlError> {
        let Some(finder) = self.shared.finder.read().expect("finder slot lock").clone() else {
            return Err(XrlError::bare(XrlErrorCode::NoFinder));
        };
        link::finder_request(&finder, command, args).await
    }
}

/// Installs the handlers the Finder pushes at: lifecycle events and cache
/// invalidation hints.
fn install_push_handlers(shared: &Arc<RouterShared>) {
    let commands = Arc::clone(&shared.commands);

    for (command, kind) in [
        (EVENT_BIRTH_COMMAND, EventKind::Birth),
        (EVENT_DEATH_COMMAND, EventKind::Death),
    ] {
        let shared = Arc::clone(shared);
        commands
            .add(
                command,
                Arc::new(move |_ctx, xrl: &Xrl| {
                    let class = xrl.args().get_text("class").unwrap_or_default().to_string();
                    let instance = xrl
                        .args()
                        .get_text("instance")
                        .unwrap_or_default()
                        .to_string();
                    if kind == EventKind::Death {
                        shared.purge_target(&instance);
                        shared.purge_target(&class);
                    }
                    debug!(router = %shared.name, ?kind, %class, %instance, "lifecycle event");
                    let _ = shared.events_tx.send(TargetLifecycleEvent {
                        kind,
                        class,
                        instance,
                    });
                    Ok(XrlArgs::new())
                }),
            )
            .expect("fresh command map");
    }

    {
        let shared = Arc::clone(shared);
        commands
            .add(
                REMOVE_XRL_COMMAND,
                Arc::new(move |_ctx, xrl: &Xrl| {
                    if let (Some(target), Some(command)) =
                        (xrl.args().get_text("target"), xrl.args().get_text("command"))
                    {
                        shared.resolution_cache.remove(&format!("{target}/{command}"));
                    }
                    Ok(XrlArgs::new())
                }),
            )
            .expect("fresh command map");
    }

    {
        let shared = Arc::clone(shared);
        commands
            .add(
                REMOVE_TARGET_COMMAND,
                Arc::new(move |_ctx, xrl: &Xrl| {
                    if let Some(target) = xrl.args().get_text("target") {
                        shared.purge_target(target);
                    }
                    Ok(XrlArgs::new())
                }),
            )
            .expect("fresh command map");
    }
}

async fn resolve_via_finder(
    finder: &MessengerHandle,
    key: &str,
) -> Result<Vec<ResolvedXrl>, XrlError> {
    let args = XrlArgs::new().with("xrl", AtomValue::Text(key.to_string()));
    let reply = link::finder_request(finder, "resolve_xrl", args).await?;
    let Some(list) = reply.get_list("resolutions") else {
        return Err(XrlError::new(
            XrlErrorCode::ResolveFailed,
            "resolve reply missing resolutions",
        ));
    };
    let mut out = Vec::with_capacity(list.len());
    for item in list {
        let AtomValue::Text(text) = item else {
            return Err(XrlError::new(
                XrlErrorCode::ResolveFailed,
                "non-text resolution entry",
            ));
        };
        let resolved: ResolvedXrl = text
            .parse()
            .map_err(|e| XrlError::new(XrlErrorCode::ResolveFailed, format!("{e}")))?;
        out.push(resolved);
    }
    Ok(out)
}
