//! The Finder's RPC-callable command surface.
//!
//! Every directory operation is an ordinary command in a [`CommandMap`],
//! dispatched by the per-connection messenger. Handlers run the registry
//! state machine, then flush whatever effects the operation queued out to
//! the per-messenger Xrl queues.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::command_map::{CommandMap, CommandResult};
use crate::domain_types::{ClassName, ProtocolFamily, TargetName};
use crate::error::{XrlError, XrlErrorCode};
use crate::finder::registry::{EventKind, Registry, RegistryEffect};
use crate::messenger::MessengerId;
use crate::xrl::{AtomValue, Xrl, XrlArgs};

/// Name of the command a router installs to receive birth notifications.
pub const EVENT_BIRTH_COMMAND: &str = "finder_event_observer/xrl_target_birth";
/// Name of the command a router installs to receive death notifications.
pub const EVENT_DEATH_COMMAND: &str = "finder_event_observer/xrl_target_death";
/// Cache hint: drop one resolution.
pub const REMOVE_XRL_COMMAND: &str = "finder_client/remove_xrl_from_cache";
/// Cache hint: drop every resolution for a target.
pub const REMOVE_TARGET_COMMAND: &str = "finder_client/remove_all_xrls";

/// Per-connection state the command surface can push Xrls at.
pub struct PeerQueues {
    queues: Mutex<HashMap<MessengerId, tokio::sync::mpsc::UnboundedSender<Xrl>>>,
}

impl PeerQueues {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, id: MessengerId, tx: tokio::sync::mpsc::UnboundedSender<Xrl>) {
        self.queues.lock().expect("peer queue lock").insert(id, tx);
    }

    pub fn remove(&self, id: MessengerId) {
        self.queues.lock().expect("peer queue lock").remove(&id);
    }

    fn push_to(&self, id: MessengerId, xrl: Xrl) {
        let queues = self.queues.lock().expect("peer queue lock");
        if let Some(tx) = queues.get(&id) {
            let _ = tx.send(xrl);
        }
    }

    fn broadcast(&self, xrl: &Xrl) {
        let queues = self.queues.lock().expect("peer queue lock");
        for tx in queues.values() {
            let _ = tx.send(xrl.clone());
        }
    }
}

impl Default for PeerQueues {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns queued registry effects into outbound Xrls, preserving order.
pub fn deliver_effects(peers: &PeerQueues, effects: Vec<RegistryEffect>) {
    for effect in effects {
        match effect {
            RegistryEffect::Notify {
                watcher,
                messenger,
                event,
            } => {
                let command = match event.kind {
                    EventKind::Birth => EVENT_BIRTH_COMMAND,
                    EventKind::Death => EVENT_DEATH_COMMAND,
                };
                let args = XrlArgs::new()
                    .with("class", AtomValue::Text(event.class.to_string()))
                    .with("instance", AtomValue::Text(event.instance.to_string()));
                match Xrl::parse_parts(watcher.as_str(), command, args) {
                    Ok(xrl) => peers.push_to(messenger, xrl),
                    Err(e) => warn!("unbuildable event xrl: {e}"),
                }
            }
            RegistryEffect::RemoveXrlHint { target, command } => {
                let args = XrlArgs::new()
                    .with("target", AtomValue::Text(target.to_string()))
                    .with("command", AtomValue::Text(command.to_string()));
                if let Ok(xrl) = Xrl::parse_parts("finder_client", REMOVE_XRL_COMMAND, args) {
                    peers.broadcast(&xrl);
                }
            }
            RegistryEffect::RemoveTargetHint { target } => {
                let args =
                    XrlArgs::new().with("target", AtomValue::Text(target.to_string()));
                if let Ok(xrl) = Xrl::parse_parts("finder_client", REMOVE_TARGET_COMMAND, args) {
                    peers.broadcast(&xrl);
                }
            }
        }
    }
}

fn text_arg(xrl: &Xrl, name: &str) -> Result<String, XrlError> {
    xrl.args()
        .get_text(name)
        .map(ToString::to_string)
        .ok_or_else(|| {
            XrlError::new(
                XrlErrorCode::BadArgs,
                format!("missing {name}:txt argument"),
            )
        })
}

fn target_arg(xrl: &Xrl, name: &str) -> Result<TargetName, XrlError> {
    TargetName::try_new(text_arg(xrl, name)?)
        .map_err(|e| XrlError::new(XrlErrorCode::BadArgs, e.to_string()))
}

fn class_arg(xrl: &Xrl, name: &str) -> Result<ClassName, XrlError> {
    ClassName::try_new(text_arg(xrl, name)?)
        .map_err(|e| XrlError::new(XrlErrorCode::BadArgs, e.to_string()))
}

fn xrl_arg(xrl: &Xrl, name: &str) -> Result<Xrl, XrlError> {
    text_arg(xrl, name)?
        .parse()
        .map_err(|e| XrlError::new(XrlErrorCode::BadArgs, format!("bad xrl argument: {e}")))
}

/// Installs the directory commands into `commands`.
pub fn install_finder_commands(
    commands: &CommandMap,
    registry: &Arc<Mutex<Registry>>,
    peers: &Arc<PeerQueues>,
) {
    let with_registry = |registry: &Arc<Mutex<Registry>>,
                         peers: &Arc<PeerQueues>,
                         f: Box<
        dyn Fn(&mut Registry, MessengerId, &Xrl) -> CommandResult + Send + Sync,
    >| {
        let registry = Arc::clone(registry);
        let peers = Arc::clone(peers);
        Arc::new(move |ctx: &crate::messenger::RequestContext, xrl: &Xrl| {
            let mut reg = registry.lock().expect("registry lock");
            let result = f(&mut reg, ctx.messenger, xrl);
            let effects = reg.drain_effects();
            drop(reg);
            deliver_effects(&peers, effects);
            result
        })
    };

    commands
        .add(
            "register_client",
            with_registry(
                registry,
                peers,
                Box::new(|reg, caller, xrl| {
                    let target = target_arg(xrl, "target")?;
                    let class = class_arg(xrl, "class")?;
                    let singleton = xrl.args().get_bool("singleton").unwrap_or(false);
                    let cookie = reg
                        .register(caller, target, class, singleton)
                        .map_err(|e| e.to_xrl_error())?;
                    Ok(XrlArgs::new().with("cookie", AtomValue::Text(cookie.to_string())))
                }),
            ),
        )
        .expect("fresh command map");

    commands
        .add(
            "unregister_client",
            with_registry(
                registry,
                peers,
                Box::new(|reg, caller, xrl| {
                    let target = target_arg(xrl, "target")?;
                    reg.unregister(caller, &target)
                        .map_err(|e| e.to_xrl_error())?;
                    Ok(XrlArgs::new())
                }),
            ),
        )
        .expect("fresh command map");

    commands
        .add(
            "set_client_enabled",
            with_registry(
                registry,
                peers,
                Box::new(|reg, caller, xrl| {
                    let target = target_arg(xrl, "target")?;
                    let enabled = xrl.args().get_bool("enabled").ok_or_else(|| {
                        XrlError::new(XrlErrorCode::BadArgs, "missing enabled:bool argument")
                    })?;
                    reg.set_enabled(caller, &target, enabled)
                        .map_err(|e| e.to_xrl_error())?;
                    Ok(XrlArgs::new())
                }),
            ),
        )
        .expect("fresh command map");

    commands
        .add(
            "add_xrl",
            with_registry(
                registry,
                peers,
                Box::new(|reg, caller, xrl| {
                    let unresolved = xrl_arg(xrl, "xrl")?;
                    let family = ProtocolFamily::try_new(text_arg(xrl, "protocol")?)
                        .map_err(|e| XrlError::new(XrlErrorCode::BadArgs, e.to_string()))?;
                    let endpoint: SocketAddr = text_arg(xrl, "address")?.parse().map_err(|_| {
                        XrlError::new(XrlErrorCode::BadArgs, "unparsable address argument")
                    })?;
                    let resolved = reg
                        .add_xrl(caller, &unresolved, family, endpoint)
                        .map_err(|e| e.to_xrl_error())?;
                    debug!(%unresolved, %resolved, "advertised");
                    Ok(XrlArgs::new().with("resolved", AtomValue::Text(resolved.to_string())))
                }),
            ),
        )
        .expect("fresh command map");

    commands
        .add(
            "remove_xrl",
            with_registry(
                registry,
                peers,
                Box::new(|reg, caller, xrl| {
                    let unresolved = xrl_arg(xrl, "xrl")?;
                    reg.remove_xrl(caller, &unresolved)
                        .map_err(|e| e.to_xrl_error())?;
                    Ok(XrlArgs::new())
                }),
            ),
        )
        .expect("fresh command map");

    commands
        .add(
            "resolve_xrl",
            with_registry(
                registry,
                peers,
                Box::new(|reg, _caller, xrl| {
                    let unresolved = xrl_arg(xrl, "xrl")?;
                    let list = reg.resolve(&unresolved).map_err(|e| e.to_xrl_error())?;
                    let rendered = list
                        .into_iter()
                        .map(|r| AtomValue::Text(r.to_string()))
                        .collect();
                    Ok(XrlArgs::new().with("resolutions", AtomValue::List(rendered)))
                }),
            ),
        )
        .expect("fresh command map");

    commands
        .add(
            "watch_class",
            with_registry(
                registry,
                peers,
                Box::new(|reg, caller, xrl| {
                    let watcher = target_arg(xrl, "target")?;
                    let class = class_arg(xrl, "class")?;
                    reg.watch_class(caller, &watcher, &class)
                        .map_err(|e| e.to_xrl_error())?;
                    Ok(XrlArgs::new())
                }),
            ),
        )
        .expect("fresh command map");

    commands
        .add(
            "unwatch_class",
            with_registry(
                registry,
                peers,
                Box::new(|reg, caller, xrl| {
                    let watcher = target_arg(xrl, "target")?;
                    let class = class_arg(xrl, "class")?;
                    reg.unwatch_class(caller, &watcher, &class)
                        .map_err(|e| e.to_xrl_error())?;
                    Ok(XrlArgs::new())
                }),
            ),
        )
        .expect("fresh command map");

    commands
        .add(
            "watch_instance",
            with_registry(
                registry,
                peers,
                Box::new(|reg, caller, xrl| {
                    let watcher = target_arg(xrl, "target")?;
                    let instance = target_arg(xrl, "instance")?;
                    reg.watch_instance(caller, &watcher, &instance)
                        .map_err(|e| e.to_xrl_error())?;
                    Ok(XrlArgs::new())
                }),
            ),
        )
        .expect("fresh command map");

    commands
        .add(
            "unwatch_instance",
            with_registry(
                registry,
                peers,
                Box::new(|reg, caller, xrl| {
                    let watcher = target_arg(xrl, "target")?;
                    let instance = target_arg(xrl, "instance")?;
                    reg.unwatch_instance(caller, &watcher, &instance)
                        .map_err(|e| e.to_xrl_error())?;
                    Ok(XrlArgs::new())
                }),
            ),
        )
        .expect("fresh command map");

    commands
        .add(
            "get_target_list",
            with_registry(
                registry,
                peers,
                Box::new(|reg, _caller, _xrl| {
                    let targets = reg
                        .target_list()
                        .into_iter()
                        .map(|t| AtomValue::Text(t.to_string()))
                        .collect();
                    Ok(XrlArgs::new().with("targets", AtomValue::List(targets)))
                }),
            ),
        )
        .expect("fresh command map");

    commands
        .add(
            "get_xrls_registered_by",
            with_registry(
                registry,
                peers,
                Box::new(|reg, _caller, xrl| {
                    let target = target_arg(xrl, "target")?;
                    let commands = reg
                        .xrls_registered_by(&target)
                        .map_err(|e| e.to_xrl_error())?
                        .into_iter()
                        .map(|c| AtomValue::Text(c.to_string()))
                        .collect();
                    Ok(XrlArgs::new().with("commands", AtomValue::List(commands)))
                }),
            ),
        )
        .expect("fresh command map");
}
