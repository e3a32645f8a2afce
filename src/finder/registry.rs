//! The Finder's directory state: who owns which target, which targets form
//! which class, what each advertised command resolves to, and who is
//! watching whom.
//!
//! This is a pure, synchronous state machine. All I/O (messengers, event
//! delivery) lives in the surrounding server; operations here return
//! [`RegistryEffect`]s describing what must be pushed out, in order.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;

use tracing::{debug, warn};

use crate::domain_types::{
    ClassName, CommandName, ProtocolFamily, RegistrationCookie, TargetName,
};
use crate::error::RegistryError;
use crate::messenger::MessengerId;
use crate::xrl::{ResolvedXrl, Xrl, XrlArgs};

/// BIRTH or DEATH of a target instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Birth,
    Death,
}

/// One entry of the event queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinderEvent {
    pub kind: EventKind,
    pub class: ClassName,
    pub instance: TargetName,
}

/// Side effects an operation produced, drained FIFO by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEffect {
    /// Deliver a birth/death notification to one watching target.
    Notify {
        watcher: TargetName,
        messenger: MessengerId,
        event: FinderEvent,
    },
    /// Tell every connected messenger to drop one cached resolution.
    RemoveXrlHint { target: TargetName, command: CommandName },
    /// Tell every connected messenger to drop all cached resolutions for a
    /// target that no longer exists.
    RemoveTargetHint { target: TargetName },
}

/// Values associated with one registered target.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FinderTarget {
    name: TargetName,
    class: ClassName,
    cookie: RegistrationCookie,
    enabled: bool,
    messenger: MessengerId,
    resolutions: HashMap<CommandName, Vec<ResolvedXrl>>,
    class_watches: HashSet<ClassName>,
    instance_watches: HashSet<TargetName>,
}

/// Which classes exist and which instances belong to them, in registration
/// order (the head is the primary instance).
#[derive(Debug, Clone, PartialEq, Eq)]
struct FinderClass {
    singleton: bool,
    instances: Vec<TargetName>,
}

/// The directory proper.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    targets: HashMap<TargetName, FinderTarget>,
    classes: HashMap<ClassName, FinderClass>,
    pending: VecDeque<RegistryEffect>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `target` as an instance of `class` on behalf of the calling
    /// messenger. Re-registration by the same messenger is idempotent and
    /// returns the original cookie.
    pub fn register(
        &mut self,
        caller: MessengerId,
        target: TargetName,
        class: ClassName,
        singleton: bool,
    ) -> Result<RegistrationCookie, RegistryError> {
        self.validate();
        if let Some(existing) = self.targets.get(&target) {
            if existing.messenger == caller && existing.class == class {
                return Ok(existing.cookie);
            }
            return Err(RegistryError::AlreadyRegistered(target));
        }

        let entry = self
            .classes
            .entry(class.clone())
            .or_insert_with(|| FinderClass {
                singleton,
                instances: Vec::new(),
            });
        // A violation implies the class pre-existed non-empty, so the
        // or_insert above never needs rolling back.
        if (singleton || entry.singleton) && !entry.instances.is_empty() {
            return Err(RegistryError::SingletonViolation(class));
        }
        entry.instances.push(target.clone());

        let cookie = RegistrationCookie::generate();
        debug!(%target, %class, %cookie, "registered target");
        self.targets.insert(
            target.clone(),
            FinderTarget {
                name: target,
                class,
                cookie,
                enabled: false,
                messenger: caller,
                resolutions: HashMap::new(),
                class_watches: HashSet::new(),
                instance_watches: HashSet::new(),
            },
        );
        self.validate();
        Ok(cookie)
    }

    /// Removes a target the calling messenger owns.
    pub fn unregister(
        &mut self,
        caller: MessengerId,
        target: &TargetName,
    ) -> Result<(), RegistryError> {
        let owned = self
            .targets
            .get(target)
            .is_some_and(|t| t.messenger == caller);
        if !owned {
            warn!(%target, "messenger illegally attempted to unregister");
            return Err(RegistryError::NotOwned(target.clone()));
        }
        self.remove_target(target);
        Ok(())
    }

    /// Toggles the enabled flag; transitions queue BIRTH/DEATH events.
    pub fn set_enabled(
        &mut self,
        caller: MessengerId,
        target: &TargetName,
        enabled: bool,
    ) -> Result<(), RegistryError> {
        let entry = self
            .targets
            .get_mut(target)
            .ok_or_else(|| RegistryError::NoTarget(target.clone()))?;
        if entry.messenger != caller {
            return Err(RegistryError::NotOwned(target.clone()));
        }
        if entry.enabled == enabled {
            return Ok(());
        }
        entry.enabled = enabled;
        let event = FinderEvent {
            kind: if enabled {
                EventKind::Birth
            } else {
                EventKind::Death
            },
            class: entry.class.clone(),
            instance: entry.name.clone(),
        };
        self.queue_event(event);
        Ok(())
    }

    /// Advertises a resolution for one of the caller's commands. The
    /// resolved method name carries a suffix derived from the registration
    /// cookie, so repeating the call is idempotent.
    pub fn add_xrl(
        &mut self,
        caller: MessengerId,
        unresolved: &Xrl,
        family: ProtocolFamily,
        endpoint: SocketAddr,
    ) -> Result<ResolvedXrl, RegistryError> {
        let entry = self
            .targets
            .get_mut(unresolved.target())
            .ok_or_else(|| RegistryError::NoTarget(unresolved.target().clone()))?;
        if entry.messenger != caller {
            warn!(target = %unresolved.target(), "messenger illegally attempted add_xrl");
            return Err(RegistryError::NotOwned(unresolved.target().clone()));
        }

        let suffixed = format!("{}-{}", unresolved.command(), entry.cookie.suffix());
        let resolved_command = CommandName::try_new(suffixed)
            .map_err(|e| RegistryError::BadXrl(e.to_string()))?;
        let resolved = ResolvedXrl::new(family, endpoint, resolved_command, XrlArgs::new());

        let list = entry
            .resolutions
            .entry(unresolved.command().clone())
            .or_default();
        if !list.contains(&resolved) {
            list.push(resolved.clone());
        }
        Ok(resolved)
    }

    /// Withdraws all resolutions for one command and hints every messenger
    /// to drop it from cache.
    pub fn remove_xrl(
        &mut self,
        caller: MessengerId,
        unresolved: &Xrl,
    ) -> Result<(), RegistryError> {
        let entry = self
            .targets
            .get_mut(unresolved.target())
            .ok_or_else(|| RegistryError::NoTarget(unresolved.target().clone()))?;
        if entry.messenger != caller {
            return Err(RegistryError::NotOwned(unresolved.target().clone()));
        }
        if entry.resolutions.remove(unresolved.command()).is_none() {
            return Err(RegistryError::Unknown(unresolved.string_no_args()));
        }
        self.pending.push_back(RegistryEffect::RemoveXrlHint {
            target: unresolved.target().clone(),
            command: unresolved.command().clone(),
        });
        Ok(())
    }

    /// Resolves `target/command`. The target may be addressed by class name,
    /// in which case the class's primary instance answers.
    pub fn resolve(&self, xrl: &Xrl) -> Result<Vec<ResolvedXrl>, RegistryError> {
        let instance = self.primary_instance(xrl.target());
        let entry = self
            .targets
            .get(&instance)
            .ok_or_else(|| RegistryError::NoTarget(instance.clone()))?;
        if !entry.enabled {
            return Err(RegistryError::NotEnabled(instance));
        }
        match entry.resolutions.get(xrl.command()) {
            Some(list) if !list.is_empty() => Ok(list.clone()),
            _ => Err(RegistryError::NoResolution(xrl.string_no_args())),
        }
    }

    /// Maps a class name to its primary (first-registered, still-living)
    /// instance; instance names map to themselves.
    #[must_use]
    pub fn primary_instance(&self, name: &TargetName) -> TargetName {
        let as_class = ClassName::try_new(name.as_str());
        if let Ok(class) = as_class
            && let Some(entry) = self.classes.get(&class)
            && let Some(primary) = entry.instances.first()
        {
            return primary.clone();
        }
        name.clone()
    }

    /// Adds a class watch for the caller's target and replays a BIRTH per
    /// live instance. Watching a class that has no instances yet is allowed;
    /// the watcher simply sees births as they happen.
    pub fn watch_class(
        &mut self,
        caller: MessengerId,
        watcher: &TargetName,
        class: &ClassName,
    ) -> Result<(), RegistryError> {
        let watcher_messenger = {
            let entry = self
                .targets
                .get_mut(watcher)
                .ok_or_else(|| RegistryError::NoTarget(watcher.clone()))?;
            if entry.messenger != caller {
                return Err(RegistryError::NotOwned(watcher.clone()));
            }
            entry.class_watches.insert(class.clone());
            entry.messenger
        };

        // Replay births for instances already up.
        let live: Vec<TargetName> = self
            .classes
            .get(class)
            .map(|c| c.instances.clone())
            .unwrap_or_default()
            .into_iter()
            .filter(|i| self.targets.get(i).is_some_and(|t| t.enabled))
            .collect();
        for instance in live {
            self.pending.push_back(RegistryEffect::Notify {
                watcher: watcher.clone(),
                messenger: watcher_messenger,
                event: FinderEvent {
                    kind: EventKind::Birth,
                    class: class.clone(),
                    instance,
                },
            });
        }
        Ok(())
    }

    pub fn unwatch_class(
        &mut self,
        caller: MessengerId,
        watcher: &TargetName,
        class: &ClassName,
    ) -> Result<(), RegistryError> {
        let entry = self
            .targets
            .get_mut(watcher)
            .ok_or_else(|| RegistryError::NoTarget(watcher.clone()))?;
        if entry.messenger != caller {
            return Err(RegistryError::NotOwned(watcher.clone()));
        }
        entry.class_watches.remove(class);
        Ok(())
    }

    /// Adds an instance watch. The watched instance must exist; a BIRTH is
    /// replayed immediately if it is already enabled.
    pub fn watch_instance(
        &mut self,
        caller: MessengerId,
        watcher: &TargetName,
        instance: &TargetName,
    ) -> Result<(), RegistryError> {
        let (watched_class, watched_enabled) = match self.targets.get(instance) {
            Some(t) => (t.class.clone(), t.enabled),
            None => return Err(RegistryError::NoInstance(instance.clone())),
        };
        let entry = self
            .targets
            .get_mut(watcher)
            .ok_or_else(|| RegistryError::NoTarget(watcher.clone()))?;
        if entry.messenger != caller {
            return Err(RegistryError::NotOwned(watcher.clone()));
        }
        entry.instance_watches.insert(instance.clone());
        let watcher_messenger = entry.messenger;
        if watched_enabled {
            self.pending.push_back(RegistryEffect::Notify {
                watcher: watcher.clone(),
                messenger: watcher_messenger,
                event: FinderEvent {
                    kind: EventKind::Birth,
                    class: watched_class,
                    instance: instance.clone(),
                },
            });
        }
        Ok(())
    }

    pub fn unwatch_instance(
        &mut self,
        caller: MessengerId,
        watcher: &TargetName,
        instance: &TargetName,
    ) -> Result<(), RegistryError> {
        let entry = self
            .targets
            .get_mut(watcher)
            .ok_or_else(|| RegistryError::NoTarget(watcher.clone()))?;
        if entry.messenger != caller {
            return Err(RegistryError::NotOwned(watcher.clone()));
        }
        entry.instance_watches.remove(instance);
        Ok(())
    }

    /// The messenger died: every target it owned goes away, cascading DEATH
    /// events and cache invalidation hints.
    pub fn messenger_death(&mut self, dead: MessengerId) {
        let owned: Vec<TargetName> = self
            .targets
            .values()
            .filter(|t| t.messenger == dead)
            .map(|t| t.name.clone())
            .collect();
        for target in owned {
            debug!(%target, %dead, "removing target of dead messenger");
            self.remove_target(&target);
        }
    }

    /// All registered target names.
    #[must_use]
    pub fn target_list(&self) -> Vec<TargetName> {
        let mut names: Vec<TargetName> = self.targets.keys().cloned().collect();
        names.sort();
        names
    }

    /// Commands a target has advertised, for enumeration.
    pub fn xrls_registered_by(
        &self,
        target: &TargetName,
    ) -> Result<Vec<CommandName>, RegistryError> {
        let entry = self
            .targets
            .get(target)
            .ok_or_else(|| RegistryError::NoTarget(target.clone()))?;
        let mut commands: Vec<CommandName> = entry.resolutions.keys().cloned().collect();
        commands.sort();
        Ok(commands)
    }

    /// Drains queued effects in FIFO order.
    pub fn drain_effects(&mut self) -> Vec<RegistryEffect> {
        self.pending.drain(..).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty() && self.classes.is_empty()
    }

    fn remove_target(&mut self, target: &TargetName) {
        self.validate();
        let Some(entry) = self.targets.remove(target) else {
            return;
        };

        // Cache invalidation goes to everyone, watchers or not.
        self.pending.push_back(RegistryEffect::RemoveTargetHint {
            target: target.clone(),
        });

        if entry.enabled {
            self.queue_event(FinderEvent {
                kind: EventKind::Death,
                class: entry.class.clone(),
                instance: entry.name.clone(),
            });
        }

        if let Some(class_entry) = self.classes.get_mut(&entry.class) {
            class_entry.instances.retain(|i| i != target);
            if class_entry.instances.is_empty() {
                self.classes.remove(&entry.class);
            }
        }
        self.validate();
    }

    /// Expands one event into per-watcher notifications, preserving
    /// generation order.
    fn queue_event(&mut self, event: FinderEvent) {
        let mut watchers: Vec<(TargetName, MessengerId)> = self
            .targets
            .values()
            .filter(|t| {
                t.class_watches.contains(&event.class)
                    || t.instance_watches.contains(&event.instance)
            })
            .map(|t| (t.name.clone(), t.messenger))
            .collect();
        watchers.sort();
        for (watcher, messenger) in watchers {
            self.pending.push_back(RegistryEffect::Notify {
                watcher,
                messenger,
                event: event.clone(),
            });
        }
    }

    /// Cross-checks the class and target tables. Divergence is a programmer
    /// error, not peer misbehavior, and takes the process down.
    fn validate(&self) {
        for (class_name, class) in &self.classes {
            assert!(
                !class.instances.is_empty(),
                "class {class_name} has no instances but was not removed"
            );
            for instance in &class.instances {
                let target = self.targets.get(instance).unwrap_or_else(|| {
                    panic!("instance {instance} of class {class_name} missing from target table")
                });
                assert!(
                    target.class == *class_name,
                    "instance {instance} claims class {} but is listed under {class_name}",
                    target.class
                );
            }
        }
        for target in self.targets.values() {
            let class = self.classes.get(&target.class).unwrap_or_else(|| {
                panic!("target {} has unknown class {}", target.name, target.class)
            });
            let listed = class.instances.iter().filter(|i| **i == target.name).count();
            assert!(
                listed == 1,
                "target {} listed {listed} times in class {}",
                target.name,
                target.class
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tn(s: &str) -> TargetName {
        TargetName::try_new(s).unwrap()
    }

    fn cn(s: &str) -> ClassName {
        ClassName::try_new(s).unwrap()
    }

    fn m(n: u64) -> MessengerId {
        MessengerId::new(n)
    }

    fn endpoint() -> SocketAddr {
        "127.0.0.1:19999".parse().unwrap()
    }

    #[test]
    fn register_unregister_restores_snapshot() {
        let mut reg = Registry::new();
        reg.register(m(1), tn("bgp-1"), cn("bgp"), false).unwrap();
        let _ = reg.drain_effects();
        let snapshot = reg.clone();

        reg.register(m(2), tn("rib-1"), cn("rib"), true).unwrap();
        reg.unregister(m(2), &tn("rib-1")).unwrap();
        let _ = reg.drain_effects();

        assert_eq!(reg, snapshot);
    }

    #[test]
    fn reregistration_by_same_messenger_is_idempotent() {
        let mut reg = Registry::new();
        let c1 = reg.register(m(1), tn("bgp-1"), cn("bgp"), false).unwrap();
        let c2 = reg.register(m(1), tn("bgp-1"), cn("bgp"), false).unwrap();
        assert_eq!(c1, c2);

        let err = reg
            .register(m(2), tn("bgp-1"), cn("bgp"), false)
            .unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered(_)));
    }

    #[test]
    fn singleton_violations_detected_at_registration() {
        let mut reg = Registry::new();
        reg.register(m(1), tn("fea-1"), cn("fea"), true).unwrap();
        let err = reg.register(m(2), tn("fea-2"), cn("fea"), true).unwrap_err();
        assert!(matches!(err, RegistryError::SingletonViolation(_)));

        // Non-singleton instance joining a singleton class is refused too.
        let err = reg
            .register(m(2), tn("fea-3"), cn("fea"), false)
            .unwrap_err();
        assert!(matches!(err, RegistryError::SingletonViolation(_)));
    }

    #[test]
    fn add_then_resolve_round_trips() {
        let mut reg = Registry::new();
        reg.register(m(1), tn("bgp-1"), cn("bgp"), false).unwrap();
        reg.set_enabled(m(1), &tn("bgp-1"), true).unwrap();

        let unresolved: Xrl = "bgp-1/get_int32".parse().unwrap();
        let resolved = reg
            .add_xrl(m(1), &unresolved, ProtocolFamily::stcp(), endpoint())
            .unwrap();
        assert!(resolved.command().as_str().starts_with("get_int32-"));

        let list = reg.resolve(&unresolved).unwrap();
        assert_eq!(list, vec![resolved.clone()]);

        // Idempotent repeat.
        let again = reg
            .add_xrl(m(1), &unresolved, ProtocolFamily::stcp(), endpoint())
            .unwrap();
        assert_eq!(again, resolved);
        assert_eq!(reg.resolve(&unresolved).unwrap().len(), 1);
    }

    #[test]
    fn resolve_via_class_uses_primary_instance() {
        let mut reg = Registry::new();
        reg.register(m(1), tn("bgp-1"), cn("bgp"), false).unwrap();
        reg.register(m(2), tn("bgp-2"), cn("bgp"), false).unwrap();
        reg.set_enabled(m(1), &tn("bgp-1"), true).unwrap();

        let unresolved: Xrl = "bgp-1/hello".parse().unwrap();
        reg.add_xrl(m(1), &unresolved, ProtocolFamily::stcp(), endpoint())
            .unwrap();

        let by_class: Xrl = "bgp/hello".parse().unwrap();
        assert!(reg.resolve(&by_class).is_ok());

        // Primary dies; bgp-2 becomes primary but has no resolution.
        reg.messenger_death(m(1));
        let err = reg.resolve(&by_class).unwrap_err();
        assert!(matches!(err, RegistryError::NotEnabled(_)));
    }

    #[test]
    fn resolve_errors_distinguish_missing_disabled_and_unadvertised() {
        let mut reg = Registry::new();
        let xrl: Xrl = "ghost/hello".parse().unwrap();
        assert!(matches!(
            reg.resolve(&xrl).unwrap_err(),
            RegistryError::NoTarget(_)
        ));

        reg.register(m(1), tn("ghost"), cn("spooks"), false).unwrap();
        assert!(matches!(
            reg.resolve(&xrl).unwrap_err(),
            RegistryError::NotEnabled(_)
        ));

        reg.set_enabled(m(1), &tn("ghost"), true).unwrap();
        assert!(matches!(
            reg.resolve(&xrl).unwrap_err(),
            RegistryError::NoResolution(_)
        ));
    }

    #[test]
    fn enable_disable_generates_birth_and_death() {
        let mut reg = Registry::new();
        reg.register(m(1), tn("watcher"), cn("mon"), false).unwrap();
        reg.watch_class(m(1), &tn("watcher"), &cn("bgp")).unwrap();
        assert!(reg.drain_effects().is_empty());

        reg.register(m(2), tn("bgp-1"), cn("bgp"), false).unwrap();
        assert!(reg.drain_effects().is_empty(), "no event until enabled");

        reg.set_enabled(m(2), &tn("bgp-1"), true).unwrap();
        let effects = reg.drain_effects();
        assert_eq!(effects.len(), 1);
        assert!(matches!(
            &effects[0],
            RegistryEffect::Notify { watcher, event, .. }
                if watcher == &tn("watcher") && event.kind == EventKind::Birth
        ));

        reg.set_enabled(m(2), &tn("bgp-1"), false).unwrap();
        let effects = reg.drain_effects();
        assert_eq!(effects.len(), 1);
        assert!(matches!(
            &effects[0],
            RegistryEffect::Notify { event, .. } if event.kind == EventKind::Death
        ));
    }

    #[test]
    fn class_watch_replays_current_instances() {
        let mut reg = Registry::new();
        reg.register(m(2), tn("bgp-1"), cn("bgp"), false).unwrap();
        reg.set_enabled(m(2), &tn("bgp-1"), true).unwrap();
        reg.register(m(3), tn("bgp-2"), cn("bgp"), false).unwrap();
        // bgp-2 registered but not enabled: no replay for it.
        let _ = reg.drain_effects();

        reg.register(m(1), tn("late-watcher"), cn("mon"), false)
            .unwrap();
        reg.watch_class(m(1), &tn("late-watcher"), &cn("bgp"))
            .unwrap();
        let effects = reg.drain_effects();
        assert_eq!(effects.len(), 1);
        assert!(matches!(
            &effects[0],
            RegistryEffect::Notify { event, .. }
                if event.instance == tn("bgp-1") && event.kind == EventKind::Birth
        ));
    }

    #[test]
    fn instance_watch_requires_existing_instance() {
        let mut reg = Registry::new();
        reg.register(m(1), tn("watcher"), cn("mon"), false).unwrap();
        let err = reg
            .watch_instance(m(1), &tn("watcher"), &tn("nobody"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::NoInstance(_)));
    }

    #[test]
    fn messenger_death_cascades() {
        let mut reg = Registry::new();
        reg.register(m(1), tn("watcher"), cn("mon"), false).unwrap();
        reg.watch_class(m(1), &tn("watcher"), &cn("bgp")).unwrap();
        reg.register(m(2), tn("bgp-1"), cn("bgp"), false).unwrap();
        reg.set_enabled(m(2), &tn("bgp-1"), true).unwrap();
        let _ = reg.drain_effects();

        reg.messenger_death(m(2));
        let effects = reg.drain_effects();
        // A cache hint for everyone plus a death notification for the
        // watcher, in that order of kinds.
        assert!(effects.iter().any(|e| matches!(
            e,
            RegistryEffect::RemoveTargetHint { target } if target == &tn("bgp-1")
        )));
        assert!(effects.iter().any(|e| matches!(
            e,
            RegistryEffect::Notify { event, .. }
                if event.kind == EventKind::Death && event.instance == tn("bgp-1")
        )));
        assert!(reg.resolve(&"bgp-1/x".parse().unwrap()).is_err());
    }

    #[test]
    fn remove_xrl_hints_everyone() {
        let mut reg = Registry::new();
        reg.register(m(1), tn("bgp-1"), cn("bgp"), false).unwrap();
        let unresolved: Xrl = "bgp-1/hello".parse().unwrap();
        reg.add_xrl(m(1), &unresolved, ProtocolFamily::stcp(), endpoint())
            .unwrap();

        assert!(matches!(
            reg.remove_xrl(m(2), &unresolved).unwrap_err(),
            RegistryError::NotOwned(_)
        ));
        reg.remove_xrl(m(1), &unresolved).unwrap();
        let effects = reg.drain_effects();
        assert!(matches!(
            &effects[..],
            [RegistryEffect::RemoveXrlHint { command, .. }]
                if command.as_str() == "hello"
        ));
        assert!(matches!(
            reg.remove_xrl(m(1), &unresolved).unwrap_err(),
            RegistryError::Unknown(_)
        ));
    }

    #[test]
    fn enumeration_lists_targets_and_commands() {
        let mut reg = Registry::new();
        reg.register(m(1), tn("b"), cn("bgp"), false).unwrap();
        reg.register(m(1), tn("a"), cn("rib"), false).unwrap();
        assert_eq!(reg.target_list(), vec![tn("a"), tn("b")]);

        reg.add_xrl(
            m(1),
            &"b/zeta".parse().unwrap(),
            ProtocolFamily::stcp(),
            endpoint(),
        )
        .unwrap();
        reg.add_xrl(
            m(1),
            &"b/alpha".parse().unwrap(),
            ProtocolFamily::stcp(),
            endpoint(),
        )
        .unwrap();
        let commands = reg.xrls_registered_by(&tn("b")).unwrap();
        assert_eq!(
            commands,
            vec![
                CommandName::try_new("alpha").unwrap(),
                CommandName::try_new("zeta").unwrap()
            ]
        );
    }
}
