//! Per-process command registry: name to handler.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use crate::error::{XrlError, XrlErrorCode};
use crate::messenger::RequestContext;
use crate::xrl::{Xrl, XrlArgs};

/// What a handler produces: reply args, or a wire-visible failure.
pub type CommandResult = Result<XrlArgs, XrlError>;

/// A command handler. Handlers run on the messenger's dispatch path and must
/// not block; anything slow belongs on a spawned task replying later through
/// its own Xrl.
pub type XrlHandler = Arc<dyn Fn(&RequestContext, &Xrl) -> CommandResult + Send + Sync>;

#[derive(Debug, Error)]
pub enum CommandMapError {
    #[error("command {0} already registered")]
    Duplicate(String),
}

/// `name -> handler` table. Lookup is O(1) average; duplicates are rejected.
#[derive(Default)]
pub struct CommandMap {
    commands: DashMap<String, XrlHandler>,
}

impl CommandMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under `name`.
    pub fn add(
        &self,
        name: impl Into<String>,
        handler: XrlHandler,
    ) -> Result<(), CommandMapError> {
        let name = name.into();
        // Entry-based insert so a concurrent duplicate cannot slip between
        // check and insert.
        match self.commands.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(CommandMapError::Duplicate(name)),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                debug!(command = %name, "registered command");
                v.insert(handler);
                Ok(())
            }
        }
    }

    /// Registers a second name for an existing handler (used for the
    /// suffixed names the Finder hands back at advertisement time).
    pub fn alias(&self, existing: &str, alias: impl Into<String>) -> Result<(), CommandMapError> {
        let Some(handler) = self.lookup(existing) else {
            return Err(CommandMapError::Duplicate(existing.to_string()));
        };
        self.add(alias, handler)
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<XrlHandler> {
        self.commands.get(name).map(|h| Arc::clone(h.value()))
    }

    pub fn remove(&self, name: &str) -> bool {
        self.commands.remove(name).is_some()
    }

    #[must_use]
    pub fn command_names(&self) -> Vec<String> {
        self.commands.iter().map(|e| e.key().clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Dispatches an inbound request. An unknown command is the caller's
    /// mistake, not ours: it gets `NO_SUCH_METHOD`.
    pub fn dispatch(&self, ctx: &RequestContext, xrl: &Xrl) -> CommandResult {
        match self.lookup(xrl.command().as_str()) {
            Some(handler) => handler(ctx, xrl),
            None => Err(XrlError::new(
                XrlErrorCode::NoSuchMethod,
                format!("no command {}", xrl.command()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::MessengerId;
    use crate::xrl::AtomValue;

    fn ctx() -> RequestContext {
        RequestContext {
            messenger: MessengerId::new(1),
            peer: "127.0.0.1:1".parse().unwrap(),
        }
    }

    #[test]
    fn dispatch_reaches_handler() {
        let map = CommandMap::new();
        map.add(
            "get_int32",
            Arc::new(|_ctx, _xrl| Ok(XrlArgs::new().with("an_int32", AtomValue::I32(123_456)))),
        )
        .unwrap();

        let xrl: Xrl = "t/get_int32".parse().unwrap();
        let reply = map.dispatch(&ctx(), &xrl).unwrap();
        assert_eq!(reply.get_i32("an_int32"), Some(123_456));
    }

    #[test]
    fn unknown_command_is_no_such_method() {
        let map = CommandMap::new();
        let xrl: Xrl = "t/absent".parse().unwrap();
        let err = map.dispatch(&ctx(), &xrl).unwrap_err();
        assert_eq!(err.code, XrlErrorCode::NoSuchMethod);
    }

    #[test]
    fn duplicates_rejected_and_aliases_share_handlers() {
        let map = CommandMap::new();
        let handler: XrlHandler = Arc::new(|_, _| Ok(XrlArgs::new()));
        map.add("hello", Arc::clone(&handler)).unwrap();
        assert!(map.add("hello", handler).is_err());

        map.alias("hello", "hello-a1b2c3d4e5f6").unwrap();
        let xrl: Xrl = "t/hello-a1b2c3d4e5f6".parse().unwrap();
        assert!(map.dispatch(&ctx(), &xrl).is_ok());
        assert_eq!(map.len(), 2);
    }
}
