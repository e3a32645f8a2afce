//! The Xrl request identifier and its text syntax.
//!
//! An Xrl names a remote operation: `target/command?args`. Targets are
//! Finder-registered instance names; commands select a method; args are a
//! typed atom list. Xrls are immutable after construction and render to a
//! canonical text form that round-trips exactly.
//!
//! A *resolved* Xrl additionally carries the transport family and endpoint
//! the Finder resolved the target to:
//! `stcp://127.0.0.1:19999/command-suffix?args`.

pub mod atom;
pub mod args;

use std::fmt::{self, Display, Formatter};
use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain_types::{CommandName, ProtocolFamily, TargetName};
use crate::error::XrlParseError;

pub use atom::{AtomValue, XrlAtom};
pub use args::XrlArgs;

/// An unresolved request identifier: `target/command?args`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Xrl {
    target: TargetName,
    command: CommandName,
    args: XrlArgs,
}

impl Xrl {
    pub fn new(target: TargetName, command: CommandName, args: XrlArgs) -> Self {
        Self {
            target,
            command,
            args,
        }
    }

    /// Convenience constructor from string literals.
    pub fn parse_parts(target: &str, command: &str, args: XrlArgs) -> Result<Self, XrlParseError> {
        let target = TargetName::try_new(target)
            .map_err(|_| XrlParseError::InvalidTarget(target.to_string()))?;
        let command = CommandName::try_new(command)
            .map_err(|_| XrlParseError::InvalidCommand(command.to_string()))?;
        Ok(Self::new(target, command, args))
    }

    #[must_use]
    pub fn target(&self) -> &TargetName {
        &self.target
    }

    #[must_use]
    pub fn command(&self) -> &CommandName {
        &self.command
    }

    #[must_use]
    pub fn args(&self) -> &XrlArgs {
        &self.args
    }

    /// The resolution key: target and command without arguments.
    #[must_use]
    pub fn string_no_args(&self) -> String {
        format!("{}/{}", self.target, self.command)
    }
}

impl Display for Xrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.target, self.command)?;
        if !self.args.is_empty() {
            write!(f, "?{}", self.args)?;
        }
        Ok(())
    }
}

impl FromStr for Xrl {
    type Err = XrlParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, args_text) = match s.split_once('?') {
            Some((p, a)) => (p, a),
            None => (s, ""),
        };
        let (target, command) = path.split_once('/').ok_or(XrlParseError::MissingCommand)?;
        let args: XrlArgs = args_text.parse()?;
        Self::parse_parts(target, command, args)
    }
}

/// A resolved request identifier, ready for dispatch to a concrete endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedXrl {
    family: ProtocolFamily,
    endpoint: SocketAddr,
    command: CommandName,
    args: XrlArgs,
}

impl ResolvedXrl {
    pub fn new(
        family: ProtocolFamily,
        endpoint: SocketAddr,
        command: CommandName,
        args: XrlArgs,
    ) -> Self {
        Self {
            family,
            endpoint,
            command,
            args,
        }
    }

    /// The transport family, which plays the role of the target in the
    /// resolved text form.
    #[must_use]
    pub fn family(&self) -> &ProtocolFamily {
        &self.family
    }

    #[must_use]
    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    #[must_use]
    pub fn command(&self) -> &CommandName {
        &self.command
    }

    #[must_use]
    pub fn args(&self) -> &XrlArgs {
        &self.args
    }

    /// Same endpoint and family, different argument payload. Used when a
    /// cached resolution is replayed for a new call.
    #[must_use]
    pub fn with_args(&self, args: XrlArgs) -> Self {
        Self {
            family: self.family.clone(),
            endpoint: self.endpoint,
            command: self.command.clone(),
            args,
        }
    }
}

impl Display for ResolvedXrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.family, self.endpoint, self.command)?;
        if !self.args.is_empty() {
            write!(f, "?{}", self.args)?;
        }
        Ok(())
    }
}

impl FromStr for ResolvedXrl {
    type Err = XrlParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || XrlParseError::MalformedResolvedPrefix(s.to_string());
        let (family, rest) = s.split_once("://").ok_or_else(bad)?;
        let family = ProtocolFamily::try_new(family).map_err(|_| bad())?;
        let (endpoint, rest) = rest.split_once('/').ok_or_else(bad)?;
        let endpoint: SocketAddr = endpoint.parse().map_err(|_| bad())?;
        let (command, args_text) = match rest.split_once('?') {
            Some((c, a)) => (c, a),
            None => (rest, ""),
        };
        let command = CommandName::try_new(command)
            .map_err(|_| XrlParseError::InvalidCommand(command.to_string()))?;
        let args: XrlArgs = args_text.parse()?;
        Ok(Self::new(family, endpoint, command, args))
    }
}
