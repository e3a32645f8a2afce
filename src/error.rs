//! Error taxonomy for the fabric.
//!
//! Wire-visible failures travel as an [`XrlErrorCode`] plus an optional
//! human-readable note; they are never exceptions across component
//! boundaries. Each subsystem keeps its own typed enum and converts at the
//! RPC boundary.

use thiserror::Error;

use crate::domain_types::{ClassName, CommandName, TargetName};

/// Wire-level result code carried on every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum XrlErrorCode {
    Okay = 0,
    CommandFailed = 1,
    NoSuchMethod = 2,
    NoFinder = 3,
    ResolveFailed = 4,
    TransportFailed = 5,
    Timeout = 6,
    ReplyTimedOut = 7,
    BadArgs = 8,
    InternalError = 9,
}

impl XrlErrorCode {
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Unknown codes from a peer decode to `InternalError` rather than
    /// failing the whole message.
    #[must_use]
    pub fn from_u32(v: u32) -> Self {
        match v {
            0 => Self::Okay,
            1 => Self::CommandFailed,
            2 => Self::NoSuchMethod,
            3 => Self::NoFinder,
            4 => Self::ResolveFailed,
            5 => Self::TransportFailed,
            6 => Self::Timeout,
            7 => Self::ReplyTimedOut,
            8 => Self::BadArgs,
            _ => Self::InternalError,
        }
    }
}

impl std::fmt::Display for XrlErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Okay => "OKAY",
            Self::CommandFailed => "COMMAND_FAILED",
            Self::NoSuchMethod => "NO_SUCH_METHOD",
            Self::NoFinder => "NO_FINDER",
            Self::ResolveFailed => "RESOLVE_FAILED",
            Self::TransportFailed => "TRANSPORT_FAILED",
            Self::Timeout => "TIMEOUT",
            Self::ReplyTimedOut => "REPLY_TIMED_OUT",
            Self::BadArgs => "BAD_ARGS",
            Self::InternalError => "INTERNAL_ERROR",
        };
        f.write_str(s)
    }
}

/// A wire-visible failure: result code plus optional note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrlError {
    pub code: XrlErrorCode,
    pub note: Option<String>,
}

impl std::fmt::Display for XrlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.note {
            Some(note) => write!(f, "{}: {note}", self.code),
            None => self.code.fmt(f),
        }
    }
}

impl std::error::Error for XrlError {}

impl XrlError {
    #[must_use]
    pub fn new(code: XrlErrorCode, note: impl Into<String>) -> Self {
        Self {
            code,
            note: Some(note.into()),
        }
    }

    #[must_use]
    pub fn bare(code: XrlErrorCode) -> Self {
        Self { code, note: None }
    }

    #[must_use]
    pub fn command_failed(note: impl Into<String>) -> Self {
        Self::new(XrlErrorCode::CommandFailed, note)
    }

    #[must_use]
    pub fn is_okay(&self) -> bool {
        self.code == XrlErrorCode::Okay
    }
}

/// Failure to parse an Xrl from its text syntax.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XrlParseError {
    #[error("missing '/' separating target and command")]
    MissingCommand,

    #[error("invalid target name: {0:?}")]
    InvalidTarget(String),

    #[error("invalid command name: {0:?}")]
    InvalidCommand(String),

    #[error("malformed argument {0:?}")]
    MalformedArgument(String),

    #[error("unknown atom type {0:?}")]
    UnknownAtomType(String),

    #[error("bad value for {atom_type} atom: {value:?}")]
    BadValue { atom_type: String, value: String },

    #[error("duplicate argument name {0:?}")]
    DuplicateArgument(String),

    #[error("malformed resolved prefix {0:?}")]
    MalformedResolvedPrefix(String),
}

/// Carrier-level failures.
#[derive(Debug, Error)]
pub enum CarrierError {
    /// The writer queue is above its high-water mark.
    #[error("carrier writer queue full")]
    Backpressure,

    #[error("carrier closed")]
    Closed,

    #[error("frame payload of {size} bytes exceeds ceiling of {limit} bytes")]
    OversizeFrame { size: usize, limit: usize },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures decoding an inbound frame into a wire message.
///
/// Always peer misbehavior: the offending carrier is closed, the process
/// carries on.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("undecodable message envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    #[error("unparsable xrl in request: {0}")]
    Xrl(#[from] XrlParseError),
}

/// Finder registry failures, reported synchronously to the originating RPC.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("target {0} already registered")]
    AlreadyRegistered(TargetName),

    #[error("class {0} is singleton and already has an instance")]
    SingletonViolation(ClassName),

    #[error("target {0} is not owned by the calling messenger")]
    NotOwned(TargetName),

    #[error("no target {0}")]
    NoTarget(TargetName),

    #[error("target {0} is not enabled")]
    NotEnabled(TargetName),

    #[error("no resolution registered for {0}")]
    NoResolution(String),

    #[error("no class {0}")]
    NoClass(ClassName),

    #[error("no instance {0}")]
    NoInstance(TargetName),

    #[error("no such registration {0}")]
    Unknown(String),

    #[error("malformed xrl: {0}")]
    BadXrl(String),
}

impl RegistryError {
    /// Wire rendering per the error-handling contract: resolution misses get
    /// the resolve code, everything else is a command failure with a note.
    #[must_use]
    pub fn to_xrl_error(&self) -> XrlError {
        let code = match self {
            Self::NoTarget(_) | Self::NotEnabled(_) | Self::NoResolution(_) => {
                XrlErrorCode::ResolveFailed
            }
            Self::BadXrl(_) => XrlErrorCode::BadArgs,
            _ => XrlErrorCode::CommandFailed,
        };
        XrlError::new(code, self.to_string())
    }
}

/// Router-side failures surfaced to `send` callers.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("no finder connection and no cached resolution for {0}")]
    NoFinder(CommandName),

    #[error("resolve failed: {0}")]
    ResolveFailed(XrlError),

    #[error("command registration failed: {0}")]
    Command(String),

    #[error("router is shutting down")]
    Shutdown,

    #[error("listener bind failed: {0}")]
    Bind(std::io::Error),

    #[error("carrier error: {0}")]
    Carrier(#[from] CarrierError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_round_trip_through_u32() {
        for code in [
            XrlErrorCode::Okay,
            XrlErrorCode::CommandFailed,
            XrlErrorCode::NoSuchMethod,
            XrlErrorCode::NoFinder,
            XrlErrorCode::ResolveFailed,
            XrlErrorCode::TransportFailed,
            XrlErrorCode::Timeout,
            XrlErrorCode::ReplyTimedOut,
            XrlErrorCode::BadArgs,
            XrlErrorCode::InternalError,
        ] {
            assert_eq!(XrlErrorCode::from_u32(code.as_u32()), code);
        }
        assert_eq!(XrlErrorCode::from_u32(999), XrlErrorCode::InternalError);
    }

    #[test]
    fn registry_errors_map_to_wire_codes() {
        let target = TargetName::try_new("bgp-1").unwrap();
        let e = RegistryError::NoTarget(target.clone());
        assert_eq!(e.to_xrl_error().code, XrlErrorCode::ResolveFailed);

        let e = RegistryError::AlreadyRegistered(target);
        assert_eq!(e.to_xrl_error().code, XrlErrorCode::CommandFailed);
        assert!(e.to_xrl_error().note.unwrap().contains("bgp-1"));
    }
}
