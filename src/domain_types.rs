//! Strongly-typed domain values shared across the fabric.
//!
//! Name-like and bounded quantities get their own validated newtypes so a
//! target name can never be confused with a class name, and so limits are
//! checked once at the edge instead of at every use site.

use nutype::nutype;
use uuid::Uuid;

/// Characters permitted in fabric names (targets, classes, families).
///
/// The Xrl text syntax reserves `/`, `?`, `&`, `=` and `:` as structure, so
/// names must not contain them.
fn is_plain_name(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 255
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Commands additionally allow `/` because a selector may span an interface
/// hierarchy (`finder/resolve_xrl`).
fn is_command_name(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 255
        && !s.starts_with('/')
        && !s.ends_with('/')
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/'))
}

/// Unique name of a registered target instance, e.g. `bgp-1`.
#[nutype(
    validate(predicate = is_plain_name),
    derive(
        Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
        TryFrom, Into, AsRef, Deref
    )
)]
pub struct TargetName(String);

/// Name of a class of interchangeable targets, e.g. `bgp`.
#[nutype(
    validate(predicate = is_plain_name),
    derive(
        Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
        TryFrom, Into, AsRef, Deref
    )
)]
pub struct ClassName(String);

/// Method selector within a target, e.g. `hello` or `rib/add_route`.
#[nutype(
    validate(predicate = is_command_name),
    derive(
        Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
        TryFrom, Into, AsRef, Deref
    )
)]
pub struct CommandName(String);

/// Transport scheme a resolved Xrl dispatches over, e.g. `stcp`.
#[nutype(
    validate(predicate = is_plain_name),
    derive(
        Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, TryFrom, Into, AsRef,
        Deref
    )
)]
pub struct ProtocolFamily(String);

impl ProtocolFamily {
    /// The framed-TCP family every router listener speaks.
    #[must_use]
    pub fn stcp() -> Self {
        Self::try_new("stcp").expect("static family name is valid")
    }
}

/// Opaque per-registration handle, used to detect stale registrations.
#[nutype(derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into
))]
pub struct RegistrationCookie(Uuid);

impl RegistrationCookie {
    /// Mints a fresh, unguessable cookie.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }

    /// Short hex form appended to resolved method names so that resolved
    /// endpoints cannot be dispatched to without asking the Finder first.
    #[must_use]
    pub fn suffix(&self) -> String {
        let bytes = self.into_inner().into_bytes();
        bytes[..6].iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Ceiling on a single carrier frame payload, in octets.
#[nutype(
    validate(greater_or_equal = 64, less_or_equal = 16_777_216),
    derive(
        Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display,
        Default, TryFrom, Into
    ),
    default = 8_192
)]
pub struct PayloadLimit(usize);

impl PayloadLimit {
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

/// Capacity of a bounded in-process queue (writer queues, event queues).
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 1_000_000),
    derive(
        Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display,
        Default, TryFrom, Into
    ),
    default = 1_024
)]
pub struct QueueCapacity(usize);

impl QueueCapacity {
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

/// Deadline applied to every outbound request.
#[nutype(
    validate(greater_or_equal = 10, less_or_equal = 600_000),
    derive(
        Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display,
        Default, TryFrom, Into
    ),
    default = 5_000
)]
pub struct RequestTimeoutMs(u64);

impl RequestTimeoutMs {
    #[must_use]
    pub fn as_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.into_inner())
    }
}

/// Interval between Finder liveness hellos.
#[nutype(
    validate(greater_or_equal = 100, less_or_equal = 60_000),
    derive(
        Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display,
        Default, TryFrom, Into
    ),
    default = 1_000
)]
pub struct HelloIntervalMs(u64);

impl HelloIntervalMs {
    #[must_use]
    pub fn as_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.into_inner())
    }
}

/// Delay before a router retries its Finder connection.
#[nutype(
    validate(greater_or_equal = 50, less_or_equal = 60_000),
    derive(
        Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display,
        Default, TryFrom, Into
    ),
    default = 250
)]
pub struct ReconnectDelayMs(u64);

impl ReconnectDelayMs {
    #[must_use]
    pub fn as_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.into_inner())
    }
}

/// Generation number stamped on a peer's RibIn.
///
/// Bumped every time the peering bounces so that references to routes from a
/// previous session can be recognized as stale downstream.
#[nutype(derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    Default, From, Into
), default = 0)]
pub struct Genid(u32);

impl Genid {
    #[must_use]
    pub fn next(&self) -> Self {
        Self::new(self.into_inner().wrapping_add(1))
    }
}

/// Identifies one BGP peering within a pipeline.
#[nutype(derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    From, Into
))]
pub struct PeerId(u32);
