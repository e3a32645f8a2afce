//! Process-wide context handed to listeners and routers.
//!
//! Carries the permit lists and the preferred local address explicitly, so
//! nothing in the fabric reaches for hidden mutable globals.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::net::AnyNet;

/// Admission policy for inbound fabric connections.
///
/// Two sets per address family: permitted single hosts and permitted
/// prefixes. The process's own preferred address is always implicitly
/// permitted. Mutation is expected only from privileged setup code before a
/// listener is enabled.
#[derive(Debug, Default)]
pub struct PermitList {
    hosts: Vec<IpAddr>,
    nets: Vec<AnyNet>,
}

impl PermitList {
    /// Adds a single permitted host. Idempotent; returns false on repeats.
    pub fn add_host(&mut self, host: IpAddr) -> bool {
        if self.hosts.contains(&host) {
            return false;
        }
        debug!(%host, "permitting host");
        self.hosts.push(host);
        true
    }

    /// Adds a permitted prefix. Idempotent; returns false on repeats.
    pub fn add_net(&mut self, net: AnyNet) -> bool {
        if self.nets.contains(&net) {
            return false;
        }
        debug!(%net, "permitting net");
        self.nets.push(net);
        true
    }

    pub fn clear(&mut self) {
        self.hosts.clear();
        self.nets.clear();
    }

    #[must_use]
    pub fn is_permitted(&self, host: IpAddr) -> bool {
        self.hosts.contains(&host) || self.nets.iter().any(|n| n.contains(host))
    }
}

/// Shared, explicitly-passed process context.
#[derive(Debug, Clone)]
pub struct ProcessContext {
    permits: Arc<RwLock<PermitList>>,
    /// The address this process advertises for itself.
    preferred_addr: IpAddr,
}

impl ProcessContext {
    #[must_use]
    pub fn new(preferred_addr: IpAddr) -> Self {
        Self {
            permits: Arc::new(RwLock::new(PermitList::default())),
            preferred_addr,
        }
    }

    /// Loopback-only context: the usual arrangement for a single-host
    /// routing suite.
    #[must_use]
    pub fn local() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    #[must_use]
    pub fn preferred_addr(&self) -> IpAddr {
        self.preferred_addr
    }

    /// Whether a peer at `peer` may connect. The preferred address is
    /// implicitly permitted; loopback peers are permitted when the preferred
    /// address is itself loopback.
    #[must_use]
    pub fn peer_is_permitted(&self, peer: SocketAddr) -> bool {
        let ip = peer.ip();
        if ip == self.preferred_addr {
            return true;
        }
        if ip.is_loopback() && self.preferred_addr.is_loopback() {
            return true;
        }
        self.permits
            .read()
            .expect("permit list lock poisoned")
            .is_permitted(ip)
    }

    /// Runs `f` against the mutable permit list. Intended for privileged
    /// setup before the listener is enabled.
    pub fn with_permits<R>(&self, f: impl FnOnce(&mut PermitList) -> R) -> R {
        let mut permits = self.permits.write().expect("permit list lock poisoned");
        f(&mut permits)
    }
}
