//! The unit the pipeline moves around: a prefix bound to an attribute set.

use std::sync::Arc;

use bitflags::bitflags;

use crate::bgp::attributes::PathAttributeList;
use crate::domain_types::{Genid, PeerId};
use crate::net::{Address, IpNet};

bitflags! {
    /// Per-route state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RouteFlags: u8 {
        /// Chosen by Decision and in use downstream.
        const IN_USE = 0b0000_0001;
        /// Rejected by a policy filter.
        const FILTERED = 0b0000_0010;
        /// Next hop currently resolves in the IGP.
        const NEXTHOP_RESOLVED = 0b0000_0100;
        /// Belongs to a generation being drained after a peering bounce.
        const STALE = 0b0000_1000;
    }
}

/// Policy tags attached by filters, opaque to the pipeline.
pub type PolicyTags = Vec<u32>;

/// A route as it flows between stages. Attribute lists are shared through
/// the pool; cloning a route is cheap.
#[derive(Debug, Clone)]
pub struct SubnetRoute<A: Address> {
    pub net: IpNet<A>,
    pub attrs: Arc<PathAttributeList<A>>,
    pub peer: PeerId,
    pub genid: Genid,
    pub flags: RouteFlags,
    pub policy_tags: PolicyTags,
    /// IGP distance to the next hop, filled in by next-hop lookup.
    pub igp_cost: Option<u32>,
}

impl<A: Address> SubnetRoute<A> {
    #[must_use]
    pub fn new(
        net: IpNet<A>,
        attrs: Arc<PathAttributeList<A>>,
        peer: PeerId,
        genid: Genid,
    ) -> Self {
        Self {
            net,
            attrs,
            peer,
            genid,
            flags: RouteFlags::default(),
            policy_tags: PolicyTags::new(),
            igp_cost: None,
        }
    }

    #[must_use]
    pub fn with_attrs(&self, attrs: Arc<PathAttributeList<A>>) -> Self {
        let mut route = self.clone();
        route.attrs = attrs;
        route
    }

    #[must_use]
    pub fn nexthop_resolved(&self) -> bool {
        self.flags.contains(RouteFlags::NEXTHOP_RESOLVED)
    }

    /// Two routes are the same announcement if prefix, peer and generation
    /// match; attributes may differ across filter stages.
    #[must_use]
    pub fn same_announcement(&self, other: &Self) -> bool {
        self.net == other.net && self.peer == other.peer && self.genid == other.genid
    }
}
