//! Next-hop lookup: annotates routes with IGP reachability and distance.

use std::collections::HashMap;

use crate::bgp::route::RouteFlags;
use crate::bgp::table::{RouteOp, RouteTable};
use crate::net::Address;

/// Resolves BGP next hops against an IGP metric table fed from outside the
/// pipeline. Routes whose next hop does not resolve still flow downstream;
/// Decision declines to pick them.
pub struct NextHopLookupTable<A: Address> {
    name: String,
    metrics: HashMap<A, u32>,
}

impl<A: Address> Default for NextHopLookupTable<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Address> NextHopLookupTable<A> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "nexthop-lookup".to_string(),
            metrics: HashMap::new(),
        }
    }

    /// Installs or updates the IGP distance to a next hop.
    pub fn set_metric(&mut self, next_hop: A, metric: u32) {
        self.metrics.insert(next_hop, metric);
    }

    /// Marks a next hop unreachable.
    pub fn clear_metric(&mut self, next_hop: &A) {
        self.metrics.remove(next_hop);
    }

    #[must_use]
    pub fn metric(&self, next_hop: &A) -> Option<u32> {
        self.metrics.get(next_hop).copied()
    }

    fn annotate(&self, route: &crate::bgp::route::SubnetRoute<A>) -> crate::bgp::route::SubnetRoute<A> {
        let mut out = route.clone();
        match self.metric(&route.attrs.next_hop) {
            Some(metric) => {
                out.flags |= RouteFlags::NEXTHOP_RESOLVED;
                out.igp_cost = Some(metric);
            }
            None => {
                out.flags &= !RouteFlags::NEXTHOP_RESOLVED;
                out.igp_cost = None;
            }
        }
        out
    }
}

impl<A: Address> RouteTable<A> for NextHopLookupTable<A> {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, op: RouteOp<A>) -> Vec<RouteOp<A>> {
        match op {
            RouteOp::Add(route) => vec![RouteOp::Add(self.annotate(&route))],
            RouteOp::Replace { old, new } => vec![RouteOp::Replace {
                old: self.annotate(&old),
                new: self.annotate(&new),
            }],
            RouteOp::Delete(route) => vec![RouteOp::Delete(self.annotate(&route))],
            RouteOp::Push => vec![RouteOp::Push],
        }
    }
}
