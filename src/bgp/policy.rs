//! Policy filter stages.
//!
//! A filter sees a route through a [`BgpVarRw`] view: it reads variables,
//! optionally writes some back, and accepts or rejects. The stage then
//! rebuilds the route (re-interning rewritten attributes) or swallows it.
//! Deletions run through the same filter as additions, so a withdraw always
//! carries the same rewritten attributes its announcement did.

use std::sync::Arc;

use crate::bgp::attributes::{AttributePool, PathAttributeList};
use crate::bgp::route::{PolicyTags, SubnetRoute};
use crate::bgp::table::{RouteOp, RouteTable};
use crate::net::{Address, IpNet};

/// Accept (with possible rewrites) or reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Accept,
    Reject,
}

/// Where in the pipeline a policy stage sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDirection {
    Import,
    SourceMatch,
    Export,
}

/// Read/write view over one route, handed to filters.
pub struct BgpVarRw<A: Address> {
    net: IpNet<A>,
    attrs: PathAttributeList<A>,
    policy_tags: PolicyTags,
    modified: bool,
}

impl<A: Address> BgpVarRw<A> {
    fn new(route: &SubnetRoute<A>) -> Self {
        Self {
            net: route.net,
            attrs: (*route.attrs).clone(),
            policy_tags: route.policy_tags.clone(),
            modified: false,
        }
    }

    #[must_use]
    pub fn net(&self) -> IpNet<A> {
        self.net
    }

    #[must_use]
    pub fn local_pref(&self) -> Option<u32> {
        self.attrs.local_pref
    }

    #[must_use]
    pub fn med(&self) -> Option<u32> {
        self.attrs.med
    }

    #[must_use]
    pub fn next_hop(&self) -> A {
        self.attrs.next_hop
    }

    #[must_use]
    pub fn as_path_contains(&self, asn: u32) -> bool {
        self.attrs.as_path.contains(asn)
    }

    #[must_use]
    pub fn has_community(&self, community: u32) -> bool {
        self.attrs.communities.contains(&community)
    }

    #[must_use]
    pub fn policy_tags(&self) -> &PolicyTags {
        &self.policy_tags
    }

    pub fn set_local_pref(&mut self, local_pref: u32) {
        self.attrs.local_pref = Some(local_pref);
        self.modified = true;
    }

    pub fn set_med(&mut self, med: u32) {
        self.attrs.med = Some(med);
        self.modified = true;
    }

    pub fn set_next_hop(&mut self, next_hop: A) {
        self.attrs.next_hop = next_hop;
        self.modified = true;
    }

    pub fn prepend_as(&mut self, asn: u32) {
        self.attrs.as_path = self.attrs.as_path.prepend(asn);
        self.modified = true;
    }

    pub fn add_community(&mut self, community: u32) {
        self.attrs.communities.insert(community);
        self.modified = true;
    }

    pub fn add_policy_tag(&mut self, tag: u32) {
        self.policy_tags.push(tag);
        self.modified = true;
    }
}

/// A policy program. Implementations must be deterministic: the deletion
/// side of a route must filter exactly like its addition did.
pub trait PolicyFilter<A: Address>: Send + Sync {
    fn apply(&self, varrw: &mut BgpVarRw<A>) -> FilterVerdict;
}

/// Convenience: closures are filters.
impl<A: Address, F> PolicyFilter<A> for F
where
    F: Fn(&mut BgpVarRw<A>) -> FilterVerdict + Send + Sync,
{
    fn apply(&self, varrw: &mut BgpVarRw<A>) -> FilterVerdict {
        self(varrw)
    }
}

/// One policy stage (import, source-match or export).
pub struct PolicyTable<A: Address> {
    name: String,
    direction: FilterDirection,
    filter: Option<Arc<dyn PolicyFilter<A>>>,
    pool: AttributePool<A>,
}

impl<A: Address> PolicyTable<A> {
    #[must_use]
    pub fn new(direction: FilterDirection, pool: AttributePool<A>) -> Self {
        Self {
            name: format!("policy-{direction:?}").to_lowercase(),
            direction,
            filter: None,
            pool,
        }
    }

    #[must_use]
    pub fn direction(&self) -> FilterDirection {
        self.direction
    }

    /// Swaps the filter program. Existing routes are re-filtered by the
    /// source-match stage's pull path, not here.
    pub fn set_filter(&mut self, filter: Option<Arc<dyn PolicyFilter<A>>>) {
        self.filter = filter;
    }

    /// Runs one route through the filter. `None` means rejected.
    #[must_use]
    pub fn filter_route(&self, route: &SubnetRoute<A>) -> Option<SubnetRoute<A>> {
        let Some(filter) = &self.filter else {
            return Some(route.clone());
        };
        let mut varrw = BgpVarRw::new(route);
        match filter.apply(&mut varrw) {
            FilterVerdict::Reject => None,
            FilterVerdict::Accept => {
                let mut out = route.clone();
                if varrw.modified {
                    out.attrs = self.pool.intern(varrw.attrs);
                    out.policy_tags = varrw.policy_tags;
                }
                Some(out)
            }
        }
    }
}

impl<A: Address> RouteTable<A> for PolicyTable<A> {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, op: RouteOp<A>) -> Vec<RouteOp<A>> {
        match op {
            RouteOp::Add(route) => match self.filter_route(&route) {
                Some(filtered) => vec![RouteOp::Add(filtered)],
                None => Vec::new(),
            },
            RouteOp::Delete(route) => match self.filter_route(&route) {
                Some(filtered) => vec![RouteOp::Delete(filtered)],
                None => Vec::new(),
            },
            RouteOp::Replace { old, new } => {
                match (self.filter_route(&old), self.filter_route(&new)) {
                    (Some(old), Some(new)) => vec![RouteOp::Replace { old, new }],
                    (Some(old), None) => vec![RouteOp::Delete(old)],
                    (None, Some(new)) => vec![RouteOp::Add(new)],
                    (None, None) => Vec::new(),
                }
            }
            RouteOp::Push => vec![RouteOp::Push],
        }
    }
}
