//! RibIn: per-peer store of advertised routes, plus the deletion walker
//! that drains it gently after a peering bounce.

use crate::bgp::attributes::{AttributePool, PathAttributeList};
use crate::bgp::route::{RouteFlags, SubnetRoute};
use crate::bgp::table::{RouteOp, RouteTable};
use crate::bgp::trie::BgpTrie;
use crate::domain_types::{Genid, PeerId};
use crate::net::{Address, IpNet};

/// Stores what one peer advertised, keyed by prefix.
pub struct RibInTable<A: Address> {
    name: String,
    peer: PeerId,
    genid: Genid,
    trie: BgpTrie<A>,
    pool: AttributePool<A>,
}

impl<A: Address> RibInTable<A> {
    #[must_use]
    pub fn new(peer: PeerId, pool: AttributePool<A>) -> Self {
        Self {
            name: format!("ribin-{peer}"),
            peer,
            genid: Genid::new(1),
            trie: BgpTrie::new(),
            pool,
        }
    }

    #[must_use]
    pub fn genid(&self) -> Genid {
        self.genid
    }

    #[must_use]
    pub fn route_count(&self) -> usize {
        self.trie.route_count()
    }

    #[must_use]
    pub fn trie(&self) -> &BgpTrie<A> {
        &self.trie
    }

    /// Peer advertised (or re-advertised) a prefix.
    pub fn advertise(&mut self, net: IpNet<A>, attrs: PathAttributeList<A>) -> Vec<RouteOp<A>> {
        let attrs = self.pool.intern(attrs);
        let route = SubnetRoute::new(net, attrs, self.peer, self.genid);
        let (_, previous) = self.trie.insert(route.clone());
        match previous {
            Some(old) => vec![RouteOp::Replace { old, new: route }],
            None => vec![RouteOp::Add(route)],
        }
    }

    /// Peer withdrew a prefix. Unknown prefixes are ignored (a withdraw
    /// can legitimately cross a bounce).
    pub fn withdraw(&mut self, net: &IpNet<A>) -> Vec<RouteOp<A>> {
        match self.trie.erase(net) {
            Some(old) => vec![RouteOp::Delete(old)],
            None => Vec::new(),
        }
    }

    /// End of an update burst.
    #[must_use]
    pub fn push(&self) -> Vec<RouteOp<A>> {
        vec![RouteOp::Push]
    }

    /// The peering dropped: bump the generation so stale references are
    /// recognizable and hand everything to a deletion walker.
    pub fn peering_went_down(&mut self) -> DeletionTable<A> {
        let stale = self.trie.drain();
        self.genid = self.genid.next();
        DeletionTable::new(self.peer, stale)
    }
}

impl<A: Address> RouteTable<A> for RibInTable<A> {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, op: RouteOp<A>) -> Vec<RouteOp<A>> {
        match op {
            RouteOp::Add(route) | RouteOp::Replace { new: route, .. } => {
                self.advertise(route.net, (*route.attrs).clone())
            }
            RouteOp::Delete(route) => self.withdraw(&route.net),
            RouteOp::Push => self.push(),
        }
    }
}

/// Drains a dead peering's routes in bounded batches so downstream stages
/// never see a deletion spike.
pub struct DeletionTable<A: Address> {
    peer: PeerId,
    pending: Vec<SubnetRoute<A>>,
    cursor: usize,
}

impl<A: Address> DeletionTable<A> {
    fn new(peer: PeerId, mut routes: Vec<SubnetRoute<A>>) -> Self {
        for route in &mut routes {
            route.flags |= RouteFlags::STALE;
        }
        Self {
            peer,
            pending: routes,
            cursor: 0,
        }
    }

    #[must_use]
    pub fn peer(&self) -> PeerId {
        self.peer
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.pending.len() - self.cursor
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.cursor >= self.pending.len()
    }

    /// Emits up to `batch` deletions, followed by a barrier so downstream
    /// flushes between batches.
    pub fn drain_batch(&mut self, batch: usize) -> Vec<RouteOp<A>> {
        if self.is_done() {
            return Vec::new();
        }
        let end = (self.cursor + batch.max(1)).min(self.pending.len());
        let mut ops: Vec<RouteOp<A>> = self.pending[self.cursor..end]
            .iter()
            .cloned()
            .map(RouteOp::Delete)
            .collect();
        self.cursor = end;
        ops.push(RouteOp::Push);
        ops
    }
}
