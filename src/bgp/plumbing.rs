//! Wires the stages into the full pipeline:
//!
//! ```text
//! RibIn -> Import -> Cache -> NextHopLookup ->
//!                        Decision -> SourceMatch -> Fanout ->
//!                 { per output: Export -> Cache -> RibOut }
//! ```
//!
//! One plumbing instance serves one address family. Stages are plain
//! composition: the plumbing drives every inter-stage call explicitly, so
//! ordering within a prefix and the `Push` barrier fall out of the call
//! order.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::bgp::attributes::{AttributePool, PathAttributeList};
use crate::bgp::cache::CacheTable;
use crate::bgp::decision::{DecisionTable, PeerInfo};
use crate::bgp::fanout::FanoutTable;
use crate::bgp::nexthop::NextHopLookupTable;
use crate::bgp::policy::{FilterDirection, PolicyFilter, PolicyTable};
use crate::bgp::ribin::{DeletionTable, RibInTable};
use crate::bgp::ribout::RibOutTable;
use crate::bgp::route::SubnetRoute;
use crate::bgp::table::{RouteOp, RouteTable};
use crate::domain_types::PeerId;
use crate::net::{Address, IpNet};

/// The inbound half of one peering.
struct PeerBranch<A: Address> {
    ribin: RibInTable<A>,
    import: PolicyTable<A>,
    cache: CacheTable<A>,
    nexthop: NextHopLookupTable<A>,
}

/// The outbound half of one peering.
struct OutputBranch<A: Address> {
    export: PolicyTable<A>,
    cache: CacheTable<A>,
    ribout: RibOutTable<A>,
}

/// Full pipeline for one address family.
pub struct BgpPlumbing<A: Address> {
    pool: AttributePool<A>,
    peers: HashMap<PeerId, PeerBranch<A>>,
    deletions: Vec<DeletionTable<A>>,
    decision: DecisionTable<A>,
    source_match: PolicyTable<A>,
    fanout: FanoutTable<A>,
    outputs: HashMap<PeerId, OutputBranch<A>>,
}

impl<A: Address> Default for BgpPlumbing<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Address> BgpPlumbing<A> {
    #[must_use]
    pub fn new() -> Self {
        let pool = AttributePool::new();
        Self {
            decision: DecisionTable::new(),
            source_match: PolicyTable::new(FilterDirection::SourceMatch, pool.clone()),
            fanout: FanoutTable::new(),
            peers: HashMap::new(),
            deletions: Vec::new(),
            outputs: HashMap::new(),
            pool,
        }
    }

    #[must_use]
    pub fn pool(&self) -> &AttributePool<A> {
        &self.pool
    }

    /// Plumbs the inbound branch for a new peering.
    pub fn add_peer(&mut self, peer: PeerId, info: PeerInfo) {
        debug!(%peer, "plumbing peer branch");
        self.decision.register_peer(peer, info);
        self.peers.insert(
            peer,
            PeerBranch {
                ribin: RibInTable::new(peer, self.pool.clone()),
                import: PolicyTable::new(FilterDirection::Import, self.pool.clone()),
                cache: CacheTable::new(&format!("in-{peer}")),
                nexthop: NextHopLookupTable::new(),
            },
        );
    }

    /// Plumbs the outbound branch toward one peer.
    pub fn add_output(&mut self, peer: PeerId) {
        debug!(%peer, "plumbing output branch");
        self.fanout.add_subscriber(peer);
        self.outputs.insert(
            peer,
            OutputBranch {
                export: PolicyTable::new(FilterDirection::Export, self.pool.clone()),
                cache: CacheTable::new(&format!("out-{peer}")),
                ribout: RibOutTable::new(&format!("{peer}")),
            },
        );
    }

    /// Tears down an output; queued fanout messages for it are skipped.
    pub fn remove_output(&mut self, peer: PeerId) {
        self.fanout.remove_subscriber(peer);
        self.outputs.remove(&peer);
    }

    pub fn set_import_filter(&mut self, peer: PeerId, filter: Option<Arc<dyn PolicyFilter<A>>>) {
        if let Some(branch) = self.peers.get_mut(&peer) {
            branch.import.set_filter(filter);
        }
    }

    /// Swaps the source-match filter and re-filters existing state with a
    /// pull over the current Decision winners, so the configuration change
    /// takes effect without bouncing any peering.
    pub fn set_source_match_filter(&mut self, filter: Option<Arc<dyn PolicyFilter<A>>>) {
        let winners = self.decision.winners();
        let before: Vec<Option<SubnetRoute<A>>> = winners
            .iter()
            .map(|w| self.source_match.filter_route(w))
            .collect();
        self.source_match.set_filter(filter);

        let mut deliveries = Vec::new();
        for (winner, old) in winners.into_iter().zip(before) {
            let new = self.source_match.filter_route(&winner);
            let op = match (old, new) {
                (Some(old), Some(new)) => {
                    if Arc::ptr_eq(&old.attrs, &new.attrs) {
                        continue;
                    }
                    RouteOp::Replace { old, new }
                }
                (Some(old), None) => RouteOp::Delete(old),
                (None, Some(new)) => RouteOp::Add(new),
                (None, None) => continue,
            };
            deliveries.extend(self.fanout.process(op));
        }
        for (peer, op) in deliveries {
            self.run_output(peer, op);
        }
    }

    pub fn set_export_filter(&mut self, peer: PeerId, filter: Option<Arc<dyn PolicyFilter<A>>>) {
        if let Some(branch) = self.outputs.get_mut(&peer) {
            branch.export.set_filter(filter);
        }
    }

    /// Installs the IGP metric for a next hop on every peer branch.
    pub fn set_nexthop_metric(&mut self, next_hop: A, metric: u32) {
        for branch in self.peers.values_mut() {
            branch.nexthop.set_metric(next_hop, metric);
        }
    }

    /// A peer advertised a prefix.
    pub fn advertise(&mut self, peer: PeerId, net: IpNet<A>, attrs: PathAttributeList<A>) {
        let Some(branch) = self.peers.get_mut(&peer) else {
            return;
        };
        let ops = branch.ribin.advertise(net, attrs);
        let ops = Self::run_branch(branch, ops);
        self.run_from_decision(ops);
    }

    /// A peer withdrew a prefix.
    pub fn withdraw(&mut self, peer: PeerId, net: &IpNet<A>) {
        let Some(branch) = self.peers.get_mut(&peer) else {
            return;
        };
        let ops = branch.ribin.withdraw(net);
        let ops = Self::run_branch(branch, ops);
        self.run_from_decision(ops);
    }

    /// End of a peer's update burst; the barrier flushes downstream.
    pub fn push(&mut self, peer: PeerId) {
        let Some(branch) = self.peers.get_mut(&peer) else {
            return;
        };
        let ops = branch.ribin.push();
        let ops = Self::run_branch(branch, ops);
        self.run_from_decision(ops);
    }

    /// The peering dropped: its routes move to a deletion table drained in
    /// background batches via [`BgpPlumbing::drain_deletions`].
    pub fn peer_down(&mut self, peer: PeerId) {
        let Some(branch) = self.peers.get_mut(&peer) else {
            return;
        };
        let deletion = branch.ribin.peering_went_down();
        debug!(%peer, remaining = deletion.remaining(), "peer down, draining gradually");
        self.deletions.push(deletion);
    }

    /// Drains one bounded batch from each pending deletion table. Returns
    /// true while more remain. Deletions pass through the peer's filters
    /// like any other withdraw.
    pub fn drain_deletions(&mut self, batch: usize) -> bool {
        let mut tables = std::mem::take(&mut self.deletions);
        for deletion in &mut tables {
            let peer = deletion.peer();
            let ops = deletion.drain_batch(batch);
            if let Some(branch) = self.peers.get_mut(&peer) {
                let ops = Self::run_branch(branch, ops);
                self.run_from_decision(ops);
            }
        }
        tables.retain(|d| !d.is_done());
        let more = !tables.is_empty();
        self.deletions = tables;
        more
    }

    /// Marks an output busy (its fanout messages queue) or ready.
    pub fn set_output_busy(&mut self, peer: PeerId, busy: bool) {
        self.fanout.set_busy(peer, busy);
    }

    /// Pending fanout messages for an output.
    #[must_use]
    pub fn output_queue_len(&self, peer: PeerId) -> usize {
        self.fanout.queue_len(peer)
    }

    /// A ready output pulls its next pending message through its branch.
    /// Returns false when the backlog is empty.
    pub fn get_next_message(&mut self, peer: PeerId) -> bool {
        let Some(op) = self.fanout.get_next_message(peer) else {
            return false;
        };
        self.run_output(peer, op);
        true
    }

    /// The advertised state toward one output, for inspection.
    #[must_use]
    pub fn ribout(&self, peer: PeerId) -> Option<&RibOutTable<A>> {
        self.outputs.get(&peer).map(|b| &b.ribout)
    }

    pub fn ribout_mut(&mut self, peer: PeerId) -> Option<&mut RibOutTable<A>> {
        self.outputs.get_mut(&peer).map(|b| &mut b.ribout)
    }

    /// Routes a peer branch's output through import filter, cache and
    /// next-hop lookup.
    fn run_branch(branch: &mut PeerBranch<A>, ops: Vec<RouteOp<A>>) -> Vec<RouteOp<A>> {
        let mut staged = Vec::new();
        for op in ops {
            for op in branch.import.process(op) {
                for op in branch.cache.process(op) {
                    staged.extend(branch.nexthop.process(op));
                }
            }
        }
        staged
    }

    /// Decision, source-match and fanout, then any immediate deliveries.
    fn run_from_decision(&mut self, ops: Vec<RouteOp<A>>) {
        let mut deliveries = Vec::new();
        for op in ops {
            for op in self.decision.process(op) {
                for op in self.source_match.process(op) {
                    deliveries.extend(self.fanout.process(op));
                }
            }
        }
        for (peer, op) in deliveries {
            self.run_output(peer, op);
        }
    }

    fn run_output(&mut self, peer: PeerId, op: RouteOp<A>) {
        let Some(branch) = self.outputs.get_mut(&peer) else {
            return;
        };
        for op in branch.export.process(op) {
            for op in branch.cache.process(op) {
                let _ = branch.ribout.process(op);
            }
        }
    }
}
