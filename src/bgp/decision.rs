//! Decision: standard BGP path selection across peers.
//!
//! The stage keeps its own per-prefix candidate set fed by the upstream
//! branches, so choosing a winner never reaches back up the pipeline. Only
//! routes with a resolved next hop are eligible.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

use tracing::trace;

use crate::bgp::route::{RouteFlags, SubnetRoute};
use crate::bgp::table::{RouteOp, RouteTable};
use crate::domain_types::PeerId;
use crate::net::{Address, IpNet};

/// When no LOCAL_PREF attribute is present.
pub const DEFAULT_LOCAL_PREF: u32 = 100;

/// Facts about a peering that selection needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerInfo {
    pub router_id: Ipv4Addr,
    pub external: bool,
    pub neighbor_as: u32,
}

pub struct DecisionTable<A: Address> {
    name: String,
    peers: HashMap<PeerId, PeerInfo>,
    candidates: BTreeMap<IpNet<A>, Vec<SubnetRoute<A>>>,
}

impl<A: Address> Default for DecisionTable<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Address> DecisionTable<A> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "decision".to_string(),
            peers: HashMap::new(),
            candidates: BTreeMap::new(),
        }
    }

    pub fn register_peer(&mut self, peer: PeerId, info: PeerInfo) {
        self.peers.insert(peer, info);
    }

    /// Current winner for a prefix, if any candidate is usable.
    #[must_use]
    pub fn winner(&self, net: &IpNet<A>) -> Option<&SubnetRoute<A>> {
        let candidates = self.candidates.get(net)?;
        self.best_of(candidates)
    }

    /// Every current winner, in prefix order. This is the pull side used
    /// when a downstream filter change needs existing state re-pushed.
    #[must_use]
    pub fn winners(&self) -> Vec<SubnetRoute<A>> {
        self.candidates
            .keys()
            .filter_map(|net| self.winner(net))
            .cloned()
            .collect()
    }

    fn best_of<'a>(&self, candidates: &'a [SubnetRoute<A>]) -> Option<&'a SubnetRoute<A>> {
        candidates
            .iter()
            .filter(|r| r.nexthop_resolved())
            .reduce(|best, challenger| {
                if self.compare(challenger, best) == Ordering::Greater {
                    challenger
                } else {
                    best
                }
            })
    }

    /// `Greater` means `a` is preferred over `b`.
    fn compare(&self, a: &SubnetRoute<A>, b: &SubnetRoute<A>) -> Ordering {
        let a_pref = a.attrs.local_pref.unwrap_or(DEFAULT_LOCAL_PREF);
        let b_pref = b.attrs.local_pref.unwrap_or(DEFAULT_LOCAL_PREF);
        let by_pref = a_pref.cmp(&b_pref);
        if by_pref != Ordering::Equal {
            return by_pref;
        }

        // Shorter AS path wins.
        let by_path = b.attrs.as_path.len().cmp(&a.attrs.as_path.len());
        if by_path != Ordering::Equal {
            return by_path;
        }

        // IGP < EGP < INCOMPLETE.
        let by_origin = b.attrs.origin.cmp(&a.attrs.origin);
        if by_origin != Ordering::Equal {
            return by_origin;
        }

        // MED compares only between routes from the same neighbor AS;
        // lower is better.
        let a_info = self.peers.get(&a.peer);
        let b_info = self.peers.get(&b.peer);
        if let (Some(ai), Some(bi)) = (a_info, b_info)
            && ai.neighbor_as == bi.neighbor_as
        {
            let a_med = a.attrs.med.unwrap_or(0);
            let b_med = b.attrs.med.unwrap_or(0);
            let by_med = b_med.cmp(&a_med);
            if by_med != Ordering::Equal {
                return by_med;
            }
        }

        // External over internal.
        let a_ext = a_info.is_some_and(|i| i.external);
        let b_ext = b_info.is_some_and(|i| i.external);
        let by_ebgp = a_ext.cmp(&b_ext);
        if by_ebgp != Ordering::Equal {
            return by_ebgp;
        }

        // Lower IGP distance to the next hop.
        let a_cost = a.igp_cost.unwrap_or(u32::MAX);
        let b_cost = b.igp_cost.unwrap_or(u32::MAX);
        let by_cost = b_cost.cmp(&a_cost);
        if by_cost != Ordering::Equal {
            return by_cost;
        }

        // Final tie break: lower router id.
        let a_id = a_info.map_or(Ipv4Addr::BROADCAST, |i| i.router_id);
        let b_id = b_info.map_or(Ipv4Addr::BROADCAST, |i| i.router_id);
        b_id.cmp(&a_id)
    }

    fn upsert_candidate(&mut self, route: SubnetRoute<A>) {
        let list = self.candidates.entry(route.net).or_default();
        match list.iter_mut().find(|c| c.peer == route.peer) {
            Some(slot) => *slot = route,
            None => list.push(route),
        }
    }

    /// A deletion only lands if it matches the stored candidate's
    /// generation; a stale post-bounce deletion must not take out a route
    /// the peer has already re-advertised.
    fn remove_candidate(&mut self, net: &IpNet<A>, peer: PeerId, genid: crate::domain_types::Genid) {
        if let Some(list) = self.candidates.get_mut(net) {
            list.retain(|c| c.peer != peer || c.genid != genid);
            if list.is_empty() {
                self.candidates.remove(net);
            }
        }
    }

    /// Applies one upstream change and emits the downstream delta between
    /// the winner before and after.
    fn apply(&mut self, net: IpNet<A>, change: impl FnOnce(&mut Self)) -> Vec<RouteOp<A>> {
        let before = self.winner(&net).cloned();
        change(self);
        let after = self.winner(&net).cloned();

        match (before, after) {
            (None, None) => Vec::new(),
            (None, Some(new)) => vec![RouteOp::Add(mark_in_use(new))],
            (Some(old), None) => vec![RouteOp::Delete(old)],
            (Some(old), Some(new)) => {
                let unchanged = old.peer == new.peer
                    && old.genid == new.genid
                    && std::sync::Arc::ptr_eq(&old.attrs, &new.attrs);
                if unchanged {
                    Vec::new()
                } else {
                    trace!(%net, "winner changed");
                    vec![RouteOp::Replace {
                        old,
                        new: mark_in_use(new),
                    }]
                }
            }
        }
    }
}

fn mark_in_use<A: Address>(mut route: SubnetRoute<A>) -> SubnetRoute<A> {
    route.flags |= RouteFlags::IN_USE;
    route
}

impl<A: Address> RouteTable<A> for DecisionTable<A> {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, op: RouteOp<A>) -> Vec<RouteOp<A>> {
        match op {
            RouteOp::Add(route) => {
                self.apply(route.net, |this| this.upsert_candidate(route))
            }
            RouteOp::Replace { new, .. } => {
                self.apply(new.net, |this| this.upsert_candidate(new))
            }
            RouteOp::Delete(route) => self.apply(route.net, |this| {
                this.remove_candidate(&route.net, route.peer, route.genid)
            }),
            RouteOp::Push => vec![RouteOp::Push],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgp::attributes::{AsPath, AttributePool, Origin, PathAttributeList};
    use crate::domain_types::Genid;

    fn peer(n: u32, external: bool, neighbor_as: u32, router_id: &str) -> (PeerId, PeerInfo) {
        (
            PeerId::new(n),
            PeerInfo {
                router_id: router_id.parse().unwrap(),
                external,
                neighbor_as,
            },
        )
    }

    fn candidate(
        pool: &AttributePool<Ipv4Addr>,
        peer: PeerId,
        attrs: PathAttributeList<Ipv4Addr>,
        igp_cost: u32,
    ) -> SubnetRoute<Ipv4Addr> {
        let mut route = SubnetRoute::new(
            "1.0.1.0/24".parse().unwrap(),
            pool.intern(attrs),
            peer,
            Genid::new(1),
        );
        route.flags |= RouteFlags::NEXTHOP_RESOLVED;
        route.igp_cost = Some(igp_cost);
        route
    }

    fn base(nh: &str, path: Vec<u32>) -> PathAttributeList<Ipv4Addr> {
        PathAttributeList::new(nh.parse().unwrap(), Origin::Igp, AsPath::new(path))
    }

    #[test]
    fn local_pref_dominates_path_length() {
        let pool = AttributePool::new();
        let mut decision = DecisionTable::new();
        let (p1, i1) = peer(1, true, 100, "10.0.0.1");
        let (p2, i2) = peer(2, true, 200, "10.0.0.2");
        decision.register_peer(p1, i1);
        decision.register_peer(p2, i2);

        let long_but_preferred =
            candidate(&pool, p1, base("2.0.0.1", vec![1, 2, 3]).with_local_pref(200), 10);
        let short = candidate(&pool, p2, base("2.0.0.2", vec![1]), 10);

        let ops = decision.process(RouteOp::Add(short));
        assert!(matches!(&ops[..], [RouteOp::Add(_)]));

        let ops = decision.process(RouteOp::Add(long_but_preferred));
        let [RouteOp::Replace { new, .. }] = &ops[..] else {
            panic!("expected winner change");
        };
        assert_eq!(new.peer, p1);
        assert!(new.flags.contains(RouteFlags::IN_USE));
    }

    #[test]
    fn med_only_compares_within_one_neighbor_as() {
        let pool = AttributePool::new();
        let mut decision = DecisionTable::new();
        let (p1, i1) = peer(1, true, 100, "10.0.0.9");
        let (p2, i2) = peer(2, true, 100, "10.0.0.1");
        decision.register_peer(p1, i1);
        decision.register_peer(p2, i2);

        // Same neighbor AS: lower MED wins despite higher router id order.
        decision.process(RouteOp::Add(candidate(
            &pool,
            p1,
            base("2.0.0.1", vec![5]).with_med(10),
            10,
        )));
        let ops = decision.process(RouteOp::Add(candidate(
            &pool,
            p2,
            base("2.0.0.2", vec![5]).with_med(50),
            10,
        )));
        assert!(ops.is_empty(), "higher MED must not displace the winner");
        assert_eq!(
            decision.winner(&"1.0.1.0/24".parse().unwrap()).unwrap().peer,
            p1
        );
    }

    #[test]
    fn ebgp_beats_ibgp_then_igp_cost_then_router_id() {
        let pool = AttributePool::new();
        let mut decision = DecisionTable::new();
        let (internal, i1) = peer(1, false, 65_000, "10.0.0.1");
        let (external, i2) = peer(2, true, 200, "10.0.0.9");
        decision.register_peer(internal, i1);
        decision.register_peer(external, i2);

        decision.process(RouteOp::Add(candidate(&pool, internal, base("2.0.0.1", vec![5]), 1)));
        let ops =
            decision.process(RouteOp::Add(candidate(&pool, external, base("2.0.0.2", vec![5]), 99)));
        let [RouteOp::Replace { new, .. }] = &ops[..] else {
            panic!("external route should win");
        };
        assert_eq!(new.peer, external);

        // Two internals tie down to router id.
        let mut decision: DecisionTable<Ipv4Addr> = DecisionTable::new();
        let (pa, ia) = peer(1, false, 65_000, "10.0.0.5");
        let (pb, ib) = peer(2, false, 65_000, "10.0.0.4");
        decision.register_peer(pa, ia);
        decision.register_peer(pb, ib);
        decision.process(RouteOp::Add(candidate(&pool, pa, base("2.0.0.1", vec![5]), 10)));
        let ops = decision.process(RouteOp::Add(candidate(&pool, pb, base("2.0.0.2", vec![5]), 10)));
        let [RouteOp::Replace { new, .. }] = &ops[..] else {
            panic!("lower router id should win");
        };
        assert_eq!(new.peer, pb);
    }

    #[test]
    fn unresolved_nexthop_is_ineligible() {
        let pool = AttributePool::new();
        let mut decision = DecisionTable::new();
        let (p1, i1) = peer(1, true, 100, "10.0.0.1");
        decision.register_peer(p1, i1);

        let mut route = candidate(&pool, p1, base("2.0.0.1", vec![5]), 10);
        route.flags &= !RouteFlags::NEXTHOP_RESOLVED;
        let ops = decision.process(RouteOp::Add(route));
        assert!(ops.is_empty());
        assert!(decision.winner(&"1.0.1.0/24".parse().unwrap()).is_none());
    }

    #[test]
    fn stale_generation_delete_is_ignored() {
        let pool = AttributePool::new();
        let mut decision = DecisionTable::new();
        let (p1, i1) = peer(1, true, 100, "10.0.0.1");
        decision.register_peer(p1, i1);

        let stale = candidate(&pool, p1, base("2.0.0.1", vec![1]), 10);
        let mut fresh = candidate(&pool, p1, base("2.0.0.2", vec![1]), 10);
        fresh.genid = stale.genid.next();

        decision.process(RouteOp::Add(fresh.clone()));
        // A leftover deletion from the previous generation arrives late.
        let ops = decision.process(RouteOp::Delete(stale));
        assert!(ops.is_empty());
        assert_eq!(
            decision
                .winner(&"1.0.1.0/24".parse().unwrap())
                .unwrap()
                .genid,
            fresh.genid
        );
    }

    #[test]
    fn losing_the_winner_emits_replace_to_runner_up() {
        let pool = AttributePool::new();
        let mut decision = DecisionTable::new();
        let (p1, i1) = peer(1, true, 100, "10.0.0.1");
        let (p2, i2) = peer(2, true, 200, "10.0.0.2");
        decision.register_peer(p1, i1);
        decision.register_peer(p2, i2);

        let winner = candidate(&pool, p1, base("2.0.0.1", vec![1]), 10);
        let runner_up = candidate(&pool, p2, base("2.0.0.2", vec![1, 2]), 10);
        decision.process(RouteOp::Add(winner.clone()));
        decision.process(RouteOp::Add(runner_up));

        let ops = decision.process(RouteOp::Delete(winner));
        let [RouteOp::Replace { old, new }] = &ops[..] else {
            panic!("expected fallback to runner-up");
        };
        assert_eq!(old.peer, p1);
        assert_eq!(new.peer, p2);

        // Deleting the last candidate deletes downstream.
        let survivor = new.clone();
        let ops = decision.process(RouteOp::Delete(survivor));
        assert!(matches!(&ops[..], [RouteOp::Delete(_)]));
    }
}
