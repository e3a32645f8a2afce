//! Fanout: one upstream, N subscribers, per-subscriber backpressure.
//!
//! Backed by one [`UpdateQueue`] with a cursor per subscriber. A ready
//! subscriber receives new messages immediately; a busy subscriber
//! accumulates backlog and drains it later through `get_next_message`, one
//! message per call, FIFO. Routes are never handed back to the peer that
//! originated them.

use std::collections::HashMap;

use crate::bgp::table::RouteOp;
use crate::bgp::update_queue::{ReaderId, UpdateQueue};
use crate::domain_types::PeerId;
use crate::net::Address;

#[derive(Debug, Default, Clone, Copy)]
struct SubscriberState {
    busy: bool,
}

pub struct FanoutTable<A: Address> {
    name: String,
    queue: UpdateQueue<RouteOp<A>>,
    subscribers: HashMap<PeerId, SubscriberState>,
}

impl<A: Address> Default for FanoutTable<A> {
    fn default() -> Self {
        Self::new()
    }
}

fn reader(peer: PeerId) -> ReaderId {
    ReaderId(peer.into_inner())
}

impl<A: Address> FanoutTable<A> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "fanout".to_string(),
            queue: UpdateQueue::new(),
            subscribers: HashMap::new(),
        }
    }

    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.name
    }

    /// Adds a downstream subscriber, initially ready, positioned at the
    /// queue tail.
    pub fn add_subscriber(&mut self, peer: PeerId) {
        self.queue.add_reader(reader(peer));
        self.subscribers.insert(peer, SubscriberState::default());
    }

    /// Removes a subscriber; its backlog is skipped (teardown path).
    pub fn remove_subscriber(&mut self, peer: PeerId) {
        self.queue.remove_reader(reader(peer));
        self.subscribers.remove(&peer);
    }

    pub fn set_busy(&mut self, peer: PeerId, busy: bool) {
        if let Some(state) = self.subscribers.get_mut(&peer) {
            state.busy = busy;
        }
    }

    #[must_use]
    pub fn is_busy(&self, peer: PeerId) -> bool {
        self.subscribers.get(&peer).is_some_and(|s| s.busy)
    }

    /// Pending messages for one subscriber.
    #[must_use]
    pub fn queue_len(&self, peer: PeerId) -> usize {
        self.queue.backlog(reader(peer))
    }

    /// Accepts one message from upstream and returns the immediate
    /// deliveries `(subscriber, message)` for every ready subscriber, FIFO
    /// per subscriber. Busy subscribers just grow backlog.
    pub fn process(&mut self, op: RouteOp<A>) -> Vec<(PeerId, RouteOp<A>)> {
        self.queue.push(op);

        let mut ready: Vec<PeerId> = self
            .subscribers
            .iter()
            .filter(|(_, s)| !s.busy)
            .map(|(p, _)| *p)
            .collect();
        ready.sort();

        let mut deliveries = Vec::new();
        for peer in ready {
            while let Some(op) = self.next_for(peer) {
                deliveries.push((peer, op));
            }
        }
        deliveries
    }

    /// One pending message for a subscriber that has turned ready, oldest
    /// first. `None` once its backlog is empty.
    pub fn get_next_message(&mut self, peer: PeerId) -> Option<RouteOp<A>> {
        self.next_for(peer)
    }

    /// Reads past the originator-suppression filter.
    fn next_for(&mut self, peer: PeerId) -> Option<RouteOp<A>> {
        loop {
            let op = self.queue.read(reader(peer))?;
            let originated_here = op.route().is_some_and(|r| r.peer == peer);
            if !originated_here {
                return Some(op);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgp::attributes::{AsPath, AttributePool, Origin, PathAttributeList};
    use crate::bgp::route::SubnetRoute;
    use crate::domain_types::Genid;
    use std::net::Ipv4Addr;

    fn add(pool: &AttributePool<Ipv4Addr>, net: &str, origin_peer: u32) -> RouteOp<Ipv4Addr> {
        let attrs = pool.intern(PathAttributeList::new(
            "2.0.0.1".parse().unwrap(),
            Origin::Igp,
            AsPath::new(vec![1]),
        ));
        RouteOp::Add(SubnetRoute::new(
            net.parse().unwrap(),
            attrs,
            PeerId::new(origin_peer),
            Genid::new(1),
        ))
    }

    #[test]
    fn busy_subscriber_queues_ready_receives_immediately() {
        let pool = AttributePool::new();
        let mut fanout: FanoutTable<Ipv4Addr> = FanoutTable::new();
        let ready_peer = PeerId::new(10);
        let busy_peer = PeerId::new(20);
        fanout.add_subscriber(ready_peer);
        fanout.add_subscriber(busy_peer);
        fanout.set_busy(busy_peer, true);

        let deliveries = fanout.process(add(&pool, "1.0.1.0/24", 99));
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].0, ready_peer);
        assert_eq!(fanout.queue_len(ready_peer), 0);
        assert_eq!(fanout.queue_len(busy_peer), 1);

        // Turn ready and pull: exactly the queued add, then empty.
        fanout.set_busy(busy_peer, false);
        let op = fanout.get_next_message(busy_peer).expect("queued add");
        assert!(matches!(op, RouteOp::Add(_)));
        assert_eq!(fanout.queue_len(busy_peer), 0);
        assert!(fanout.get_next_message(busy_peer).is_none());
    }

    #[test]
    fn fifo_per_subscriber() {
        let pool = AttributePool::new();
        let mut fanout: FanoutTable<Ipv4Addr> = FanoutTable::new();
        let peer = PeerId::new(1);
        fanout.add_subscriber(peer);
        fanout.set_busy(peer, true);

        fanout.process(add(&pool, "1.0.1.0/24", 99));
        fanout.process(add(&pool, "1.0.2.0/24", 99));
        fanout.process(RouteOp::Push);
        assert_eq!(fanout.queue_len(peer), 3);

        let nets: Vec<String> = std::iter::from_fn(|| fanout.get_next_message(peer))
            .map(|op| match op {
                RouteOp::Add(r) => r.net.to_string(),
                RouteOp::Push => "push".to_string(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(nets, vec!["1.0.1.0/24", "1.0.2.0/24", "push"]);
    }

    #[test]
    fn originator_never_hears_its_own_route() {
        let pool = AttributePool::new();
        let mut fanout: FanoutTable<Ipv4Addr> = FanoutTable::new();
        let origin = PeerId::new(7);
        let other = PeerId::new(8);
        fanout.add_subscriber(origin);
        fanout.add_subscriber(other);

        let deliveries = fanout.process(add(&pool, "1.0.1.0/24", 7));
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].0, other);
        assert_eq!(fanout.queue_len(origin), 0);
    }

    #[test]
    fn teardown_skips_backlog() {
        let pool = AttributePool::new();
        let mut fanout: FanoutTable<Ipv4Addr> = FanoutTable::new();
        let gone = PeerId::new(1);
        let live = PeerId::new(2);
        fanout.add_subscriber(gone);
        fanout.add_subscriber(live);
        fanout.set_busy(gone, true);
        fanout.set_busy(live, true);

        fanout.process(add(&pool, "1.0.1.0/24", 99));
        assert_eq!(fanout.queue_len(gone), 1);
        fanout.remove_subscriber(gone);

        // Live subscriber still drains its copy.
        assert!(fanout.get_next_message(live).is_some());
        assert!(fanout.get_next_message(gone).is_none());
    }
}
