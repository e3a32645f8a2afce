//! Route database the output walkers read.
//!
//! Deleted routes linger at infinity cost until their deletion timer
//! retires them, so walkers can advertise the withdrawal. A paused walker
//! extends the timer of the route it points at; resume never dereferences
//! a retired entry.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::net::{Address, IpNet};

/// Metric ceiling: unreachable.
pub const RIP_INFINITY: u32 = 16;

/// One RIP route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RipRoute<A: Address> {
    pub net: IpNet<A>,
    pub next_hop: A,
    pub cost: u32,
    pub tag: u16,
    /// Interface the route was learned on; horizon policies key off it.
    pub vif: String,
}

#[derive(Debug, Clone)]
struct Entry<A: Address> {
    route: RipRoute<A>,
    /// Set once the route is withdrawn; retired when it passes.
    deletion_deadline: Option<Instant>,
}

/// Prefix-ordered table of current and recently-deleted routes.
pub struct RouteDb<A: Address> {
    entries: BTreeMap<IpNet<A>, Entry<A>>,
    retention: Duration,
}

impl<A: Address> RouteDb<A> {
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: BTreeMap::new(),
            retention,
        }
    }

    pub fn insert(&mut self, route: RipRoute<A>) {
        self.entries.insert(
            route.net,
            Entry {
                route,
                deletion_deadline: None,
            },
        );
    }

    /// Marks a route withdrawn: cost goes to infinity and a deletion timer
    /// starts. The entry keeps being advertised until the timer retires it.
    pub fn expire(&mut self, net: &IpNet<A>, now: Instant) {
        if let Some(entry) = self.entries.get_mut(net) {
            entry.route.cost = RIP_INFINITY;
            entry.deletion_deadline = Some(now + self.retention);
        }
    }

    /// Pushes a route's deletion timer out by `extension`. No-op for live
    /// routes.
    pub fn extend_deletion(&mut self, net: &IpNet<A>, extension: Duration) {
        if let Some(entry) = self.entries.get_mut(net)
            && let Some(deadline) = entry.deletion_deadline
        {
            entry.deletion_deadline = Some(deadline + extension);
        }
    }

    /// Drops entries whose deletion timer has passed.
    pub fn retire_expired(&mut self, now: Instant) {
        self.entries
            .retain(|_, e| e.deletion_deadline.is_none_or(|d| d > now));
    }

    #[must_use]
    pub fn get(&self, net: &IpNet<A>) -> Option<&RipRoute<A>> {
        self.entries.get(net).map(|e| &e.route)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First route at or after `from`, in prefix order.
    #[must_use]
    pub fn next_from(&self, from: Option<IpNet<A>>) -> Option<&RipRoute<A>> {
        match from {
            None => self.entries.values().next().map(|e| &e.route),
            Some(net) => self
                .entries
                .range(net..)
                .map(|(_, e)| &e.route)
                .next(),
        }
    }

    /// First route strictly after `net`.
    #[must_use]
    pub fn next_after(&self, net: IpNet<A>) -> Option<&RipRoute<A>> {
        use std::ops::Bound;
        self.entries
            .range((Bound::Excluded(net), Bound::Unbounded))
            .map(|(_, e)| &e.route)
            .next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn route(net: &str, cost: u32) -> RipRoute<Ipv4Addr> {
        RipRoute {
            net: net.parse().unwrap(),
            next_hop: "10.0.0.1".parse().unwrap(),
            cost,
            tag: 0,
            vif: "eth0".to_string(),
        }
    }

    #[test]
    fn expire_holds_at_infinity_then_retires() {
        let mut db = RouteDb::new(Duration::from_millis(100));
        db.insert(route("10.1.0.0/16", 2));
        let now = Instant::now();

        db.expire(&"10.1.0.0/16".parse().unwrap(), now);
        assert_eq!(db.get(&"10.1.0.0/16".parse().unwrap()).unwrap().cost, RIP_INFINITY);

        db.retire_expired(now + Duration::from_millis(50));
        assert_eq!(db.len(), 1, "still within retention");
        db.retire_expired(now + Duration::from_millis(150));
        assert!(db.is_empty());
    }

    #[test]
    fn extend_deletion_defers_retirement() {
        let mut db = RouteDb::new(Duration::from_millis(100));
        db.insert(route("10.1.0.0/16", 2));
        let now = Instant::now();
        db.expire(&"10.1.0.0/16".parse().unwrap(), now);
        db.extend_deletion(&"10.1.0.0/16".parse().unwrap(), Duration::from_millis(200));

        db.retire_expired(now + Duration::from_millis(150));
        assert_eq!(db.len(), 1, "extension kept it alive");
        db.retire_expired(now + Duration::from_millis(350));
        assert!(db.is_empty());
    }

    #[test]
    fn walk_order_is_prefix_order() {
        let mut db = RouteDb::new(Duration::from_secs(1));
        for net in ["10.2.0.0/16", "10.1.0.0/16", "10.3.0.0/16"] {
            db.insert(route(net, 1));
        }
        let first = db.next_from(None).unwrap().net;
        assert_eq!(first.to_string(), "10.1.0.0/16");
        let second = db.next_after(first).unwrap().net;
        assert_eq!(second.to_string(), "10.2.0.0/16");
        assert!(db.next_after("10.3.0.0/16".parse().unwrap()).is_none());
    }
}
