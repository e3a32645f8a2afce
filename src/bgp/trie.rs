//! Prefix table with attribute-sharing chains.
//!
//! Lookup by network is ordinary; the interesting index is the second one:
//! every stored route is threaded into a circular chain with all other
//! routes sharing its attribute list, so "every route carrying these
//! attributes" enumerates in constant time per step.
//!
//! Routes live in a slot arena owned by the trie and the chains are index
//! links, not pointers, so the cycles carry no ownership. Slots carry a
//! generation that bumps on reuse; a stale index can be detected rather
//! than silently reading a recycled slot.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::bgp::attributes::PathAttributeList;
use crate::bgp::route::SubnetRoute;
use crate::net::{Address, IpNet};

/// Index plus generation; stale handles never alias a reused slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteSlot {
    index: u32,
    generation: u32,
}

struct Slot<A: Address> {
    route: Option<SubnetRoute<A>>,
    generation: u32,
    /// Chain links are valid only while `route` is occupied.
    prev: u32,
    next: u32,
}

/// The augmented prefix table.
pub struct BgpTrie<A: Address> {
    slots: Vec<Slot<A>>,
    free: Vec<u32>,
    by_net: BTreeMap<IpNet<A>, u32>,
    /// Attribute list -> any slot of its chain.
    pathmap: HashMap<Arc<PathAttributeList<A>>, u32>,
}

impl<A: Address> Default for BgpTrie<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Address> BgpTrie<A> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_net: BTreeMap::new(),
            pathmap: HashMap::new(),
        }
    }

    #[must_use]
    pub fn route_count(&self) -> usize {
        self.by_net.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_net.is_empty()
    }

    /// Inserts or replaces the route for `route.net`. Returns the handle of
    /// the stored copy and the previous occupant, if any.
    pub fn insert(&mut self, route: SubnetRoute<A>) -> (RouteSlot, Option<SubnetRoute<A>>) {
        let previous = self.erase(&route.net);

        let attrs = Arc::clone(&route.attrs);
        let index = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.route = Some(route);
                index
            }
            None => {
                let index = u32::try_from(self.slots.len()).expect("trie below u32 slots");
                self.slots.push(Slot {
                    route: Some(route),
                    generation: 0,
                    prev: index,
                    next: index,
                });
                index
            }
        };
        self.chain(index, &attrs);
        let net = self.slots[index as usize]
            .route
            .as_ref()
            .expect("slot just filled")
            .net;
        self.by_net.insert(net, index);

        let handle = RouteSlot {
            index,
            generation: self.slots[index as usize].generation,
        };
        (handle, previous)
    }

    /// Removes the route for `net`, unchaining it.
    pub fn erase(&mut self, net: &IpNet<A>) -> Option<SubnetRoute<A>> {
        let index = self.by_net.remove(net)?;
        self.unchain(index);
        let slot = &mut self.slots[index as usize];
        let route = slot.route.take().expect("indexed slot occupied");
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        Some(route)
    }

    #[must_use]
    pub fn lookup(&self, net: &IpNet<A>) -> Option<&SubnetRoute<A>> {
        let index = *self.by_net.get(net)?;
        self.slots[index as usize].route.as_ref()
    }

    /// Handle-based lookup; `None` once the slot was recycled.
    #[must_use]
    pub fn lookup_slot(&self, handle: RouteSlot) -> Option<&SubnetRoute<A>> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.route.as_ref()
    }

    /// Longest-prefix match for a host address.
    #[must_use]
    pub fn find(&self, addr: A) -> Option<&SubnetRoute<A>> {
        self.by_net
            .iter()
            .filter(|(net, _)| net.contains(addr))
            .max_by_key(|(net, _)| net.prefix_len())
            .and_then(|(_, index)| self.slots[*index as usize].route.as_ref())
    }

    /// All stored routes in prefix order.
    pub fn iter(&self) -> impl Iterator<Item = &SubnetRoute<A>> {
        self.by_net
            .values()
            .filter_map(|index| self.slots[*index as usize].route.as_ref())
    }

    /// Drains every route, in prefix order. Used when a peering bounces and
    /// the table is handed to a deletion walker.
    pub fn drain(&mut self) -> Vec<SubnetRoute<A>> {
        let nets: Vec<IpNet<A>> = self.by_net.keys().copied().collect();
        nets.iter().filter_map(|net| self.erase(net)).collect()
    }

    /// Every route sharing `attrs`, by walking its chain.
    #[must_use]
    pub fn routes_with_attrs(&self, attrs: &Arc<PathAttributeList<A>>) -> Vec<&SubnetRoute<A>> {
        let Some(&head) = self.pathmap.get(attrs) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut cursor = head;
        loop {
            out.push(
                self.slots[cursor as usize]
                    .route
                    .as_ref()
                    .expect("chained slot occupied"),
            );
            cursor = self.slots[cursor as usize].next;
            if cursor == head {
                break;
            }
        }
        out
    }

    /// Walks the chain for `attrs` and checks it is a cycle that returns to
    /// its head in exactly `len` steps. Test support, but cheap enough to
    /// run in debug builds.
    #[must_use]
    pub fn chain_is_cycle(&self, attrs: &Arc<PathAttributeList<A>>) -> bool {
        let Some(&head) = self.pathmap.get(attrs) else {
            return true;
        };
        let len = self.routes_with_attrs(attrs).len();
        let mut cursor = head;
        for _ in 0..len {
            let slot = &self.slots[cursor as usize];
            if slot.route.is_none() {
                return false;
            }
            // Back links must mirror forward links.
            if self.slots[slot.next as usize].prev != cursor {
                return false;
            }
            cursor = slot.next;
        }
        cursor == head
    }

    fn chain(&mut self, index: u32, attrs: &Arc<PathAttributeList<A>>) {
        match self.pathmap.get(attrs) {
            None => {
                let slot = &mut self.slots[index as usize];
                slot.prev = index;
                slot.next = index;
                self.pathmap.insert(Arc::clone(attrs), index);
            }
            Some(&head) => {
                // Insert between head and head.next.
                let after = self.slots[head as usize].next;
                self.slots[index as usize].prev = head;
                self.slots[index as usize].next = after;
                self.slots[head as usize].next = index;
                self.slots[after as usize].prev = index;
            }
        }
    }

    fn unchain(&mut self, index: u32) {
        let attrs = Arc::clone(
            &self.slots[index as usize]
                .route
                .as_ref()
                .expect("unchaining occupied slot")
                .attrs,
        );
        let prev = self.slots[index as usize].prev;
        let next = self.slots[index as usize].next;

        if prev == index {
            // Sole member.
            self.pathmap.remove(&attrs);
            return;
        }
        self.slots[prev as usize].next = next;
        self.slots[next as usize].prev = prev;
        if self.pathmap.get(&attrs) == Some(&index) {
            self.pathmap.insert(attrs, next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgp::attributes::{AsPath, AttributePool, Origin};
    use crate::domain_types::{Genid, PeerId};
    use std::net::Ipv4Addr;

    fn route(
        pool: &AttributePool<Ipv4Addr>,
        net: &str,
        nexthop: &str,
    ) -> SubnetRoute<Ipv4Addr> {
        let attrs = pool.intern(PathAttributeList::new(
            nexthop.parse().unwrap(),
            Origin::Igp,
            AsPath::new(vec![1, 2]),
        ));
        SubnetRoute::new(net.parse().unwrap(), attrs, PeerId::new(1), Genid::new(1))
    }

    #[test]
    fn chains_grow_and_stay_cyclic() {
        let pool = AttributePool::new();
        let mut trie: BgpTrie<Ipv4Addr> = BgpTrie::new();

        let shared_nets = ["1.0.1.0/24", "1.0.2.0/24", "1.0.3.0/24", "1.0.4.0/24"];
        for net in shared_nets {
            trie.insert(route(&pool, net, "2.0.0.1"));
        }
        trie.insert(route(&pool, "9.0.0.0/8", "2.0.0.9"));

        let shared_attrs = Arc::clone(&trie.lookup(&"1.0.1.0/24".parse().unwrap()).unwrap().attrs);
        assert_eq!(trie.routes_with_attrs(&shared_attrs).len(), 4);
        assert!(trie.chain_is_cycle(&shared_attrs));

        let lone_attrs = Arc::clone(&trie.lookup(&"9.0.0.0/8".parse().unwrap()).unwrap().attrs);
        assert_eq!(trie.routes_with_attrs(&lone_attrs).len(), 1);
        assert!(trie.chain_is_cycle(&lone_attrs));
    }

    #[test]
    fn erase_middle_and_head_keep_cycle() {
        let pool = AttributePool::new();
        let mut trie: BgpTrie<Ipv4Addr> = BgpTrie::new();
        for net in ["1.0.1.0/24", "1.0.2.0/24", "1.0.3.0/24"] {
            trie.insert(route(&pool, net, "2.0.0.1"));
        }
        let attrs = Arc::clone(&trie.lookup(&"1.0.1.0/24".parse().unwrap()).unwrap().attrs);

        trie.erase(&"1.0.2.0/24".parse().unwrap());
        assert_eq!(trie.routes_with_attrs(&attrs).len(), 2);
        assert!(trie.chain_is_cycle(&attrs));

        trie.erase(&"1.0.1.0/24".parse().unwrap());
        assert_eq!(trie.routes_with_attrs(&attrs).len(), 1);
        assert!(trie.chain_is_cycle(&attrs));

        trie.erase(&"1.0.3.0/24".parse().unwrap());
        assert!(trie.routes_with_attrs(&attrs).is_empty());
        assert!(trie.is_empty());
    }

    #[test]
    fn replacement_moves_between_chains() {
        let pool = AttributePool::new();
        let mut trie: BgpTrie<Ipv4Addr> = BgpTrie::new();
        trie.insert(route(&pool, "1.0.1.0/24", "2.0.0.1"));
        trie.insert(route(&pool, "1.0.2.0/24", "2.0.0.1"));
        let old_attrs = Arc::clone(&trie.lookup(&"1.0.1.0/24".parse().unwrap()).unwrap().attrs);

        let (_, previous) = trie.insert(route(&pool, "1.0.1.0/24", "3.0.0.1"));
        assert!(previous.is_some());
        assert_eq!(trie.route_count(), 2);
        assert_eq!(trie.routes_with_attrs(&old_attrs).len(), 1);
        let new_attrs = Arc::clone(&trie.lookup(&"1.0.1.0/24".parse().unwrap()).unwrap().attrs);
        assert_eq!(trie.routes_with_attrs(&new_attrs).len(), 1);
        assert!(trie.chain_is_cycle(&old_attrs));
        assert!(trie.chain_is_cycle(&new_attrs));
    }

    #[test]
    fn stale_slot_handles_miss_after_reuse() {
        let pool = AttributePool::new();
        let mut trie: BgpTrie<Ipv4Addr> = BgpTrie::new();
        let (handle, _) = trie.insert(route(&pool, "1.0.1.0/24", "2.0.0.1"));
        assert!(trie.lookup_slot(handle).is_some());

        trie.erase(&"1.0.1.0/24".parse().unwrap());
        assert!(trie.lookup_slot(handle).is_none());

        // Reuse the slot for a different prefix.
        trie.insert(route(&pool, "5.0.0.0/8", "2.0.0.1"));
        assert!(trie.lookup_slot(handle).is_none(), "generation must differ");
    }

    #[test]
    fn longest_prefix_match_wins() {
        let pool = AttributePool::new();
        let mut trie: BgpTrie<Ipv4Addr> = BgpTrie::new();
        trie.insert(route(&pool, "10.0.0.0/8", "2.0.0.1"));
        trie.insert(route(&pool, "10.1.0.0/16", "2.0.0.2"));

        let hit = trie.find("10.1.2.3".parse().unwrap()).unwrap();
        assert_eq!(hit.net, "10.1.0.0/16".parse().unwrap());
        let hit = trie.find("10.2.0.1".parse().unwrap()).unwrap();
        assert_eq!(hit.net, "10.0.0.0/8".parse().unwrap());
        assert!(trie.find("11.0.0.1".parse().unwrap()).is_none());
    }
}
