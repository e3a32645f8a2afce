//! Cache stage: decouples downstream references from upstream storage.
//!
//! The cache keeps the post-filter copy of every route that passed it, so a
//! later delete or replace can be forwarded with exactly the attributes the
//! downstream stages saw on the way in, even if upstream state has since
//! been rewritten or the filter configuration changed.

use std::collections::BTreeMap;

use crate::bgp::route::SubnetRoute;
use crate::bgp::table::{RouteOp, RouteTable};
use crate::net::{Address, IpNet};

pub struct CacheTable<A: Address> {
    name: String,
    routes: BTreeMap<IpNet<A>, SubnetRoute<A>>,
}

impl<A: Address> CacheTable<A> {
    #[must_use]
    pub fn new(label: &str) -> Self {
        Self {
            name: format!("cache-{label}"),
            routes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn lookup(&self, net: &IpNet<A>) -> Option<&SubnetRoute<A>> {
        self.routes.get(net)
    }
}

impl<A: Address> RouteTable<A> for CacheTable<A> {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, op: RouteOp<A>) -> Vec<RouteOp<A>> {
        match op {
            RouteOp::Add(route) => {
                self.routes.insert(route.net, route.clone());
                vec![RouteOp::Add(route)]
            }
            RouteOp::Replace { old, new } => {
                // Prefer our cached copy of the old route: that is what
                // downstream actually holds.
                let cached_old = self.routes.insert(new.net, new.clone()).unwrap_or(old);
                vec![RouteOp::Replace {
                    old: cached_old,
                    new,
                }]
            }
            RouteOp::Delete(route) => {
                let cached = self.routes.remove(&route.net).unwrap_or(route);
                vec![RouteOp::Delete(cached)]
            }
            RouteOp::Push => vec![RouteOp::Push],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgp::attributes::{AsPath, AttributePool, Origin, PathAttributeList};
    use crate::domain_types::{Genid, PeerId};
    use std::net::Ipv4Addr;

    fn route(pool: &AttributePool<Ipv4Addr>, net: &str, med: u32) -> SubnetRoute<Ipv4Addr> {
        let attrs = pool.intern(
            PathAttributeList::new("2.0.0.1".parse().unwrap(), Origin::Igp, AsPath::empty())
                .with_med(med),
        );
        SubnetRoute::new(net.parse().unwrap(), attrs, PeerId::new(1), Genid::new(1))
    }

    #[test]
    fn delete_forwards_the_cached_copy() {
        let pool = AttributePool::new();
        let mut cache: CacheTable<Ipv4Addr> = CacheTable::new("in");

        let seen = route(&pool, "1.0.1.0/24", 10);
        cache.process(RouteOp::Add(seen.clone()));

        // Upstream forgets and deletes with different attributes; downstream
        // still gets the version it was given originally.
        let divergent = route(&pool, "1.0.1.0/24", 99);
        let ops = cache.process(RouteOp::Delete(divergent));
        let [RouteOp::Delete(forwarded)] = &ops[..] else {
            panic!("expected delete");
        };
        assert_eq!(forwarded.attrs.med, Some(10));
        assert_eq!(cache.route_count(), 0);
    }

    #[test]
    fn replace_swaps_cached_old() {
        let pool = AttributePool::new();
        let mut cache: CacheTable<Ipv4Addr> = CacheTable::new("in");
        cache.process(RouteOp::Add(route(&pool, "1.0.1.0/24", 10)));

        let ops = cache.process(RouteOp::Replace {
            old: route(&pool, "1.0.1.0/24", 55),
            new: route(&pool, "1.0.1.0/24", 20),
        });
        let [RouteOp::Replace { old, new }] = &ops[..] else {
            panic!("expected replace");
        };
        assert_eq!(old.attrs.med, Some(10), "cached old wins");
        assert_eq!(new.attrs.med, Some(20));
        assert_eq!(cache.lookup(&"1.0.1.0/24".parse().unwrap()).unwrap().attrs.med, Some(20));
    }
}
