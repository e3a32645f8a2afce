//! RibOut: terminal stage holding what has actually been advertised to one
//! output peer.

use std::collections::BTreeMap;

use crate::bgp::route::SubnetRoute;
use crate::bgp::table::{RouteOp, RouteTable};
use crate::net::{Address, IpNet};

pub struct RibOutTable<A: Address> {
    name: String,
    routes: BTreeMap<IpNet<A>, SubnetRoute<A>>,
    /// Everything delivered, in order. The peer-facing encoder consumes
    /// this; tests inspect it.
    history: Vec<RouteOp<A>>,
}

impl<A: Address> RibOutTable<A> {
    #[must_use]
    pub fn new(label: &str) -> Self {
        Self {
            name: format!("ribout-{label}"),
            routes: BTreeMap::new(),
            history: Vec::new(),
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

    #[must_use]
    pub fn history(&self) -> &[RouteOp<A>] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

impl<A: Address> RouteTable<A> for RibOutTable<A> {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, op: RouteOp<A>) -> Vec<RouteOp<A>> {
        match &op {
            RouteOp::Add(route) => {
                self.routes.insert(route.net, route.clone());
            }
            RouteOp::Replace { new, .. } => {
                self.routes.insert(new.net, new.clone());
            }
            RouteOp::Delete(route) => {
                self.routes.remove(&route.net);
            }
            RouteOp::Push => {}
        }
        self.history.push(op);
        Vec::new()
    }
}
