//! The four-operation contract every pipeline stage implements.

use crate::bgp::route::SubnetRoute;
use crate::net::Address;

/// One unit of work flowing down the pipeline. `Push` is a barrier marking
/// the end of a logical update burst so downstream stages may flush.
#[derive(Debug, Clone)]
pub enum RouteOp<A: Address> {
    Add(SubnetRoute<A>),
    Replace {
        old: SubnetRoute<A>,
        new: SubnetRoute<A>,
    },
    Delete(SubnetRoute<A>),
    Push,
}

impl<A: Address> RouteOp<A> {
    /// The route the operation is about, if any.
    #[must_use]
    pub fn route(&self) -> Option<&SubnetRoute<A>> {
        match self {
            Self::Add(r) | Self::Delete(r) => Some(r),
            Self::Replace { new, .. } => Some(new),
            Self::Push => None,
        }
    }

    #[must_use]
    pub fn is_push(&self) -> bool {
        matches!(self, Self::Push)
    }
}

/// A pipeline stage. Each call consumes one operation from upstream and
/// yields the operations to hand downstream, in order. Within one stage,
/// operations for one prefix are applied in arrival order; `Push` is never
/// reordered past data.
pub trait RouteTable<A: Address> {
    /// Stage name for diagnostics.
    fn name(&self) -> &str;

    fn process(&mut self, op: RouteOp<A>) -> Vec<RouteOp<A>>;
}
