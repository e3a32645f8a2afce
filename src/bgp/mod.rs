//! The BGP route-table pipeline.
//!
//! Each stage implements the four-operation [`table::RouteTable`] contract;
//! [`plumbing::BgpPlumbing`] composes them per peer and per output. The
//! pipeline is a synchronous data structure driven from the daemon's event
//! loop; nothing here blocks.

pub mod attributes;
pub mod cache;
pub mod decision;
pub mod fanout;
pub mod nexthop;
pub mod policy;
pub mod plumbing;
pub mod ribin;
pub mod ribout;
pub mod route;
pub mod table;
pub mod trie;
pub mod update_queue;

pub use attributes::{AsPath, AttributePool, Origin, PathAttributeList};
pub use decision::{DecisionTable, PeerInfo};
pub use fanout::FanoutTable;
pub use plumbing::BgpPlumbing;
pub use policy::{BgpVarRw, FilterDirection, FilterVerdict, PolicyFilter, PolicyTable};
pub use ribin::{DeletionTable, RibInTable};
pub use ribout::RibOutTable;
pub use route::{RouteFlags, SubnetRoute};
pub use table::{RouteOp, RouteTable};
pub use trie::BgpTrie;
pub use update_queue::{ReaderId, UpdateQueue};
