//! Path attributes and the attribute-sharing pool.
//!
//! A [`PathAttributeList`] is immutable, canonically ordered and
//! content-addressed: two logically equal attribute sets compare equal and,
//! once interned through an [`AttributePool`], share one allocation. Most of
//! a BGP table's routes reference a few hundred distinct attribute sets, so
//! the sharing is what keeps the pipeline's memory flat.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::net::Address;

/// Route origin, ordered by preference: IGP < EGP < INCOMPLETE.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum Origin {
    #[default]
    Igp = 0,
    Egp = 1,
    Incomplete = 2,
}

/// AS path as a flat sequence, most recent AS first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct AsPath(Vec<u32>);

impl AsPath {
    #[must_use]
    pub fn new(path: Vec<u32>) -> Self {
        Self(path)
    }

    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The neighbor AS is the first hop, if any.
    #[must_use]
    pub fn first_as(&self) -> Option<u32> {
        self.0.first().copied()
    }

    #[must_use]
    pub fn prepend(&self, asn: u32) -> Self {
        let mut path = Vec::with_capacity(self.0.len() + 1);
        path.push(asn);
        path.extend_from_slice(&self.0);
        Self(path)
    }

    #[must_use]
    pub fn contains(&self, asn: u32) -> bool {
        self.0.contains(&asn)
    }
}

impl fmt::Display for AsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", rendered.join(" "))
    }
}

/// The full, canonical attribute set of a route.
///
/// Optional attributes use `Option`; unknown transitive attributes keep
/// their type code ordering in a `BTreeMap` so equal sets hash equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathAttributeList<A: Address> {
    pub next_hop: A,
    pub origin: Origin,
    pub as_path: AsPath,
    pub med: Option<u32>,
    pub local_pref: Option<u32>,
    pub communities: BTreeSet<u32>,
    pub unknowns: BTreeMap<u8, Vec<u8>>,
}

impl<A: Address> PathAttributeList<A> {
    #[must_use]
    pub fn new(next_hop: A, origin: Origin, as_path: AsPath) -> Self {
        Self {
            next_hop,
            origin,
            as_path,
            med: None,
            local_pref: None,
            communities: BTreeSet::new(),
            unknowns: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_med(mut self, med: u32) -> Self {
        self.med = Some(med);
        self
    }

    #[must_use]
    pub fn with_local_pref(mut self, local_pref: u32) -> Self {
        self.local_pref = Some(local_pref);
        self
    }

    #[must_use]
    pub fn with_community(mut self, community: u32) -> Self {
        self.communities.insert(community);
        self
    }
}

/// Content-addressing pool: logically equal attribute lists share storage.
///
/// Cloning the pool clones the handle, not the contents; every stage of one
/// pipeline holds the same pool.
#[derive(Clone, Default)]
pub struct AttributePool<A: Address> {
    interned: Arc<Mutex<HashMap<PathAttributeList<A>, Arc<PathAttributeList<A>>>>>,
}

impl<A: Address> AttributePool<A> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            interned: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the shared copy of `attrs`, interning on first sight.
    pub fn intern(&self, attrs: PathAttributeList<A>) -> Arc<PathAttributeList<A>> {
        let mut interned = self.interned.lock().expect("attribute pool lock");
        if let Some(existing) = interned.get(&attrs) {
            return Arc::clone(existing);
        }
        let shared = Arc::new(attrs.clone());
        interned.insert(attrs, Arc::clone(&shared));
        shared
    }

    /// Number of distinct attribute sets seen.
    #[must_use]
    pub fn distinct(&self) -> usize {
        self.interned.lock().expect("attribute pool lock").len()
    }

    /// Drops interned entries no longer referenced outside the pool.
    pub fn sweep(&self) {
        self.interned
            .lock()
            .expect("attribute pool lock")
            .retain(|_, v| Arc::strong_count(v) > 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn nh(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn equal_lists_share_storage() {
        let pool: AttributePool<Ipv4Addr> = AttributePool::new();
        let a = pool.intern(
            PathAttributeList::new(nh("2.0.0.1"), Origin::Igp, AsPath::new(vec![1, 2, 3]))
                .with_med(100),
        );
        let b = pool.intern(
            PathAttributeList::new(nh("2.0.0.1"), Origin::Igp, AsPath::new(vec![1, 2, 3]))
                .with_med(100),
        );
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.distinct(), 1);

        let c = pool.intern(
            PathAttributeList::new(nh("2.0.0.1"), Origin::Igp, AsPath::new(vec![1, 2, 3]))
                .with_med(200),
        );
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(pool.distinct(), 2);
    }

    #[test]
    fn sweep_drops_unreferenced() {
        let pool: AttributePool<Ipv4Addr> = AttributePool::new();
        let keep = pool.intern(PathAttributeList::new(
            nh("2.0.0.1"),
            Origin::Igp,
            AsPath::empty(),
        ));
        {
            let _drop_me = pool.intern(PathAttributeList::new(
                nh("2.0.0.2"),
                Origin::Egp,
                AsPath::empty(),
            ));
        }
        pool.sweep();
        assert_eq!(pool.distinct(), 1);
        drop(keep);
    }

    #[test]
    fn as_path_prepend_is_persistent() {
        let base = AsPath::new(vec![65_001]);
        let longer = base.prepend(65_000);
        assert_eq!(base.len(), 1);
        assert_eq!(longer.len(), 2);
        assert_eq!(longer.first_as(), Some(65_000));
        assert!(longer.contains(65_001));
    }

    #[test]
    fn origin_preference_order() {
        assert!(Origin::Igp < Origin::Egp);
        assert!(Origin::Egp < Origin::Incomplete);
    }
}
