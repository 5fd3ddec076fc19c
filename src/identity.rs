//! The deduplicating node factory.
//!
//! Two expressions that are provably the same — equal operator, identical
//! parents — must evaluate once, not twice. The [`IdentityMap`] enforces
//! this by interning every node under its structural key: asking for a node
//! that already exists returns the existing allocation.
//!
//! The map holds its entries weakly, so it knows about every live node
//! without keeping any of them alive. Dead entries are swept lazily, a
//! cheap retain pass triggered every few dozen inserts. Builds that prefer
//! a simpler lifetime story can enable the `strong-identity` feature, which
//! pins every interned node for the life of the map.
//!
//! Constant folding happens here, *before* lookup: when every parent of a
//! prospective node is a constant and the operator is a pure function of its
//! inputs, the map hands back the folded constant node instead of building a
//! graph vertex. Folding before interning means `constant(1) + constant(2)`
//! is not merely equal to `constant(3)` — it is the same object.
//!
//! A process-wide map behind a mutex is the default ([`obtain`]); embedders
//! that want isolated graphs can instantiate their own [`IdentityMap`].

use crate::node::{Node, NodeKey, NodeRef};
use crate::op::OpKernel;
use log::trace;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

#[cfg(not(feature = "strong-identity"))]
type Entry = std::sync::Weak<Node>;
#[cfg(feature = "strong-identity")]
type Entry = NodeRef;

/// How many inserts may pass between dead-entry sweeps.
const SWEEP_INTERVAL: usize = 64;

struct MapInner {
    entries: HashMap<NodeKey, Entry>,
    inserts: usize,
}

/// A deduplicating cache from structural node keys to live nodes.
pub struct IdentityMap {
    inner: Mutex<MapInner>,
}

impl Default for IdentityMap {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityMap {
    /// An empty map, independent of the process-wide one.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MapInner {
                entries: HashMap::new(),
                inserts: 0,
            }),
        }
    }

    /// Return the unique node for `(op, parents)`, creating it if absent.
    ///
    /// Infallible by design: interning has no observable failure mode.
    pub fn obtain(&self, parents: &[NodeRef], op: Arc<dyn OpKernel>) -> NodeRef {
        if let Some(folded) = try_fold(parents, op.as_ref()) {
            return self.obtain(&[], folded);
        }

        let key = NodeKey::new(&op, parents);
        let mut inner = self.inner.lock().unwrap();

        if let Some(existing) = lookup(&inner.entries, &key) {
            return existing;
        }

        inner.inserts += 1;
        if inner.inserts % SWEEP_INTERVAL == 0 {
            sweep(&mut inner.entries);
        }

        let node = Arc::new(Node::new(op, parents.to_vec()));
        inner.entries.insert(key, make_entry(&node));
        node
    }

    /// Number of entries whose node is still alive.
    pub fn live_len(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.entries.values().filter(|e| entry_alive(e)).count()
    }

    /// Total number of entries, dead ones included.
    pub fn raw_len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// Drop every entry whose node has died.
    pub fn compact(&self) {
        sweep(&mut self.inner.lock().unwrap().entries);
    }
}

#[cfg(not(feature = "strong-identity"))]
fn lookup(entries: &HashMap<NodeKey, Entry>, key: &NodeKey) -> Option<NodeRef> {
    entries.get(key).and_then(std::sync::Weak::upgrade)
}

#[cfg(feature = "strong-identity")]
fn lookup(entries: &HashMap<NodeKey, Entry>, key: &NodeKey) -> Option<NodeRef> {
    entries.get(key).cloned()
}

#[cfg(not(feature = "strong-identity"))]
fn make_entry(node: &NodeRef) -> Entry {
    Arc::downgrade(node)
}

#[cfg(feature = "strong-identity")]
fn make_entry(node: &NodeRef) -> Entry {
    Arc::clone(node)
}

#[cfg(not(feature = "strong-identity"))]
fn entry_alive(entry: &Entry) -> bool {
    entry.strong_count() > 0
}

#[cfg(feature = "strong-identity")]
fn entry_alive(_entry: &Entry) -> bool {
    true
}

fn sweep(entries: &mut HashMap<NodeKey, Entry>) {
    let before = entries.len();
    entries.retain(|_, e| entry_alive(e));
    let dead = before - entries.len();
    if dead > 0 {
        trace!("identity map swept {dead} dead entries ({} remain)", entries.len());
    }
}

/// Constant propagation: evaluate a pure operator over constant parents at
/// construction time.
fn try_fold(parents: &[NodeRef], op: &dyn OpKernel) -> Option<Arc<dyn OpKernel>> {
    if parents.is_empty() || !op.flags().foldable() {
        return None;
    }
    if !parents.iter().all(|p| p.is_constant()) {
        return None;
    }
    let parent_ops: Vec<&dyn OpKernel> = parents.iter().map(|p| p.op().as_ref()).collect();
    op.fold_constants(&parent_ops)
}

/// The process-wide identity map.
pub fn global() -> &'static IdentityMap {
    static GLOBAL: OnceLock<IdentityMap> = OnceLock::new();
    GLOBAL.get_or_init(IdentityMap::new)
}

/// Intern `(op, parents)` in the process-wide map.
pub fn obtain(parents: &[NodeRef], op: Arc<dyn OpKernel>) -> NodeRef {
    global().obtain(parents, op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::ConstantOp;

    #[test]
    fn interning_returns_the_same_allocation() {
        let map = IdentityMap::new();
        let a = map.obtain(&[], Arc::new(ConstantOp::new(7i64)));
        let b = map.obtain(&[], Arc::new(ConstantOp::new(7i64)));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(map.live_len(), 1);
    }

    #[cfg(not(feature = "strong-identity"))]
    #[test]
    fn dead_entries_are_swept() {
        let map = IdentityMap::new();
        let kept = map.obtain(&[], Arc::new(ConstantOp::new(1i64)));
        {
            let _dropped = map.obtain(&[], Arc::new(ConstantOp::new(2i64)));
            assert_eq!(map.live_len(), 2);
        }
        assert_eq!(map.live_len(), 1);
        map.compact();
        assert_eq!(map.raw_len(), 1);

        let again = map.obtain(&[], Arc::new(ConstantOp::new(1i64)));
        assert!(Arc::ptr_eq(&kept, &again));
    }
}
