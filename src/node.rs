//! Graph nodes and their structural identity.
//!
//! A [`Node`] is nothing more than an operator plus an ordered tuple of
//! parent nodes. Nodes are immutable and heap-allocated behind `Arc` for one
//! reason only: the identity map wants to observe their lifetime. Because
//! every node is interned there, parent equality collapses to pointer
//! equality, and two nodes are the same expression iff they are the same
//! allocation.

use crate::op::{OpKernel, TypeTag, kernel_hash};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Shared handle to an interned graph node.
pub type NodeRef = Arc<Node>;

/// One vertex of the computational graph: `(operator, parents)`.
pub struct Node {
    op: Arc<dyn OpKernel>,
    parents: Box<[NodeRef]>,
}

impl Node {
    pub(crate) fn new(op: Arc<dyn OpKernel>, parents: Vec<NodeRef>) -> Self {
        Self {
            op,
            parents: parents.into_boxed_slice(),
        }
    }

    /// The operator this node applies.
    #[inline]
    pub fn op(&self) -> &Arc<dyn OpKernel> {
        &self.op
    }

    /// The ordered parents this node reads from.
    #[inline]
    pub fn parents(&self) -> &[NodeRef] {
        &self.parents
    }

    /// The value type of the blocks this node produces.
    #[inline]
    pub fn output_type(&self) -> TypeTag {
        self.op.output_type()
    }

    /// True if this node is a constant (ticks once with a fixed value).
    #[inline]
    pub fn is_constant(&self) -> bool {
        self.op.is_constant()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op.name())?;
        if !self.parents.is_empty() {
            write!(f, "/{}", self.parents.len())?;
        }
        Ok(())
    }
}

/// Address of a node allocation, used as its identity everywhere the engine
/// needs a map key.
#[inline]
pub(crate) fn node_addr(node: &NodeRef) -> usize {
    Arc::as_ptr(node) as usize
}

/// The structural key a node is interned under: the operator's structural
/// identity plus the addresses of its (already interned) parents.
///
/// Parent addresses are stable for as long as the entry can match a live
/// node, since a live node holds its parents strongly. A stale key whose
/// weak value has died can never resurrect a node: lookups check liveness
/// before returning.
pub(crate) struct NodeKey {
    op: Arc<dyn OpKernel>,
    hash: u64,
    parents: Vec<usize>,
}

impl NodeKey {
    pub(crate) fn new(op: &Arc<dyn OpKernel>, parents: &[NodeRef]) -> Self {
        let parents: Vec<usize> = parents.iter().map(node_addr).collect();
        let mut hasher = std::hash::DefaultHasher::new();
        kernel_hash(op.as_ref()).hash(&mut hasher);
        parents.hash(&mut hasher);
        Self {
            op: Arc::clone(op),
            hash: hasher.finish(),
            parents,
        }
    }
}

impl PartialEq for NodeKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.parents == other.parents
            && self.op.dyn_eq(other.op.as_ref())
    }
}

impl Eq for NodeKey {}

impl Hash for NodeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}
