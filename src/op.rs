//! The dynamic operator protocol.
//!
//! Every node in the graph carries an [`OpKernel`]: a type-erased operator
//! that knows its output value type, its capability flags, how to create its
//! per-session state, and how to turn one batch of parent blocks into one
//! batch of output knots.
//!
//! The capability flags ([`OpFlags`]) are what the rest of the engine
//! dispatches on, not the concrete kernel type:
//! - `always_ticks` — the operator produces a value every time it is invoked.
//! - `stateless` — the operator function reads no per-node state.
//! - `time_agnostic` — the operator function never looks at the current time.
//!
//! An operator with all three flags set is a pure function of its inputs, so
//! the identity map may fold it over constant parents at construction time.
//!
//! Kernels must also be structurally comparable ([`OpKernel::dyn_eq`] /
//! [`OpKernel::dyn_hash`]) — that is what lets the identity map deduplicate
//! equivalent expressions. Built-in kernels compare their static parameters;
//! kernels wrapping user closures compare closure identity, since closure
//! equivalence is not provable.

use crate::block::ErasedBlock;
use crate::error::Result;
use crate::state::NodeState;
use crate::time::Span;
use std::any::{Any, TypeId, type_name};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// How a multi-input operator chooses its output times.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Alignment {
    /// Tick whenever any input ticks, once every input has ticked at least
    /// once.
    Union,
    /// Tick only at times where every input ticks simultaneously.
    Intersect,
    /// Tick at the first input's times, once every other input has ticked at
    /// least once.
    Left,
}

/// Capability flags describing the operator function inside a kernel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct OpFlags {
    /// The operator emits a value on every invocation.
    pub always_ticks: bool,
    /// The operator function carries no per-node state.
    pub stateless: bool,
    /// The operator function never reads the current time.
    pub time_agnostic: bool,
}

impl OpFlags {
    /// A plain value-to-value function: always ticks, stateless, blind to
    /// time. This is the shape of all arithmetic and comparison operators.
    pub const ELEMENTWISE: OpFlags = OpFlags {
        always_ticks: true,
        stateless: true,
        time_agnostic: true,
    };

    /// A stateless function that may suppress knots (`filter`-shaped).
    pub const SIEVE: OpFlags = OpFlags {
        always_ticks: false,
        stateless: true,
        time_agnostic: true,
    };

    /// A per-node-state machine that ticks on every input knot.
    pub const STATEFUL: OpFlags = OpFlags {
        always_ticks: true,
        stateless: false,
        time_agnostic: true,
    };

    /// A per-node-state machine that may suppress knots.
    pub const STATEFUL_SIEVE: OpFlags = OpFlags {
        always_ticks: false,
        stateless: false,
        time_agnostic: true,
    };

    /// True if the operator is a pure function of its input values, making
    /// it safe to evaluate over constant parents at construction time.
    #[inline]
    pub fn foldable(self) -> bool {
        self.always_ticks && self.stateless && self.time_agnostic
    }
}

/// A lightweight runtime identifier for a value type.
///
/// Attached to every kernel so graph plumbing can assert that edges connect
/// compatible types without carrying generics through the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeTag {
    /// Stable Rust type identifier.
    pub id: TypeId,
    /// Human-readable type name (best-effort).
    pub name: &'static str,
}

impl TypeTag {
    /// Construct a tag for `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }
}

/// Structural identity for kernels wrapping a function value.
///
/// Built-in constructors use [`OpToken::Named`] so that, say, two additions
/// of the same parents produce the same node. User closures get a fresh
/// [`OpToken::Unique`] per wrap — two closures are never provably the same
/// operation, so they never deduplicate against each other.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum OpToken {
    /// A canonical built-in operation, identified by name.
    Named(&'static str),
    /// A one-off user operation.
    Unique(u64),
}

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(0);

impl OpToken {
    /// Mint a token that equals only itself.
    pub fn unique() -> Self {
        OpToken::Unique(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

/// A type-erased graph operator.
///
/// Implementations are the sealed set of built-in kernels plus the
/// closure-wrapping kernels behind `Series::map`/`apply_binary`; all of them
/// live inside this crate. The scheduler only ever talks to this trait.
pub trait OpKernel: Send + Sync + 'static {
    /// Short operator name for logs and debug output.
    fn name(&self) -> &str;

    /// The value type of the blocks this kernel produces.
    fn output_type(&self) -> TypeTag;

    /// Capability flags of the operator function.
    fn flags(&self) -> OpFlags;

    /// Alignment policy, meaningful only for multi-input kernels.
    fn alignment(&self) -> Alignment {
        Alignment::Union
    }

    /// Fresh per-session state for one node running this kernel.
    fn create_state(&self) -> NodeState;

    /// Produce this node's knots for one batch.
    ///
    /// `inputs` holds one block per parent, in parent order, each covering
    /// exactly `span`. The returned block must satisfy the operator
    /// contract: strictly increasing times, all inside `span`, derived only
    /// from state and inputs at or before each output time.
    fn run(&self, state: &mut NodeState, span: Span, inputs: &[ErasedBlock]) -> Result<ErasedBlock>;

    /// Downcasting hook for structural comparison and graph rewrites.
    fn as_any(&self) -> &dyn Any;

    /// Structural equality against another kernel.
    fn dyn_eq(&self, other: &dyn OpKernel) -> bool;

    /// Structural hash, consistent with [`OpKernel::dyn_eq`].
    fn dyn_hash(&self, state: &mut dyn Hasher);

    /// True for the kernel of a constant node (ticks once with a fixed
    /// value).
    fn is_constant(&self) -> bool {
        false
    }

    /// True for kernels that provably never emit a knot.
    fn never_ticks(&self) -> bool {
        false
    }

    /// Fold this operator over constant parents, yielding the kernel of the
    /// resulting constant node.
    ///
    /// Called by the identity map before node construction, only when every
    /// parent is constant and [`OpFlags::foldable`] holds. `None` opts out.
    fn fold_constants(&self, parents: &[&dyn OpKernel]) -> Option<Arc<dyn OpKernel>> {
        let _ = parents;
        None
    }
}

impl std::fmt::Debug for dyn OpKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}<{}>", self.name(), self.output_type().name)
    }
}

/// Hash a kernel's structural identity down to a single `u64`.
pub(crate) fn kernel_hash(op: &dyn OpKernel) -> u64 {
    let mut hasher = std::hash::DefaultHasher::new();
    op.dyn_hash(&mut hasher);
    hasher.finish()
}

/// Hash helper for kernel implementations: mixes in the concrete kernel type
/// so two different kernels never collide structurally.
pub(crate) fn hash_kernel_type<K: 'static>(state: &mut dyn Hasher) {
    let mut state = state;
    TypeId::of::<K>().hash(&mut state);
}
