//! Source kernels: where knots enter the graph.
//!
//! Sources are nodes with no parents. The engine ships three built-in
//! shapes — a constant that ticks once, a node that never ticks, and a node
//! wrapping an in-memory block — plus the [`SourceAdapter`] seam through
//! which external collaborators (file readers, generators, live feeds) push
//! data in. Adapters are outside the trust boundary, so their output is
//! re-validated against the operator contract on every batch.

use crate::block::{Block, ErasedBlock, KnotValue};
use crate::error::{Error, Result};
use crate::op::{OpFlags, OpKernel, TypeTag, hash_kernel_type};
use crate::state::{NodeState, empty_state, state_mut};
use crate::time::Span;
use std::hash::Hasher;
use std::sync::Arc;

/* ===================== ConstantOp ===================== */

/// A value that holds over all time.
///
/// The node ticks exactly once, at the start of evaluation, and stays valid
/// forever after through the alignment kernel's latest-value state.
pub(crate) struct ConstantOp<T> {
    value: T,
}

impl<T> ConstantOp<T> {
    pub(crate) fn new(value: T) -> Self {
        Self { value }
    }

    pub(crate) fn value(&self) -> &T {
        &self.value
    }
}

#[derive(Clone, Copy, Default)]
struct ConstState {
    emitted: bool,
}

impl<T: KnotValue + PartialEq> OpKernel for ConstantOp<T> {
    fn name(&self) -> &str {
        "constant"
    }

    fn output_type(&self) -> TypeTag {
        TypeTag::of::<T>()
    }

    fn flags(&self) -> OpFlags {
        OpFlags {
            always_ticks: false,
            stateless: false,
            time_agnostic: true,
        }
    }

    fn create_state(&self) -> NodeState {
        Box::new(ConstState::default())
    }

    fn run(&self, state: &mut NodeState, span: Span, _inputs: &[ErasedBlock]) -> Result<ErasedBlock> {
        let st = state_mut::<ConstState>(state)?;
        let block = if st.emitted || span.is_empty() {
            Block::empty()
        } else {
            st.emitted = true;
            Block::from_parts_unchecked(vec![span.start], vec![self.value.clone()])
        };
        Ok(ErasedBlock::new(block))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn dyn_eq(&self, other: &dyn OpKernel) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|o| self.value == o.value)
    }

    fn dyn_hash(&self, state: &mut dyn Hasher) {
        // Values are compared, not hashed; constants of one type share a
        // bucket and the key equality disambiguates.
        hash_kernel_type::<Self>(state);
    }

    fn is_constant(&self) -> bool {
        true
    }
}

/* ===================== EmptyOp ===================== */

/// A source with no knots, ever.
pub(crate) struct EmptyOp<T> {
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> EmptyOp<T> {
    pub(crate) fn new() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: KnotValue> OpKernel for EmptyOp<T> {
    fn name(&self) -> &str {
        "empty"
    }

    fn output_type(&self) -> TypeTag {
        TypeTag::of::<T>()
    }

    fn flags(&self) -> OpFlags {
        OpFlags::SIEVE
    }

    fn create_state(&self) -> NodeState {
        empty_state()
    }

    fn run(&self, _state: &mut NodeState, _span: Span, _inputs: &[ErasedBlock]) -> Result<ErasedBlock> {
        Ok(ErasedBlock::new(Block::<T>::empty()))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn dyn_eq(&self, other: &dyn OpKernel) -> bool {
        other.as_any().downcast_ref::<Self>().is_some()
    }

    fn dyn_hash(&self, state: &mut dyn Hasher) {
        hash_kernel_type::<Self>(state);
    }

    fn never_ticks(&self) -> bool {
        true
    }
}

/* ===================== BlockOp ===================== */

/// A source wrapping an in-memory block; each batch is a slice of it.
///
/// Identity is the backing storage, so wrapping the same block twice yields
/// the same node without ever comparing knots.
pub(crate) struct BlockOp<T> {
    block: Block<T>,
}

impl<T: KnotValue> BlockOp<T> {
    pub(crate) fn new(block: Block<T>) -> Self {
        Self { block }
    }
}

impl<T: KnotValue> OpKernel for BlockOp<T> {
    fn name(&self) -> &str {
        "block"
    }

    fn output_type(&self) -> TypeTag {
        TypeTag::of::<T>()
    }

    fn flags(&self) -> OpFlags {
        OpFlags::SIEVE
    }

    fn create_state(&self) -> NodeState {
        empty_state()
    }

    fn run(&self, _state: &mut NodeState, span: Span, _inputs: &[ErasedBlock]) -> Result<ErasedBlock> {
        Ok(ErasedBlock::new(self.block.slice(span.start, span.end)))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn dyn_eq(&self, other: &dyn OpKernel) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|o| self.block.same_backing(&o.block))
    }

    fn dyn_hash(&self, state: &mut dyn Hasher) {
        hash_kernel_type::<Self>(state);
        let mut state = state;
        std::hash::Hash::hash(&self.block.backing_key(), &mut state);
    }
}

/* ===================== SourceAdapter ===================== */

/// The seam for external data producers.
///
/// An adapter is called once per batch and must return exactly the knots in
/// `[span.start, span.end)`, in strictly increasing time order, derived
/// deterministically from its state. The engine re-checks the first two
/// obligations on every call; determinism is the adapter's burden.
pub trait SourceAdapter<T: KnotValue>: Send + Sync + 'static {
    /// Produce all knots of this source inside `span`.
    fn fetch(&self, span: Span, state: &mut NodeState) -> anyhow::Result<Block<T>>;

    /// Fresh per-session adapter state.
    fn create_state(&self) -> NodeState {
        empty_state()
    }
}

/// Adapter wrapper for a plain closure, for sources without state.
struct FnAdapter<T, F> {
    f: F,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T, F> SourceAdapter<T> for FnAdapter<T, F>
where
    T: KnotValue,
    F: Fn(Span) -> anyhow::Result<Block<T>> + Send + Sync + 'static,
{
    fn fetch(&self, span: Span, _state: &mut NodeState) -> anyhow::Result<Block<T>> {
        (self.f)(span)
    }
}

/// Wrap a closure as a [`SourceAdapter`].
pub fn adapter_fn<T, F>(f: F) -> Arc<dyn SourceAdapter<T>>
where
    T: KnotValue,
    F: Fn(Span) -> anyhow::Result<Block<T>> + Send + Sync + 'static,
{
    Arc::new(FnAdapter {
        f,
        _marker: std::marker::PhantomData,
    })
}

/// The kernel hosting a [`SourceAdapter`]. Identity is adapter identity.
pub(crate) struct AdapterOp<T: KnotValue> {
    adapter: Arc<dyn SourceAdapter<T>>,
}

impl<T: KnotValue> AdapterOp<T> {
    pub(crate) fn new(adapter: Arc<dyn SourceAdapter<T>>) -> Self {
        Self { adapter }
    }

    fn adapter_addr(&self) -> usize {
        Arc::as_ptr(&self.adapter) as *const () as usize
    }
}

impl<T: KnotValue> OpKernel for AdapterOp<T> {
    fn name(&self) -> &str {
        "source"
    }

    fn output_type(&self) -> TypeTag {
        TypeTag::of::<T>()
    }

    fn flags(&self) -> OpFlags {
        OpFlags::STATEFUL_SIEVE
    }

    fn create_state(&self) -> NodeState {
        self.adapter.create_state()
    }

    fn run(&self, state: &mut NodeState, span: Span, _inputs: &[ErasedBlock]) -> Result<ErasedBlock> {
        let block = self.adapter.fetch(span, state)?;
        if let (Some(first), Some(last)) = (block.first_time(), block.last_time()) {
            if first < span.start || last >= span.end {
                return Err(Error::invalid(format!(
                    "source adapter returned knots outside {span:?} (first {first:?}, last {last:?})"
                )));
            }
        }
        Ok(ErasedBlock::new(block))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn dyn_eq(&self, other: &dyn OpKernel) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|o| Arc::ptr_eq(&self.adapter, &o.adapter))
    }

    fn dyn_hash(&self, state: &mut dyn Hasher) {
        hash_kernel_type::<Self>(state);
        let mut state = state;
        std::hash::Hash::hash(&self.adapter_addr(), &mut state);
    }
}
