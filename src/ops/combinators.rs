//! Small combination state machines and thin compositions.
//!
//! The kernels here are deliberately explicit: each is a handful of lines of
//! merge-walk with a clearly named piece of cross-batch state. Everything
//! that can be said as a composition of existing operators is (see
//! [`coalign_many`], [`filter_by`], `Series::diff`), and the constructors
//! fold the algebraic identities — `merge(x, x) = x`,
//! `first_knot(first_knot(x)) = first_knot(x)`, `prepend(∅, y) = y` — into
//! node identity before anything is interned.

use crate::align::BinaryOp;
use crate::block::{Block, ErasedBlock, KnotValue};
use crate::error::{Error, Result};
use crate::identity::obtain;
use crate::node::{NodeRef, node_addr};
use crate::op::{Alignment, OpFlags, OpKernel, OpToken, TypeTag, hash_kernel_type};
use crate::series::{AnySeries, Series};
use crate::state::{NodeState, empty_state, state_mut};
use crate::time::{Span, Timestamp};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

/* ===================== MergeOp ===================== */

/// N-ary union of same-typed series; on simultaneous ticks the leftmost
/// input wins.
pub(crate) struct MergeOp<T> {
    _marker: PhantomData<fn(T)>,
}

impl<T: KnotValue> OpKernel for MergeOp<T> {
    fn name(&self) -> &str {
        "merge"
    }

    fn output_type(&self) -> TypeTag {
        TypeTag::of::<T>()
    }

    fn flags(&self) -> OpFlags {
        OpFlags::ELEMENTWISE
    }

    fn create_state(&self) -> NodeState {
        empty_state()
    }

    fn run(&self, _state: &mut NodeState, _span: Span, inputs: &[ErasedBlock]) -> Result<ErasedBlock> {
        let blocks: Vec<&Block<T>> = inputs
            .iter()
            .map(|b| b.downcast::<T>())
            .collect::<Result<_>>()?;
        let cap: usize = blocks.iter().map(|b| b.len()).sum();
        let mut idx = vec![0usize; blocks.len()];
        let mut times = Vec::with_capacity(cap);
        let mut values = Vec::with_capacity(cap);
        loop {
            let t = blocks
                .iter()
                .zip(&idx)
                .filter_map(|(b, &i)| (i < b.len()).then(|| b.time(i)))
                .min();
            let Some(t) = t else { break };
            let mut winner: Option<&T> = None;
            for (b, i) in blocks.iter().zip(idx.iter_mut()) {
                if *i < b.len() && b.time(*i) == t {
                    if winner.is_none() {
                        winner = Some(b.value(*i));
                    }
                    *i += 1;
                }
            }
            if let Some(v) = winner {
                times.push(t);
                values.push(v.clone());
            }
        }
        Ok(ErasedBlock::new(Block::from_parts_unchecked(times, values)))
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
}

/// Union of any number of same-typed series; at simultaneous ticks the
/// leftmost input wins.
///
/// Duplicate inputs are dropped (a duplicate can never out-tick its first
/// occurrence), so `merge(x, x, …, x)` *is* `x`.
pub fn merge<T: KnotValue>(inputs: &[Series<T>]) -> Result<Series<T>> {
    if inputs.is_empty() {
        return Err(Error::invalid("merge requires at least one input"));
    }
    let mut nodes: Vec<NodeRef> = Vec::with_capacity(inputs.len());
    for s in inputs {
        if !nodes.iter().any(|n| node_addr(n) == node_addr(s.node())) {
            nodes.push(Arc::clone(s.node()));
        }
    }
    if nodes.len() == 1 {
        return Ok(Series::from_node(nodes.remove(0)));
    }
    let op: Arc<dyn OpKernel> = Arc::new(MergeOp::<T> {
        _marker: PhantomData,
    });
    Ok(Series::from_node(obtain(&nodes, op)))
}

/* ===================== PrependOp ===================== */

/// Emit the first input until the second one starts ticking, then hand over
/// for good.
pub(crate) struct PrependOp<T> {
    _marker: PhantomData<fn(T)>,
}

#[derive(Clone, Copy, Default)]
struct HandoffState {
    taken_over: bool,
}

impl<T: KnotValue> OpKernel for PrependOp<T> {
    fn name(&self) -> &str {
        "prepend"
    }

    fn output_type(&self) -> TypeTag {
        TypeTag::of::<T>()
    }

    fn flags(&self) -> OpFlags {
        OpFlags::STATEFUL_SIEVE
    }

    fn create_state(&self) -> NodeState {
        Box::new(HandoffState::default())
    }

    fn run(&self, state: &mut NodeState, _span: Span, inputs: &[ErasedBlock]) -> Result<ErasedBlock> {
        let x = inputs[0].downcast::<T>()?;
        let y = inputs[1].downcast::<T>()?;
        let st = state_mut::<HandoffState>(state)?;
        let mut times = Vec::with_capacity(x.len() + y.len());
        let mut values = Vec::with_capacity(x.len() + y.len());
        let (mut i, mut j) = (0, 0);
        while i < x.len() || j < y.len() {
            let tx = (i < x.len()).then(|| x.time(i));
            let ty = (j < y.len()).then(|| y.time(j));
            // On a tie the taking-over side wins.
            if ty.is_some() && (tx.is_none() || ty <= tx) {
                st.taken_over = true;
                times.push(y.time(j));
                values.push(y.value(j).clone());
                if tx == ty {
                    i += 1;
                }
                j += 1;
            } else {
                if !st.taken_over {
                    times.push(x.time(i));
                    values.push(x.value(i).clone());
                }
                i += 1;
            }
        }
        Ok(ErasedBlock::new(Block::from_parts_unchecked(times, values)))
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
}

/// Tick with `x` until `y` first ticks, then with `y` forever after.
pub fn prepend<T: KnotValue>(x: &Series<T>, y: &Series<T>) -> Series<T> {
    if node_addr(x.node()) == node_addr(y.node()) || x.node().op().never_ticks() {
        return y.clone();
    }
    let op: Arc<dyn OpKernel> = Arc::new(PrependOp::<T> {
        _marker: PhantomData,
    });
    let parents = [Arc::clone(x.node()), Arc::clone(y.node())];
    Series::from_node(obtain(&parents, op))
}

/* ===================== AlignOp / AlignOnceOp ===================== */

/// Emit `x`'s latest value at every tick of a clock series.
///
/// Only the clock's timestamps matter, so the clock's value type never
/// appears here.
pub(crate) struct AlignOp<T> {
    repeat: bool,
    _marker: PhantomData<fn(T)>,
}

#[derive(Clone)]
struct AlignState<T> {
    latest: Option<T>,
    /// Set when `latest` advanced since it was last emitted; only consulted
    /// by the non-repeating variant.
    fresh: bool,
}

impl<T: KnotValue> OpKernel for AlignOp<T> {
    fn name(&self) -> &str {
        if self.repeat { "align" } else { "align_once" }
    }

    fn output_type(&self) -> TypeTag {
        TypeTag::of::<T>()
    }

    fn flags(&self) -> OpFlags {
        OpFlags::STATEFUL_SIEVE
    }

    fn create_state(&self) -> NodeState {
        Box::new(AlignState::<T> {
            latest: None,
            fresh: false,
        })
    }

    fn run(&self, state: &mut NodeState, _span: Span, inputs: &[ErasedBlock]) -> Result<ErasedBlock> {
        let x = inputs[0].downcast::<T>()?;
        let clock = inputs[1].times();
        let st = state_mut::<AlignState<T>>(state)?;
        let mut times = Vec::with_capacity(clock.len());
        let mut values = Vec::with_capacity(clock.len());
        let mut i = 0;
        for &t in clock {
            while i < x.len() && x.time(i) <= t {
                st.latest = Some(x.value(i).clone());
                st.fresh = true;
                i += 1;
            }
            if let Some(v) = &st.latest {
                if self.repeat || st.fresh {
                    times.push(t);
                    values.push(v.clone());
                    st.fresh = false;
                }
            }
        }
        while i < x.len() {
            st.latest = Some(x.value(i).clone());
            st.fresh = true;
            i += 1;
        }
        Ok(ErasedBlock::new(Block::from_parts_unchecked(times, values)))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn dyn_eq(&self, other: &dyn OpKernel) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|o| self.repeat == o.repeat)
    }

    fn dyn_hash(&self, state: &mut dyn Hasher) {
        hash_kernel_type::<Self>(state);
        let mut state = state;
        self.repeat.hash(&mut state);
    }
}

/// Tick with `x`'s latest value whenever `clock` ticks.
pub fn align<T: KnotValue, C: KnotValue>(x: &Series<T>, clock: &Series<C>) -> Series<T> {
    if node_addr(x.node()) == node_addr(clock.node()) {
        return x.clone();
    }
    align_node(x, clock.node(), true)
}

/// Like [`align`], but each `x` knot is emitted at most once; clock ticks
/// that would repeat a value are suppressed.
pub fn align_once<T: KnotValue, C: KnotValue>(x: &Series<T>, clock: &Series<C>) -> Series<T> {
    if node_addr(x.node()) == node_addr(clock.node()) {
        return x.clone();
    }
    align_node(x, clock.node(), false)
}

fn align_node<T: KnotValue>(x: &Series<T>, clock: &NodeRef, repeat: bool) -> Series<T> {
    let op: Arc<dyn OpKernel> = Arc::new(AlignOp::<T> {
        repeat,
        _marker: PhantomData,
    });
    let parents = [Arc::clone(x.node()), Arc::clone(clock)];
    Series::from_node(obtain(&parents, op))
}

/// Re-align both series onto one set of output times.
///
/// The pair ticks together: at the chosen times each output carries its own
/// input's latest value. `alignment` picks the times exactly as it does for
/// a binary operator over `(x, y)`.
pub fn coalign<A: KnotValue, B: KnotValue>(
    x: &Series<A>,
    y: &Series<B>,
    alignment: Alignment,
) -> (Series<A>, Series<B>) {
    let left = BinaryOp::<A, B, A>::new(
        OpToken::Named("coalign_left"),
        OpFlags::ELEMENTWISE,
        alignment,
        |_, a, _| Some(a.clone()),
    );
    let right = BinaryOp::<A, B, B>::new(
        OpToken::Named("coalign_right"),
        OpFlags::ELEMENTWISE,
        alignment,
        |_, _, b| Some(b.clone()),
    );
    let parents = [Arc::clone(x.node()), Arc::clone(y.node())];
    (
        Series::from_node(obtain(&parents, Arc::new(left))),
        Series::from_node(obtain(&parents, Arc::new(right))),
    )
}

/// Re-align any number of same-typed series onto their merged union times.
///
/// A thin composition: the union-of-ticks skeleton is a [`merge`], and each
/// output is its input [`align`]ed to that skeleton.
pub fn coalign_many<T: KnotValue>(inputs: &[Series<T>]) -> Result<Vec<Series<T>>> {
    let base = merge(inputs)?;
    Ok(inputs.iter().map(|s| align(s, &base)).collect())
}

/* ===================== FirstKnotOp ===================== */

/// Pass through the first knot ever, then fall silent.
pub(crate) struct FirstKnotOp<T> {
    _marker: PhantomData<fn(T)>,
}

impl<T> FirstKnotOp<T> {
    pub(crate) fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T: KnotValue> OpKernel for FirstKnotOp<T> {
    fn name(&self) -> &str {
        "first_knot"
    }

    fn output_type(&self) -> TypeTag {
        TypeTag::of::<T>()
    }

    fn flags(&self) -> OpFlags {
        OpFlags::STATEFUL_SIEVE
    }

    fn create_state(&self) -> NodeState {
        Box::new(HandoffState::default())
    }

    fn run(&self, state: &mut NodeState, _span: Span, inputs: &[ErasedBlock]) -> Result<ErasedBlock> {
        let input = inputs[0].downcast::<T>()?;
        let st = state_mut::<HandoffState>(state)?;
        let block = if st.taken_over || input.is_empty() {
            Block::empty()
        } else {
            st.taken_over = true;
            Block::from_parts_unchecked(vec![input.time(0)], vec![input.value(0).clone()])
        };
        Ok(ErasedBlock::new(block))
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
}

/* ===================== ThrottleOp ===================== */

/// Emit the first of every run of `n` consecutive input knots.
pub(crate) struct ThrottleOp<T> {
    n: u64,
    _marker: PhantomData<fn(T)>,
}

impl<T> ThrottleOp<T> {
    pub(crate) fn new(n: u64) -> Self {
        debug_assert!(n > 1);
        Self {
            n,
            _marker: PhantomData,
        }
    }
}

impl<T: KnotValue> OpKernel for ThrottleOp<T> {
    fn name(&self) -> &str {
        "throttle"
    }

    fn output_type(&self) -> TypeTag {
        TypeTag::of::<T>()
    }

    fn flags(&self) -> OpFlags {
        OpFlags::STATEFUL_SIEVE
    }

    fn create_state(&self) -> NodeState {
        Box::new(0u64)
    }

    fn run(&self, state: &mut NodeState, _span: Span, inputs: &[ErasedBlock]) -> Result<ErasedBlock> {
        let input = inputs[0].downcast::<T>()?;
        let seen = state_mut::<u64>(state)?;
        let mut times = Vec::with_capacity(input.len());
        let mut values = Vec::with_capacity(input.len());
        for (t, v) in input.iter() {
            if *seen % self.n == 0 {
                times.push(t);
                values.push(v.clone());
            }
            *seen += 1;
        }
        Ok(ErasedBlock::new(Block::from_parts_unchecked(times, values)))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn dyn_eq(&self, other: &dyn OpKernel) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|o| self.n == o.n)
    }

    fn dyn_hash(&self, state: &mut dyn Hasher) {
        hash_kernel_type::<Self>(state);
        let mut state = state;
        self.n.hash(&mut state);
    }
}

/* ===================== CountKnotsOp ===================== */

/// Running count of knots seen so far, emitted at every input tick.
pub(crate) struct CountKnotsOp<T> {
    _marker: PhantomData<fn(T)>,
}

impl<T> CountKnotsOp<T> {
    pub(crate) fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T: KnotValue> OpKernel for CountKnotsOp<T> {
    fn name(&self) -> &str {
        "count_knots"
    }

    fn output_type(&self) -> TypeTag {
        TypeTag::of::<i64>()
    }

    fn flags(&self) -> OpFlags {
        OpFlags::STATEFUL
    }

    fn create_state(&self) -> NodeState {
        Box::new(0i64)
    }

    fn run(&self, state: &mut NodeState, _span: Span, inputs: &[ErasedBlock]) -> Result<ErasedBlock> {
        let input = inputs[0].times();
        let count = state_mut::<i64>(state)?;
        let mut values = Vec::with_capacity(input.len());
        for _ in input {
            *count += 1;
            values.push(*count);
        }
        Ok(ErasedBlock::new(Block::from_parts_unchecked(
            input.to_vec(),
            values,
        )))
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
}

/* ===================== HistoryOp ===================== */

/// Emit the vector of the last ≤ `n` values at every input tick.
pub(crate) struct HistoryOp<T> {
    n: usize,
    _marker: PhantomData<fn(T)>,
}

impl<T> HistoryOp<T> {
    pub(crate) fn new(n: usize) -> Self {
        debug_assert!(n > 0);
        Self {
            n,
            _marker: PhantomData,
        }
    }
}

impl<T: KnotValue> OpKernel for HistoryOp<T> {
    fn name(&self) -> &str {
        "history"
    }

    fn output_type(&self) -> TypeTag {
        TypeTag::of::<Vec<T>>()
    }

    fn flags(&self) -> OpFlags {
        OpFlags::STATEFUL
    }

    fn create_state(&self) -> NodeState {
        Box::new(std::collections::VecDeque::<T>::new())
    }

    fn run(&self, state: &mut NodeState, _span: Span, inputs: &[ErasedBlock]) -> Result<ErasedBlock> {
        let input = inputs[0].downcast::<T>()?;
        let ring = state_mut::<std::collections::VecDeque<T>>(state)?;
        let mut times = Vec::with_capacity(input.len());
        let mut values = Vec::with_capacity(input.len());
        for (t, v) in input.iter() {
            if ring.len() == self.n {
                ring.pop_front();
            }
            ring.push_back(v.clone());
            times.push(t);
            values.push(ring.iter().cloned().collect::<Vec<T>>());
        }
        Ok(ErasedBlock::new(Block::from_parts_unchecked(times, values)))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn dyn_eq(&self, other: &dyn OpKernel) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|o| self.n == o.n)
    }

    fn dyn_hash(&self, state: &mut dyn Hasher) {
        hash_kernel_type::<Self>(state);
        let mut state = state;
        self.n.hash(&mut state);
    }
}

/* ===================== ActiveCountOp ===================== */

/// How many inputs have ticked at least once. Emits whenever the count
/// rises, which happens at most once per input.
///
/// Works over erased inputs — only tick times matter, so the inputs may
/// carry any mix of value types.
pub(crate) struct ActiveCountOp;

impl OpKernel for ActiveCountOp {
    fn name(&self) -> &str {
        "active_count"
    }

    fn output_type(&self) -> TypeTag {
        TypeTag::of::<i64>()
    }

    fn flags(&self) -> OpFlags {
        OpFlags::STATEFUL_SIEVE
    }

    fn create_state(&self) -> NodeState {
        Box::new(Vec::<bool>::new())
    }

    fn run(&self, state: &mut NodeState, _span: Span, inputs: &[ErasedBlock]) -> Result<ErasedBlock> {
        let seen = state_mut::<Vec<bool>>(state)?;
        if seen.is_empty() {
            seen.resize(inputs.len(), false);
        }
        let mut idx = vec![0usize; inputs.len()];
        let mut times = Vec::new();
        let mut values = Vec::new();
        loop {
            let t = inputs
                .iter()
                .zip(&idx)
                .filter_map(|(b, &i)| b.times().get(i).copied())
                .min();
            let Some(t) = t else { break };
            let mut rose = false;
            for (k, (b, i)) in inputs.iter().zip(idx.iter_mut()).enumerate() {
                if b.times().get(*i) == Some(&t) {
                    if !seen[k] {
                        seen[k] = true;
                        rose = true;
                    }
                    *i += 1;
                }
            }
            if rose {
                times.push(t);
                values.push(seen.iter().filter(|&&s| s).count() as i64);
            }
        }
        Ok(ErasedBlock::new(Block::from_parts_unchecked(times, values)))
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
}

/// Number of the given series that have ticked at least once, across any
/// mix of value types.
pub fn active_count(inputs: &[&dyn AnySeries]) -> Result<Series<i64>> {
    if inputs.is_empty() {
        return Err(Error::invalid("active_count requires at least one input"));
    }
    let parents: Vec<NodeRef> = inputs.iter().map(|s| Arc::clone(s.node_ref())).collect();
    let op: Arc<dyn OpKernel> = Arc::new(ActiveCountOp);
    Ok(Series::from_node(obtain(&parents, op)))
}

/* ===================== thin compositions ===================== */

/// Emit `values` knots only while the latest `gate` value is `true`.
///
/// Left-aligned on `values`: nothing passes until the gate has ticked once.
pub fn filter_by<T: KnotValue>(values: &Series<T>, gate: &Series<bool>) -> Series<T> {
    let op = BinaryOp::<T, bool, T>::new(
        OpToken::Named("filter_by"),
        OpFlags::SIEVE,
        Alignment::Left,
        |_, v, g| g.then(|| v.clone()),
    );
    let parents = [Arc::clone(values.node()), Arc::clone(gate.node())];
    Series::from_node(obtain(&parents, Arc::new(op)))
}

/// Drop absent values, narrowing `Series<Option<T>>` to `Series<T>`.
pub fn skip_missing<T: KnotValue>(x: &Series<Option<T>>) -> Series<T> {
    use crate::align::UnaryOp;
    let op = UnaryOp::<Option<T>, T>::new(OpToken::Named("skip_missing"), OpFlags::SIEVE, |_, v| {
        v.clone()
    });
    let parents = [Arc::clone(x.node())];
    Series::from_node(obtain(&parents, Arc::new(op)))
}

/// Timestamps on which `t` ticks, as knot pairs `(time, time)` — the tick
/// skeleton of a series with its own times as values.
pub fn tick_times<T: KnotValue>(x: &Series<T>) -> Series<Timestamp> {
    use crate::align::UnaryOp;
    let op = UnaryOp::<T, Timestamp>::new(
        OpToken::Named("tick_times"),
        OpFlags {
            always_ticks: true,
            stateless: true,
            time_agnostic: false,
        },
        |t, _| Some(t),
    );
    let parents = [Arc::clone(x.node())];
    Series::from_node(obtain(&parents, Arc::new(op)))
}
