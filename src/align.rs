//! The alignment kernel: joining irregular inputs and applying operators.
//!
//! Inputs to a multi-parent node tick at unrelated times. The kernel decides
//! at which times the node itself ticks ([`Alignment`]) and pairs every
//! output time with the latest-at-or-before value of each input:
//!
//! - **Intersect** — tick only where every input has a knot at exactly the
//!   same time. Needs no memory between batches.
//! - **Union** — tick at every input knot, as soon as every input has ticked
//!   at least once. Remembers the latest value and validity of each input.
//! - **Left** — tick at the first input's knots, once the others have ticked.
//!   Remembers the latest value of the non-anchor inputs.
//!
//! Initial values pre-mark an input as valid, letting a node tick from the
//! very first knot of the other side; Intersect ignores them.
//!
//! When all inputs of a batch share one time vector — checked in constant
//! time via [`Block::equal_times`] — the merge loop is skipped entirely and
//! the operator runs element-wise over the zipped values.
//!
//! Output buffers are sized at the sum of input lengths up front; the merge
//! loops only push, and the surplus capacity is dropped when the buffer is
//! frozen into a block.
//!
//! The kernels here ([`UnaryOp`], [`BinaryOp`], [`ScanOp`]) are the general
//! carriers for both built-in named operations and user closures; the
//! structured state machines (lags, reducers, merges) have dedicated kernels
//! in `ops`.

use crate::block::{Block, ErasedBlock, KnotValue};
use crate::error::Result;
use crate::op::{Alignment, OpFlags, OpKernel, OpToken, TypeTag, hash_kernel_type};
use crate::sources::ConstantOp;
use crate::state::{NodeState, empty_state, state_mut};
use crate::time::{Span, Timestamp};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

/// Timestamp handed to time-agnostic operators during constant folding.
const FOLD_TIME: Timestamp = Timestamp::from_millis(0);

/// A parameter value paired with the equality it was constructed under.
///
/// Op descriptors must stay comparable even though the engine's value bound
/// does not include `PartialEq`; capturing the comparison as a function
/// pointer at the (bounded) construction site keeps the descriptor
/// monomorphic.
pub(crate) struct InitValue<T> {
    value: T,
    eq: fn(&T, &T) -> bool,
}

impl<T: Clone> Clone for InitValue<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            eq: self.eq,
        }
    }
}

impl<T> InitValue<T> {
    pub(crate) fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self {
            value,
            eq: |a, b| a == b,
        }
    }

    fn matches(&self, other: &Self) -> bool {
        (self.eq)(&self.value, &other.value)
    }
}

fn initials_match<T>(a: &Option<InitValue<T>>, b: &Option<InitValue<T>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.matches(b),
        _ => false,
    }
}

/// Cross-batch alignment state of a binary node: the latest value seen on
/// each input. `None` doubles as the "not yet valid" bit.
#[derive(Clone)]
struct BinState<A, B> {
    left: Option<A>,
    right: Option<B>,
}

/* ===================== UnaryOp ===================== */

/// A stateless operator over one parent, with optional knot suppression.
///
/// Covers `map`, `filter`, `skip_missing`, comparisons against the parent's
/// own history — anything expressible as `(time, &A) -> Option<O>`.
pub(crate) struct UnaryOp<A, O> {
    f: Arc<dyn Fn(Timestamp, &A) -> Option<O> + Send + Sync>,
    token: OpToken,
    flags: OpFlags,
    _marker: PhantomData<fn(&A) -> O>,
}

impl<A: KnotValue, O: KnotValue> UnaryOp<A, O> {
    pub(crate) fn new(
        token: OpToken,
        flags: OpFlags,
        f: impl Fn(Timestamp, &A) -> Option<O> + Send + Sync + 'static,
    ) -> Self {
        Self {
            f: Arc::new(f),
            token,
            flags,
            _marker: PhantomData,
        }
    }
}

impl<A: KnotValue, O: KnotValue> OpKernel for UnaryOp<A, O> {
    fn name(&self) -> &str {
        match self.token {
            OpToken::Named(n) => n,
            OpToken::Unique(_) => "wrapped_fn",
        }
    }

    fn output_type(&self) -> TypeTag {
        TypeTag::of::<O>()
    }

    fn flags(&self) -> OpFlags {
        self.flags
    }

    fn create_state(&self) -> NodeState {
        empty_state()
    }

    fn run(&self, _state: &mut NodeState, _span: Span, inputs: &[ErasedBlock]) -> Result<ErasedBlock> {
        let input = inputs[0].downcast::<A>()?;
        let mut times = Vec::with_capacity(input.len());
        let mut values = Vec::with_capacity(input.len());
        for (t, v) in input.iter() {
            if let Some(o) = (self.f)(t, v) {
                times.push(t);
                values.push(o);
            }
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
            .is_some_and(|o| self.token == o.token && self.flags == o.flags)
    }

    fn dyn_hash(&self, state: &mut dyn Hasher) {
        hash_kernel_type::<Self>(state);
        let mut state = state;
        self.token.hash(&mut state);
    }
}

/* ===================== BinaryOp ===================== */

/// An aligned operator over two parents.
///
/// The same kernel carries all three alignment policies; `run` dispatches on
/// the policy and on the equal-times fast path. Arithmetic, comparisons,
/// covariance pairing and user binary functions all come through here.
pub(crate) struct BinaryOp<A, B, O> {
    f: Arc<dyn Fn(Timestamp, &A, &B) -> Option<O> + Send + Sync>,
    token: OpToken,
    flags: OpFlags,
    align: Alignment,
    initial_left: Option<InitValue<A>>,
    initial_right: Option<InitValue<B>>,
    folder: Option<fn(&BinaryOp<A, B, O>, &dyn OpKernel, &dyn OpKernel) -> Option<Arc<dyn OpKernel>>>,
    _marker: PhantomData<fn(&A, &B) -> O>,
}

impl<A: KnotValue, B: KnotValue, O: KnotValue> BinaryOp<A, B, O> {
    pub(crate) fn new(
        token: OpToken,
        flags: OpFlags,
        align: Alignment,
        f: impl Fn(Timestamp, &A, &B) -> Option<O> + Send + Sync + 'static,
    ) -> Self {
        Self {
            f: Arc::new(f),
            token,
            flags,
            align,
            initial_left: None,
            initial_right: None,
            folder: None,
            _marker: PhantomData,
        }
    }

    /// Seed the inputs' validity with initial values. The anchor of a Left
    /// alignment never reads its seed; Intersect ignores both.
    pub(crate) fn with_initials(mut self, left: Option<A>, right: Option<B>) -> Self
    where
        A: PartialEq,
        B: PartialEq,
    {
        self.initial_left = left.map(InitValue::new);
        self.initial_right = right.map(InitValue::new);
        self
    }

    /// Enable constant propagation through this operator.
    pub(crate) fn foldable(mut self) -> Self
    where
        O: PartialEq,
    {
        self.folder = Some(fold_binary::<A, B, O>);
        self
    }

    fn fresh_state(&self) -> BinState<A, B> {
        BinState {
            left: self.initial_left.as_ref().map(|iv| iv.value.clone()),
            right: self.initial_right.as_ref().map(|iv| iv.value.clone()),
        }
    }

    /// Element-wise application when both inputs share one time vector.
    fn run_zipped(
        &self,
        lhs: &Block<A>,
        rhs: &Block<B>,
        times: &mut Vec<Timestamp>,
        values: &mut Vec<O>,
    ) {
        for i in 0..lhs.len() {
            let t = lhs.time(i);
            if let Some(o) = (self.f)(t, lhs.value(i), rhs.value(i)) {
                times.push(t);
                values.push(o);
            }
        }
    }

    fn run_union(
        &self,
        st: &mut BinState<A, B>,
        lhs: &Block<A>,
        rhs: &Block<B>,
        times: &mut Vec<Timestamp>,
        values: &mut Vec<O>,
    ) {
        if lhs.equal_times(rhs) {
            // Both sides tick everywhere, so validity is immediate.
            self.run_zipped(lhs, rhs, times, values);
            if let Some(last) = lhs.values().last() {
                st.left = Some(last.clone());
            }
            if let Some(last) = rhs.values().last() {
                st.right = Some(last.clone());
            }
            return;
        }

        let (mut i, mut j) = (0, 0);
        while i < lhs.len() || j < rhs.len() {
            let tl = (i < lhs.len()).then(|| lhs.time(i));
            let tr = (j < rhs.len()).then(|| rhs.time(j));
            let t = match (tl, tr) {
                (Some(a), Some(b)) => a.min(b),
                (Some(a), None) => a,
                (None, Some(b)) => b,
                (None, None) => unreachable!("loop condition"),
            };
            if tl == Some(t) {
                st.left = Some(lhs.value(i).clone());
                i += 1;
            }
            if tr == Some(t) {
                st.right = Some(rhs.value(j).clone());
                j += 1;
            }
            if let (Some(a), Some(b)) = (&st.left, &st.right) {
                if let Some(o) = (self.f)(t, a, b) {
                    times.push(t);
                    values.push(o);
                }
            }
        }
    }

    fn run_left(
        &self,
        st: &mut BinState<A, B>,
        lhs: &Block<A>,
        rhs: &Block<B>,
        times: &mut Vec<Timestamp>,
        values: &mut Vec<O>,
    ) {
        if lhs.equal_times(rhs) {
            self.run_zipped(lhs, rhs, times, values);
            if let Some(last) = rhs.values().last() {
                st.right = Some(last.clone());
            }
            return;
        }

        let mut j = 0;
        for i in 0..lhs.len() {
            let t = lhs.time(i);
            while j < rhs.len() && rhs.time(j) <= t {
                st.right = Some(rhs.value(j).clone());
                j += 1;
            }
            if let Some(b) = &st.right {
                if let Some(o) = (self.f)(t, lhs.value(i), b) {
                    times.push(t);
                    values.push(o);
                }
            }
        }
        // Knots after the last anchor tick still count for the next batch.
        while j < rhs.len() {
            st.right = Some(rhs.value(j).clone());
            j += 1;
        }
    }

    fn run_intersect(
        &self,
        lhs: &Block<A>,
        rhs: &Block<B>,
        times: &mut Vec<Timestamp>,
        values: &mut Vec<O>,
    ) {
        if lhs.equal_times(rhs) {
            self.run_zipped(lhs, rhs, times, values);
            return;
        }

        let (mut i, mut j) = (0, 0);
        while i < lhs.len() && j < rhs.len() {
            let (ta, tb) = (lhs.time(i), rhs.time(j));
            if ta < tb {
                i += 1;
            } else if tb < ta {
                j += 1;
            } else {
                if let Some(o) = (self.f)(ta, lhs.value(i), rhs.value(j)) {
                    times.push(ta);
                    values.push(o);
                }
                i += 1;
                j += 1;
            }
        }
    }
}

fn fold_binary<A: KnotValue, B: KnotValue, O: KnotValue + PartialEq>(
    op: &BinaryOp<A, B, O>,
    left: &dyn OpKernel,
    right: &dyn OpKernel,
) -> Option<Arc<dyn OpKernel>> {
    let a = left.as_any().downcast_ref::<ConstantOp<A>>()?;
    let b = right.as_any().downcast_ref::<ConstantOp<B>>()?;
    let v = (op.f)(FOLD_TIME, a.value(), b.value())?;
    Some(Arc::new(ConstantOp::new(v)))
}

impl<A: KnotValue, B: KnotValue, O: KnotValue> OpKernel for BinaryOp<A, B, O> {
    fn name(&self) -> &str {
        match self.token {
            OpToken::Named(n) => n,
            OpToken::Unique(_) => "wrapped_fn2",
        }
    }

    fn output_type(&self) -> TypeTag {
        TypeTag::of::<O>()
    }

    fn flags(&self) -> OpFlags {
        self.flags
    }

    fn alignment(&self) -> Alignment {
        self.align
    }

    fn create_state(&self) -> NodeState {
        eprintln!("DEBUG create_state self={:p} align={:?}", self, self.align);
        match self.align {
            Alignment::Intersect => empty_state(),
            _ => Box::new(self.fresh_state()),
        }
    }

    fn run(&self, state: &mut NodeState, _span: Span, inputs: &[ErasedBlock]) -> Result<ErasedBlock> {
        eprintln!("DEBUG run self={:p} align={:?}", self, self.align);
        eprintln!(
            "DEBUG direct downcast ok={} typeid_state={:?} typeid_expected={:?}",
            state.as_any().downcast_ref::<BinState<A, B>>().is_some(),
            state.as_any().type_id(),
            std::any::TypeId::of::<BinState<A, B>>()
        );
        let lhs = inputs[0].downcast::<A>()?;
        let rhs = inputs[1].downcast::<B>()?;
        let mut times = Vec::with_capacity(lhs.len() + rhs.len());
        let mut values = Vec::with_capacity(lhs.len() + rhs.len());
        match self.align {
            Alignment::Union => {
                let st = state_mut::<BinState<A, B>>(state)?;
                self.run_union(st, lhs, rhs, &mut times, &mut values);
            }
            Alignment::Left => {
                let st = state_mut::<BinState<A, B>>(state)?;
                self.run_left(st, lhs, rhs, &mut times, &mut values);
            }
            Alignment::Intersect => self.run_intersect(lhs, rhs, &mut times, &mut values),
        }
        Ok(ErasedBlock::new(Block::from_parts_unchecked(times, values)))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn dyn_eq(&self, other: &dyn OpKernel) -> bool {
        other.as_any().downcast_ref::<Self>().is_some_and(|o| {
            self.token == o.token
                && self.flags == o.flags
                && self.align == o.align
                && initials_match(&self.initial_left, &o.initial_left)
                && initials_match(&self.initial_right, &o.initial_right)
        })
    }

    fn dyn_hash(&self, state: &mut dyn Hasher) {
        hash_kernel_type::<Self>(state);
        let mut state = state;
        self.token.hash(&mut state);
        self.align.hash(&mut state);
        self.initial_left.is_some().hash(&mut state);
        self.initial_right.is_some().hash(&mut state);
    }

    fn fold_constants(&self, parents: &[&dyn OpKernel]) -> Option<Arc<dyn OpKernel>> {
        match (self.folder, parents) {
            (Some(fold), [left, right]) => fold(self, *left, *right),
            _ => None,
        }
    }
}

/* ===================== NaryOp ===================== */

/// An aligned operator over any number of same-typed parents.
///
/// The operator sees one value per input, latest-at-or-before the output
/// time, in parent order. Union and Left carry a latest-value slot per
/// input across batches; Intersect is memoryless.
pub(crate) struct NaryOp<T, O> {
    f: Arc<dyn Fn(Timestamp, &[T]) -> Option<O> + Send + Sync>,
    token: OpToken,
    flags: OpFlags,
    align: Alignment,
    initials: Vec<Option<InitValue<T>>>,
    _marker: PhantomData<fn(&[T]) -> O>,
}

impl<T: KnotValue, O: KnotValue> NaryOp<T, O> {
    pub(crate) fn new(
        token: OpToken,
        flags: OpFlags,
        align: Alignment,
        arity: usize,
        f: impl Fn(Timestamp, &[T]) -> Option<O> + Send + Sync + 'static,
    ) -> Self {
        Self {
            f: Arc::new(f),
            token,
            flags,
            align,
            initials: vec![None; arity],
            _marker: PhantomData,
        }
    }

    /// Seed per-input validity; the slot count must match the arity.
    pub(crate) fn with_initials(mut self, initials: Vec<Option<T>>) -> Self
    where
        T: PartialEq,
    {
        debug_assert_eq!(initials.len(), self.initials.len());
        self.initials = initials
            .into_iter()
            .map(|v| v.map(InitValue::new))
            .collect();
        self
    }

    fn fresh_state(&self) -> Vec<Option<T>> {
        self.initials
            .iter()
            .map(|iv| iv.as_ref().map(|iv| iv.value.clone()))
            .collect()
    }

    /// True if every input of the batch shares the first input's time
    /// vector.
    fn zippable(blocks: &[&Block<T>]) -> bool {
        match blocks.split_first() {
            Some((first, rest)) => rest.iter().all(|b| first.equal_times(*b)),
            None => false,
        }
    }

    fn run_zipped(
        &self,
        blocks: &[&Block<T>],
        scratch: &mut Vec<T>,
        times: &mut Vec<Timestamp>,
        values: &mut Vec<O>,
    ) {
        let len = blocks.first().map_or(0, |b| b.len());
        for i in 0..len {
            let t = blocks[0].time(i);
            scratch.clear();
            scratch.extend(blocks.iter().map(|b| b.value(i).clone()));
            if let Some(o) = (self.f)(t, scratch) {
                times.push(t);
                values.push(o);
            }
        }
    }

    fn emit_if_ready(
        &self,
        t: Timestamp,
        latest: &[Option<T>],
        scratch: &mut Vec<T>,
        times: &mut Vec<Timestamp>,
        values: &mut Vec<O>,
    ) {
        scratch.clear();
        scratch.extend(latest.iter().filter_map(|v| v.clone()));
        if scratch.len() == latest.len() {
            if let Some(o) = (self.f)(t, scratch) {
                times.push(t);
                values.push(o);
            }
        }
    }

    fn run_union(
        &self,
        latest: &mut [Option<T>],
        blocks: &[&Block<T>],
        scratch: &mut Vec<T>,
        times: &mut Vec<Timestamp>,
        values: &mut Vec<O>,
    ) {
        let mut idx = vec![0usize; blocks.len()];
        loop {
            let t = blocks
                .iter()
                .zip(&idx)
                .filter_map(|(b, &i)| (i < b.len()).then(|| b.time(i)))
                .min();
            let Some(t) = t else { break };
            for (k, (b, i)) in blocks.iter().zip(idx.iter_mut()).enumerate() {
                if *i < b.len() && b.time(*i) == t {
                    latest[k] = Some(b.value(*i).clone());
                    *i += 1;
                }
            }
            self.emit_if_ready(t, latest, scratch, times, values);
        }
    }

    fn run_left(
        &self,
        latest: &mut [Option<T>],
        blocks: &[&Block<T>],
        scratch: &mut Vec<T>,
        times: &mut Vec<Timestamp>,
        values: &mut Vec<O>,
    ) {
        let anchor = blocks[0];
        let others = &blocks[1..];
        let mut idx = vec![0usize; others.len()];
        for a in 0..anchor.len() {
            let t = anchor.time(a);
            latest[0] = Some(anchor.value(a).clone());
            for (k, (b, i)) in others.iter().zip(idx.iter_mut()).enumerate() {
                while *i < b.len() && b.time(*i) <= t {
                    latest[k + 1] = Some(b.value(*i).clone());
                    *i += 1;
                }
            }
            self.emit_if_ready(t, latest, scratch, times, values);
        }
        for (k, (b, i)) in others.iter().zip(idx.iter_mut()).enumerate() {
            while *i < b.len() {
                latest[k + 1] = Some(b.value(*i).clone());
                *i += 1;
            }
        }
    }

    fn run_intersect(
        &self,
        blocks: &[&Block<T>],
        scratch: &mut Vec<T>,
        times: &mut Vec<Timestamp>,
        values: &mut Vec<O>,
    ) {
        let mut idx = vec![0usize; blocks.len()];
        'outer: loop {
            // Candidate time: the furthest-ahead head.
            let mut candidate = None;
            for (b, &i) in blocks.iter().zip(&idx) {
                if i >= b.len() {
                    break 'outer;
                }
                let t = b.time(i);
                candidate = Some(candidate.map_or(t, |c: Timestamp| c.max(t)));
            }
            let Some(t) = candidate else { break };
            // Advance every head to the candidate; any overshoot restarts.
            let mut aligned = true;
            for (b, i) in blocks.iter().zip(idx.iter_mut()) {
                while *i < b.len() && b.time(*i) < t {
                    *i += 1;
                }
                if *i >= b.len() || b.time(*i) != t {
                    aligned = false;
                }
            }
            if aligned {
                scratch.clear();
                scratch.extend(blocks.iter().zip(&idx).map(|(b, &i)| b.value(i).clone()));
                if let Some(o) = (self.f)(t, scratch) {
                    times.push(t);
                    values.push(o);
                }
                for i in idx.iter_mut() {
                    *i += 1;
                }
            }
        }
    }
}

impl<T: KnotValue, O: KnotValue> OpKernel for NaryOp<T, O> {
    fn name(&self) -> &str {
        match self.token {
            OpToken::Named(n) => n,
            OpToken::Unique(_) => "wrapped_fn_n",
        }
    }

    fn output_type(&self) -> TypeTag {
        TypeTag::of::<O>()
    }

    fn flags(&self) -> OpFlags {
        self.flags
    }

    fn alignment(&self) -> Alignment {
        self.align
    }

    fn create_state(&self) -> NodeState {
        match self.align {
            Alignment::Intersect => empty_state(),
            _ => Box::new(self.fresh_state()),
        }
    }

    fn run(&self, state: &mut NodeState, _span: Span, inputs: &[ErasedBlock]) -> Result<ErasedBlock> {
        let blocks: Vec<&Block<T>> = inputs
            .iter()
            .map(|b| b.downcast::<T>())
            .collect::<Result<_>>()?;
        let cap: usize = blocks.iter().map(|b| b.len()).sum();
        let mut times = Vec::with_capacity(cap);
        let mut values = Vec::with_capacity(cap);
        let mut scratch: Vec<T> = Vec::with_capacity(blocks.len());

        if Self::zippable(&blocks) {
            self.run_zipped(&blocks, &mut scratch, &mut times, &mut values);
            if !matches!(self.align, Alignment::Intersect) {
                let latest = state_mut::<Vec<Option<T>>>(state)?;
                for (k, b) in blocks.iter().enumerate() {
                    if let Some(last) = b.values().last() {
                        latest[k] = Some(last.clone());
                    }
                }
            }
            return Ok(ErasedBlock::new(Block::from_parts_unchecked(times, values)));
        }

        match self.align {
            Alignment::Union => {
                let latest = state_mut::<Vec<Option<T>>>(state)?;
                self.run_union(latest, &blocks, &mut scratch, &mut times, &mut values);
            }
            Alignment::Left => {
                let latest = state_mut::<Vec<Option<T>>>(state)?;
                self.run_left(latest, &blocks, &mut scratch, &mut times, &mut values);
            }
            Alignment::Intersect => {
                self.run_intersect(&blocks, &mut scratch, &mut times, &mut values)
            }
        }
        Ok(ErasedBlock::new(Block::from_parts_unchecked(times, values)))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn dyn_eq(&self, other: &dyn OpKernel) -> bool {
        other.as_any().downcast_ref::<Self>().is_some_and(|o| {
            self.token == o.token
                && self.flags == o.flags
                && self.align == o.align
                && self.initials.len() == o.initials.len()
                && self
                    .initials
                    .iter()
                    .zip(&o.initials)
                    .all(|(a, b)| initials_match(a, b))
        })
    }

    fn dyn_hash(&self, state: &mut dyn Hasher) {
        hash_kernel_type::<Self>(state);
        let mut state = state;
        self.token.hash(&mut state);
        self.align.hash(&mut state);
        self.initials.len().hash(&mut state);
    }
}

/* ===================== ScanOp ===================== */

/// A stateful user operator over one parent.
///
/// The caller provides a deterministic seed state and a step function; any
/// randomness must live in the seed so that re-evaluation from the same
/// start reproduces the same outputs.
pub(crate) struct ScanOp<A, O, S> {
    seed: S,
    f: Arc<dyn Fn(&mut S, Timestamp, &A) -> Option<O> + Send + Sync>,
    token: OpToken,
    _marker: PhantomData<fn(&A) -> O>,
}

impl<A, O, S> ScanOp<A, O, S>
where
    A: KnotValue,
    O: KnotValue,
    S: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        seed: S,
        f: impl Fn(&mut S, Timestamp, &A) -> Option<O> + Send + Sync + 'static,
    ) -> Self {
        Self {
            seed,
            f: Arc::new(f),
            token: OpToken::unique(),
            _marker: PhantomData,
        }
    }
}

impl<A, O, S> OpKernel for ScanOp<A, O, S>
where
    A: KnotValue,
    O: KnotValue,
    S: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "scan"
    }

    fn output_type(&self) -> TypeTag {
        TypeTag::of::<O>()
    }

    fn flags(&self) -> OpFlags {
        OpFlags::STATEFUL_SIEVE
    }

    fn create_state(&self) -> NodeState {
        Box::new(self.seed.clone())
    }

    fn run(&self, state: &mut NodeState, _span: Span, inputs: &[ErasedBlock]) -> Result<ErasedBlock> {
        let input = inputs[0].downcast::<A>()?;
        let st = state_mut::<S>(state)?;
        let mut times = Vec::with_capacity(input.len());
        let mut values = Vec::with_capacity(input.len());
        for (t, v) in input.iter() {
            if let Some(o) = (self.f)(st, t, v) {
                times.push(t);
                values.push(o);
            }
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
            .is_some_and(|o| self.token == o.token)
    }

    fn dyn_hash(&self, state: &mut dyn Hasher) {
        hash_kernel_type::<Self>(state);
        let mut state = state;
        self.token.hash(&mut state);
    }
}
