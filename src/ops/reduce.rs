//! Associative reduction scaffolds.
//!
//! Two kernels cover every built-in statistic and any user reduction:
//!
//! - [`InceptionOp`] folds a single accumulator from the first knot onward.
//! - [`WindowOp`] maintains the reduction of the last `N` knots with O(1)
//!   amortised queries, using the classic two-stack trick: a back stack
//!   absorbs new values into a running aggregate, and when an eviction finds
//!   the front stack empty, the back stack is flipped into suffix
//!   aggregates. No inverse operation is required, only associativity.
//! - [`TimeWindowOp`] is the wall-clock variant: the window covers
//!   `(t − W, t]`, so a knot exactly `W` old has just fallen out.
//!
//! The reduction itself is a [`ReduceFn`]: seed an accumulator from the
//! first value, absorb later values, merge two adjacent accumulators, and
//! extract an output. `should_tick` lets a reduction suppress outputs while
//! the accumulator is not yet meaningful (variance of one knot, say).

use crate::block::{Block, ErasedBlock, KnotValue};
use crate::error::Result;
use crate::op::{OpFlags, OpKernel, TypeTag, hash_kernel_type};
use crate::state::{NodeState, state_mut};
use crate::time::{Duration, Span, Timestamp};
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// An associative reduction over a stream of values.
///
/// `merge(earlier, later)` must be associative and must agree with feeding
/// the same values through `create`/`add_input` in order; the window
/// scaffold leans on that to split and recombine the window at will.
///
/// Reducers double as op-descriptor parameters, so they must be cheaply
/// comparable and hashable.
pub trait ReduceFn<T>: Send + Sync + PartialEq + Hash + 'static {
    /// The accumulator carried in node state.
    type Acc: Clone + Send + Sync + 'static;
    /// The emitted value type.
    type Out: KnotValue;

    /// Seed an accumulator from the first value.
    fn create(&self, v: &T) -> Self::Acc;

    /// Absorb one later value.
    fn add_input(&self, acc: &mut Self::Acc, v: &T);

    /// Combine the accumulators of two adjacent runs, `earlier` first.
    fn merge(&self, earlier: &Self::Acc, later: &Self::Acc) -> Self::Acc;

    /// Extract the output value.
    fn finish(&self, acc: &Self::Acc) -> Self::Out;

    /// Whether the accumulator is ready to emit.
    fn should_tick(&self, _acc: &Self::Acc) -> bool {
        true
    }

    /// Smallest window over which `finish` is meaningful; window
    /// constructors reject anything below this.
    fn min_window(&self) -> usize {
        1
    }
}

/* ===================== InceptionOp ===================== */

/// Cumulative reduction since the first observed knot.
pub(crate) struct InceptionOp<T, R> {
    reducer: R,
    _marker: PhantomData<fn(&T)>,
}

impl<T, R> InceptionOp<T, R> {
    pub(crate) fn new(reducer: R) -> Self {
        Self {
            reducer,
            _marker: PhantomData,
        }
    }
}

impl<T, R> OpKernel for InceptionOp<T, R>
where
    T: KnotValue,
    R: ReduceFn<T>,
{
    fn name(&self) -> &str {
        "inception"
    }

    fn output_type(&self) -> TypeTag {
        TypeTag::of::<R::Out>()
    }

    fn flags(&self) -> OpFlags {
        OpFlags::STATEFUL_SIEVE
    }

    fn create_state(&self) -> NodeState {
        Box::new(None::<R::Acc>)
    }

    fn run(&self, state: &mut NodeState, _span: Span, inputs: &[ErasedBlock]) -> Result<ErasedBlock> {
        let input = inputs[0].downcast::<T>()?;
        let st = state_mut::<Option<R::Acc>>(state)?;
        let mut times = Vec::with_capacity(input.len());
        let mut values = Vec::with_capacity(input.len());
        for (t, v) in input.iter() {
            match st {
                None => *st = Some(self.reducer.create(v)),
                Some(acc) => self.reducer.add_input(acc, v),
            }
            if let Some(acc) = st {
                if self.reducer.should_tick(acc) {
                    times.push(t);
                    values.push(self.reducer.finish(acc));
                }
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
            .is_some_and(|o| self.reducer == o.reducer)
    }

    fn dyn_hash(&self, state: &mut dyn Hasher) {
        hash_kernel_type::<Self>(state);
        let mut state = state;
        self.reducer.hash(&mut state);
    }
}

/* ===================== the two-stack window ===================== */

/// Sliding-window aggregation state over values of type `T` with
/// accumulators `A`.
#[derive(Clone)]
pub(crate) struct Swag<T, A> {
    /// Suffix aggregates of the older run; the overall oldest element's
    /// aggregate sits at the end.
    front: Vec<A>,
    /// Raw values of the newer run, in arrival order.
    back: Vec<T>,
    /// Aggregate of everything in `back`.
    back_agg: Option<A>,
}

impl<T: Clone, A: Clone> Swag<T, A> {
    fn new() -> Self {
        Self {
            front: Vec::new(),
            back: Vec::new(),
            back_agg: None,
        }
    }

    fn len(&self) -> usize {
        self.front.len() + self.back.len()
    }

    fn push<R>(&mut self, r: &R, v: &T)
    where
        R: ReduceFn<T, Acc = A>,
    {
        self.back_agg = Some(match &self.back_agg {
            None => r.create(v),
            Some(agg) => {
                let mut agg = agg.clone();
                r.add_input(&mut agg, v);
                agg
            }
        });
        self.back.push(v.clone());
    }

    /// Drop the oldest element, flipping the back stack if needed.
    fn evict<R>(&mut self, r: &R)
    where
        R: ReduceFn<T, Acc = A>,
    {
        if self.front.is_empty() {
            let mut suffix: Option<A> = None;
            for v in self.back.iter().rev() {
                let agg = match &suffix {
                    None => r.create(v),
                    Some(rest) => r.merge(&r.create(v), rest),
                };
                self.front.push(agg.clone());
                suffix = Some(agg);
            }
            self.back.clear();
            self.back_agg = None;
        }
        self.front.pop();
    }

    /// Aggregate of the whole window.
    fn query<R>(&self, r: &R) -> Option<A>
    where
        R: ReduceFn<T, Acc = A>,
    {
        match (self.front.last(), &self.back_agg) {
            (Some(older), Some(newer)) => Some(r.merge(older, newer)),
            (Some(older), None) => Some(older.clone()),
            (None, Some(newer)) => Some(newer.clone()),
            (None, None) => None,
        }
    }
}

/* ===================== WindowOp ===================== */

/// Reduction over the last `n` knots.
pub(crate) struct WindowOp<T, R> {
    reducer: R,
    n: usize,
    emit_early: bool,
    _marker: PhantomData<fn(&T)>,
}

impl<T, R> WindowOp<T, R> {
    pub(crate) fn new(reducer: R, n: usize, emit_early: bool) -> Self {
        Self {
            reducer,
            n,
            emit_early,
            _marker: PhantomData,
        }
    }
}

impl<T, R> OpKernel for WindowOp<T, R>
where
    T: KnotValue,
    R: ReduceFn<T>,
{
    fn name(&self) -> &str {
        "window"
    }

    fn output_type(&self) -> TypeTag {
        TypeTag::of::<R::Out>()
    }

    fn flags(&self) -> OpFlags {
        OpFlags::STATEFUL_SIEVE
    }

    fn create_state(&self) -> NodeState {
        Box::new(Swag::<T, R::Acc>::new())
    }

    fn run(&self, state: &mut NodeState, _span: Span, inputs: &[ErasedBlock]) -> Result<ErasedBlock> {
        let input = inputs[0].downcast::<T>()?;
        let st = state_mut::<Swag<T, R::Acc>>(state)?;
        let mut times = Vec::with_capacity(input.len());
        let mut values = Vec::with_capacity(input.len());
        for (t, v) in input.iter() {
            st.push(&self.reducer, v);
            if st.len() > self.n {
                st.evict(&self.reducer);
            }
            if !self.emit_early && st.len() < self.n {
                continue;
            }
            if let Some(acc) = st.query(&self.reducer) {
                if self.reducer.should_tick(&acc) {
                    times.push(t);
                    values.push(self.reducer.finish(&acc));
                }
            }
        }
        Ok(ErasedBlock::new(Block::from_parts_unchecked(times, values)))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn dyn_eq(&self, other: &dyn OpKernel) -> bool {
        other.as_any().downcast_ref::<Self>().is_some_and(|o| {
            self.reducer == o.reducer && self.n == o.n && self.emit_early == o.emit_early
        })
    }

    fn dyn_hash(&self, state: &mut dyn Hasher) {
        hash_kernel_type::<Self>(state);
        let mut state = state;
        self.reducer.hash(&mut state);
        self.n.hash(&mut state);
        self.emit_early.hash(&mut state);
    }
}

/* ===================== TimeWindowOp ===================== */

/// Sliding-window state with wall-clock eviction.
#[derive(Clone)]
pub(crate) struct TimedSwag<T, A> {
    front: Vec<(Timestamp, A)>,
    back: VecDeque<(Timestamp, T)>,
    back_agg: Option<A>,
    first_seen: Option<Timestamp>,
}

impl<T: Clone, A: Clone> TimedSwag<T, A> {
    fn new() -> Self {
        Self {
            front: Vec::new(),
            back: VecDeque::new(),
            back_agg: None,
            first_seen: None,
        }
    }

    fn oldest_time(&self) -> Option<Timestamp> {
        self.front
            .last()
            .map(|(t, _)| *t)
            .or_else(|| self.back.front().map(|(t, _)| *t))
    }

    fn push<R>(&mut self, r: &R, t: Timestamp, v: &T)
    where
        R: ReduceFn<T, Acc = A>,
    {
        self.first_seen.get_or_insert(t);
        self.back_agg = Some(match &self.back_agg {
            None => r.create(v),
            Some(agg) => {
                let mut agg = agg.clone();
                r.add_input(&mut agg, v);
                agg
            }
        });
        self.back.push_back((t, v.clone()));
    }

    fn evict<R>(&mut self, r: &R)
    where
        R: ReduceFn<T, Acc = A>,
    {
        if self.front.is_empty() {
            let mut suffix: Option<A> = None;
            for (t, v) in self.back.iter().rev() {
                let agg = match &suffix {
                    None => r.create(v),
                    Some(rest) => r.merge(&r.create(v), rest),
                };
                self.front.push((*t, agg.clone()));
                suffix = Some(agg);
            }
            self.back.clear();
            self.back_agg = None;
        }
        self.front.pop();
    }

    fn query<R>(&self, r: &R) -> Option<A>
    where
        R: ReduceFn<T, Acc = A>,
    {
        match (self.front.last(), &self.back_agg) {
            (Some((_, older)), Some(newer)) => Some(r.merge(older, newer)),
            (Some((_, older)), None) => Some(older.clone()),
            (None, Some(newer)) => Some(newer.clone()),
            (None, None) => None,
        }
    }
}

/// Reduction over the knots in `(t − width, t]`.
pub(crate) struct TimeWindowOp<T, R> {
    reducer: R,
    width: Duration,
    emit_early: bool,
    _marker: PhantomData<fn(&T)>,
}

impl<T, R> TimeWindowOp<T, R> {
    pub(crate) fn new(reducer: R, width: Duration, emit_early: bool) -> Self {
        Self {
            reducer,
            width,
            emit_early,
            _marker: PhantomData,
        }
    }
}

impl<T, R> OpKernel for TimeWindowOp<T, R>
where
    T: KnotValue,
    R: ReduceFn<T>,
{
    fn name(&self) -> &str {
        "time_window"
    }

    fn output_type(&self) -> TypeTag {
        TypeTag::of::<R::Out>()
    }

    fn flags(&self) -> OpFlags {
        OpFlags {
            always_ticks: false,
            stateless: false,
            time_agnostic: false,
        }
    }

    fn create_state(&self) -> NodeState {
        Box::new(TimedSwag::<T, R::Acc>::new())
    }

    fn run(&self, state: &mut NodeState, _span: Span, inputs: &[ErasedBlock]) -> Result<ErasedBlock> {
        let input = inputs[0].downcast::<T>()?;
        let st = state_mut::<TimedSwag<T, R::Acc>>(state)?;
        let mut times = Vec::with_capacity(input.len());
        let mut values = Vec::with_capacity(input.len());
        for (t, v) in input.iter() {
            st.push(&self.reducer, t, v);
            while st.oldest_time().is_some_and(|oldest| oldest + self.width <= t) {
                st.evict(&self.reducer);
            }
            let full = st
                .first_seen
                .is_some_and(|first| first + self.width <= t);
            if !self.emit_early && !full {
                continue;
            }
            if let Some(acc) = st.query(&self.reducer) {
                if self.reducer.should_tick(&acc) {
                    times.push(t);
                    values.push(self.reducer.finish(&acc));
                }
            }
        }
        Ok(ErasedBlock::new(Block::from_parts_unchecked(times, values)))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn dyn_eq(&self, other: &dyn OpKernel) -> bool {
        other.as_any().downcast_ref::<Self>().is_some_and(|o| {
            self.reducer == o.reducer && self.width == o.width && self.emit_early == o.emit_early
        })
    }

    fn dyn_hash(&self, state: &mut dyn Hasher) {
        hash_kernel_type::<Self>(state);
        let mut state = state;
        self.reducer.hash(&mut state);
        self.width.hash(&mut state);
        self.emit_early.hash(&mut state);
    }
}
