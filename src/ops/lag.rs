//! Lagging operators.
//!
//! - [`LagOp`] delays values by a knot count: each emitted knot carries the
//!   time of the newer input and the value of the input `n` knots earlier.
//! - [`TimeLagOp`] delays knots by a fixed duration: every knot re-emerges
//!   `Δ` later with its original value. History is retained exactly until
//!   its shifted time has been emitted — after a batch ending at `t_end`,
//!   the state holds precisely the knots with `time + Δ ≥ t_end`.
//!
//! Lag by zero, and lagging a node that ticks at most once, are identities;
//! the series constructors rewrite those cases away before a kernel is ever
//! built.

use crate::block::{Block, ErasedBlock, KnotValue};
use crate::error::Result;
use crate::op::{OpFlags, OpKernel, TypeTag, hash_kernel_type};
use crate::state::{NodeState, state_mut};
use crate::time::{Duration, Span};
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Delay by `n` knots.
pub(crate) struct LagOp<T> {
    n: usize,
    _marker: PhantomData<fn(T)>,
}

impl<T> LagOp<T> {
    pub(crate) fn new(n: usize) -> Self {
        debug_assert!(n > 0);
        Self {
            n,
            _marker: PhantomData,
        }
    }
}

impl<T: KnotValue> OpKernel for LagOp<T> {
    fn name(&self) -> &str {
        "lag"
    }

    fn output_type(&self) -> TypeTag {
        TypeTag::of::<T>()
    }

    fn flags(&self) -> OpFlags {
        OpFlags::STATEFUL_SIEVE
    }

    fn create_state(&self) -> NodeState {
        Box::new(VecDeque::<T>::new())
    }

    fn run(&self, state: &mut NodeState, _span: Span, inputs: &[ErasedBlock]) -> Result<ErasedBlock> {
        let input = inputs[0].downcast::<T>()?;
        let ring = state_mut::<VecDeque<T>>(state)?;
        let mut times = Vec::with_capacity(input.len());
        let mut values = Vec::with_capacity(input.len());
        for (t, v) in input.iter() {
            if ring.len() == self.n {
                if let Some(old) = ring.pop_front() {
                    times.push(t);
                    values.push(old);
                }
            }
            ring.push_back(v.clone());
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

/// Delay by a fixed duration.
pub(crate) struct TimeLagOp<T> {
    delta: Duration,
    _marker: PhantomData<fn(T)>,
}

impl<T> TimeLagOp<T> {
    pub(crate) fn new(delta: Duration) -> Self {
        debug_assert!(delta.millis() > 0);
        Self {
            delta,
            _marker: PhantomData,
        }
    }
}

impl<T: KnotValue> OpKernel for TimeLagOp<T> {
    fn name(&self) -> &str {
        "lag_time"
    }

    fn output_type(&self) -> TypeTag {
        TypeTag::of::<T>()
    }

    fn flags(&self) -> OpFlags {
        OpFlags {
            always_ticks: false,
            stateless: false,
            time_agnostic: false,
        }
    }

    fn create_state(&self) -> NodeState {
        Box::new(VecDeque::<(crate::time::Timestamp, T)>::new())
    }

    fn run(&self, state: &mut NodeState, span: Span, inputs: &[ErasedBlock]) -> Result<ErasedBlock> {
        let input = inputs[0].downcast::<T>()?;
        let pending = state_mut::<VecDeque<(crate::time::Timestamp, T)>>(state)?;
        for (t, v) in input.iter() {
            pending.push_back((t, v.clone()));
        }
        let mut times = Vec::with_capacity(pending.len());
        let mut values = Vec::with_capacity(pending.len());
        while pending
            .front()
            .is_some_and(|(t, _)| *t + self.delta < span.end)
        {
            if let Some((t, v)) = pending.pop_front() {
                times.push(t + self.delta);
                values.push(v);
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
            .is_some_and(|o| self.delta == o.delta)
    }

    fn dyn_hash(&self, state: &mut dyn Hasher) {
        hash_kernel_type::<Self>(state);
        let mut state = state;
        self.delta.hash(&mut state);
    }
}
