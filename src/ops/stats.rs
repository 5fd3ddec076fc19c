//! Numeric reducers and the exponential moving average.
//!
//! All of the statistics ride the scaffolds in [`crate::ops::reduce`]:
//!
//! - [`SumFn`] / [`ProdFn`] — plain monoid folds over any `Add`/`Mul` type.
//! - [`MeanFn`] — `(sum, count)` accumulator.
//! - [`VarFn`] / [`StdFn`] — one-pass moments via [`MomentAcc`], merged with
//!   the parallel-variance recurrence so window splits recombine exactly.
//! - [`CovFn`] / [`CorFn`] — bivariate moments over `(f64, f64)` pairs via
//!   [`CoMomentAcc`].
//!
//! Variance-family reducers refuse to tick until they have seen two inputs
//! and declare a minimum window of two, which the window constructors
//! enforce at build time.
//!
//! [`EmaOp`] is not associative and therefore not a reducer; it is a small
//! dedicated kernel with the smoothing factor stored as an [`OrderedFloat`]
//! so the op descriptor stays hashable.

use crate::block::{Block, ErasedBlock};
use crate::error::Result;
use crate::op::{OpFlags, OpKernel, TypeTag, hash_kernel_type};
use crate::ops::reduce::ReduceFn;
use crate::state::{NodeState, state_mut};
use crate::time::Span;
use ordered_float::OrderedFloat;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::{Add, Mul};

/* ===================== SumFn / ProdFn ===================== */

/// Running sum.
#[derive(Debug)]
pub struct SumFn<T>(PhantomData<fn(T)>);

impl<T> Clone for SumFn<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SumFn<T> {}

impl<T> Default for SumFn<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T> PartialEq for SumFn<T> {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<T> Eq for SumFn<T> {}

impl<T> Hash for SumFn<T> {
    fn hash<H: Hasher>(&self, _state: &mut H) {}
}

impl<T> SumFn<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> ReduceFn<T> for SumFn<T>
where
    T: crate::block::KnotValue + Add<Output = T>,
{
    type Acc = T;
    type Out = T;

    fn create(&self, v: &T) -> T {
        v.clone()
    }

    fn add_input(&self, acc: &mut T, v: &T) {
        *acc = acc.clone() + v.clone();
    }

    fn merge(&self, earlier: &T, later: &T) -> T {
        earlier.clone() + later.clone()
    }

    fn finish(&self, acc: &T) -> T {
        acc.clone()
    }
}

/// Running product.
#[derive(Debug)]
pub struct ProdFn<T>(PhantomData<fn(T)>);

impl<T> Clone for ProdFn<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ProdFn<T> {}

impl<T> Default for ProdFn<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T> PartialEq for ProdFn<T> {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<T> Eq for ProdFn<T> {}

impl<T> Hash for ProdFn<T> {
    fn hash<H: Hasher>(&self, _state: &mut H) {}
}

impl<T> ProdFn<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> ReduceFn<T> for ProdFn<T>
where
    T: crate::block::KnotValue + Mul<Output = T>,
{
    type Acc = T;
    type Out = T;

    fn create(&self, v: &T) -> T {
        v.clone()
    }

    fn add_input(&self, acc: &mut T, v: &T) {
        *acc = acc.clone() * v.clone();
    }

    fn merge(&self, earlier: &T, later: &T) -> T {
        earlier.clone() * later.clone()
    }

    fn finish(&self, acc: &T) -> T {
        acc.clone()
    }
}

/* ===================== MeanFn ===================== */

/// Arithmetic mean of `f64` values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MeanFn;

impl ReduceFn<f64> for MeanFn {
    type Acc = (f64, u64);
    type Out = f64;

    fn create(&self, v: &f64) -> (f64, u64) {
        (*v, 1)
    }

    fn add_input(&self, acc: &mut (f64, u64), v: &f64) {
        acc.0 += v;
        acc.1 += 1;
    }

    fn merge(&self, earlier: &(f64, u64), later: &(f64, u64)) -> (f64, u64) {
        (earlier.0 + later.0, earlier.1 + later.1)
    }

    fn finish(&self, acc: &(f64, u64)) -> f64 {
        acc.0 / acc.1 as f64
    }
}

/* ===================== moments ===================== */

/// One-pass univariate moments: count, mean, and centered second moment.
#[derive(Clone, Copy, Debug, Default)]
pub struct MomentAcc {
    n: u64,
    mean: f64,
    m2: f64,
}

impl MomentAcc {
    fn seed(v: f64) -> Self {
        Self {
            n: 1,
            mean: v,
            m2: 0.0,
        }
    }

    fn push(&mut self, v: f64) {
        self.n += 1;
        let d = v - self.mean;
        self.mean += d / self.n as f64;
        self.m2 += d * (v - self.mean);
    }

    fn combine(&self, later: &MomentAcc) -> MomentAcc {
        let n = self.n + later.n;
        let d = later.mean - self.mean;
        let (na, nb) = (self.n as f64, later.n as f64);
        MomentAcc {
            n,
            mean: self.mean + d * nb / n as f64,
            m2: self.m2 + later.m2 + d * d * na * nb / n as f64,
        }
    }

    fn variance(&self) -> f64 {
        self.m2 / (self.n - 1) as f64
    }
}

/// Corrected sample variance (n − 1 denominator).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct VarFn;

impl ReduceFn<f64> for VarFn {
    type Acc = MomentAcc;
    type Out = f64;

    fn create(&self, v: &f64) -> MomentAcc {
        MomentAcc::seed(*v)
    }

    fn add_input(&self, acc: &mut MomentAcc, v: &f64) {
        acc.push(*v);
    }

    fn merge(&self, earlier: &MomentAcc, later: &MomentAcc) -> MomentAcc {
        earlier.combine(later)
    }

    fn finish(&self, acc: &MomentAcc) -> f64 {
        acc.variance()
    }

    fn should_tick(&self, acc: &MomentAcc) -> bool {
        acc.n >= 2
    }

    fn min_window(&self) -> usize {
        2
    }
}

/// Corrected sample standard deviation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct StdFn;

impl ReduceFn<f64> for StdFn {
    type Acc = MomentAcc;
    type Out = f64;

    fn create(&self, v: &f64) -> MomentAcc {
        MomentAcc::seed(*v)
    }

    fn add_input(&self, acc: &mut MomentAcc, v: &f64) {
        acc.push(*v);
    }

    fn merge(&self, earlier: &MomentAcc, later: &MomentAcc) -> MomentAcc {
        earlier.combine(later)
    }

    fn finish(&self, acc: &MomentAcc) -> f64 {
        acc.variance().sqrt()
    }

    fn should_tick(&self, acc: &MomentAcc) -> bool {
        acc.n >= 2
    }

    fn min_window(&self) -> usize {
        2
    }
}

/// One-pass bivariate moments for covariance and correlation.
#[derive(Clone, Copy, Debug, Default)]
pub struct CoMomentAcc {
    n: u64,
    mean_x: f64,
    mean_y: f64,
    m2x: f64,
    m2y: f64,
    cxy: f64,
}

impl CoMomentAcc {
    fn seed(x: f64, y: f64) -> Self {
        Self {
            n: 1,
            mean_x: x,
            mean_y: y,
            ..Self::default()
        }
    }

    fn push(&mut self, x: f64, y: f64) {
        self.n += 1;
        let nf = self.n as f64;
        let dx = x - self.mean_x;
        let dy = y - self.mean_y;
        self.mean_x += dx / nf;
        self.mean_y += dy / nf;
        self.m2x += dx * (x - self.mean_x);
        self.m2y += dy * (y - self.mean_y);
        self.cxy += dx * (y - self.mean_y);
    }

    fn combine(&self, later: &CoMomentAcc) -> CoMomentAcc {
        let n = self.n + later.n;
        let (na, nb) = (self.n as f64, later.n as f64);
        let nf = n as f64;
        let dx = later.mean_x - self.mean_x;
        let dy = later.mean_y - self.mean_y;
        CoMomentAcc {
            n,
            mean_x: self.mean_x + dx * nb / nf,
            mean_y: self.mean_y + dy * nb / nf,
            m2x: self.m2x + later.m2x + dx * dx * na * nb / nf,
            m2y: self.m2y + later.m2y + dy * dy * na * nb / nf,
            cxy: self.cxy + later.cxy + dx * dy * na * nb / nf,
        }
    }
}

/// Corrected sample covariance over `(x, y)` pairs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CovFn;

impl ReduceFn<(f64, f64)> for CovFn {
    type Acc = CoMomentAcc;
    type Out = f64;

    fn create(&self, v: &(f64, f64)) -> CoMomentAcc {
        CoMomentAcc::seed(v.0, v.1)
    }

    fn add_input(&self, acc: &mut CoMomentAcc, v: &(f64, f64)) {
        acc.push(v.0, v.1);
    }

    fn merge(&self, earlier: &CoMomentAcc, later: &CoMomentAcc) -> CoMomentAcc {
        earlier.combine(later)
    }

    fn finish(&self, acc: &CoMomentAcc) -> f64 {
        acc.cxy / (acc.n - 1) as f64
    }

    fn should_tick(&self, acc: &CoMomentAcc) -> bool {
        acc.n >= 2
    }

    fn min_window(&self) -> usize {
        2
    }
}

/// Pearson correlation over `(x, y)` pairs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CorFn;

impl ReduceFn<(f64, f64)> for CorFn {
    type Acc = CoMomentAcc;
    type Out = f64;

    fn create(&self, v: &(f64, f64)) -> CoMomentAcc {
        CoMomentAcc::seed(v.0, v.1)
    }

    fn add_input(&self, acc: &mut CoMomentAcc, v: &(f64, f64)) {
        acc.push(v.0, v.1);
    }

    fn merge(&self, earlier: &CoMomentAcc, later: &CoMomentAcc) -> CoMomentAcc {
        earlier.combine(later)
    }

    fn finish(&self, acc: &CoMomentAcc) -> f64 {
        acc.cxy / (acc.m2x * acc.m2y).sqrt()
    }

    fn should_tick(&self, acc: &CoMomentAcc) -> bool {
        acc.n >= 2
    }

    fn min_window(&self) -> usize {
        2
    }
}

/* ===================== EmaOp ===================== */

/// Exponential moving average with smoothing factor `alpha` in `(0, 1]`.
///
/// Seeds on the first input, then `s ← α·x + (1 − α)·s`.
pub(crate) struct EmaOp {
    alpha: OrderedFloat<f64>,
}

impl EmaOp {
    pub(crate) fn new(alpha: f64) -> Self {
        Self {
            alpha: OrderedFloat(alpha),
        }
    }
}

impl OpKernel for EmaOp {
    fn name(&self) -> &str {
        "ema"
    }

    fn output_type(&self) -> TypeTag {
        TypeTag::of::<f64>()
    }

    fn flags(&self) -> OpFlags {
        OpFlags::STATEFUL
    }

    fn create_state(&self) -> NodeState {
        Box::new(None::<f64>)
    }

    fn run(&self, state: &mut NodeState, _span: Span, inputs: &[ErasedBlock]) -> Result<ErasedBlock> {
        let input = inputs[0].downcast::<f64>()?;
        let st = state_mut::<Option<f64>>(state)?;
        let alpha = self.alpha.into_inner();
        let mut times = Vec::with_capacity(input.len());
        let mut values = Vec::with_capacity(input.len());
        for (t, &x) in input.iter() {
            let s = match *st {
                None => x,
                Some(prev) => alpha * x + (1.0 - alpha) * prev,
            };
            *st = Some(s);
            times.push(t);
            values.push(s);
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
            .is_some_and(|o| self.alpha == o.alpha)
    }

    fn dyn_hash(&self, state: &mut dyn Hasher) {
        hash_kernel_type::<Self>(state);
        let mut state = state;
        self.alpha.hash(&mut state);
    }
}
