//! The typed handle over the untyped node graph.
//!
//! A [`Series<T>`] is a `PhantomData`-typed wrapper around an interned
//! [`NodeRef`]. It is cheap to clone, and every transformation method builds
//! a new node through the identity map — so two structurally identical
//! expressions hand back the *same* series, and equality on `Series` is node
//! identity.
//!
//! Construction is where the engine's algebraic identities live: lag by
//! zero, lag of a constant, `first_knot` of a `first_knot`, and friends are
//! rewritten to their fixed points here, before any kernel is built.
//!
//! Arithmetic between series (and between a series and a plain value) is
//! generated below for `+ - * /`; every operator also has an `_aligned`
//! variant taking an explicit [`Alignment`].

use crate::align::{BinaryOp, NaryOp, ScanOp, UnaryOp};
use crate::block::{Block, KnotValue};
use crate::error::{Error, Result};
use crate::identity::obtain;
use crate::node::NodeRef;
use crate::op::{Alignment, OpFlags, OpKernel, OpToken};
use crate::ops::combinators::FirstKnotOp;
use crate::ops::lag::{LagOp, TimeLagOp};
use crate::ops::reduce::{InceptionOp, ReduceFn, TimeWindowOp, WindowOp};
use crate::ops::stats::{CorFn, CovFn, EmaOp, MeanFn, ProdFn, StdFn, SumFn, VarFn};
use crate::scheduler::Session;
use crate::sources::{AdapterOp, BlockOp, ConstantOp, EmptyOp, SourceAdapter, adapter_fn};
use crate::time::{Duration, Timestamp};
use std::marker::PhantomData;
use std::ops::{Add, Div, Mul, Sub};
use std::sync::Arc;

/// A typed time series: a handle to one node of the computational graph.
pub struct Series<T> {
    node: NodeRef,
    _t: PhantomData<fn() -> T>,
}

impl<T> Clone for Series<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            _t: PhantomData,
        }
    }
}

/// Series equality is node identity: two handles are equal iff they denote
/// the same interned expression.
impl<T> PartialEq for Series<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl<T> Eq for Series<T> {}

impl<T> std::fmt::Debug for Series<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Series[{:?}]", self.node)
    }
}

/// Type-erased view of a series, for operations that only care about ticks.
pub trait AnySeries {
    /// The underlying graph node.
    fn node_ref(&self) -> &NodeRef;
}

impl<T: KnotValue> AnySeries for Series<T> {
    fn node_ref(&self) -> &NodeRef {
        &self.node
    }
}

impl<T: KnotValue> Series<T> {
    pub(crate) fn from_node(node: NodeRef) -> Self {
        debug_assert_eq!(
            node.output_type().id,
            crate::op::TypeTag::of::<T>().id,
            "series type does not match node output type"
        );
        Self {
            node,
            _t: PhantomData,
        }
    }

    /// The underlying graph node.
    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    fn unary(&self, op: impl OpKernel) -> NodeRef {
        obtain(
            std::slice::from_ref(&self.node),
            Arc::new(op) as Arc<dyn OpKernel>,
        )
    }

    /* ---------- evaluation sugar ---------- */

    /// Evaluate this series alone over `[t_start, t_end)` in a single batch.
    pub fn evaluate(&self, t_start: Timestamp, t_end: Timestamp) -> Result<Block<T>> {
        let session =
            crate::scheduler::evaluate_nodes(std::slice::from_ref(&self.node), t_start, t_end, None)?;
        session.output(self)
    }

    /// Evaluate over `[t_start, t_end)` in batches of `step`.
    pub fn evaluate_batched(
        &self,
        t_start: Timestamp,
        t_end: Timestamp,
        step: Duration,
    ) -> Result<Block<T>> {
        let session = crate::scheduler::evaluate_nodes(
            std::slice::from_ref(&self.node),
            t_start,
            t_end,
            Some(step),
        )?;
        session.output(self)
    }

    /// Start an incremental session rooted at this series.
    pub fn session_at(&self, t_start: Timestamp) -> Session {
        Session::start_at(std::slice::from_ref(&self.node), t_start)
    }

    /* ---------- wrapped user functions ---------- */

    /// Apply a pure function to every value.
    pub fn map<O: KnotValue>(&self, f: impl Fn(&T) -> O + Send + Sync + 'static) -> Series<O> {
        let op = UnaryOp::<T, O>::new(OpToken::unique(), OpFlags::ELEMENTWISE, move |_, v| {
            Some(f(v))
        });
        Series::from_node(self.unary(op))
    }

    /// Keep only the knots whose value satisfies `pred`.
    pub fn filter(&self, pred: impl Fn(&T) -> bool + Send + Sync + 'static) -> Series<T> {
        let op = UnaryOp::<T, T>::new(OpToken::unique(), OpFlags::SIEVE, move |_, v| {
            pred(v).then(|| v.clone())
        });
        Series::from_node(self.unary(op))
    }

    /// Apply a user operator under the full contract: the declared `flags`
    /// drive kernel dispatch, and returning `None` suppresses the knot.
    pub fn apply<O: KnotValue>(
        &self,
        flags: OpFlags,
        f: impl Fn(Timestamp, &T) -> Option<O> + Send + Sync + 'static,
    ) -> Series<O> {
        let op = UnaryOp::<T, O>::new(OpToken::unique(), flags, f);
        Series::from_node(self.unary(op))
    }

    /// Apply a stateful user operator. `seed` is cloned into every fresh
    /// session, so any randomness must be captured in it deterministically.
    pub fn scan<S, O>(
        &self,
        seed: S,
        f: impl Fn(&mut S, Timestamp, &T) -> Option<O> + Send + Sync + 'static,
    ) -> Series<O>
    where
        S: Clone + Send + Sync + 'static,
        O: KnotValue,
    {
        Series::from_node(self.unary(ScanOp::new(seed, f)))
    }

    /* ---------- lagging ---------- */

    /// Delay values by `n` knots: emits the value from `n` ticks ago at each
    /// new tick. Lag by zero, or of a node that ticks at most once, is the
    /// series itself.
    pub fn lag(&self, n: usize) -> Series<T> {
        if n == 0 || self.node.op().is_constant() || self.node.op().never_ticks() {
            return self.clone();
        }
        Series::from_node(self.unary(LagOp::<T>::new(n)))
    }

    /// Delay every knot by `delta` wall-clock time.
    pub fn lag_time(&self, delta: Duration) -> Result<Series<T>> {
        if delta.is_negative() {
            return Err(Error::invalid(format!("cannot lag by negative {delta:?}")));
        }
        if delta.is_zero() || self.node.op().is_constant() || self.node.op().never_ticks() {
            return Ok(self.clone());
        }
        Ok(Series::from_node(self.unary(TimeLagOp::<T>::new(delta))))
    }

    /// `x - lag(x, n)`, the n-knot difference.
    pub fn diff(&self, n: usize) -> Series<T>
    where
        T: Sub<Output = T> + PartialEq,
    {
        sub(self, &self.lag(n))
    }

    /* ---------- small state machines ---------- */

    /// Only the first knot ever. Idempotent by construction:
    /// `first_knot(first_knot(x))` is the same node as `first_knot(x)`.
    pub fn first_knot(&self) -> Series<T> {
        let op = self.node.op();
        if op.as_any().downcast_ref::<FirstKnotOp<T>>().is_some()
            || op.is_constant()
            || op.never_ticks()
        {
            return self.clone();
        }
        Series::from_node(self.unary(FirstKnotOp::<T>::new()))
    }

    /// Emit the first of every `n` consecutive knots. `throttle(1)` is the
    /// series itself.
    pub fn throttle(&self, n: usize) -> Result<Series<T>> {
        if n == 0 {
            return Err(Error::invalid("throttle factor must be at least 1"));
        }
        if n == 1 {
            return Ok(self.clone());
        }
        Ok(Series::from_node(
            self.unary(crate::ops::combinators::ThrottleOp::<T>::new(n as u64)),
        ))
    }

    /// Running count of knots, ticking with the input.
    pub fn count_knots(&self) -> Series<i64> {
        Series::from_node(self.unary(crate::ops::combinators::CountKnotsOp::<T>::new()))
    }

    /// The last ≤ `n` values as a vector, ticking with the input.
    pub fn history(&self, n: usize) -> Result<Series<Vec<T>>> {
        if n == 0 {
            return Err(Error::invalid("history length must be at least 1"));
        }
        Ok(Series::from_node(
            self.unary(crate::ops::combinators::HistoryOp::<T>::new(n)),
        ))
    }

    /* ---------- reductions ---------- */

    /// Cumulative reduction since the first knot.
    pub fn fold<R: ReduceFn<T>>(&self, reducer: R) -> Series<R::Out> {
        Series::from_node(self.unary(InceptionOp::new(reducer)))
    }

    /// Reduction over the last `n` knots. With `emit_early` the node ticks
    /// from the first knot; otherwise only full windows emit.
    pub fn fold_window<R: ReduceFn<T>>(
        &self,
        reducer: R,
        n: usize,
        emit_early: bool,
    ) -> Result<Series<R::Out>> {
        if n < reducer.min_window().max(1) {
            return Err(Error::invalid(format!(
                "window of {n} below this reduction's minimum of {}",
                reducer.min_window().max(1)
            )));
        }
        Ok(Series::from_node(self.unary(WindowOp::new(reducer, n, emit_early))))
    }

    /// Reduction over the knots in `(t − width, t]`.
    pub fn fold_over<R: ReduceFn<T>>(
        &self,
        reducer: R,
        width: Duration,
        emit_early: bool,
    ) -> Result<Series<R::Out>> {
        if width.millis() <= 0 {
            return Err(Error::invalid(format!(
                "time window width must be positive, got {width:?}"
            )));
        }
        Ok(Series::from_node(
            self.unary(TimeWindowOp::new(reducer, width, emit_early)),
        ))
    }
}

impl<T: KnotValue + Add<Output = T>> Series<T> {
    /// Cumulative sum since inception.
    pub fn sum(&self) -> Series<T> {
        self.fold(SumFn::new())
    }

    /// Sum of the last `n` knots.
    pub fn sum_window(&self, n: usize, emit_early: bool) -> Result<Series<T>> {
        self.fold_window(SumFn::new(), n, emit_early)
    }

    /// Sum of the knots in `(t − width, t]`.
    pub fn sum_over(&self, width: Duration, emit_early: bool) -> Result<Series<T>> {
        self.fold_over(SumFn::new(), width, emit_early)
    }
}

impl<T: KnotValue + Mul<Output = T>> Series<T> {
    /// Cumulative product since inception.
    pub fn prod(&self) -> Series<T> {
        self.fold(ProdFn::new())
    }

    /// Product of the last `n` knots.
    pub fn prod_window(&self, n: usize, emit_early: bool) -> Result<Series<T>> {
        self.fold_window(ProdFn::new(), n, emit_early)
    }

    /// Product of the knots in `(t − width, t]`.
    pub fn prod_over(&self, width: Duration, emit_early: bool) -> Result<Series<T>> {
        self.fold_over(ProdFn::new(), width, emit_early)
    }
}

impl Series<f64> {
    /// Running mean since inception.
    pub fn mean(&self) -> Series<f64> {
        self.fold(MeanFn)
    }

    /// Mean of the last `n` knots.
    pub fn mean_window(&self, n: usize, emit_early: bool) -> Result<Series<f64>> {
        self.fold_window(MeanFn, n, emit_early)
    }

    /// Mean of the knots in `(t − width, t]`.
    pub fn mean_over(&self, width: Duration, emit_early: bool) -> Result<Series<f64>> {
        self.fold_over(MeanFn, width, emit_early)
    }

    /// Corrected sample variance since inception; silent until two knots.
    pub fn var(&self) -> Series<f64> {
        self.fold(VarFn)
    }

    /// Variance of the last `n` knots; `n` must be at least 2.
    pub fn var_window(&self, n: usize, emit_early: bool) -> Result<Series<f64>> {
        self.fold_window(VarFn, n, emit_early)
    }

    /// Variance of the knots in `(t − width, t]`.
    pub fn var_over(&self, width: Duration, emit_early: bool) -> Result<Series<f64>> {
        self.fold_over(VarFn, width, emit_early)
    }

    /// Corrected sample standard deviation since inception.
    pub fn std(&self) -> Series<f64> {
        self.fold(StdFn)
    }

    /// Standard deviation of the last `n` knots; `n` must be at least 2.
    pub fn std_window(&self, n: usize, emit_early: bool) -> Result<Series<f64>> {
        self.fold_window(StdFn, n, emit_early)
    }

    /// Standard deviation of the knots in `(t − width, t]`.
    pub fn std_over(&self, width: Duration, emit_early: bool) -> Result<Series<f64>> {
        self.fold_over(StdFn, width, emit_early)
    }

    /// Exponential moving average with smoothing factor in `(0, 1]`.
    pub fn ema(&self, alpha: f64) -> Result<Series<f64>> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(Error::invalid(format!(
                "ema smoothing factor must be in (0, 1], got {alpha}"
            )));
        }
        Ok(Series::from_node(self.unary(EmaOp::new(alpha))))
    }
}

/* ===================== sources ===================== */

/// A node whose value is `v` over all time; it ticks once at the start of
/// evaluation.
pub fn constant<T: KnotValue + PartialEq>(value: T) -> Series<T> {
    Series::from_node(obtain(&[], Arc::new(ConstantOp::new(value)) as Arc<dyn OpKernel>))
}

/// A node that never ticks.
pub fn empty_node<T: KnotValue>() -> Series<T> {
    Series::from_node(obtain(&[], Arc::new(EmptyOp::<T>::new()) as Arc<dyn OpKernel>))
}

/// A node backed by an in-memory block; evaluation slices it per batch.
pub fn block_node<T: KnotValue>(block: Block<T>) -> Series<T> {
    Series::from_node(obtain(&[], Arc::new(BlockOp::new(block)) as Arc<dyn OpKernel>))
}

/// A node fed by an external [`SourceAdapter`].
pub fn source<T: KnotValue>(adapter: Arc<dyn SourceAdapter<T>>) -> Series<T> {
    Series::from_node(obtain(&[], Arc::new(AdapterOp::new(adapter)) as Arc<dyn OpKernel>))
}

/// A node fed by a stateless closure `span -> block`.
pub fn source_fn<T, F>(f: F) -> Series<T>
where
    T: KnotValue,
    F: Fn(crate::time::Span) -> anyhow::Result<Block<T>> + Send + Sync + 'static,
{
    source(adapter_fn(f))
}

/* ===================== binary application ===================== */

/// Apply a user binary operator under an alignment policy.
pub fn apply_binary<A, B, O>(
    a: &Series<A>,
    b: &Series<B>,
    alignment: Alignment,
    flags: OpFlags,
    f: impl Fn(Timestamp, &A, &B) -> Option<O> + Send + Sync + 'static,
) -> Series<O>
where
    A: KnotValue,
    B: KnotValue,
    O: KnotValue,
{
    let op = BinaryOp::<A, B, O>::new(OpToken::unique(), flags, alignment, f);
    binary_node(a, b, op)
}

/// [`apply_binary`] with initial values seeding the inputs' validity. The
/// anchor of a `Left` alignment ignores its seed; `Intersect` ignores both.
pub fn apply_binary_with_initials<A, B, O>(
    a: &Series<A>,
    b: &Series<B>,
    alignment: Alignment,
    flags: OpFlags,
    initial_a: Option<A>,
    initial_b: Option<B>,
    f: impl Fn(Timestamp, &A, &B) -> Option<O> + Send + Sync + 'static,
) -> Series<O>
where
    A: KnotValue + PartialEq,
    B: KnotValue + PartialEq,
    O: KnotValue,
{
    let op = BinaryOp::<A, B, O>::new(OpToken::unique(), flags, alignment, f)
        .with_initials(initial_a, initial_b);
    binary_node(a, b, op)
}

/// Apply a user operator over any number of same-typed series.
///
/// The operator receives one value per input, in input order, each the
/// latest at or before the output time chosen by `alignment`.
pub fn apply_many<T, O>(
    inputs: &[Series<T>],
    alignment: Alignment,
    flags: OpFlags,
    f: impl Fn(Timestamp, &[T]) -> Option<O> + Send + Sync + 'static,
) -> Result<Series<O>>
where
    T: KnotValue,
    O: KnotValue,
{
    if inputs.is_empty() {
        return Err(Error::invalid("aligned application requires at least one input"));
    }
    let op = NaryOp::<T, O>::new(OpToken::unique(), flags, alignment, inputs.len(), f);
    let parents: Vec<NodeRef> = inputs.iter().map(|s| Arc::clone(s.node())).collect();
    Ok(Series::from_node(obtain(&parents, Arc::new(op) as Arc<dyn OpKernel>)))
}

/// [`apply_many`] with one optional initial value per input (the anchor of
/// a `Left` alignment ignores its slot; `Intersect` ignores all of them).
pub fn apply_many_with_initials<T, O>(
    inputs: &[Series<T>],
    alignment: Alignment,
    flags: OpFlags,
    initials: Vec<Option<T>>,
    f: impl Fn(Timestamp, &[T]) -> Option<O> + Send + Sync + 'static,
) -> Result<Series<O>>
where
    T: KnotValue + PartialEq,
    O: KnotValue,
{
    if inputs.is_empty() {
        return Err(Error::invalid("aligned application requires at least one input"));
    }
    if initials.len() != inputs.len() {
        return Err(Error::invalid(format!(
            "{} initial values for {} inputs",
            initials.len(),
            inputs.len()
        )));
    }
    let op = NaryOp::<T, O>::new(OpToken::unique(), flags, alignment, inputs.len(), f)
        .with_initials(initials);
    let parents: Vec<NodeRef> = inputs.iter().map(|s| Arc::clone(s.node())).collect();
    Ok(Series::from_node(obtain(&parents, Arc::new(op) as Arc<dyn OpKernel>)))
}

/// Zip two series into `(a, b)` pairs under an alignment policy.
pub fn pair<A, B>(a: &Series<A>, b: &Series<B>, alignment: Alignment) -> Series<(A, B)>
where
    A: KnotValue,
    B: KnotValue,
{
    let op = BinaryOp::<A, B, (A, B)>::new(
        OpToken::Named("pair"),
        OpFlags::ELEMENTWISE,
        alignment,
        |_, x, y| Some((x.clone(), y.clone())),
    );
    binary_node(a, b, op)
}

fn binary_node<A, B, O>(a: &Series<A>, b: &Series<B>, op: BinaryOp<A, B, O>) -> Series<O>
where
    A: KnotValue,
    B: KnotValue,
    O: KnotValue,
{
    let parents = [Arc::clone(a.node()), Arc::clone(b.node())];
    Series::from_node(obtain(&parents, Arc::new(op) as Arc<dyn OpKernel>))
}

/* ===================== covariance family ===================== */

/// Covariance of two series since inception, union-aligned pairing.
pub fn cov(x: &Series<f64>, y: &Series<f64>, alignment: Alignment) -> Series<f64> {
    pair(x, y, alignment).fold(CovFn)
}

/// Covariance over the last `n` aligned pairs; `n` must be at least 2.
pub fn cov_window(
    x: &Series<f64>,
    y: &Series<f64>,
    alignment: Alignment,
    n: usize,
    emit_early: bool,
) -> Result<Series<f64>> {
    pair(x, y, alignment).fold_window(CovFn, n, emit_early)
}

/// Covariance over the aligned pairs in `(t − width, t]`.
pub fn cov_over(
    x: &Series<f64>,
    y: &Series<f64>,
    alignment: Alignment,
    width: Duration,
    emit_early: bool,
) -> Result<Series<f64>> {
    pair(x, y, alignment).fold_over(CovFn, width, emit_early)
}

/// Pearson correlation of two series since inception.
pub fn cor(x: &Series<f64>, y: &Series<f64>, alignment: Alignment) -> Series<f64> {
    pair(x, y, alignment).fold(CorFn)
}

/// Correlation over the last `n` aligned pairs; `n` must be at least 2.
pub fn cor_window(
    x: &Series<f64>,
    y: &Series<f64>,
    alignment: Alignment,
    n: usize,
    emit_early: bool,
) -> Result<Series<f64>> {
    pair(x, y, alignment).fold_window(CorFn, n, emit_early)
}

/// Correlation over the aligned pairs in `(t − width, t]`.
pub fn cor_over(
    x: &Series<f64>,
    y: &Series<f64>,
    alignment: Alignment,
    width: Duration,
    emit_early: bool,
) -> Result<Series<f64>> {
    pair(x, y, alignment).fold_over(CorFn, width, emit_early)
}

/* ===================== arithmetic ===================== */

macro_rules! arith_ops {
    ($(($name:ident, $trait:ident, $method:ident)),+ $(,)?) => {
        $(
            paste::paste! {
                #[doc = "Union-aligned element-wise `" $name "` of two series."]
                pub fn $name<T>(a: &Series<T>, b: &Series<T>) -> Series<T>
                where
                    T: KnotValue + $trait<Output = T> + PartialEq,
                {
                    [<$name _aligned>](a, b, Alignment::Union)
                }

                #[doc = "Element-wise `" $name "` under an explicit alignment policy."]
                pub fn [<$name _aligned>]<T>(
                    a: &Series<T>,
                    b: &Series<T>,
                    alignment: Alignment,
                ) -> Series<T>
                where
                    T: KnotValue + $trait<Output = T> + PartialEq,
                {
                    let op = BinaryOp::<T, T, T>::new(
                        OpToken::Named(stringify!($name)),
                        OpFlags::ELEMENTWISE,
                        alignment,
                        |_, x: &T, y: &T| Some(x.clone().$method(y.clone())),
                    )
                    .foldable();
                    binary_node(a, b, op)
                }

                impl<T> $trait for &Series<T>
                where
                    T: KnotValue + $trait<Output = T> + PartialEq,
                {
                    type Output = Series<T>;
                    fn $method(self, rhs: &Series<T>) -> Series<T> {
                        $name(self, rhs)
                    }
                }

                impl<T> $trait for Series<T>
                where
                    T: KnotValue + $trait<Output = T> + PartialEq,
                {
                    type Output = Series<T>;
                    fn $method(self, rhs: Series<T>) -> Series<T> {
                        $name(&self, &rhs)
                    }
                }

                impl<T> $trait<T> for &Series<T>
                where
                    T: KnotValue + $trait<Output = T> + PartialEq,
                {
                    type Output = Series<T>;
                    fn $method(self, rhs: T) -> Series<T> {
                        $name(self, &constant(rhs))
                    }
                }
            }
        )+
    };
}

arith_ops!(
    (add, Add, add),
    (sub, Sub, sub),
    (mul, Mul, mul),
    (div, Div, div),
);

/* ===================== comparisons ===================== */

macro_rules! cmp_ops {
    ($(($name:ident, $op:tt)),+ $(,)?) => {
        $(
            #[doc = concat!("Union-aligned element-wise `", stringify!($op), "` producing a boolean series.")]
            pub fn $name<T>(a: &Series<T>, b: &Series<T>) -> Series<bool>
            where
                T: KnotValue + PartialOrd,
            {
                let op = BinaryOp::<T, T, bool>::new(
                    OpToken::Named(stringify!($name)),
                    OpFlags::ELEMENTWISE,
                    Alignment::Union,
                    |_, x: &T, y: &T| Some(x $op y),
                )
                .foldable();
                binary_node(a, b, op)
            }
        )+
    };
}

cmp_ops!((gt, >), (lt, <), (ge, >=), (le, <=));
