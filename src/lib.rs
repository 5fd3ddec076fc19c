//! # Knotflow
//!
//! A **computational graph engine for irregular time series**. Knotflow lets
//! you compose operations over strictly-ordered series declaratively, then
//! pull concrete data through the resulting DAG over any time interval —
//! one shot for history, batch by batch for live use.
//!
//! ## Key ideas
//!
//! - **Knots and blocks** — a series is a sequence of `(timestamp, value)`
//!   *knots*; data moves through the graph as immutable, strictly-increasing
//!   [`Block`]s.
//! - **Structural identity** — building the same expression twice hands back
//!   the *same node*. Shared sub-expressions are computed once per
//!   evaluation, and constants fold at construction time:
//!   `constant(1) + constant(2)` *is* `constant(3)`.
//! - **Alignment** — multi-input operators join irregular inputs under
//!   [`Alignment::Union`], [`Alignment::Intersect`], or [`Alignment::Left`],
//!   pairing each output time with the latest-at-or-before value of every
//!   input. No operator can peek at the future.
//! - **Batched evaluation** — a [`Session`] pushes contiguous time batches
//!   through the graph in topological order, threading opaque per-node state
//!   so that any decomposition of an interval yields identical output.
//!
//! ## Quick start
//!
//! ```
//! use knotflow::*;
//! use knotflow::testing::{series_of, ts};
//!
//! # fn main() -> knotflow::Result<()> {
//! let left = series_of(&[(1, 1.0f64), (2, 2.0), (3, 3.0)]);
//! let right = series_of(&[(2, 10.0f64), (3, 20.0)]);
//!
//! // Union-aligned arithmetic: ticks once both sides have a value.
//! let spread = &left - &right;
//! let smoothed = spread.ema(0.5)?;
//!
//! let out = smoothed.evaluate(ts(0), ts(10))?;
//! assert_eq!(out.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Incremental (live) evaluation
//!
//! ```
//! use knotflow::*;
//! use knotflow::testing::{series_of, ts};
//!
//! # fn main() -> knotflow::Result<()> {
//! let x = series_of(&[(1, 1i64), (5, 2), (9, 3)]);
//! let total = x.sum();
//!
//! let mut session = total.session_at(ts(0));
//! session.evaluate_until(ts(6))?;   // first batch: [0, 6)
//! session.evaluate_until(ts(20))?;  // second batch: [6, 20)
//!
//! let out = session.output(&total)?;
//! assert_eq!(out.values(), &[1, 3, 6]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core concepts
//!
//! ### `Series<T>`
//!
//! A [`Series`] is a cheap typed handle to one node of the graph.
//! Transformation methods (`map`, `lag`, `sum_window`, …) and the free
//! combinators (`merge`, `align`, `cov`, …) build new nodes; nothing is
//! computed until evaluation. Series equality is node identity.
//!
//! ### Sources
//!
//! Knots enter through source nodes: [`constant`], [`empty_node`],
//! [`block_node`] for in-memory data, and [`source`] for external
//! [`SourceAdapter`]s (file readers, generators, feeds) that honour the
//! operator contract.
//!
//! ### Reductions
//!
//! Associative reductions ride two scaffolds: cumulative-since-inception
//! (`fold`) and last-`n`-knots windows (`fold_window`, plus the wall-clock
//! `fold_over`). The built-in statistics — sum, product, mean, variance,
//! standard deviation, covariance, correlation — are just [`ReduceFn`]s;
//! user reductions plug in the same way.
//!
//! ### Sessions
//!
//! [`evaluate_nodes`] (or `Series::evaluate`) covers the one-shot case.
//! For live updates, [`Session::start_at`] then repeated
//! [`Session::evaluate_until`] calls pull data through in batches;
//! [`Session::duplicate`] forks a run, sharing the graph and all produced
//! blocks while deep-copying the mutable state.
//!
//! ## Module overview
//!
//! - [`block`] — knots, blocks, and the type-erased edge payload
//! - [`time`] — timestamps, durations, batch spans
//! - [`series`] — the typed handle and construction surface
//! - [`op`] — the dynamic operator protocol and capability flags
//! - [`align`] — the union/intersect/left merge loops and wrapped operators
//! - [`ops`] — built-in kernels: reductions, statistics, lags, combinators
//! - [`identity`] — the deduplicating node factory
//! - [`scheduler`] — sessions and the batched evaluator
//! - [`sources`] — source kernels and the adapter seam
//! - [`testing`] — block builders, assertions, and contract harnesses

pub mod align;
pub mod block;
pub mod error;
pub mod graph;
pub mod identity;
pub mod node;
pub mod op;
pub mod ops;
pub mod scheduler;
pub mod series;
pub mod sources;
pub mod state;
pub mod testing;
pub mod time;

// Data model
pub use block::{Block, ErasedBlock, Knot, KnotValue};
pub use time::{Duration, Span, Timestamp};

// Errors
pub use error::{Error, Result};

// Graph model
pub use identity::{IdentityMap, obtain};
pub use node::{Node, NodeRef};
pub use op::{Alignment, OpFlags, OpKernel, TypeTag};

// Evaluation
pub use scheduler::{Session, evaluate_nodes};
pub use state::{EmptyState, NodeState, StateVal, empty_state};

// Construction surface
pub use series::{
    AnySeries, Series, add, add_aligned, apply_binary, apply_binary_with_initials, apply_many,
    apply_many_with_initials, block_node, constant, cor, cor_over, cor_window, cov, cov_over,
    cov_window, div, div_aligned, empty_node, ge, gt, le, lt, mul, mul_aligned, pair, source,
    source_fn, sub, sub_aligned,
};

pub use ops::combinators::{
    active_count, align, align_once, coalign, coalign_many, filter_by, merge, prepend,
    skip_missing, tick_times,
};
pub use ops::reduce::ReduceFn;
pub use ops::stats::{CorFn, CovFn, MeanFn, ProdFn, StdFn, SumFn, VarFn};
pub use sources::{SourceAdapter, adapter_fn};
