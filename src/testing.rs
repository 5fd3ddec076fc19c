//! Testing utilities for graph pipelines.
//!
//! Helpers for writing idiomatic tests against the engine:
//!
//! - **Literal builders** — [`ts`], [`knots`], [`series_of`], and the
//!   fluent [`BlockBuilder`] for larger fixtures.
//! - **Assertions** — [`assert_block_eq`] and [`assert_block_approx`]
//!   compare a produced block against expected `(millis, value)` pairs with
//!   detailed panic messages.
//! - **Contract harnesses** — [`assert_batch_consistent`] re-evaluates a
//!   series over every prefix decomposition you give it and demands the
//!   concatenated result match the one-shot evaluation, which is the
//!   batch-consistency obligation every operator carries.
//!
//! # Example
//!
//! ```
//! use knotflow::testing::*;
//!
//! let x = series_of(&[(1, 10i64), (2, 20)]);
//! let doubled = x.map(|v: &i64| v * 2);
//! let out = doubled.evaluate(ts(0), ts(10)).unwrap();
//! assert_block_eq(&out, &[(1, 20), (2, 40)]);
//! ```

use crate::block::{Block, KnotValue};
use crate::series::{Series, block_node};
use crate::time::Timestamp;
use std::fmt::Debug;

/// Shorthand for [`Timestamp::from_millis`].
pub fn ts(millis: i64) -> Timestamp {
    Timestamp::from_millis(millis)
}

/// Build a block from `(millis, value)` literals.
///
/// # Panics
///
/// Panics if the literals violate the block invariants; this is a test
/// helper, and a bad fixture is a bug in the test.
pub fn knots<T: KnotValue>(pairs: &[(i64, T)]) -> Block<T> {
    Block::from_pairs(pairs.iter().map(|(t, v)| (ts(*t), v.clone())))
        .expect("test fixture violates block invariants")
}

/// Build a block-backed series from `(millis, value)` literals.
pub fn series_of<T: KnotValue>(pairs: &[(i64, T)]) -> Series<T> {
    block_node(knots(pairs))
}

/// Assert a block equals the expected `(millis, value)` literals, in order.
///
/// # Panics
///
/// Panics with a message naming the first mismatching position.
pub fn assert_block_eq<T>(actual: &Block<T>, expected: &[(i64, T)])
where
    T: KnotValue + PartialEq + Debug,
{
    assert_eq!(
        actual.len(),
        expected.len(),
        "block length mismatch:\n  expected {} knots: {expected:?}\n  actual {} knots: {actual:?}",
        expected.len(),
        actual.len()
    );
    for (i, ((at, av), (et, ev))) in actual.iter().zip(expected.iter()).enumerate() {
        assert!(
            at == ts(*et) && av == ev,
            "block mismatch at position {i}:\n  expected ({et}, {ev:?})\n  actual ({at:?}, {av:?})\n  full expected: {expected:?}\n  full actual: {actual:?}"
        );
    }
}

/// Assert a float block matches expected literals: timestamps exactly,
/// values within `tolerance`.
///
/// # Panics
///
/// Panics with a message naming the first mismatching position.
pub fn assert_block_approx(actual: &Block<f64>, expected: &[(i64, f64)], tolerance: f64) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "block length mismatch:\n  expected {} knots: {expected:?}\n  actual {} knots: {actual:?}",
        expected.len(),
        actual.len()
    );
    for (i, ((at, av), (et, ev))) in actual.iter().zip(expected.iter()).enumerate() {
        assert!(
            at == ts(*et) && (av - ev).abs() <= tolerance,
            "block mismatch at position {i} (tolerance {tolerance}):\n  expected ({et}, {ev})\n  actual ({at:?}, {av})"
        );
    }
}

/// Assert that evaluating `series` over `[t0, t1)` in one shot equals
/// evaluating it with batch boundaries at each of `splits` (millis,
/// strictly increasing, inside the interval), with state threaded through.
///
/// # Panics
///
/// Panics if any decomposition disagrees with the one-shot output.
pub fn assert_batch_consistent<T>(series: &Series<T>, t0: i64, t1: i64, splits: &[i64])
where
    T: KnotValue + PartialEq + Debug,
{
    let whole = series
        .evaluate(ts(t0), ts(t1))
        .expect("one-shot evaluation failed");

    let mut session = series.session_at(ts(t0));
    for &s in splits {
        assert!(t0 <= s && s <= t1, "split {s} outside [{t0}, {t1})");
        session
            .evaluate_until(ts(s))
            .expect("split evaluation failed");
    }
    session.evaluate_until(ts(t1)).expect("final batch failed");
    let pieced = session.output(series).expect("session output failed");

    assert!(
        whole == pieced,
        "batch decomposition at {splits:?} diverged:\n  one-shot: {whole:?}\n  pieced:   {pieced:?}"
    );
}

/// A fluent builder for block fixtures.
///
/// ```
/// use knotflow::testing::BlockBuilder;
///
/// let block = BlockBuilder::new()
///     .knot(1, 1.0)
///     .ramp(10, 5, &[2.0, 3.0, 4.0])
///     .build();
/// assert_eq!(block.len(), 4);
/// ```
#[derive(Default)]
pub struct BlockBuilder<T> {
    pairs: Vec<(i64, T)>,
}

impl<T: KnotValue> BlockBuilder<T> {
    /// An empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Add a single knot at `millis`.
    #[must_use]
    pub fn knot(mut self, millis: i64, value: T) -> Self {
        self.pairs.push((millis, value));
        self
    }

    /// Add evenly spaced knots starting at `start` with `step` millis
    /// between them.
    #[must_use]
    pub fn ramp(mut self, start: i64, step: i64, values: &[T]) -> Self {
        for (i, v) in values.iter().enumerate() {
            self.pairs.push((start + step * i as i64, v.clone()));
        }
        self
    }

    /// Number of knots added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// True if nothing has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Finish into a block.
    ///
    /// # Panics
    ///
    /// Panics if the accumulated knots violate the block invariants.
    #[must_use]
    pub fn build(self) -> Block<T> {
        knots(&self.pairs)
    }

    /// Finish into a block-backed series.
    #[must_use]
    pub fn build_series(self) -> Series<T> {
        block_node(self.build())
    }
}
