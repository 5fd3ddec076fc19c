//! Immutable, time-ordered segments of knots.
//!
//! A [`Block<T>`] is the unit of data that flows along every graph edge: a
//! finite sequence of `(timestamp, value)` pairs with strictly increasing
//! timestamps and a uniform value type. Blocks are cheap to clone and cheap
//! to slice — both share the backing storage — and once a block has been
//! produced by an operator it must never be mutated.
//!
//! The runtime moves blocks between nodes type-erased as [`ErasedBlock`]s;
//! operators downcast back to the concrete `Block<T>` they expect. Timestamps
//! stay reachable through the erasure so generic machinery (tick counting,
//! merged-time walks, range checks) never needs the value type.

use crate::error::{Error, Result};
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// The blanket trait bound for values carried in a series.
///
/// The engine clones values into alignment state and may hand blocks to a
/// future multi-threaded evaluator, so all value types must be `'static`,
/// `Send + Sync`, and `Clone`.
pub trait KnotValue: 'static + Send + Sync + Clone {}
impl<T> KnotValue for T where T: 'static + Send + Sync + Clone {}

/// A single `(timestamp, value)` pair.
///
/// Mostly useful at the edges of the engine: building blocks from literals
/// and serializing block contents for storage outside the core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Knot<T> {
    /// The instant this observation is attached to.
    pub time: Timestamp,
    /// The observed value.
    pub value: T,
}

impl<T> Knot<T> {
    /// Construct a new knot.
    #[inline]
    pub fn new(time: Timestamp, value: T) -> Self {
        Self { time, value }
    }
}

/// An immutable, strictly-increasing run of knots.
///
/// Internally a block is a pair of shared vectors plus a window `[start, end)`
/// into them, so slicing never copies. Equality is structural (same times,
/// same values); [`Block::equal_times`] additionally offers a constant-time
/// *reference* check used by the alignment fast path.
pub struct Block<T> {
    times: Arc<Vec<Timestamp>>,
    values: Arc<Vec<T>>,
    start: usize,
    end: usize,
}

impl<T> Clone for Block<T> {
    fn clone(&self) -> Self {
        Self {
            times: Arc::clone(&self.times),
            values: Arc::clone(&self.values),
            start: self.start,
            end: self.end,
        }
    }
}

impl<T: KnotValue> Default for Block<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: KnotValue> Block<T> {
    /// A block with no knots.
    pub fn empty() -> Self {
        Self {
            times: Arc::new(Vec::new()),
            values: Arc::new(Vec::new()),
            start: 0,
            end: 0,
        }
    }

    /// Build a block from `(timestamp, value)` pairs.
    ///
    /// Fails with [`Error::InvalidInput`] unless timestamps are strictly
    /// increasing; duplicates are forbidden.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Timestamp, T)>) -> Result<Self> {
        let (times, values): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        Self::from_parts(times, values)
    }

    /// Build a block from parallel time and value vectors.
    pub fn from_parts(times: Vec<Timestamp>, values: Vec<T>) -> Result<Self> {
        if times.len() != values.len() {
            return Err(Error::invalid(format!(
                "block construction with {} times but {} values",
                times.len(),
                values.len()
            )));
        }
        if let Some(w) = times.windows(2).find(|w| w[0] >= w[1]) {
            return Err(Error::invalid(format!(
                "block timestamps must be strictly increasing, got {:?} then {:?}",
                w[0], w[1]
            )));
        }
        Ok(Self::from_parts_unchecked(times, values))
    }

    /// Build a block without validating the ordering invariant.
    ///
    /// For internal use where the invariant holds by construction (merge
    /// loops emit in strictly increasing time order). Checked in debug
    /// builds.
    pub(crate) fn from_parts_unchecked(times: Vec<Timestamp>, values: Vec<T>) -> Self {
        debug_assert_eq!(times.len(), values.len());
        debug_assert!(times.windows(2).all(|w| w[0] < w[1]));
        let end = times.len();
        Self {
            times: Arc::new(times),
            values: Arc::new(values),
            start: 0,
            end,
        }
    }

    /// Build a block from owned [`Knot`]s, validating the invariants.
    pub fn from_knots(knots: Vec<Knot<T>>) -> Result<Self> {
        Self::from_pairs(knots.into_iter().map(|k| (k.time, k.value)))
    }

    /// Copy the contents out as owned [`Knot`]s.
    pub fn to_knots(&self) -> Vec<Knot<T>> {
        self.iter()
            .map(|(t, v)| Knot::new(t, v.clone()))
            .collect()
    }

    /// Number of knots.
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// True if the block holds no knots.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The timestamp at position `i`.
    #[inline]
    pub fn time(&self, i: usize) -> Timestamp {
        self.times[self.start + i]
    }

    /// The value at position `i`.
    #[inline]
    pub fn value(&self, i: usize) -> &T {
        &self.values[self.start + i]
    }

    /// All timestamps in this block's window.
    #[inline]
    pub fn times(&self) -> &[Timestamp] {
        &self.times[self.start..self.end]
    }

    /// All values in this block's window.
    #[inline]
    pub fn values(&self) -> &[T] {
        &self.values[self.start..self.end]
    }

    /// Timestamp of the first knot, if any.
    pub fn first_time(&self) -> Option<Timestamp> {
        (!self.is_empty()).then(|| self.time(0))
    }

    /// Timestamp of the last knot, if any.
    pub fn last_time(&self) -> Option<Timestamp> {
        (!self.is_empty()).then(|| self.time(self.len() - 1))
    }

    /// Iterate `(timestamp, &value)` pairs in time order.
    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, &T)> + '_ {
        self.times().iter().copied().zip(self.values().iter())
    }

    /// Restrict to the knots with timestamps in `[t_start, t_end)`.
    ///
    /// A strict sub-range is returned as a view over the same backing
    /// storage; asking for the whole range hands back a clone of `self`, so
    /// the result still passes [`Block::equal_times`] against the original.
    pub fn slice(&self, t_start: Timestamp, t_end: Timestamp) -> Block<T> {
        let times = self.times();
        let lo = times.partition_point(|&t| t < t_start);
        let hi = times.partition_point(|&t| t < t_end).max(lo);
        if lo == 0 && hi == self.len() {
            return self.clone();
        }
        Block {
            times: Arc::clone(&self.times),
            values: Arc::clone(&self.values),
            start: self.start + lo,
            end: self.start + hi,
        }
    }

    /// Concatenate blocks in order, skipping empty ones.
    ///
    /// A single non-empty input is returned as-is (shared backing). The
    /// boundary between consecutive inputs must keep timestamps strictly
    /// increasing.
    pub fn concat(blocks: &[Block<T>]) -> Result<Block<T>> {
        let non_empty: Vec<&Block<T>> = blocks.iter().filter(|b| !b.is_empty()).collect();
        match non_empty.len() {
            0 => Ok(Block::empty()),
            1 => Ok(non_empty[0].clone()),
            _ => {
                let total: usize = non_empty.iter().map(|b| b.len()).sum();
                let mut times = Vec::with_capacity(total);
                let mut values = Vec::with_capacity(total);
                for b in non_empty {
                    if let (Some(&last), Some(first)) = (times.last(), b.first_time()) {
                        if first <= last {
                            return Err(Error::invalid(format!(
                                "concat would break ordering: {last:?} then {first:?}"
                            )));
                        }
                    }
                    times.extend_from_slice(b.times());
                    values.extend_from_slice(b.values());
                }
                Ok(Block::from_parts_unchecked(times, values))
            }
        }
    }

    /// Constant-time check that two blocks share an identical time vector.
    ///
    /// This compares backing references only. `true` guarantees the time
    /// sequences are identical; `false` says nothing (two separately-built
    /// blocks with equal times still compare `false`). The alignment kernel
    /// treats a `false` as "take the general merge loop", which is always
    /// correct.
    #[inline]
    pub fn equal_times<U: KnotValue>(&self, other: &Block<U>) -> bool {
        Arc::ptr_eq(&self.times, &other.times)
            && self.start == other.start
            && self.end == other.end
    }

    /// True if both blocks are views of the very same storage and window.
    pub(crate) fn same_backing(&self, other: &Block<T>) -> bool {
        Arc::ptr_eq(&self.times, &other.times)
            && Arc::ptr_eq(&self.values, &other.values)
            && self.start == other.start
            && self.end == other.end
    }

    /// Hashable stand-in for backing identity: storage address plus window.
    pub(crate) fn backing_key(&self) -> (usize, usize, usize) {
        (Arc::as_ptr(&self.times) as *const () as usize, self.start, self.end)
    }
}

impl Block<f64> {
    /// Structural equality with exact timestamps and approximate values.
    pub fn approx_eq(&self, other: &Block<f64>, tolerance: f64) -> bool {
        self.len() == other.len()
            && self.times() == other.times()
            && self
                .values()
                .iter()
                .zip(other.values())
                .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}

impl<T: KnotValue + PartialEq> PartialEq for Block<T> {
    fn eq(&self, other: &Self) -> bool {
        self.times() == other.times() && self.values() == other.values()
    }
}

impl<T: KnotValue + Eq> Eq for Block<T> {}

impl<T: KnotValue + fmt::Debug> fmt::Debug for Block<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.times().iter().zip(self.values().iter()))
            .finish()
    }
}

/// A type-erased block travelling along a graph edge.
///
/// The payload is the concrete `Block<T>` behind `dyn Any`; the time window
/// is duplicated alongside it so schedulers and time-only operators can read
/// timestamps without knowing `T`.
#[derive(Clone)]
pub struct ErasedBlock {
    payload: Arc<dyn Any + Send + Sync>,
    times: Arc<Vec<Timestamp>>,
    start: usize,
    end: usize,
}

impl ErasedBlock {
    /// Erase a typed block.
    pub fn new<T: KnotValue>(block: Block<T>) -> Self {
        let times = Arc::clone(&block.times);
        let (start, end) = (block.start, block.end);
        Self {
            payload: Arc::new(block),
            times,
            start,
            end,
        }
    }

    /// Recover the typed block, or report state corruption when the edge
    /// carried something else.
    pub fn downcast<T: KnotValue>(&self) -> Result<&Block<T>> {
        self.payload.downcast_ref::<Block<T>>().ok_or_else(|| {
            Error::corrupt(format!(
                "edge carried a block of the wrong value type (expected {})",
                std::any::type_name::<T>()
            ))
        })
    }

    /// The timestamps of the erased block.
    #[inline]
    pub fn times(&self) -> &[Timestamp] {
        &self.times[self.start..self.end]
    }

    /// Number of knots.
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// True if the erased block holds no knots.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Debug for ErasedBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedBlock")
            .field("len", &self.len())
            .field("first", &self.times().first())
            .field("last", &self.times().last())
            .finish()
    }
}
