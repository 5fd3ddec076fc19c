//! Built-in operator kernels.
//!
//! - [`reduce`] — the inception and window scaffolds every associative
//!   reduction runs on.
//! - [`stats`] — the numeric reducers (sum, product, mean, variance,
//!   covariance, correlation) and the exponential moving average.
//! - [`lag`] — knot-count and wall-clock lagging.
//! - [`combinators`] — the small explicit state machines (merge, prepend,
//!   align, throttle, …) and thin compositions over the other kernels.

pub mod combinators;
pub mod lag;
pub mod reduce;
pub mod stats;
