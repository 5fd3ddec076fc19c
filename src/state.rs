//! Opaque per-node evaluation state.
//!
//! Each node in a session owns one [`NodeState`]: a type-erased, clonable
//! box of whatever its kernel needs to carry between batches (latest values
//! and validity for alignment, ring buffers for lags, accumulators for
//! reductions). The scheduler threads it through every `run` call; kernels
//! downcast to their concrete state type.
//!
//! States must be clonable so a whole session can be forked with
//! `Session::duplicate` — the graph and all produced blocks are shared, the
//! mutable state is deep-copied.

use crate::error::{Error, Result};
use std::any::Any;

/// A clonable, type-erased state value.
///
/// Blanket-implemented for anything `Any + Send + Clone`; kernels never
/// implement this by hand.
pub trait StateVal: Any + Send {
    /// Deep-copy the state.
    fn clone_state(&self) -> NodeState;
    /// Upcast for downcasting.
    fn as_any(&self) -> &dyn Any;
    /// Mutable upcast for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any + Send + Clone> StateVal for T {
    fn clone_state(&self) -> NodeState {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The state box carried per node per session.
pub type NodeState = Box<dyn StateVal>;

impl Clone for Box<dyn StateVal> {
    fn clone(&self) -> Self {
        self.clone_state()
    }
}

/// The placeholder state of operators that keep nothing between batches.
#[derive(Clone, Copy, Default, Debug)]
pub struct EmptyState;

/// Fresh placeholder state for a stateless kernel.
pub fn empty_state() -> NodeState {
    Box::new(EmptyState)
}

/// Borrow a kernel's concrete state mutably.
pub(crate) fn state_mut<T: Any>(state: &mut NodeState) -> Result<&mut T> {
    state.as_any_mut().downcast_mut::<T>().ok_or_else(|| {
        Error::corrupt(format!(
            "node state had the wrong type (expected {})",
            std::any::type_name::<T>()
        ))
    })
}
