pub mod classify;
pub mod clean;
pub mod comments;
pub mod dataset;
pub mod filters;

pub use classify::*;
pub use clean::*;
pub use comments::*;
pub use dataset::*;
pub use filters::*;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag, checked between API pages and inference
/// batches. Never interrupts work mid-batch.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
