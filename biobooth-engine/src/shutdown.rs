//! Process-teardown signal shared by all background loops
//!
//! Acquisition threads run for the process lifetime in steady state; this
//! flag is checked each loop iteration so tests and process exit can tear
//! them down cleanly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable cancellation flag
#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request teardown of every loop holding a clone of this flag
    pub fn signal(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_signalled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
