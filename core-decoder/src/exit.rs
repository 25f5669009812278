//! Per-stream cancellation flag.
//!
//! Every retry loop in the pipeline waits on this flag instead of sleeping,
//! so a stop request wakes all of them immediately.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Default)]
pub struct ExitFlag {
    inner: Arc<ExitInner>,
}

#[derive(Default)]
struct ExitInner {
    set: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

impl ExitFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every thread sharing this flag to unwind.
    pub fn request(&self) {
        let _guard = self.inner.lock.lock();
        self.inner.set.store(true, Ordering::Release);
        self.inner.cond.notify_all();
    }

    pub fn is_set(&self) -> bool {
        self.inner.set.load(Ordering::Acquire)
    }

    /// Re-arm the flag before threads are started again.
    pub fn reset(&self) {
        self.inner.set.store(false, Ordering::Release);
    }

    /// Sleep for at most `timeout`, returning early on exit.
    ///
    /// Returns `true` if exit was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut guard = self.inner.lock.lock();
        if self.is_set() {
            return true;
        }
        self.inner.cond.wait_for(&mut guard, timeout);
        self.is_set()
    }
}

impl std::fmt::Debug for ExitFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitFlag").field("set", &self.is_set()).finish()
    }
}
