//! Scoped submission control.
//!
//! A [`Gate`] is held for the lifetime of one request. Acquiring it yields a
//! [`GatePermit`]; dropping the permit releases the gate, so every exit path
//! of the holder releases it exactly once.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct GateInner {
    held: AtomicBool,
    released: Notify,
}

/// A cloneable mutual-exclusion flag for a submission control.
///
/// All clones observe the same state, so a UI can watch the gate while the
/// session or export job holds it.
#[derive(Debug, Clone, Default)]
pub struct Gate {
    inner: Arc<GateInner>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the gate, or `None` if it is already held.
    pub fn try_acquire(&self) -> Option<GatePermit> {
        self.inner
            .held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GatePermit { gate: self.clone() })
    }

    /// Whether a permit is currently outstanding (control disabled).
    pub fn is_held(&self) -> bool {
        self.inner.held.load(Ordering::Acquire)
    }

    /// Wait until the gate is released.
    pub async fn wait_until_released(&self) {
        let notified = self.inner.released.notified();
        if !self.is_held() {
            return;
        }
        notified.await;
    }

    /// Wait until the gate is released, with a timeout.
    /// Returns `true` if released, `false` on timeout.
    pub async fn wait_until_released_timeout(&self, timeout: std::time::Duration) -> bool {
        if !self.is_held() {
            return true;
        }
        tokio::time::timeout(timeout, self.wait_until_released())
            .await
            .is_ok()
    }
}

/// Proof of holding a [`Gate`]. Released on drop.
#[derive(Debug)]
#[must_use = "the gate is released as soon as the permit is dropped"]
pub struct GatePermit {
    gate: Gate,
}

impl GatePermit {
    /// Release the gate now
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.inner.held.store(false, Ordering::Release);
        self.gate.inner.released.notify_waiters();
    }
}
