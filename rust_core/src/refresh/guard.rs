//! Process-wide refresh guard.
//!
//! A non-blocking mutex around the state only a running cycle may touch (the token
//! cache). `try_acquire` never waits: a caller either gets the permit or learns that a
//! cycle is already in flight. Dropping the permit releases the guard on every exit
//! path, including unwinding.
//!
//! Observers read a separate `running` flag; they never touch the mutex, so polling
//! `is_held` cannot make a concurrent `try_acquire` fail.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug)]
pub struct RefreshGuard<T> {
    inner: Mutex<T>,
    /// Set while a permit is alive
    running: AtomicBool,
}

impl<T> RefreshGuard<T> {
    pub fn new(state: T) -> Self {
        Self {
            inner: Mutex::new(state),
            running: AtomicBool::new(false),
        }
    }

    /// Acquire without waiting. `None` if a cycle already holds the guard.
    pub fn try_acquire(&self) -> Option<RefreshPermit<'_, T>> {
        let state = self.inner.try_lock().ok()?;
        self.running.store(true, Ordering::Release);
        debug!("Refresh guard acquired");
        Some(RefreshPermit {
            state,
            running: &self.running,
            acquired_at: Instant::now(),
        })
    }

    /// Whether a permit is currently alive. Lock-free.
    pub fn is_held(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Exclusive access to the guarded state for the duration of one cycle.
pub struct RefreshPermit<'a, T> {
    state: MutexGuard<'a, T>,
    running: &'a AtomicBool,
    acquired_at: Instant,
}

impl<T> Deref for RefreshPermit<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.state
    }
}

impl<T> DerefMut for RefreshPermit<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.state
    }
}

impl<T> Drop for RefreshPermit<'_, T> {
    fn drop(&mut self) {
        // Cleared before the mutex guard field is dropped.
        self.running.store(false, Ordering::Release);
        debug!(
            "Refresh guard released after {}ms",
            self.acquired_at.elapsed().as_millis()
        );
    }
}
