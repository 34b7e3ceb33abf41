use std::mem;
use std::sync::Mutex;

use mio::Waker;

/// A deferred action executed exactly once, on the reactor thread.
pub type Callback<C> = Box<dyn FnOnce(&mut C) + Send>;

/// Thread-safe queue of actions deferred onto the reactor thread.
///
/// Any thread may `submit`; only the reactor thread calls `drain`. Draining
/// snapshots the queued callbacks and clears the live queue before running
/// any of them, so a callback that submits another callback schedules it for
/// the *next* drain — the reactor gets back to socket work between bursts.
pub struct CallbackQueue<C> {
    callbacks: Mutex<Vec<Callback<C>>>,
    waker: Option<Waker>,
}

impl<C> CallbackQueue<C> {
    /// A queue with no waker, for contexts that poll it directly.
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new(Vec::new()),
            waker: None,
        }
    }

    /// A queue that interrupts a parked poll on every submission.
    pub fn with_waker(waker: Waker) -> Self {
        Self {
            callbacks: Mutex::new(Vec::new()),
            waker: Some(waker),
        }
    }

    /// Queues a callback and wakes the reactor. Safe from any thread.
    pub fn submit(&self, callback: impl FnOnce(&mut C) + Send + 'static) {
        self.lock().push(Box::new(callback));
        self.wake();
    }

    /// Interrupts a parked poll without queueing anything.
    pub fn wake(&self) {
        if let Some(waker) = &self.waker {
            if let Err(e) = waker.wake() {
                tracing::warn!(error = %e, "failed to wake reactor");
            }
        }
    }

    /// Runs everything queued before this call; reactor thread only.
    /// Returns whether any work was done.
    pub fn drain(&self, ctx: &mut C) -> bool {
        let snapshot = mem::take(&mut *self.lock());
        if snapshot.is_empty() {
            return false;
        }
        for callback in snapshot {
            callback(ctx);
        }
        true
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Callback<C>>> {
        match self.callbacks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<C> Default for CallbackQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}
