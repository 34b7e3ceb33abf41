use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use mio::Token;

use crate::server::callback::Callback;

/// A one-shot deadline with an attached action.
///
/// Cancellation flips a shared flag instead of removing the entry; an
/// expired cancelled timeout runs as a no-op.
pub struct Timeout<C> {
    deadline: Instant,
    callback: Callback<C>,
    cancelled: Arc<AtomicBool>,
}

/// Cancels the matching [`Timeout`] from anywhere, in O(1).
#[derive(Debug, Clone)]
pub struct TimeoutHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimeoutHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl<C> Timeout<C> {
    pub fn new(deadline: Instant, callback: impl FnOnce(&mut C) + Send + 'static) -> (Self, TimeoutHandle) {
        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = TimeoutHandle {
            cancelled: Arc::clone(&cancelled),
        };
        (
            Self {
                deadline,
                callback: Box::new(callback),
                cancelled,
            },
            handle,
        )
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Runs the callback unless the timeout was cancelled.
    pub fn run(self, ctx: &mut C) {
        if !self.cancelled.load(Ordering::SeqCst) {
            (self.callback)(ctx);
        }
    }
}

/// Work removed from the live structures by one expiry pass.
pub struct TimerSweep<C> {
    /// Due one-shot timeouts, in deadline order.
    pub due: Vec<Timeout<C>>,
    /// Connections whose keep-alive deadline passed.
    pub expired: Vec<Token>,
    /// Time until the next known deadline across both collections; `None`
    /// when both are empty.
    pub next: Option<Duration>,
}

/// Deadline-ordered timer storage for the reactor.
///
/// One-shot timeouts are rare; keep-alive entries churn on almost every
/// read, so they get a dedicated ordered set plus a per-connection index
/// for O(1) replacement. Only the reactor thread touches either.
pub struct TimerManager<C> {
    timeouts: BTreeMap<(Instant, u64), Timeout<C>>,
    seq: u64,
    keep_alive: BTreeSet<(Instant, Token)>,
    index: HashMap<Token, Instant>,
}

impl<C> TimerManager<C> {
    pub fn new() -> Self {
        Self {
            timeouts: BTreeMap::new(),
            seq: 0,
            keep_alive: BTreeSet::new(),
            index: HashMap::new(),
        }
    }

    pub fn add_timeout(&mut self, timeout: Timeout<C>) {
        let key = (timeout.deadline, self.seq);
        self.seq += 1;
        self.timeouts.insert(key, timeout);
    }

    /// Sets the keep-alive deadline for a connection, replacing any pending
    /// one: a connection has at most one keep-alive entry.
    pub fn add_keep_alive(&mut self, token: Token, deadline: Instant) {
        if let Some(previous) = self.index.insert(token, deadline) {
            self.keep_alive.remove(&(previous, token));
        }
        self.keep_alive.insert((deadline, token));
    }

    /// Idempotent; a connection without an entry is left alone.
    pub fn remove_keep_alive(&mut self, token: Token) {
        if let Some(previous) = self.index.remove(&token) {
            self.keep_alive.remove(&(previous, token));
        }
    }

    pub fn has_keep_alive(&self, token: Token) -> bool {
        self.index.contains_key(&token)
    }

    pub fn keep_alive_count(&self) -> usize {
        self.index.len()
    }

    pub fn timeout_count(&self) -> usize {
        self.timeouts.len()
    }

    /// Removes everything due at `now` from the live structures and hands it
    /// back for execution. Removal happens before any callback runs, so a
    /// callback re-adding a timer cannot be observed twice in one pass and
    /// the structures are free for it to mutate.
    pub fn execute(&mut self, now: Instant) -> TimerSweep<C> {
        let pending = self.timeouts.split_off(&(now, u64::MAX));
        let due_map = std::mem::replace(&mut self.timeouts, pending);
        let due: Vec<Timeout<C>> = due_map.into_values().collect();

        let mut expired = Vec::new();
        while let Some(&(deadline, token)) = self.keep_alive.first() {
            if deadline > now {
                break;
            }
            self.keep_alive.pop_first();
            self.index.remove(&token);
            expired.push(token);
        }

        let next_timeout = self.timeouts.keys().next().map(|&(deadline, _)| deadline);
        let next_keep_alive = self.keep_alive.first().map(|&(deadline, _)| deadline);
        let next = match (next_timeout, next_keep_alive) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
        .map(|deadline| deadline.saturating_duration_since(now));

        TimerSweep { due, expired, next }
    }
}

impl<C> Default for TimerManager<C> {
    fn default() -> Self {
        Self::new()
    }
}
