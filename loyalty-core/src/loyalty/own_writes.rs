//! src/loyalty/own_writes.rs
//!
//! Bookkeeping for snapshot keys the engine wrote itself.
//!
//! The engine updates its mirror as soon as the store acknowledges a write,
//! but the matching notification reaches the dispatcher later, possibly behind
//! notifications from other clients that the hub ordered *before* the write.
//! Those are stale by the time they arrive and must not be applied; values
//! ordered after the write arrive after its echo and apply normally.
//!
//! Writers call [`OwnWrites::begin`] and, on failure, [`OwnWrites::abort`]
//! while holding the lock of the aggregate the key belongs to. The dispatcher
//! calls [`OwnWrites::admit`] under that same lock, so it never observes a
//! write that is still in flight: a non-zero count means an acknowledged
//! write whose echo is still queued.

use std::collections::HashMap;

use parking_lot::Mutex;

#[derive(Debug, Default)]
pub(crate) struct OwnWrites {
    unconfirmed: Mutex<HashMap<String, usize>>,
}

impl OwnWrites {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn begin(&self, key: &str) {
        *self.unconfirmed.lock().entry(key.to_string()).or_insert(0) += 1;
    }

    /// Undoes [`begin`](Self::begin) for a write the store rejected.
    pub(crate) fn abort(&self, key: &str) {
        self.settle(key);
    }

    /// Called for a notification this engine's client wrote. Returns `false`
    /// if no write on the key was outstanding; the value then has not reached
    /// the mirror and must be applied like any other.
    pub(crate) fn confirm(&self, key: &str) -> bool {
        self.settle(key)
    }

    /// Whether a snapshot of `key` written by someone else may be applied.
    pub(crate) fn admit(&self, key: &str) -> bool {
        !self.unconfirmed.lock().contains_key(key)
    }

    fn settle(&self, key: &str) -> bool {
        let mut unconfirmed = self.unconfirmed.lock();
        let Some(count) = unconfirmed.get_mut(key) else { return false };
        *count -= 1;
        if *count == 0 {
            unconfirmed.remove(key);
        }
        true
    }
}
