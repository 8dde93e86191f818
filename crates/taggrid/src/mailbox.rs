//! Single-slot, overwrite-on-write hand-off between threads.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Outcome of a non-blocking read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Retrieved<T> {
    Present(T),
    Empty,
}

impl<T> Retrieved<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Retrieved::Present(value) => Some(value),
            Retrieved::Empty => None,
        }
    }
}

#[derive(Debug)]
struct Slot<T> {
    value: Option<T>,
    unread: bool,
    closed: bool,
}

/// Holds at most one value. Writers replace it, readers get a clone.
///
/// Only the newest value is ever observable; nothing queues up behind a slow
/// reader. Readers that already saw the current value can still read it again.
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Slot<T>>,
    cond: Condvar,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(Slot {
                value: None,
                unread: false,
                closed: false,
            }),
            cond: Condvar::new(),
        }
    }
}

impl<T: Clone> Mailbox<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mailbox that starts out holding `value` (marked unread).
    pub fn with_value(value: T) -> Self {
        let mailbox = Self::default();
        mailbox.set(value);
        mailbox
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the stored value and wake every waiter.
    pub fn set(&self, value: T) {
        let mut slot = self.lock();
        slot.value = Some(value);
        slot.unread = true;
        self.cond.notify_all();
    }

    /// Block until a value exists, then return it.
    pub fn retrieve(&self) -> T {
        let mut slot = self.lock();
        loop {
            if let Some(value) = slot.value.clone() {
                slot.unread = false;
                return value;
            }
            slot = self.cond.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// `Empty` only if nothing was ever stored.
    pub fn retrieve_nowait(&self) -> Retrieved<T> {
        let mut slot = self.lock();
        match slot.value.clone() {
            Some(value) => {
                slot.unread = false;
                Retrieved::Present(value)
            }
            None => Retrieved::Empty,
        }
    }

    /// The stored value if it was written since the last read.
    pub fn retrieve_fresh(&self) -> Option<T> {
        let mut slot = self.lock();
        if !slot.unread {
            return None;
        }
        slot.unread = false;
        slot.value.clone()
    }

    /// Like [`Mailbox::retrieve`], giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.lock();
        loop {
            if let Some(value) = slot.value.clone() {
                slot.unread = false;
                return Some(value);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            slot = self
                .cond
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Block until a value is written that was not read yet. `None` once the
    /// mailbox is closed.
    pub fn wait_fresh(&self) -> Option<T> {
        let mut slot = self.lock();
        loop {
            if slot.closed {
                return None;
            }
            if slot.unread {
                slot.unread = false;
                return slot.value.clone();
            }
            slot = self.cond.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Release every [`Mailbox::wait_fresh`] caller, now and later.
    pub fn close(&self) {
        self.lock().closed = true;
        self.cond.notify_all();
    }

    /// Whether a value was written since the last read.
    pub fn has_unread(&self) -> bool {
        self.lock().unread
    }
}
