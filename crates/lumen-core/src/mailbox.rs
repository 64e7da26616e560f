//! Single-slot mailbox for newest-wins handoff between threads.
//!
//! A [`Mailbox`] holds at most one value. Putting a value while another is
//! still waiting to be taken replaces it, so the consumer only ever sees the
//! most recent one. This is the right shape when stale work is worthless,
//! such as "the image the user currently wants to see".
//!
//! # Example
//!
//! ```
//! use lumen_core::Mailbox;
//!
//! let mailbox = Mailbox::new();
//! assert_eq!(mailbox.put("first"), None);
//! assert_eq!(mailbox.put("second"), Some("first"));
//! assert_eq!(mailbox.try_take(), Some("second"));
//!
//! mailbox.close();
//! assert_eq!(mailbox.take(), None);
//! ```

use parking_lot::{Condvar, Mutex};

struct Slot<T> {
    value: Option<T>,
    closed: bool,
}

/// A capacity-one, overwrite-on-put handoff slot.
pub struct Mailbox<T> {
    slot: Mutex<Slot<T>>,
    available: Condvar,
}

impl<T> Mailbox<T> {
    /// Create an empty, open mailbox.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                value: None,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Store a value, returning the unread value it replaced.
    ///
    /// If the mailbox is closed the value is handed straight back as
    /// `Err(value)`.
    pub fn try_put(&self, value: T) -> Result<Option<T>, T> {
        let mut slot = self.slot.lock();
        if slot.closed {
            return Err(value);
        }
        let replaced = slot.value.replace(value);
        self.available.notify_one();
        Ok(replaced)
    }

    /// Store a value, returning the unread value it replaced.
    ///
    /// A value put into a closed mailbox is dropped and `None` is returned.
    pub fn put(&self, value: T) -> Option<T> {
        self.try_put(value).unwrap_or(None)
    }

    /// Take the waiting value, blocking until one arrives.
    ///
    /// Returns `None` once the mailbox is closed and empty.
    pub fn take(&self) -> Option<T> {
        let mut slot = self.slot.lock();
        loop {
            if let Some(value) = slot.value.take() {
                return Some(value);
            }
            if slot.closed {
                return None;
            }
            self.available.wait(&mut slot);
        }
    }

    /// Take the waiting value without blocking.
    pub fn try_take(&self) -> Option<T> {
        self.slot.lock().value.take()
    }

    /// Close the mailbox.
    ///
    /// A value already waiting can still be taken; further puts are refused
    /// and blocked takers wake up once the slot is empty.
    pub fn close(&self) {
        let mut slot = self.slot.lock();
        slot.closed = true;
        self.available.notify_all();
    }

    /// Check whether no value is waiting.
    pub fn is_empty(&self) -> bool {
        self.slot.lock().value.is_none()
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Mailbox<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.slot.lock();
        f.debug_struct("Mailbox")
            .field("occupied", &slot.value.is_some())
            .field("closed", &slot.closed)
            .finish()
    }
}
