//! Flag collections: the ordered unique set shown to the user and the
//! tracker that serializes in-flight server calls per flag.
//!
//! DESIGN
//! ======
//! Two rapid calls for the same flag (add then remove, or two adds from two
//! widgets) may resolve out of order on the wire. `PendingFlags` hands out a
//! per-flag lock so the second call is only issued after the first one's
//! reply has been applied; local state therefore follows issue order.
//! Calls on different flags still run concurrently.

#[cfg(test)]
#[path = "flags_test.rs"]
mod tests;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OwnedMutexGuard;

// =============================================================================
// FLAG SET
// =============================================================================

/// Insertion-ordered set of unique flag names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSet {
    items: Vec<String>,
}

impl FlagSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, flag: &str) -> bool {
        self.items.iter().any(|item| item == flag)
    }

    /// Append `flag` unless present. Returns whether it was added.
    pub fn insert(&mut self, flag: &str) -> bool {
        if self.contains(flag) {
            return false;
        }
        self.items.push(flag.to_owned());
        true
    }

    /// Remove `flag` if present. Returns whether it was removed.
    pub fn remove(&mut self, flag: &str) -> bool {
        let Some(index) = self.items.iter().position(|item| item == flag) else {
            return false;
        };
        self.items.remove(index);
        true
    }

    /// Append every flag not already present; returns how many were added.
    pub fn extend_missing<I>(&mut self, flags: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut added = 0;
        for flag in flags {
            if !self.contains(&flag) {
                self.items.push(flag);
                added += 1;
            }
        }
        added
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.items
    }
}

impl FromIterator<String> for FlagSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend_missing(iter);
        set
    }
}

// =============================================================================
// PENDING TRACKER
// =============================================================================

#[derive(Debug, Default)]
struct PendingInner {
    next_ticket: u64,
    slots: HashMap<String, Slot>,
}

#[derive(Debug)]
struct Slot {
    lock: Arc<tokio::sync::Mutex<()>>,
    /// Tickets issued for this flag that have not been dropped yet.
    holders: usize,
}

/// Per-flag serialization of in-flight server calls.
#[derive(Debug, Clone, Default)]
pub struct PendingFlags {
    inner: Arc<Mutex<PendingInner>>,
}

/// Exclusive right to issue a server call for one flag.
///
/// Dropping the ticket lets the next waiter for the same flag proceed.
pub struct FlagTicket {
    _guard: OwnedMutexGuard<()>,
    registration: Registration,
}

impl FlagTicket {
    #[must_use]
    pub fn flag(&self) -> &str {
        &self.registration.flag
    }

    /// Monotonic issue number, unique across all flags.
    #[must_use]
    pub fn number(&self) -> u64 {
        self.registration.number
    }
}

/// Counts a caller as a holder from the moment it asks for a ticket, so a
/// caller cancelled while waiting still releases its slot.
struct Registration {
    tracker: PendingFlags,
    flag: String,
    number: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.tracker.release(&self.flag);
    }
}

impl PendingFlags {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no earlier call for `flag` is in flight, then take the slot.
    pub async fn acquire(&self, flag: &str) -> FlagTicket {
        let (lock, number) = {
            let mut inner = self.lock_inner();
            inner.next_ticket += 1;
            let number = inner.next_ticket;
            let slot = inner
                .slots
                .entry(flag.to_owned())
                .or_insert_with(|| Slot { lock: Arc::new(tokio::sync::Mutex::new(())), holders: 0 });
            slot.holders += 1;
            (Arc::clone(&slot.lock), number)
        };
        let registration = Registration { tracker: self.clone(), flag: flag.to_owned(), number };
        let guard = lock.lock_owned().await;
        FlagTicket { _guard: guard, registration }
    }

    /// Number of callers holding or waiting for `flag`.
    #[must_use]
    pub fn in_flight(&self, flag: &str) -> usize {
        self.lock_inner().slots.get(flag).map_or(0, |slot| slot.holders)
    }

    /// `true` when no flag has a call in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.lock_inner().slots.is_empty()
    }

    fn release(&self, flag: &str) {
        let mut inner = self.lock_inner();
        let Some(slot) = inner.slots.get_mut(flag) else {
            return;
        };
        slot.holders = slot.holders.saturating_sub(1);
        if slot.holders == 0 {
            inner.slots.remove(flag);
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, PendingInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
