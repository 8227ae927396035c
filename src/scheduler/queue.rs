//! The ordered work queue of schedule entries.
//!
//! Entries are kept sorted ascending by due time, ties broken by insertion
//! order. The sort invariant is what makes "what's next" and "how long to
//! sleep" O(1) lookups for the scheduler; insertion is a linear scan from
//! the front, acceptable because the number of concurrently scheduled alerts
//! is small (tens, not thousands). If that ever becomes a bottleneck, the
//! mitigation is partitioning entries into per-interval buckets.

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use crate::alert::{AlertId, AlertRef};

/// An alert paired with the next time it is due to be checked.
///
/// The atomic unit the engine orders and moves. `due_at` is only ever
/// produced as "now" (initial add, enable-transition-to-true) or
/// "now + update interval" (reschedule after a pass).
pub struct ScheduleEntry {
    /// Engine-assigned identifier of the alert.
    pub id: AlertId,
    /// The alert to check when due.
    pub alert: AlertRef,
    /// The earliest time the alert is eligible to be checked again.
    pub due_at: Instant,
}

impl ScheduleEntry {
    /// Creates an entry due at the given time.
    #[must_use]
    pub fn new(id: AlertId, alert: AlertRef, due_at: Instant) -> Self {
        Self { id, alert, due_at }
    }
}

impl fmt::Debug for ScheduleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleEntry")
            .field("id", &self.id)
            .field("due_at", &self.due_at)
            .finish_non_exhaustive()
    }
}

/// Schedule entries sorted ascending by due time, FIFO for equal due times.
///
/// The queue itself is not synchronized; the manager guards it with a mutex
/// and is its only user.
#[derive(Debug, Default)]
pub struct WorkQueue {
    entries: VecDeque<ScheduleEntry>,
}

impl WorkQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of scheduled entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry with the soonest due time, if any.
    #[must_use]
    pub fn peek_front(&self) -> Option<&ScheduleEntry> {
        self.entries.front()
    }

    /// Removes and returns the entry with the soonest due time.
    pub fn pop_front(&mut self) -> Option<ScheduleEntry> {
        self.entries.pop_front()
    }

    /// Places an entry at the exact front of the queue.
    ///
    /// Callers must only use this for entries due "now" (newly added alerts
    /// and enable-to-true reschedules). An entry that is already due may
    /// thereby land ahead of an overdue one; that is harmless because the
    /// scheduler drains everything due in a single pass, and it is exactly
    /// the checked-on-the-very-next-pass behavior front insertion exists
    /// to provide.
    pub fn push_front(&mut self, entry: ScheduleEntry) {
        self.entries.push_front(entry);
    }

    /// Inserts an entry at its due-time position: scanning from the front,
    /// immediately before the first entry with a strictly later due time,
    /// or at the back if there is none. Equal due times therefore keep
    /// insertion order (FIFO).
    pub fn insert_sequential(&mut self, entry: ScheduleEntry) {
        let position = self
            .entries
            .iter()
            .position(|existing| existing.due_at > entry.due_at);

        match position {
            Some(index) => self.entries.insert(index, entry),
            None => self.entries.push_back(entry),
        }
    }

    /// Removes the entry for `id`, returning it if present.
    pub fn remove(&mut self, id: AlertId) -> Option<ScheduleEntry> {
        let index = self.entries.iter().position(|entry| entry.id == id)?;
        self.entries.remove(index)
    }

    /// Iterates entries in due-time order.
    pub fn iter(&self) -> impl Iterator<Item = &ScheduleEntry> {
        self.entries.iter()
    }

    /// Drains every entry, front first. Used at shutdown.
    pub fn drain(&mut self) -> impl Iterator<Item = ScheduleEntry> + '_ {
        self.entries.drain(..)
    }
}
