//! The alert scheduling subsystem.
//!
//! A single manager owns an ordered work queue of schedule entries and a
//! dedicated worker thread that pops everything currently due, checks the
//! enabled ones, re-inserts them at their new due time, and sleeps until the
//! next due time or until an external mutation wakes it early. The facade
//! (add/remove/list/subscribe/dispose) is safe to call from any thread.

/// Manager facade and worker loop.
pub mod manager;
/// The due-time-ordered work queue.
pub mod queue;

pub use manager::{AlertManager, AlertsUpdatedFn, ListenerId, ManagerConfig};
pub use queue::{ScheduleEntry, WorkQueue};
