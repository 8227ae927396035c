//! The alert capability consumed by the scheduling engine.
//!
//! An alert is a pluggable, independently schedulable unit of polling logic:
//! it owns its own enabled flag and update interval, and performs the actual
//! domain check (chat activity, text-to-speech, sound playback, ...) when the
//! scheduler invokes it. The engine never sees anything beyond this trait.

/// Embeddable enabled/interval/subscriber state.
pub mod state;
/// Construction of alerts from saved records.
pub mod registry;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AlertError;

/// Identifier assigned to an alert by the engine when it is added.
///
/// Ids start at 1, increase monotonically, and are never reused within the
/// lifetime of one [`crate::AlertManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlertId(pub u64);

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "alert-{}", self.0)
    }
}

/// Shared handle to an alert.
///
/// The engine holds a non-owning reference for scheduling purposes; whoever
/// constructed the alert (typically the composition root, via the
/// [`registry::AlertRegistry`]) may keep handles of its own. The engine is
/// the only party permitted to invoke [`Alert::dispose`], and does so at
/// most once, after removal.
pub type AlertRef = Arc<dyn Alert>;

/// Callback invoked when an alert's enabled flag transitions.
///
/// The alert's identity is captured by the closure at subscription time, so
/// the callback only carries the new flag value.
pub type EnabledChangedFn = Box<dyn Fn(bool) + Send + Sync>;

/// A pluggable, independently schedulable unit of polling logic.
///
/// Implementations are expected to embed [`state::AlertState`] and forward
/// the four state accessors to it; the trait exists so the engine can stay
/// decoupled from whatever the alert actually does on [`check`](Alert::check).
///
/// Scheduling semantics the engine relies on:
///
/// - [`set_enabled`](Alert::set_enabled) notifies subscribers synchronously,
///   exactly once, and only when the value actually changes.
/// - [`update_interval`](Alert::update_interval) is re-read after every
///   check; it means "how long to wait after a check before checking again".
/// - [`check`](Alert::check) runs on the scheduler thread, outside any
///   engine lock. Failures are logged and never fatal to the engine.
pub trait Alert: Send + Sync {
    /// Whether the alert is currently enabled. Disabled alerts stay
    /// scheduled but are skipped by the scheduler.
    fn is_enabled(&self) -> bool;

    /// Sets the enabled flag, notifying enabled-changed subscribers on an
    /// actual transition.
    fn set_enabled(&self, enabled: bool);

    /// The interval to wait after a check before the next one.
    fn update_interval(&self) -> Duration;

    /// Sets the update interval. Takes effect when the alert is next
    /// rescheduled.
    fn set_update_interval(&self, interval: Duration);

    /// Subscribes to enabled-flag transitions made through
    /// [`set_enabled`](Alert::set_enabled).
    fn subscribe_enabled_changed(&self, callback: EnabledChangedFn);

    /// Executes the logic of the alert: identify whether an alert condition
    /// exists and produce some user-visible indication that it happened.
    ///
    /// # Errors
    ///
    /// Implementations report their own failures here; the scheduler logs
    /// them and carries on with the rest of the pass.
    fn check(&self) -> Result<(), AlertError>;

    /// Releases resources owned by the alert. Called by the engine at most
    /// once, after the alert has been removed (or at engine shutdown).
    fn dispose(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_id_display() {
        assert_eq!(AlertId(7).to_string(), "alert-7");
    }

    #[test]
    fn alert_id_ordering_follows_assignment_order() {
        assert!(AlertId(1) < AlertId(2));
        assert_eq!(AlertId(3), AlertId(3));
    }
}
