//! Shared enabled/interval state embedded by alert implementations.
//!
//! The engine requires every alert to own an enabled flag, an update
//! interval, and an enabled-changed subscription list with
//! notify-exactly-once-on-transition semantics. Rather than inheriting that
//! behavior, an implementation embeds an [`AlertState`] and forwards the
//! state half of the [`crate::Alert`] trait to it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::alert::EnabledChangedFn;

/// Subscriber handles are reference-counted so notification can run on a
/// snapshot taken outside the list lock.
type SubscriberFn = Arc<dyn Fn(bool) + Send + Sync>;

/// The enabled flag, update interval, and enabled-changed subscribers of a
/// single alert.
///
/// All methods are callable from any thread. `set_enabled` notifies
/// subscribers synchronously on the calling thread, exactly once per actual
/// transition; subscribers are free to call back into this state (or into
/// the manager) because no lock is held while they run.
pub struct AlertState {
    enabled: AtomicBool,
    interval_millis: AtomicU64,
    subscribers: Mutex<Vec<SubscriberFn>>,
}

impl AlertState {
    /// Creates alert state with the given initial flag and interval.
    #[must_use]
    pub fn new(enabled: bool, interval: Duration) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            interval_millis: AtomicU64::new(duration_to_millis(interval)),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Whether the alert is currently enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Sets the enabled flag.
    ///
    /// Subscribers are notified synchronously, and only when the value
    /// actually changed. A panicking subscriber is contained and logged and
    /// does not prevent the remaining subscribers from being notified.
    pub fn set_enabled(&self, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::AcqRel);
        if previous == enabled {
            return;
        }

        // Snapshot under the lock, invoke outside it: a subscriber may
        // re-enter (subscribe, toggle, talk to the manager) without
        // deadlocking.
        let snapshot: Vec<SubscriberFn> = {
            let subs = self
                .subscribers
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            subs.clone()
        };

        for sub in snapshot {
            if panic::catch_unwind(AssertUnwindSafe(|| sub(enabled))).is_err() {
                tracing::error!("enabled-changed subscriber panicked; continuing");
            }
        }
    }

    /// The interval to wait after a check before the next one.
    #[must_use]
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.interval_millis.load(Ordering::Acquire))
    }

    /// Sets the update interval. Applied the next time the alert is
    /// rescheduled by the engine.
    pub fn set_update_interval(&self, interval: Duration) {
        self.interval_millis
            .store(duration_to_millis(interval), Ordering::Release);
    }

    /// Subscribes to enabled-flag transitions.
    pub fn subscribe_enabled_changed(&self, callback: EnabledChangedFn) {
        let mut subs = self
            .subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        subs.push(Arc::from(callback));
    }
}

impl std::fmt::Debug for AlertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertState")
            .field("enabled", &self.is_enabled())
            .field("update_interval", &self.update_interval())
            .finish_non_exhaustive()
    }
}

/// Intervals are stored as whole milliseconds, the granularity the
/// scheduler works at.
fn duration_to_millis(interval: Duration) -> u64 {
    u64::try_from(interval.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn starts_with_constructor_values() {
        let state = AlertState::new(true, Duration::from_millis(250));
        assert!(state.is_enabled());
        assert_eq!(state.update_interval(), Duration::from_millis(250));
    }

    #[test]
    fn set_enabled_notifies_on_transition_only() {
        let state = AlertState::new(false, Duration::ZERO);
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        state.subscribe_enabled_changed(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        state.set_enabled(false);
        assert_eq!(calls.load(Ordering::SeqCst), 0, "no transition, no call");

        state.set_enabled(true);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        state.set_enabled(true);
        assert_eq!(calls.load(Ordering::SeqCst), 1, "repeat set is not a transition");

        state.set_enabled(false);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn subscriber_receives_new_value() {
        let state = AlertState::new(false, Duration::ZERO);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        state.subscribe_enabled_changed(Box::new(move |enabled| {
            sink.lock().unwrap().push(enabled);
        }));

        state.set_enabled(true);
        state.set_enabled(false);
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn panicking_subscriber_does_not_block_others() {
        let state = AlertState::new(false, Duration::ZERO);
        let calls = Arc::new(AtomicUsize::new(0));

        state.subscribe_enabled_changed(Box::new(|_| panic!("bad subscriber")));
        let counter = Arc::clone(&calls);
        state.subscribe_enabled_changed(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        state.set_enabled(true);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscriber_may_reenter_without_deadlock() {
        let state = Arc::new(AlertState::new(false, Duration::ZERO));

        let reentrant = Arc::clone(&state);
        state.subscribe_enabled_changed(Box::new(move |_| {
            // Re-entrant subscription must not deadlock on the list lock.
            reentrant.subscribe_enabled_changed(Box::new(|_| {}));
        }));

        state.set_enabled(true);
        assert!(state.is_enabled());
    }

    #[test]
    fn interval_is_mutable() {
        let state = AlertState::new(true, Duration::from_secs(1));
        state.set_update_interval(Duration::from_millis(50));
        assert_eq!(state.update_interval(), Duration::from_millis(50));
    }
}
