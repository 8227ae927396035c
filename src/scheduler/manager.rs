//! Alert manager facade and scheduler worker.
//!
//! The manager owns the work queue and runs a dedicated worker thread that
//! executes due alerts. Add/remove/list/subscribe may be called from any
//! thread (in practice, a UI thread); each piece of shared state has its own
//! narrow critical section, and no lock is ever held across a `check()` call
//! or a subscriber callback. External mutations cut the worker's sleep short
//! through a capacity-1 wake channel.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, error, info, trace, warn};

use crate::alert::{AlertId, AlertRef};
use crate::error::EngineError;
use crate::scheduler::queue::{ScheduleEntry, WorkQueue};

/// Scheduler configuration.
#[derive(Debug, Clone, Copy)]
pub struct ManagerConfig {
    /// Upper bound on a sleep while the queue is empty, so externally
    /// triggered wakes have bounded worst-case latency even if a wake
    /// signal is lost.
    pub idle_wait: Duration,
    /// How long `dispose` waits for the worker to exit gracefully before
    /// detaching it.
    pub shutdown_grace: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            idle_wait: Duration::from_millis(1000),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

/// Callback invoked when an alert is added to or removed from the manager.
///
/// `added` is true for additions, false for removals.
pub type AlertsUpdatedFn = Box<dyn Fn(bool, &AlertRef) + Send + Sync>;

/// Token identifying a registered alerts-updated listener.
///
/// Closures have no identity of their own, so removal is by the token handed
/// out at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listener storage is reference-counted so notification can run on a
/// snapshot taken outside the list lock.
type ListenerEntry = (ListenerId, Arc<dyn Fn(bool, &AlertRef) + Send + Sync>);

/// State shared between the facade and the worker thread.
///
/// Lock order, where two are held at once: queue, then pending-removal.
struct Shared {
    config: ManagerConfig,
    queue: Mutex<WorkQueue>,
    pending_removal: Mutex<HashSet<AlertId>>,
    listeners: Mutex<Vec<ListenerEntry>>,
    next_alert_id: AtomicU64,
    next_listener_id: AtomicU64,
    terminate: AtomicBool,
    wake_tx: Sender<()>,
}

/// The manager responsible for containing the list of alerts and executing
/// them.
///
/// One long-lived instance is constructed by the application's composition
/// root and passed by reference to whoever needs it; there is no global
/// singleton. Construction spawns the worker; [`dispose`](AlertManager::dispose)
/// (or `Drop`) shuts it down within a bounded grace period.
pub struct AlertManager {
    shared: Arc<Shared>,
    join: Mutex<Option<JoinHandle<()>>>,
    done_rx: Receiver<()>,
    disposed: AtomicBool,
}

impl AlertManager {
    /// Creates a manager with default configuration and starts its worker.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    /// Creates a manager with the given configuration and starts its worker.
    #[must_use]
    pub fn with_config(config: ManagerConfig) -> Self {
        let (wake_tx, wake_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);

        let shared = Arc::new(Shared {
            config,
            queue: Mutex::new(WorkQueue::new()),
            pending_removal: Mutex::new(HashSet::new()),
            listeners: Mutex::new(Vec::new()),
            next_alert_id: AtomicU64::new(0),
            next_listener_id: AtomicU64::new(0),
            terminate: AtomicBool::new(false),
            wake_tx,
        });

        let worker_shared = Arc::clone(&shared);
        let join = thread::Builder::new()
            .name("klaxon-scheduler".to_string())
            .spawn(move || scheduler_loop(&worker_shared, &wake_rx, &done_tx))
            .expect("failed to spawn klaxon scheduler worker");

        Self {
            shared,
            join: Mutex::new(Some(join)),
            done_rx,
            disposed: AtomicBool::new(false),
        }
    }

    /// Adds an alert and returns its engine-assigned id.
    ///
    /// The alert is scheduled due immediately, regardless of its configured
    /// interval, so it is checked on the very next pass. The manager
    /// subscribes to the alert's enabled-changed notifications; an alert
    /// that later transitions to enabled is pulled to the front of the
    /// queue. The `added` event fires synchronously on the calling thread,
    /// after the mutation.
    pub fn add_alert(&self, alert: AlertRef) -> AlertId {
        let id = AlertId(self.shared.next_alert_id.fetch_add(1, Ordering::Relaxed) + 1);

        {
            let mut queue = lock(&self.shared.queue);
            queue.push_front(ScheduleEntry::new(id, Arc::clone(&alert), Instant::now()));
        }

        let weak = Arc::downgrade(&self.shared);
        alert.subscribe_enabled_changed(Box::new(move |enabled| {
            if !enabled {
                // A disabled entry stays where it is; the worker skips it.
                return;
            }

            if let Some(shared) = weak.upgrade() {
                shared.reschedule_now(id);
            }
        }));

        self.shared.wake();
        self.shared.notify_listeners(true, &alert);

        debug!(id = id.0, "alert added");
        id
    }

    /// Removes an alert by reference. Unknown alerts are a silent no-op:
    /// removal of an already-gone alert is a benign race, not a bug.
    ///
    /// The `removed` event fires synchronously on the calling thread; the
    /// alert's `dispose()` runs later on the worker thread, so observers are
    /// always notified before disposal and removal never blocks the caller.
    pub fn remove_alert(&self, alert: &AlertRef) {
        let id = {
            let queue = lock(&self.shared.queue);
            let found = queue
                .iter()
                .find(|entry| Arc::ptr_eq(&entry.alert, alert))
                .map(|entry| entry.id);
            found
        };

        if let Some(id) = id {
            self.remove_alert_by_id(id);
        }
    }

    /// Removes an alert by id. Equivalent in every observable way to
    /// [`remove_alert`](AlertManager::remove_alert) with the matching
    /// reference; unknown ids are a silent no-op.
    pub fn remove_alert_by_id(&self, id: AlertId) {
        let alert = {
            let queue = lock(&self.shared.queue);
            let Some(entry) = queue.iter().find(|entry| entry.id == id) else {
                return;
            };
            let alert = Arc::clone(&entry.alert);

            let mut pending = lock(&self.shared.pending_removal);
            if !pending.insert(id) {
                // Already queued for removal; one event, one dispose.
                return;
            }

            alert
        };

        self.shared.wake();
        self.shared.notify_listeners(false, &alert);

        debug!(id = id.0, "alert removal requested");
    }

    /// A point-in-time snapshot of the scheduled alerts, excluding any whose
    /// removal has been requested but not yet processed.
    #[must_use]
    pub fn alerts(&self) -> Vec<AlertRef> {
        let queue = lock(&self.shared.queue);
        let pending = lock(&self.shared.pending_removal);

        queue
            .iter()
            .filter(|entry| !pending.contains(&entry.id))
            .map(|entry| Arc::clone(&entry.alert))
            .collect()
    }

    /// Registers a listener for add/remove events and returns its removal
    /// token. Listener panics are contained and logged and never prevent
    /// other listeners from being notified.
    pub fn add_alerts_updated_listener(&self, listener: AlertsUpdatedFn) -> ListenerId {
        let id = ListenerId(self.shared.next_listener_id.fetch_add(1, Ordering::Relaxed) + 1);
        let mut listeners = lock(&self.shared.listeners);
        listeners.push((id, Arc::from(listener)));
        id
    }

    /// Unregisters a listener. Unknown tokens are a no-op.
    pub fn remove_alerts_updated_listener(&self, id: ListenerId) {
        let mut listeners = lock(&self.shared.listeners);
        listeners.retain(|(listener_id, _)| *listener_id != id);
    }

    /// Shuts the engine down: signals the worker, waits up to the configured
    /// grace period for it to drain and dispose every remaining alert, and
    /// detaches it if it fails to exit in time (a stuck `check()` may leak
    /// its resources; the queue is reclaimed and disposed here instead).
    ///
    /// Consuming `self` makes calling dispose twice unrepresentable. A
    /// manager dropped without an explicit call performs the same shutdown.
    pub fn dispose(self) {
        self.shutdown();
    }

    fn shutdown(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.shared.terminate.store(true, Ordering::Release);
        self.shared.wake();

        let grace = self.shared.config.shutdown_grace;
        match self.done_rx.recv_timeout(grace) {
            Ok(()) => {
                if let Some(handle) = lock(&self.join).take() {
                    let _ = handle.join();
                }
                debug!("scheduler worker exited cleanly");
            }
            Err(RecvTimeoutError::Disconnected) => {
                // Worker died without signalling; reap it and reclaim.
                let err = EngineError::Disconnected {
                    channel: "scheduler-done".to_string(),
                };
                warn!("{err}; reclaiming queue on caller thread");
                if let Some(handle) = lock(&self.join).take() {
                    let _ = handle.join();
                }
                self.shared.drain_and_dispose_all();
            }
            Err(RecvTimeoutError::Timeout) => {
                let err = EngineError::ShutdownTimeout {
                    waited_ms: u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                };
                warn!("{err}; detaching worker and reclaiming queue on caller thread");
                // Detaching is the best force-cancel available: the thread
                // cannot be killed, but everything still queued is disposed
                // here, and the worker re-checks the terminate flag before
                // touching any entry if it ever resumes.
                drop(lock(&self.join).take());
                self.shared.drain_and_dispose_all();
            }
        }
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AlertManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for AlertManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertManager")
            .field("scheduled", &lock(&self.shared.queue).len())
            .field("disposed", &self.disposed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Shared {
    /// Cuts the worker's sleep short. Coalesces: a wake while one is
    /// already pending is a no-op, and a wake after the worker has exited
    /// has nobody left to notify.
    fn wake(&self) {
        match self.wake_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) | Err(TrySendError::Disconnected(())) => {}
        }
    }

    /// Moves the entry for `id` to the front of the queue, due immediately,
    /// and wakes the worker. Invoked by the enabled-changed subscription
    /// when an alert transitions to enabled, so it gets checked on the next
    /// pass instead of waiting out its old schedule.
    fn reschedule_now(&self, id: AlertId) {
        {
            let mut queue = lock(&self.queue);
            // Linear search by id; the known scaling limit at tens of
            // alerts, same as every other queue operation.
            let Some(mut entry) = queue.remove(id) else {
                return;
            };
            entry.due_at = Instant::now();
            queue.push_front(entry);
        }

        self.wake();
        trace!(id = id.0, "rescheduled to front on enable");
    }

    /// Fires the add/remove listeners with a snapshot taken outside the
    /// list lock, containing any panic per listener.
    fn notify_listeners(&self, added: bool, alert: &AlertRef) {
        let snapshot: Vec<ListenerEntry> = {
            let listeners = lock(&self.listeners);
            listeners.clone()
        };

        for (id, listener) in snapshot {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(added, alert))).is_err() {
                error!(listener = id.0, "alerts-updated listener panicked; continuing");
            }
        }
    }

    /// One pass of list surgery: drains pending removals out of the queue,
    /// then pops every due entry and re-inserts it at its new position
    /// before the lock is released. Returns the removed entries (to be
    /// disposed) and the ready batch (to be checked), both handled by the
    /// caller outside the lock.
    ///
    /// Rescheduling inside the same critical section means a concurrent
    /// `alerts()` snapshot never misses an in-flight alert, and an alert
    /// with a pathologically small interval is checked once per pass, not
    /// spun on forever.
    fn collect_pass(&self) -> (Vec<ScheduleEntry>, Vec<(AlertId, AlertRef)>) {
        let now = Instant::now();
        let mut queue = lock(&self.queue);

        let removed: Vec<ScheduleEntry> = {
            let mut pending = lock(&self.pending_removal);
            pending.drain().filter_map(|id| queue.remove(id)).collect()
        };

        let mut due_batch = Vec::new();
        while let Some(front) = queue.peek_front() {
            if front.due_at > now {
                // Sorted ascending: everything behind it is later still.
                break;
            }
            if let Some(entry) = queue.pop_front() {
                due_batch.push(entry);
            }
        }

        let mut ready = Vec::with_capacity(due_batch.len());
        for mut entry in due_batch {
            ready.push((entry.id, Arc::clone(&entry.alert)));
            entry.due_at = now + entry.alert.update_interval();
            queue.insert_sequential(entry);
        }

        (removed, ready)
    }

    /// How long the worker should sleep: until the front entry is due, or
    /// the idle wait when nothing is scheduled.
    fn next_wait(&self) -> Duration {
        let queue = lock(&self.queue);
        match queue.peek_front() {
            Some(front) => front.due_at.saturating_duration_since(Instant::now()),
            None => self.config.idle_wait,
        }
    }

    /// Drains the queue and disposes every remaining alert, then clears the
    /// removal set and the listener list. Entries are taken under the lock,
    /// disposed outside it; whichever of the worker and a timed-out
    /// `dispose()` gets an entry out of the queue first is the one that
    /// disposes it, so each alert is disposed at most once.
    fn drain_and_dispose_all(&self) {
        let drained: Vec<ScheduleEntry> = {
            let mut queue = lock(&self.queue);
            queue.drain().collect()
        };

        let count = drained.len();
        for entry in drained {
            dispose_alert(&entry);
        }

        lock(&self.pending_removal).clear();
        lock(&self.listeners).clear();

        if count > 0 {
            debug!(count, "disposed remaining alerts at shutdown");
        }
    }
}

/// The worker loop: one pass per wake-up until terminated.
fn scheduler_loop(shared: &Arc<Shared>, wake_rx: &Receiver<()>, done_tx: &Sender<()>) {
    info!("scheduler worker started");

    while !shared.terminate.load(Ordering::Acquire) {
        let (removed, ready) = shared.collect_pass();

        for entry in &removed {
            dispose_alert(entry);
        }

        for (id, alert) in ready {
            if !alert.is_enabled() {
                trace!(id = id.0, "skipping disabled alert");
                continue;
            }

            match panic::catch_unwind(AssertUnwindSafe(|| alert.check())) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(id = id.0, "alert check failed: {err}"),
                Err(_) => error!(id = id.0, "alert check panicked; continuing pass"),
            }
        }

        match wake_rx.recv_timeout(shared.next_wait()) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    shared.drain_and_dispose_all();
    info!("scheduler worker exited");
    let _ = done_tx.send(());
}

/// Disposes one alert, containing any panic; the engine must outlive
/// misbehaving alert code.
fn dispose_alert(entry: &ScheduleEntry) {
    if panic::catch_unwind(AssertUnwindSafe(|| entry.alert.dispose())).is_err() {
        error!(id = entry.id.0, "alert dispose panicked");
    }
}

/// Locks a mutex, continuing through poison: the data guarded here is kept
/// consistent by the holders themselves, and a panic in contained user code
/// must not wedge the whole engine.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
