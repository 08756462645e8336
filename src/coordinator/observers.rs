//! Observer registration and fan-out
//!
//! Fan-out iterates a snapshot of the set taken when it starts, so
//! observers may register or unregister (themselves or others) from inside a
//! callback. A removed entry is flagged inactive immediately and skipped if
//! its turn has not come yet.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::capture::{CaptureState, StateChange};

/// Listener for capture state transitions
pub trait CaptureObserver: Send + Sync {
    /// Called once per committed transition with the new state and the
    /// flags that changed.
    fn on_capture_state_changed(&self, state: CaptureState, change: StateChange);
}

impl<F> CaptureObserver for F
where
    F: Fn(CaptureState, StateChange) + Send + Sync,
{
    fn on_capture_state_changed(&self, state: CaptureState, change: StateChange) {
        self(state, change)
    }
}

/// Registration handle returned by [`ObserverSet::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct ObserverEntry {
    id: ObserverId,
    active: AtomicBool,
    observer: Arc<dyn CaptureObserver>,
}

type Entries = Arc<Vec<Arc<ObserverEntry>>>;

/// Ordered set of observers
#[derive(Default)]
pub struct ObserverSet {
    next_id: AtomicU64,
    entries: Mutex<Entries>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. The same observer may be added more than once.
    pub fn add(&self, observer: Arc<dyn CaptureObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = Arc::new(ObserverEntry {
            id,
            active: AtomicBool::new(true),
            observer,
        });

        let mut entries = self.lock();
        let mut next = Vec::with_capacity(entries.len() + 1);
        next.extend(entries.iter().cloned());
        next.push(entry);
        *entries = Arc::new(next);

        debug!("Observer {:?} added ({} registered)", id, entries.len());
        id
    }

    /// Unregister an observer. Removing an unknown id is a no-op.
    pub fn remove(&self, id: ObserverId) -> bool {
        let mut entries = self.lock();
        let Some(entry) = entries.iter().find(|e| e.id == id) else {
            return false;
        };
        entry.active.store(false, Ordering::Release);

        let next: Vec<_> = entries.iter().filter(|e| e.id != id).cloned().collect();
        *entries = Arc::new(next);

        debug!("Observer {:?} removed ({} registered)", id, entries.len());
        true
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver a transition to every observer registered at fan-out start
    pub fn notify(&self, state: CaptureState, change: StateChange) {
        let snapshot = self.lock().clone();
        for entry in snapshot.iter() {
            if entry.active.load(Ordering::Acquire) {
                entry.observer.on_capture_state_changed(state, change);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn capturing() -> (CaptureState, StateChange) {
        (
            CaptureState {
                capturing: true,
                frame_available: false,
            },
            StateChange {
                capturing: true,
                frame_available: false,
            },
        )
    }

    fn counter() -> (Arc<AtomicUsize>, Arc<dyn CaptureObserver>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let observer: Arc<dyn CaptureObserver> = Arc::new(move |_: CaptureState, _: StateChange| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (count, observer)
    }

    #[test]
    fn test_notifies_in_insertion_order() {
        let set = ObserverSet::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            set.add(Arc::new(move |_: CaptureState, _: StateChange| {
                order.lock().unwrap().push(i)
            }));
        }
        let (state, change) = capturing();
        set.notify(state, change);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let set = ObserverSet::new();
        let (count, observer) = counter();
        let id = set.add(observer);
        assert!(set.remove(id));
        assert!(!set.remove(id));
        assert!(set.is_empty());

        let (state, change) = capturing();
        set.notify(state, change);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_duplicate_registration_notifies_twice() {
        let set = ObserverSet::new();
        let (count, observer) = counter();
        set.add(observer.clone());
        set.add(observer);
        let (state, change) = capturing();
        set.notify(state, change);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_removal_before_turn_skips_delivery() {
        let set = Arc::new(ObserverSet::new());
        let (late_count, late) = counter();

        let victim = Arc::new(Mutex::new(None::<ObserverId>));
        let remover = {
            let set = set.clone();
            let victim = victim.clone();
            move |_: CaptureState, _: StateChange| {
                if let Some(id) = victim.lock().unwrap().take() {
                    set.remove(id);
                }
            }
        };
        set.add(Arc::new(remover));
        let late_id = set.add(late);
        *victim.lock().unwrap() = Some(late_id);

        let (state, change) = capturing();
        set.notify(state, change);
        assert_eq!(late_count.load(Ordering::SeqCst), 0);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_observer_added_during_fanout_waits_for_next() {
        let set = Arc::new(ObserverSet::new());
        let (late_count, late) = counter();
        let pending = Arc::new(Mutex::new(Some(late)));

        let adder = {
            let set = set.clone();
            let pending = pending.clone();
            move |_: CaptureState, _: StateChange| {
                if let Some(observer) = pending.lock().unwrap().take() {
                    set.add(observer);
                }
            }
        };
        set.add(Arc::new(adder));

        let (state, change) = capturing();
        set.notify(state, change);
        assert_eq!(late_count.load(Ordering::SeqCst), 0);

        set.notify(state, change);
        assert_eq!(late_count.load(Ordering::SeqCst), 1);
    }
}
