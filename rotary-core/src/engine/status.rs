//! Status publication: observer fan-out plus a broadcast stream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tokio::sync::broadcast;
use tracing::info;

use crate::events::{LifecycleState, StatusEvent, StatusObserver};
use crate::observer::{ObserverRegistry, SubscriptionId};

/// Broadcast channel capacity: 256 status events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

pub(crate) struct StatusHub {
    state: RwLock<LifecycleState>,
    /// Held across delivery so observers see events in order and a replay
    /// never overtakes a live event. Reentrant: an observer may query or
    /// register observers from inside its callback.
    delivery: ReentrantMutex<()>,
    latest: Mutex<Option<StatusEvent>>,
    seq: AtomicU64,
    observers: ObserverRegistry<dyn StatusObserver>,
    tx: broadcast::Sender<StatusEvent>,
}

impl StatusHub {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAP);
        Self {
            state: RwLock::new(LifecycleState::Initializing),
            delivery: ReentrantMutex::new(()),
            latest: Mutex::new(None),
            seq: AtomicU64::new(0),
            observers: ObserverRegistry::new(),
            tx,
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    pub(crate) fn latest(&self) -> Option<StatusEvent> {
        self.latest.lock().clone()
    }

    /// Record `state` and deliver `status` to every observer and subscriber.
    pub(crate) fn publish(&self, status: impl Into<String>, state: LifecycleState) {
        let _delivery = self.delivery.lock();
        let event = StatusEvent {
            seq: self.seq.fetch_add(1, Ordering::Relaxed) + 1,
            status: status.into(),
            state,
        };
        *self.state.write() = state;
        *self.latest.lock() = Some(event.clone());
        info!(seq = event.seq, status = %event.status, %state, "status");

        self.observers.for_each(|o| o.status_updated(&event));
        // No receivers is fine.
        let _ = self.tx.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    /// Register `observer` and replay the latest event to it.
    pub(crate) fn add_observer(&self, observer: Arc<dyn StatusObserver>) -> SubscriptionId {
        let _delivery = self.delivery.lock();
        let id = self.observers.subscribe(Arc::clone(&observer));
        if let Some(event) = self.latest() {
            observer.status_updated(&event);
        }
        id
    }

    pub(crate) fn remove_observer(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }
}
