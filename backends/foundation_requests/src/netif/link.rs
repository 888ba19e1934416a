use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Network-layer state transitions reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The interface has a routable address.
    Up,
    Down,
}

pub type LinkCallback = Arc<dyn Fn(LinkEvent) + Send + Sync>;

/// Identifies a registered link callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// Source of link up/down notifications.
///
/// Events are edge triggered: a subscriber only hears about transitions
/// that happen after it subscribed, unless it asks for the current state to
/// be re-emitted with [`LinkMonitor::resend_status`].
pub trait LinkMonitor: Send + Sync {
    /// Registers `callback` for every subsequent link event.
    fn subscribe(&self, callback: LinkCallback) -> SubscriptionId;

    /// Removes a callback registered with [`LinkMonitor::subscribe`].
    fn unsubscribe(&self, id: SubscriptionId);

    /// Re-emits the current link state to every subscriber.
    fn resend_status(&self);
}

/// In-process [`LinkMonitor`] driven by the host through
/// [`LinkStateMonitor::set_state`].
pub struct LinkStateMonitor {
    state: Mutex<LinkEvent>,
    next_id: AtomicU64,
    subscribers: Mutex<BTreeMap<SubscriptionId, LinkCallback>>,
}

impl Default for LinkStateMonitor {
    fn default() -> Self {
        Self::new(LinkEvent::Down)
    }
}

impl LinkStateMonitor {
    #[must_use]
    pub fn new(initial: LinkEvent) -> Self {
        Self {
            state: Mutex::new(initial),
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(BTreeMap::new()),
        }
    }

    /// A monitor whose link is already up, as on a hosted OS.
    #[must_use]
    pub fn up() -> Self {
        Self::new(LinkEvent::Up)
    }

    #[must_use]
    pub fn state(&self) -> LinkEvent {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a transition and notifies subscribers when the state changed.
    pub fn set_state(&self, event: LinkEvent) {
        let changed = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let changed = *state != event;
            *state = event;
            changed
        };

        if changed {
            tracing::debug!("Link state changed: {:?}", event);
            self.notify(event);
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn notify(&self, event: LinkEvent) {
        // callbacks run outside the lock so they may unsubscribe
        let callbacks: Vec<LinkCallback> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        for callback in callbacks {
            callback(event);
        }
    }
}

impl LinkMonitor for LinkStateMonitor {
    fn subscribe(&self, callback: LinkCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, callback);
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    fn resend_status(&self) {
        self.notify(self.state());
    }
}
