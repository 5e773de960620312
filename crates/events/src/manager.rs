use anyhow::Result;
use parking_lot::RwLock;
use sonde_common::{DiscardReason, TelemetryItem};
use std::{fmt, sync::Arc};
use tracing::trace;

use crate::NotificationListener;

/// Registry of [`NotificationListener`]s.
///
/// Cloning yields another handle to the same registry. Notifications iterate
/// over a snapshot of the registered listeners taken when the notification
/// starts, so adding or removing listeners from inside a callback only affects
/// later notifications.
#[derive(Clone, Default)]
pub struct NotificationManager {
    listeners: Arc<RwLock<Vec<Arc<dyn NotificationListener>>>>,
}

impl NotificationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener. The same listener may be registered more than once.
    pub fn add_notification_listener(&self, listener: Arc<dyn NotificationListener>) {
        self.listeners.write().push(listener);
    }

    /// Removes every registration of `listener`, compared by allocation.
    pub fn remove_notification_listener(&self, listener: &Arc<dyn NotificationListener>) {
        self.listeners.write().retain(|registered| !Arc::ptr_eq(registered, listener));
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn events_discarded(&self, items: &[TelemetryItem], reason: DiscardReason) -> Result<()> {
        let listeners = self.snapshot();
        trace!(
            "notifying {} listeners of {} discarded items ({})",
            listeners.len(),
            items.len(),
            reason
        );
        for listener in listeners {
            listener.events_discarded(items, reason)?;
        }
        Ok(())
    }

    pub fn events_sent(&self, items: &[TelemetryItem]) -> Result<()> {
        for listener in self.snapshot() {
            listener.events_sent(items)?;
        }
        Ok(())
    }

    fn snapshot(&self) -> Vec<Arc<dyn NotificationListener>> {
        self.listeners.read().clone()
    }
}

impl fmt::Debug for NotificationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationManager")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
