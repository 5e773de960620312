use anyhow::Result;
use mockall::automock;
use sonde_common::{DiscardReason, TelemetryItem};

/// Observer of pipeline-level lifecycle events.
///
/// Every callback has a no-op default, so a listener only implements the
/// notifications it cares about. An error returned from a callback is not
/// caught by the [`crate::NotificationManager`]; it surfaces to whoever raised
/// the notification.
#[automock]
pub trait NotificationListener: Send + Sync {
    /// Called when items are dropped before reaching a transmission channel.
    fn events_discarded(&self, _items: &[TelemetryItem], _reason: DiscardReason) -> Result<()> {
        Ok(())
    }

    /// Called by transmission channels once items have been handed off.
    fn events_sent(&self, _items: &[TelemetryItem]) -> Result<()> {
        Ok(())
    }
}
