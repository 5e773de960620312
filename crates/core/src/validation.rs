use sonde_common::{DiscardReason, TelemetryItem};
use sonde_errors::{InvalidEventError, Result};
use sonde_events::NotificationManager;
use tracing::debug;

/// Checks the fields every item needs before it may enter the pipeline.
///
/// Name, time and instrumentation key are checked in that order. The first
/// missing one is reported to the notification manager as a discard and then
/// returned as the error.
pub fn validate_item(item: &TelemetryItem, notifications: &NotificationManager) -> Result<()> {
    let missing = if !item.has_name() {
        Some("name")
    } else if !item.has_time() {
        Some("time")
    } else if !item.has_ikey() {
        Some("iKey")
    } else {
        None
    };

    if let Some(field) = missing {
        debug!("discarding item without {}: {:?}", field, item.name);
        notifications.events_discarded(std::slice::from_ref(item), DiscardReason::InvalidEvent)?;
        return Err(InvalidEventError::MissingField(field).into());
    }

    Ok(())
}
