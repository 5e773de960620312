use anyhow::Result;
use log::{debug, warn};
use sonde_common::{DiscardReason, TelemetryItem};
use sonde_events::NotificationListener;

/// Writes pipeline notifications to the log.
#[derive(Debug, Default)]
pub struct LoggingListener;

impl NotificationListener for LoggingListener {
    fn events_discarded(&self, items: &[TelemetryItem], reason: DiscardReason) -> Result<()> {
        warn!("{} events discarded: {} (code {})", items.len(), reason, reason.code());
        Ok(())
    }

    fn events_sent(&self, items: &[TelemetryItem]) -> Result<()> {
        debug!("{} events sent", items.len());
        Ok(())
    }
}
