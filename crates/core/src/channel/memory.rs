use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use sonde_common::TelemetryItem;
use sonde_events::NotificationManager;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tracing::{debug, warn};

use super::ChannelControls;
use crate::{Configuration, Plugin, ProcessingPlugin, TelemetryCore};

pub const MEMORY_CHANNEL_DEFAULT_PRIORITY: i32 = 1000;

/// A transmission channel that keeps sent items in memory.
///
/// While paused, items are held back and handed off on `resume` or `flush`.
/// Every hand-off is reported to the notification manager found in the
/// configuration.
pub struct MemoryChannel {
    identifier: String,
    priority: i32,
    paused: AtomicBool,
    pending: Mutex<Vec<TelemetryItem>>,
    sent: Mutex<Vec<TelemetryItem>>,
    next: RwLock<Option<Arc<dyn ProcessingPlugin>>>,
    notification_manager: RwLock<Option<NotificationManager>>,
}

impl MemoryChannel {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self::with_priority(identifier, MEMORY_CHANNEL_DEFAULT_PRIORITY)
    }

    pub fn with_priority(identifier: impl Into<String>, priority: i32) -> Self {
        Self {
            identifier: identifier.into(),
            priority,
            paused: AtomicBool::new(false),
            pending: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            next: RwLock::new(None),
            notification_manager: RwLock::new(None),
        }
    }

    pub fn sent_items(&self) -> Vec<TelemetryItem> {
        self.sent.lock().clone()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    fn hand_off(&self, items: Vec<TelemetryItem>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        debug!("{}: sending {} items", self.identifier, items.len());
        if let Some(manager) = self.notification_manager.read().clone() {
            manager.events_sent(&items)?;
        }
        self.sent.lock().extend(items);
        Ok(())
    }
}

impl ProcessingPlugin for MemoryChannel {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn initialize(
        &self,
        config: &Arc<Configuration>,
        _core: &TelemetryCore,
        _extensions: &[Plugin],
    ) -> Result<()> {
        *self.notification_manager.write() = config.notification_manager().cloned();
        Ok(())
    }

    fn set_next_plugin(&self, next: Arc<dyn ProcessingPlugin>) {
        *self.next.write() = Some(next);
    }

    fn process_telemetry(&self, item: TelemetryItem) -> Result<()> {
        let next = self.next.read().clone();
        if self.is_paused() {
            self.pending.lock().push(item.clone());
        } else {
            self.hand_off(vec![item.clone()])?;
        }
        match next {
            Some(next) => next.process_telemetry(item),
            None => Ok(()),
        }
    }
}

impl ChannelControls for MemoryChannel {
    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        let pending = std::mem::take(&mut *self.pending.lock());
        if let Err(e) = self.hand_off(pending) {
            warn!("{}: failed to send held items on resume: {}", self.identifier, e);
        }
    }

    fn flush(&self) -> Result<()> {
        let pending = std::mem::take(&mut *self.pending.lock());
        self.hand_off(pending)
    }
}
