use anyhow::Result;
use chrono::Utc;
use sonde_common::{DiscardReason, TelemetryItem};
use tokio::sync::broadcast;

use crate::{NotificationEvent, NotificationInfo, NotificationListener};

const NOTIFICATION_CHANNEL_CAPACITY: usize = 1024;

/// Republishes listener callbacks on a broadcast channel, for hosts that
/// consume notifications from async tasks instead of synchronous callbacks.
#[derive(Debug, Clone)]
pub struct NotificationChannel {
    tx: broadcast::Sender<NotificationInfo>,
}

impl Default for NotificationChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationChannel {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn publisher(&self) -> NotificationPublisher {
        NotificationPublisher {
            tx: self.tx.clone(),
        }
    }

    pub fn subscribe(&self) -> NotificationSubscriber {
        NotificationSubscriber {
            rx: self.tx.subscribe(),
        }
    }
}

impl NotificationListener for NotificationChannel {
    fn events_discarded(&self, items: &[TelemetryItem], reason: DiscardReason) -> Result<()> {
        self.publisher().send(NotificationEvent::EventsDiscarded {
            names: item_names(items),
            reason,
        });
        Ok(())
    }

    fn events_sent(&self, items: &[TelemetryItem]) -> Result<()> {
        self.publisher().send(NotificationEvent::EventsSent {
            names: item_names(items),
        });
        Ok(())
    }
}

fn item_names(items: &[TelemetryItem]) -> Vec<String> {
    items.iter().map(|item| item.name.clone().unwrap_or_default()).collect()
}

#[derive(Debug, Clone)]
pub struct NotificationPublisher {
    tx: broadcast::Sender<NotificationInfo>,
}

impl NotificationPublisher {
    pub fn send(&self, event: NotificationEvent) {
        let formatted_log = event.to_string();
        let info = NotificationInfo {
            event,
            time: Utc::now(),
            formatted_log,
        };
        // no subscribers is not an error
        let _ = self.tx.send(info);
    }
}

#[derive(Debug)]
pub struct NotificationSubscriber {
    rx: broadcast::Receiver<NotificationInfo>,
}

impl NotificationSubscriber {
    pub async fn recv(&mut self) -> Result<NotificationInfo, broadcast::error::RecvError> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<NotificationInfo, broadcast::error::TryRecvError> {
        self.rx.try_recv()
    }
}
