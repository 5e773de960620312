use chrono::{DateTime, Utc};
use core::fmt;
use serde::Serialize;
use sonde_common::DiscardReason;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    /// Sent when items were dropped before reaching a transmission channel.
    EventsDiscarded {
        names: Vec<String>,
        reason: DiscardReason,
    },
    /// Sent when a transmission channel handed items off.
    EventsSent { names: Vec<String> },
}

impl NotificationEvent {
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::EventsDiscarded { .. })
    }

    pub fn item_count(&self) -> usize {
        match self {
            Self::EventsDiscarded { names, .. } | Self::EventsSent { names } => names.len(),
        }
    }
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EventsDiscarded { names, reason } => {
                write!(f, "Discarded {} events ({}): {:?}", names.len(), reason, names)
            }
            Self::EventsSent { names } => {
                write!(f, "Sent {} events: {:?}", names.len(), names)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationInfo {
    pub event: NotificationEvent,
    pub time: DateTime<Utc>,
    pub formatted_log: String,
}

impl NotificationInfo {
    pub const fn is_error(&self) -> bool {
        self.event.is_error()
    }
}
