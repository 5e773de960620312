use core::fmt;
use serde::{Deserialize, Serialize};

/// Reason code passed to listeners when telemetry items are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum DiscardReason {
    Unknown = 0,
    /// The endpoint rejected the items with a status that will not be retried.
    NonRetryableStatus = 1,
    /// The item failed validation before entering the pipeline.
    InvalidEvent = 2,
    SizeLimitExceeded = 3,
    KillSwitch = 4,
    QueueFull = 5,
}

impl DiscardReason {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::NonRetryableStatus => write!(f, "non-retryable status"),
            Self::InvalidEvent => write!(f, "invalid event"),
            Self::SizeLimitExceeded => write!(f, "size limit exceeded"),
            Self::KillSwitch => write!(f, "kill switch"),
            Self::QueueFull => write!(f, "queue full"),
        }
    }
}
