//! Internal diagnostics: messages the core and its plugins raise about
//! themselves, queued and periodically tracked as telemetry.

use parking_lot::Mutex;
use serde_json::{Value, json};
use sonde_common::TelemetryItem;
use sonde_errors::Result;
use std::{
    collections::{HashSet, VecDeque},
    fmt,
    sync::Arc,
    time::Duration,
};
use tokio::{
    task::{JoinError, JoinHandle},
    time::{Instant, MissedTickBehavior, interval_at},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::DiagnosticsConfig;

pub const INTERNAL_MESSAGE_BASE_TYPE: &str = "MessageData";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LoggingSeverity {
    Critical = 1,
    Warning = 2,
}

impl LoggingSeverity {
    const fn level(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub u32);

impl MessageId {
    pub const PLUGIN_INIT_FAILED: Self = Self(1);
    pub const DUPLICATE_PRIORITY: Self = Self(2);
    pub const IDLE_EXTENSION: Self = Self(3);
    pub const MESSAGE_LIMIT_EXCEEDED: Self = Self(4);
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticMessage {
    pub message_id: MessageId,
    pub message: String,
    pub properties: Option<Value>,
}

impl DiagnosticMessage {
    pub fn new(message_id: MessageId, message: impl Into<String>) -> Self {
        Self {
            message_id,
            message: message.into(),
            properties: None,
        }
    }

    /// The item a flush submits for this message.
    pub fn to_telemetry_item(&self, ikey: &str) -> TelemetryItem {
        let mut base_data = json!({ "message": self.message });
        if let Some(properties) = &self.properties {
            base_data["properties"] = properties.clone();
        }
        TelemetryItem::new(format!("InternalMessageId: {}", self.message_id))
            .with_ikey(ikey)
            .with_base(INTERNAL_MESSAGE_BASE_TYPE, base_data)
    }
}

#[derive(Default)]
struct LoggerState {
    config: DiagnosticsConfig,
    queue: VecDeque<DiagnosticMessage>,
    /// Ids queued in the current session.
    queued_ids: HashSet<MessageId>,
    /// Ids of user-actionable messages already written to the log output.
    reported_ids: HashSet<MessageId>,
    message_count: usize,
}

impl LoggerState {
    fn is_throttled(&self) -> bool {
        self.message_count >= self.config.max_message_limit
    }

    fn enqueue(&mut self, message: DiagnosticMessage) {
        if self.is_throttled() || !self.queued_ids.insert(message.message_id) {
            return;
        }
        self.queue.push_back(message);
        self.message_count += 1;

        if self.message_count == self.config.max_message_limit {
            let text = "Internal events throttle limit reached for this session.";
            warn!("{}", text);
            self.queue.push_back(DiagnosticMessage::new(MessageId::MESSAGE_LIMIT_EXCEEDED, text));
        }
    }
}

/// Queue of internal diagnostic messages.
///
/// Cloning yields another handle to the same queue. A message id is queued at
/// most once per session, and a session queues at most
/// [`DiagnosticsConfig::max_message_limit`] messages before a single
/// limit-exceeded message is appended and the rest are dropped.
#[derive(Clone, Default)]
pub struct DiagnosticLogger {
    state: Arc<Mutex<LoggerState>>,
}

impl DiagnosticLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configure(&self, config: &DiagnosticsConfig) {
        self.state.lock().config = config.clone();
    }

    pub fn config(&self) -> DiagnosticsConfig {
        self.state.lock().config.clone()
    }

    pub fn throw_internal(
        &self,
        severity: LoggingSeverity,
        message_id: MessageId,
        message: impl Into<String>,
        properties: Option<Value>,
        user_actionable: bool,
    ) {
        let message = DiagnosticMessage {
            message_id,
            message: message.into(),
            properties,
        };
        let mut state = self.state.lock();

        if severity.level() <= state.config.logging_level_console {
            let first_report = state.reported_ids.insert(message_id);
            if !user_actionable || first_report {
                match severity {
                    LoggingSeverity::Critical => error!("[{}] {}", message_id, message.message),
                    LoggingSeverity::Warning => warn!("[{}] {}", message_id, message.message),
                }
            }
        } else {
            debug!("[{}] {}", message_id, message.message);
        }

        if severity.level() <= state.config.logging_level_telemetry {
            state.enqueue(message);
        }
    }

    /// Starts a new session: ids may be queued again and the message limit resets.
    pub fn reset_internal_message_count(&self) {
        let mut state = self.state.lock();
        state.message_count = 0;
        state.queued_ids.clear();
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn snapshot(&self) -> Vec<DiagnosticMessage> {
        self.state.lock().queue.iter().cloned().collect()
    }

    /// Removes and returns every queued message. Messages queued afterwards stay
    /// for the next drain.
    pub fn drain_queued(&self) -> Vec<DiagnosticMessage> {
        self.state.lock().queue.drain(..).collect()
    }
}

impl fmt::Debug for DiagnosticLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DiagnosticLogger")
            .field("queued", &state.queue.len())
            .field("message_count", &state.message_count)
            .finish()
    }
}

/// Handle to a running internal log poll. Dropping it leaves the poll running.
pub struct PollHandle {
    cancellation_token: CancellationToken,
    handle: JoinHandle<()>,
    interval: Duration,
}

impl PollHandle {
    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits for the poll task to stop. Only returns after [`Self::cancel`].
    pub async fn join(self) -> std::result::Result<(), JoinError> {
        self.handle.await
    }
}

/// Calls `flush` once per `period`, starting one period from now.
pub(crate) fn spawn_poll<F>(period: Duration, flush: F) -> PollHandle
where
    F: Fn() -> Result<usize> + Send + 'static,
{
    let cancellation_token = CancellationToken::new();
    let token = cancellation_token.clone();

    let handle = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("internal log poll cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    match flush() {
                        Ok(0) => {}
                        Ok(flushed) => debug!("flushed {} internal messages", flushed),
                        Err(e) => error!("failed to flush internal messages: {}", e),
                    }
                }
            }
        }
    });

    PollHandle {
        cancellation_token,
        handle,
        interval: period,
    }
}
