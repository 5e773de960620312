use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sonde_errors::{ConfigurationError, Result};
use sonde_events::NotificationManager;
use std::{collections::HashMap, time::Duration};

use crate::plugin::{ChannelHandle, Plugin};

/// Key under which the core publishes its [`NotificationManager`] in
/// [`Configuration::extension_config`].
pub const NOTIFICATION_MANAGER_KEY: &str = "NotificationManager";

/// Period of the internal log poll when none (or a non-positive one) is configured.
pub const DEFAULT_DIAGNOSTIC_LOG_INTERVAL: Duration = Duration::from_millis(10_000);

pub const DEFAULT_MAX_MESSAGE_LIMIT: usize = 25;

/// Configuration handed to [`crate::TelemetryCore::initialize`].
///
/// After initialization the core owns it and shares it with every plugin
/// through an `Arc`; plugins never receive their own copy.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Identifies the resource telemetry is sent to. Must not be empty.
    pub instrumentation_key: String,

    /// Names of plugins resolved through the core's plugin registry.
    #[serde(rename = "extensions")]
    pub extension_names: Vec<String>,

    /// Plugin instances attached programmatically. Merged after the plugins
    /// passed to `initialize` and before the name-resolved ones.
    #[serde(skip)]
    pub extensions: Vec<Plugin>,

    /// Transmission channel groups handed to the channel controller.
    #[serde(skip)]
    pub channels: Vec<Vec<ChannelHandle>>,

    /// Per-plugin settings keyed by plugin identifier.
    pub extension_config: HashMap<String, ExtensionConfig>,

    pub diagnostics: DiagnosticsConfig,
}

impl Configuration {
    pub fn new(instrumentation_key: impl Into<String>) -> Self {
        Self {
            instrumentation_key: instrumentation_key.into(),
            ..Default::default()
        }
    }

    pub fn with_extension(mut self, plugin: Plugin) -> Self {
        self.extensions.push(plugin);
        self
    }

    pub fn with_extension_name(mut self, name: impl Into<String>) -> Self {
        self.extension_names.push(name.into());
        self
    }

    pub fn with_channel_group(mut self, group: Vec<ChannelHandle>) -> Self {
        self.channels.push(group);
        self
    }

    pub fn with_extension_setting(
        mut self,
        identifier: &str,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.extension_config
            .entry(identifier.to_string())
            .or_default()
            .settings
            .insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.instrumentation_key.trim().is_empty() {
            return Err(ConfigurationError::MissingInstrumentationKey.into());
        }
        Ok(())
    }

    /// The notification manager injected by the core during initialization.
    pub fn notification_manager(&self) -> Option<&NotificationManager> {
        self.extension_config
            .get(NOTIFICATION_MANAGER_KEY)
            .and_then(|config| config.notification_manager.as_ref())
    }

    pub fn extension_settings(&self, identifier: &str) -> Option<&Map<String, Value>> {
        self.extension_config.get(identifier).map(|config| &config.settings)
    }

    pub(crate) fn inject_notification_manager(&mut self, manager: NotificationManager) {
        self.extension_config
            .entry(NOTIFICATION_MANAGER_KEY.to_string())
            .or_default()
            .notification_manager = Some(manager);
    }
}

/// Settings for a single plugin.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExtensionConfig {
    #[serde(flatten)]
    pub settings: Map<String, Value>,

    #[serde(skip)]
    pub notification_manager: Option<NotificationManager>,
}

/// Tuning for the internal diagnostic logger.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Period between internal log flushes in milliseconds. Non-positive values
    /// select [`DEFAULT_DIAGNOSTIC_LOG_INTERVAL`].
    pub diagnostic_log_interval_ms: i64,

    /// Highest severity mirrored to the log output: 0 off, 1 critical, 2 warnings.
    pub logging_level_console: u8,

    /// Highest severity queued as telemetry: 0 off, 1 critical, 2 warnings.
    pub logging_level_telemetry: u8,

    /// Messages queued per session before the logger throttles itself.
    pub max_message_limit: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            diagnostic_log_interval_ms: DEFAULT_DIAGNOSTIC_LOG_INTERVAL.as_millis() as i64,
            logging_level_console: 0,
            logging_level_telemetry: 1,
            max_message_limit: DEFAULT_MAX_MESSAGE_LIMIT,
        }
    }
}

impl DiagnosticsConfig {
    pub fn poll_interval(&self) -> Duration {
        match u64::try_from(self.diagnostic_log_interval_ms) {
            Ok(ms) if ms > 0 => Duration::from_millis(ms),
            _ => DEFAULT_DIAGNOSTIC_LOG_INTERVAL,
        }
    }
}
