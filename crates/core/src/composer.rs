use parking_lot::RwLock;
use serde_json::{Value, json};
use sonde_common::{DiscardReason, TelemetryItem};
use sonde_errors::{ConfigurationError, InvalidEventError, Result, SondeError};
use sonde_events::{NotificationListener, NotificationManager};
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tracing::{debug, info, warn};

use crate::{
    Configuration, Plugin, PluginRegistry, ProcessingPlugin,
    channel::{ChannelController, ChannelGroup, ControllerStage, DefaultChannelController, channel_count},
    diagnostics::{DiagnosticLogger, LoggingSeverity, MessageId, PollHandle, spawn_poll},
    pipeline::Pipeline,
    validation::validate_item,
};

struct CoreState {
    config: Arc<Configuration>,
    pipeline: Arc<Pipeline>,
}

struct CoreInner {
    controller: Arc<dyn ChannelController>,
    registry: PluginRegistry,
    notification_manager: NotificationManager,
    logger: DiagnosticLogger,
    /// Set while an `initialize` call is running or after one succeeded.
    claimed: AtomicBool,
    state: RwLock<Option<CoreState>>,
}

/// Composes plugins into a pipeline and dispatches telemetry through it.
///
/// Cloning yields another handle to the same core. The pipeline is built once
/// by [`TelemetryCore::initialize`] and is read-only afterwards, so `track` may
/// be called from any number of threads.
#[derive(Clone)]
pub struct TelemetryCore {
    inner: Arc<CoreInner>,
}

impl Default for TelemetryCore {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryCore {
    pub fn new() -> Self {
        Self::from_parts(Arc::new(DefaultChannelController::new()), PluginRegistry::new())
    }

    pub fn with_channel_controller(controller: Arc<dyn ChannelController>) -> Self {
        Self::from_parts(controller, PluginRegistry::new())
    }

    pub fn with_registry(registry: PluginRegistry) -> Self {
        Self::from_parts(Arc::new(DefaultChannelController::new()), registry)
    }

    pub fn from_parts(controller: Arc<dyn ChannelController>, registry: PluginRegistry) -> Self {
        Self {
            inner: Arc::new(CoreInner {
                controller,
                registry,
                notification_manager: NotificationManager::new(),
                logger: DiagnosticLogger::new(),
                claimed: AtomicBool::new(false),
                state: RwLock::new(None),
            }),
        }
    }

    /// Makes a plugin available to configurations that list it by `name`.
    pub fn register_extension<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Plugin + Send + Sync + 'static,
    {
        self.inner.registry.register(name, factory);
    }

    /// Builds the pipeline from `plugins`, the plugins attached to `config` and
    /// the plugins `config` names, then initializes the channel controller
    /// followed by every plugin in front of it.
    ///
    /// Succeeds at most once. A failed call leaves the core uninitialized and
    /// may be retried.
    pub fn initialize(&self, config: Configuration, plugins: Vec<Plugin>) -> Result<()> {
        if self
            .inner
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ConfigurationError::AlreadyInitialized.into());
        }

        match self.build_state(config, plugins) {
            Ok(state) => {
                info!(
                    "telemetry core initialized with {} extensions",
                    state.pipeline.extensions().len()
                );
                *self.inner.state.write() = Some(state);
                Ok(())
            }
            Err(e) => {
                self.inner.claimed.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    fn build_state(&self, mut config: Configuration, plugins: Vec<Plugin>) -> Result<CoreState> {
        config.validate()?;
        config.inject_notification_manager(self.inner.notification_manager.clone());
        self.inner.logger.configure(&config.diagnostics);

        let extensions = self.merge_extensions(&config, plugins)?;
        self.check_channel_priorities(&config, &extensions)?;

        let config = Arc::new(config);
        let terminal: Arc<dyn ProcessingPlugin> =
            Arc::new(ControllerStage::new(self.inner.controller.clone()));
        let pipeline = Pipeline::build(extensions, terminal);
        self.report_pipeline_warnings(&pipeline);

        pipeline.terminal().initialize(&config, self, pipeline.extensions())?;
        if channel_count(&self.inner.controller.channel_controls()) == 0 {
            return Err(SondeError::NoChannelsAvailable);
        }
        pipeline.link();

        for plugin in pipeline.initialization_order() {
            debug!("initializing {}", plugin.identifier());
            if let Err(e) = plugin.initialize(&config, self, pipeline.extensions()) {
                self.inner.logger.throw_internal(
                    LoggingSeverity::Critical,
                    MessageId::PLUGIN_INIT_FAILED,
                    format!("Failed to initialize extension {}: {}", plugin.identifier(), e),
                    Some(json!({ "extension": plugin.identifier() })),
                    true,
                );
                return Err(e.into());
            }
        }

        Ok(CoreState {
            config,
            pipeline: Arc::new(pipeline),
        })
    }

    fn merge_extensions(&self, config: &Configuration, plugins: Vec<Plugin>) -> Result<Vec<Plugin>> {
        let mut extensions = plugins;
        extensions.extend(config.extensions.iter().cloned());
        for name in &config.extension_names {
            let plugin = self.inner.registry.resolve(name).ok_or_else(|| {
                SondeError::Validation(format!("Extensions must provide callback to initialize: {name}"))
            })?;
            extensions.push(plugin);
        }
        Ok(extensions)
    }

    fn check_channel_priorities(&self, config: &Configuration, extensions: &[Plugin]) -> Result<()> {
        let controller_priority = self.inner.controller.priority();
        let channels = extensions
            .iter()
            .filter_map(Plugin::as_channel)
            .chain(config.channels.iter().flatten());
        for channel in channels {
            if channel.priority() <= controller_priority {
                return Err(SondeError::Validation(format!(
                    "Channel has invalid priority: {} ({} <= {})",
                    channel.identifier(),
                    channel.priority(),
                    controller_priority
                )));
            }
        }
        Ok(())
    }

    fn report_pipeline_warnings(&self, pipeline: &Pipeline) {
        for collision in pipeline.collisions() {
            let message = format!(
                "Two extensions have same priority #{} - {}, {}",
                collision.priority, collision.previous, collision.current
            );
            warn!("{}", message);
            self.inner.logger.throw_internal(
                LoggingSeverity::Warning,
                MessageId::DUPLICATE_PRIORITY,
                message,
                None,
                false,
            );
        }

        for plugin in pipeline.idle_extensions() {
            let message = format!(
                "Extension {} does not rank below the channel controller and will not receive telemetry",
                plugin.identifier()
            );
            warn!("{}", message);
            self.inner.logger.throw_internal(
                LoggingSeverity::Warning,
                MessageId::IDLE_EXTENSION,
                message,
                Some(json!({ "extension": plugin.identifier(), "priority": plugin.priority() })),
                true,
            );
        }
    }

    /// Fills the instrumentation key, time and schema version where missing,
    /// validates the item and hands it to the head of the pipeline.
    pub fn track(&self, mut item: TelemetryItem) -> Result<()> {
        let (config, pipeline) = self.initialized_state()?;
        item.apply_defaults(&config.instrumentation_key);
        validate_item(&item, &self.inner.notification_manager)?;
        pipeline.head().process_telemetry(item)?;
        Ok(())
    }

    /// Tracks a JSON payload. `null` and payloads that are not a telemetry item
    /// are reported as discarded and rejected, whether or not the core is
    /// initialized.
    pub fn track_raw(&self, payload: &Value) -> Result<()> {
        let reason = if payload.is_null() {
            "telemetry item is null".to_string()
        } else {
            match serde_json::from_value::<TelemetryItem>(payload.clone()) {
                Ok(item) => return self.track(item),
                Err(e) => e.to_string(),
            }
        };

        debug!("discarding malformed payload: {}", reason);
        self.inner.notification_manager.events_discarded(&[], DiscardReason::InvalidEvent)?;
        Err(InvalidEventError::Malformed(reason).into())
    }

    pub fn get_transmission_controls(&self) -> Vec<ChannelGroup> {
        self.inner.controller.channel_controls()
    }

    pub fn add_notification_listener(&self, listener: Arc<dyn NotificationListener>) {
        self.inner.notification_manager.add_notification_listener(listener);
    }

    pub fn remove_notification_listener(&self, listener: &Arc<dyn NotificationListener>) {
        self.inner.notification_manager.remove_notification_listener(listener);
    }

    pub fn notification_manager(&self) -> &NotificationManager {
        &self.inner.notification_manager
    }

    pub fn logger(&self) -> &DiagnosticLogger {
        &self.inner.logger
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.inner.registry
    }

    pub fn configuration(&self) -> Option<Arc<Configuration>> {
        self.inner.state.read().as_ref().map(|state| state.config.clone())
    }

    pub fn pipeline(&self) -> Option<Arc<Pipeline>> {
        self.inner.state.read().as_ref().map(|state| state.pipeline.clone())
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.state.read().is_some()
    }

    /// Takes every diagnostic message queued when the flush starts off the queue
    /// and tracks it. Returns how many were flushed.
    ///
    /// Messages queued while flushing, including by a concurrent flush, are left
    /// for the next one. All messages are submitted even if one fails; the first
    /// failure is returned.
    pub fn flush_internal_logs(&self) -> Result<usize> {
        if self.inner.logger.queue_len() == 0 {
            return Ok(0);
        }
        let (config, _) = self.initialized_state()?;
        let batch = self.inner.logger.drain_queued();

        let mut first_error = None;
        for message in &batch {
            if let Err(e) = self.track(message.to_telemetry_item(&config.instrumentation_key)) {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(batch.len()),
        }
    }

    /// Starts flushing internal logs on the configured interval. Must be called
    /// from within a tokio runtime.
    pub fn poll_internal_logs(&self) -> PollHandle {
        let period = self.inner.logger.config().poll_interval();
        let core = self.clone();
        debug!("polling internal logs every {:?}", period);
        spawn_poll(period, move || core.flush_internal_logs())
    }

    fn initialized_state(&self) -> Result<(Arc<Configuration>, Arc<Pipeline>)> {
        self.inner
            .state
            .read()
            .as_ref()
            .map(|state| (state.config.clone(), state.pipeline.clone()))
            .ok_or_else(|| ConfigurationError::NotInitialized.into())
    }
}

impl fmt::Debug for TelemetryCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryCore")
            .field("initialized", &self.is_initialized())
            .field("registry", &self.inner.registry)
            .field("notification_manager", &self.inner.notification_manager)
            .field("logger", &self.inner.logger)
            .finish()
    }
}
