//! Recording plugins and controllers for exercising pipelines in tests.

use anyhow::{Result, bail};
use parking_lot::{Mutex, RwLock};
use sonde_common::TelemetryItem;
use std::sync::Arc;

use crate::{
    ChannelController, ChannelGroup, Configuration, DefaultChannelController, InitOnlyPlugin, Plugin,
    ProcessingPlugin, TelemetryCore,
};

/// Shared, ordered record of plugin calls such as `init:a`, `next:a->b`,
/// `process:a:PageView`.
#[derive(Clone, Default, Debug)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn entries_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries().into_iter().filter(|entry| entry.starts_with(prefix)).collect()
    }
}

/// A processing stage that logs each hook call and forwards items to its successor.
pub struct RecordingPlugin {
    identifier: String,
    priority: i32,
    log: CallLog,
    fail_init: bool,
    next: RwLock<Option<Arc<dyn ProcessingPlugin>>>,
    processed: Mutex<Vec<TelemetryItem>>,
}

impl RecordingPlugin {
    pub fn new(identifier: &str, priority: i32, log: CallLog) -> Self {
        Self {
            identifier: identifier.to_string(),
            priority,
            log,
            fail_init: false,
            next: RwLock::new(None),
            processed: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn processed(&self) -> Vec<TelemetryItem> {
        self.processed.lock().clone()
    }

    pub fn next_identifier(&self) -> Option<String> {
        self.next.read().as_ref().map(|next| next.identifier().to_string())
    }
}

impl ProcessingPlugin for RecordingPlugin {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn initialize(
        &self,
        _config: &Arc<Configuration>,
        _core: &TelemetryCore,
        _extensions: &[Plugin],
    ) -> Result<()> {
        self.log.push(format!("init:{}", self.identifier));
        if self.fail_init {
            bail!("{} failed to initialize", self.identifier);
        }
        Ok(())
    }

    fn set_next_plugin(&self, next: Arc<dyn ProcessingPlugin>) {
        self.log.push(format!("next:{}->{}", self.identifier, next.identifier()));
        *self.next.write() = Some(next);
    }

    fn process_telemetry(&self, item: TelemetryItem) -> Result<()> {
        self.log.push(format!(
            "process:{}:{}",
            self.identifier,
            item.name.as_deref().unwrap_or_default()
        ));
        self.processed.lock().push(item.clone());
        let next = self.next.read().clone();
        match next {
            Some(next) => next.process_telemetry(item),
            None => Ok(()),
        }
    }
}

pub struct RecordingInitPlugin {
    identifier: String,
    log: CallLog,
    fail_init: bool,
}

impl RecordingInitPlugin {
    pub fn new(identifier: &str, log: CallLog) -> Self {
        Self {
            identifier: identifier.to_string(),
            log,
            fail_init: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail_init = true;
        self
    }
}

impl InitOnlyPlugin for RecordingInitPlugin {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn initialize(
        &self,
        _config: &Arc<Configuration>,
        _core: &TelemetryCore,
        _extensions: &[Plugin],
    ) -> Result<()> {
        self.log.push(format!("init:{}", self.identifier));
        if self.fail_init {
            bail!("{} failed to initialize", self.identifier);
        }
        Ok(())
    }
}

/// Logs controller calls, then delegates to a [`DefaultChannelController`].
#[derive(Default)]
pub struct RecordingController {
    inner: DefaultChannelController,
    log: CallLog,
}

impl RecordingController {
    pub fn new(log: CallLog) -> Self {
        Self {
            inner: DefaultChannelController::new(),
            log,
        }
    }
}

impl ChannelController for RecordingController {
    fn initialize(
        &self,
        config: &Arc<Configuration>,
        core: &TelemetryCore,
        extensions: &[Plugin],
    ) -> Result<()> {
        self.log.push("init:controller");
        self.inner.initialize(config, core, extensions)
    }

    fn process_telemetry(&self, item: TelemetryItem) -> Result<()> {
        self.log.push(format!("process:controller:{}", item.name.as_deref().unwrap_or_default()));
        self.inner.process_telemetry(item)
    }

    fn channel_controls(&self) -> Vec<ChannelGroup> {
        self.inner.channel_controls()
    }
}
