use anyhow::Result;
use sonde_common::TelemetryItem;
use std::{fmt, sync::Arc};

use crate::{
    Configuration, TelemetryCore,
    channel::{ChannelControls, TransmissionChannel},
};

/// A plugin that only needs to be set up. It has no priority and never
/// receives telemetry.
pub trait InitOnlyPlugin: Send + Sync {
    fn identifier(&self) -> &str;

    fn initialize(
        &self,
        config: &Arc<Configuration>,
        core: &TelemetryCore,
        extensions: &[Plugin],
    ) -> Result<()>;
}

/// A pipeline stage. Stages are ordered by ascending priority and each one
/// is responsible for forwarding items to the successor it was given.
pub trait ProcessingPlugin: Send + Sync {
    fn identifier(&self) -> &str;

    fn priority(&self) -> i32;

    fn initialize(
        &self,
        config: &Arc<Configuration>,
        core: &TelemetryCore,
        extensions: &[Plugin],
    ) -> Result<()>;

    /// Called once the channel controller is up, before this plugin's
    /// `initialize`. A core whose `initialize` failed in a plugin hook links
    /// again on retry, so the same plugin may then see a second call.
    fn set_next_plugin(&self, next: Arc<dyn ProcessingPlugin>);

    fn process_telemetry(&self, item: TelemetryItem) -> Result<()>;
}

/// Both faces of a transmission channel: the stage that receives items and the
/// controls the host uses to pause, resume and flush it.
#[derive(Clone)]
pub struct ChannelHandle {
    pub processing: Arc<dyn ProcessingPlugin>,
    pub controls: Arc<dyn ChannelControls>,
}

impl ChannelHandle {
    pub fn new<T: TransmissionChannel + 'static>(channel: Arc<T>) -> Self {
        Self {
            processing: channel.clone(),
            controls: channel,
        }
    }

    pub fn identifier(&self) -> &str {
        self.processing.identifier()
    }

    pub fn priority(&self) -> i32 {
        self.processing.priority()
    }
}

impl fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("identifier", &self.identifier())
            .field("priority", &self.priority())
            .field("paused", &self.controls.is_paused())
            .finish()
    }
}

/// A plugin, tagged by capability when it is registered.
#[derive(Clone)]
pub enum Plugin {
    InitOnly(Arc<dyn InitOnlyPlugin>),
    Processing(Arc<dyn ProcessingPlugin>),
    /// A processing plugin owned by the channel controller rather than the core.
    Channel(ChannelHandle),
}

impl Plugin {
    pub fn init_only<T: InitOnlyPlugin + 'static>(plugin: Arc<T>) -> Self {
        Self::InitOnly(plugin)
    }

    pub fn processing<T: ProcessingPlugin + 'static>(plugin: Arc<T>) -> Self {
        Self::Processing(plugin)
    }

    pub fn channel<T: TransmissionChannel + 'static>(channel: Arc<T>) -> Self {
        Self::Channel(ChannelHandle::new(channel))
    }

    pub fn identifier(&self) -> &str {
        match self {
            Self::InitOnly(plugin) => plugin.identifier(),
            Self::Processing(plugin) => plugin.identifier(),
            Self::Channel(channel) => channel.identifier(),
        }
    }

    /// `None` for initialization-only plugins.
    pub fn priority(&self) -> Option<i32> {
        self.as_processing().map(|plugin| plugin.priority())
    }

    pub const fn is_init_only(&self) -> bool {
        matches!(self, Self::InitOnly(_))
    }

    pub fn as_processing(&self) -> Option<&Arc<dyn ProcessingPlugin>> {
        match self {
            Self::InitOnly(_) => None,
            Self::Processing(plugin) => Some(plugin),
            Self::Channel(channel) => Some(&channel.processing),
        }
    }

    pub const fn as_channel(&self) -> Option<&ChannelHandle> {
        match self {
            Self::Channel(channel) => Some(channel),
            _ => None,
        }
    }

    pub fn initialize(
        &self,
        config: &Arc<Configuration>,
        core: &TelemetryCore,
        extensions: &[Self],
    ) -> Result<()> {
        match self {
            Self::InitOnly(plugin) => plugin.initialize(config, core, extensions),
            Self::Processing(plugin) => plugin.initialize(config, core, extensions),
            Self::Channel(channel) => channel.processing.initialize(config, core, extensions),
        }
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitOnly(plugin) => f.debug_tuple("InitOnly").field(&plugin.identifier()).finish(),
            Self::Processing(plugin) => f
                .debug_tuple("Processing")
                .field(&plugin.identifier())
                .field(&plugin.priority())
                .finish(),
            Self::Channel(channel) => f.debug_tuple("Channel").field(channel).finish(),
        }
    }
}
