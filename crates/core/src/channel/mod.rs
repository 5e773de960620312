//! The terminal stage of the pipeline: a channel controller that owns one or
//! more groups of transmission channels.

use anyhow::Result;
use mockall::automock;
use sonde_common::TelemetryItem;
use std::sync::Arc;
use tracing::debug;

use crate::{Configuration, Plugin, ProcessingPlugin, TelemetryCore};

pub mod controller;
pub mod memory;

pub use controller::DefaultChannelController;
pub use memory::MemoryChannel;

/// Priority of the default channel controller. Plugins below it form the
/// processing chain, channels sit above it.
pub const CHANNEL_CONTROLLER_PRIORITY: i32 = 500;

pub const CHANNEL_CONTROLLER_IDENTIFIER: &str = "ChannelControllerPlugin";

/// Controls of one channel inside a channel group.
#[automock]
pub trait ChannelControls: Send + Sync {
    fn is_paused(&self) -> bool;

    fn pause(&self);

    fn resume(&self);

    /// Hands off anything the channel is holding back.
    fn flush(&self) -> Result<()>;
}

/// A processing stage that is also a transmission channel.
pub trait TransmissionChannel: ProcessingPlugin + ChannelControls {}

impl<T: ProcessingPlugin + ChannelControls> TransmissionChannel for T {}

pub type ChannelGroup = Vec<Arc<dyn ChannelControls>>;

/// Counts channels across all groups.
pub fn channel_count(groups: &[ChannelGroup]) -> usize {
    groups.iter().map(Vec::len).sum()
}

/// The collaborator the core hands every validated item to once the
/// processing chain is done with it.
#[automock]
pub trait ChannelController: Send + Sync {
    fn priority(&self) -> i32 {
        CHANNEL_CONTROLLER_PRIORITY
    }

    /// Receives the full ordered plugin list so it can pick up channels
    /// registered as extensions.
    fn initialize(
        &self,
        config: &Arc<Configuration>,
        core: &TelemetryCore,
        extensions: &[Plugin],
    ) -> Result<()>;

    fn process_telemetry(&self, item: TelemetryItem) -> Result<()>;

    fn channel_controls(&self) -> Vec<ChannelGroup>;
}

/// Presents a [`ChannelController`] as the last stage of the pipeline.
pub(crate) struct ControllerStage {
    controller: Arc<dyn ChannelController>,
}

impl ControllerStage {
    pub(crate) fn new(controller: Arc<dyn ChannelController>) -> Self {
        Self { controller }
    }
}

impl ProcessingPlugin for ControllerStage {
    fn identifier(&self) -> &str {
        CHANNEL_CONTROLLER_IDENTIFIER
    }

    fn priority(&self) -> i32 {
        self.controller.priority()
    }

    fn initialize(
        &self,
        config: &Arc<Configuration>,
        core: &TelemetryCore,
        extensions: &[Plugin],
    ) -> Result<()> {
        self.controller.initialize(config, core, extensions)
    }

    fn set_next_plugin(&self, next: Arc<dyn ProcessingPlugin>) {
        // fan-out to channels happens inside the controller
        debug!("channel controller ignores successor {}", next.identifier());
    }

    fn process_telemetry(&self, item: TelemetryItem) -> Result<()> {
        self.controller.process_telemetry(item)
    }
}
