use anyhow::Result;
use parking_lot::RwLock;
use sonde_common::TelemetryItem;
use std::sync::Arc;
use tracing::{debug, trace};

use super::{ChannelController, ChannelGroup};
use crate::{ChannelHandle, Configuration, Plugin, TelemetryCore};

/// Fans every item out to the head of each channel group.
///
/// Groups come from [`Configuration::channels`] and, as one extra group, from
/// the channel plugins in the extension list. Each group is sorted by priority,
/// linked head to tail and initialized.
#[derive(Default)]
pub struct DefaultChannelController {
    channel_queue: RwLock<Vec<Vec<ChannelHandle>>>,
}

impl DefaultChannelController {
    pub fn new() -> Self {
        Self::default()
    }

    fn prepare_group(
        mut group: Vec<ChannelHandle>,
        config: &Arc<Configuration>,
        core: &TelemetryCore,
        extensions: &[Plugin],
    ) -> Result<Vec<ChannelHandle>> {
        group.sort_by_key(ChannelHandle::priority);
        for pair in group.windows(2) {
            pair[0].processing.set_next_plugin(pair[1].processing.clone());
        }
        for channel in &group {
            channel.processing.initialize(config, core, extensions)?;
        }
        debug!(
            "prepared channel group [{}]",
            group.iter().map(ChannelHandle::identifier).collect::<Vec<_>>().join(", ")
        );
        Ok(group)
    }
}

impl ChannelController for DefaultChannelController {
    fn initialize(
        &self,
        config: &Arc<Configuration>,
        core: &TelemetryCore,
        extensions: &[Plugin],
    ) -> Result<()> {
        let mut queue = Vec::new();
        for group in config.channels.iter().filter(|group| !group.is_empty()) {
            queue.push(Self::prepare_group(group.clone(), config, core, extensions)?);
        }

        let extension_channels: Vec<ChannelHandle> =
            extensions.iter().filter_map(Plugin::as_channel).cloned().collect();
        if !extension_channels.is_empty() {
            queue.push(Self::prepare_group(extension_channels, config, core, extensions)?);
        }

        *self.channel_queue.write() = queue;
        Ok(())
    }

    fn process_telemetry(&self, item: TelemetryItem) -> Result<()> {
        let heads: Vec<ChannelHandle> =
            self.channel_queue.read().iter().filter_map(|group| group.first().cloned()).collect();
        trace!("dispatching {:?} to {} channel groups", item.name, heads.len());
        for head in heads {
            head.processing.process_telemetry(item.clone())?;
        }
        Ok(())
    }

    fn channel_controls(&self) -> Vec<ChannelGroup> {
        self.channel_queue
            .read()
            .iter()
            .map(|group| group.iter().map(|channel| channel.controls.clone()).collect())
            .collect()
    }
}
