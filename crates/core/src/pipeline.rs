use std::sync::Arc;
use tracing::debug;

use crate::{Plugin, ProcessingPlugin};

/// Two adjacent processing stages that share a priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityCollision {
    pub priority: i32,
    pub previous: String,
    pub current: String,
}

/// The ordered, linked plugin list produced once during initialization.
///
/// Initialization-only plugins come first in the order they were supplied,
/// followed by every processing-capable entry sorted by ascending priority.
/// The terminal stage wins ties with plugins of the same priority, so the
/// processing chain is exactly the entries in front of it.
pub struct Pipeline {
    extensions: Vec<Plugin>,
    terminal: Arc<dyn ProcessingPlugin>,
    terminal_index: usize,
    collisions: Vec<PriorityCollision>,
}

impl Pipeline {
    /// Orders `plugins` around `terminal`. Nothing is linked until [`Self::link`].
    pub fn build(plugins: Vec<Plugin>, terminal: Arc<dyn ProcessingPlugin>) -> Self {
        let (init_only, processing): (Vec<Plugin>, Vec<Plugin>) =
            plugins.into_iter().partition(Plugin::is_init_only);

        let mut stages = Vec::with_capacity(processing.len() + 1);
        stages.push(Plugin::Processing(terminal.clone()));
        stages.extend(processing);
        // stable, so the terminal stays ahead of equal priorities
        stages.sort_by_key(|plugin| plugin.priority().unwrap_or(i32::MIN));

        let collisions = find_collisions(&stages);

        let terminal_position = stages
            .iter()
            .position(|plugin| {
                plugin.as_processing().is_some_and(|stage| Arc::ptr_eq(stage, &terminal))
            })
            .unwrap_or_default();

        let terminal_index = init_only.len() + terminal_position;
        let mut extensions = init_only;
        extensions.extend(stages);

        Self {
            extensions,
            terminal,
            terminal_index,
            collisions,
        }
    }

    /// Hands every stage in front of the terminal its successor. The terminal
    /// itself gets none.
    pub fn link(&self) {
        let stages: Vec<&Arc<dyn ProcessingPlugin>> = self
            .chain()
            .filter_map(Plugin::as_processing)
            .chain(std::iter::once(&self.terminal))
            .collect();
        for pair in stages.windows(2) {
            debug!("linking {} -> {}", pair[0].identifier(), pair[1].identifier());
            pair[0].set_next_plugin(pair[1].clone());
        }
    }

    /// Every plugin in pipeline order, the terminal stage included.
    pub fn extensions(&self) -> &[Plugin] {
        &self.extensions
    }

    /// The stage `track` hands items to.
    pub fn head(&self) -> &Arc<dyn ProcessingPlugin> {
        self.extensions
            .iter()
            .find_map(Plugin::as_processing)
            .unwrap_or_else(|| self.terminal())
    }

    pub const fn terminal(&self) -> &Arc<dyn ProcessingPlugin> {
        &self.terminal
    }

    /// Processing stages in front of the terminal, in ascending priority.
    pub fn chain(&self) -> impl Iterator<Item = &Plugin> {
        self.extensions[..self.terminal_index].iter().filter(|plugin| !plugin.is_init_only())
    }

    /// Initialization-only plugins, then the chain.
    pub fn initialization_order(&self) -> impl Iterator<Item = &Plugin> {
        self.extensions.iter().filter(|plugin| plugin.is_init_only()).chain(self.chain())
    }

    /// Non-channel processing plugins ranked at or behind the terminal. They are
    /// never linked, initialized or handed items.
    pub fn idle_extensions(&self) -> impl Iterator<Item = &Plugin> {
        self.extensions[self.terminal_index + 1..]
            .iter()
            .filter(|plugin| matches!(plugin, Plugin::Processing(_)))
    }

    pub fn collisions(&self) -> &[PriorityCollision] {
        &self.collisions
    }
}

fn find_collisions(stages: &[Plugin]) -> Vec<PriorityCollision> {
    stages
        .windows(2)
        .filter_map(|pair| {
            let priority = pair[0].priority()?;
            (pair[1].priority() == Some(priority)).then(|| PriorityCollision {
                priority,
                previous: pair[0].identifier().to_string(),
                current: pair[1].identifier().to_string(),
            })
        })
        .collect()
}
