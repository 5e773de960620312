use parking_lot::RwLock;
use std::{collections::HashMap, fmt, sync::Arc};

use crate::Plugin;

pub type PluginFactory = Arc<dyn Fn() -> Plugin + Send + Sync>;

/// Plugins the core can build by name, for configurations that list
/// extensions in a file instead of attaching instances.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    factories: Arc<RwLock<HashMap<String, PluginFactory>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name`, replacing any previous registration.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Plugin + Send + Sync + 'static,
    {
        self.factories.write().insert(name.into(), Arc::new(factory));
    }

    pub fn resolve(&self, name: &str) -> Option<Plugin> {
        let factory = self.factories.read().get(name).cloned()?;
        Some(factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry").field("names", &self.names()).finish()
    }
}
