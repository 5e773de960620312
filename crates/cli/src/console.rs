use anyhow::Result;
use log::info;
use parking_lot::RwLock;
use sonde_common::TelemetryItem;
use sonde_core::{Configuration, Plugin, ProcessingPlugin, TelemetryCore};
use std::sync::Arc;

pub const CONSOLE_PLUGIN_NAME: &str = "console";
pub const CONSOLE_PLUGIN_PRIORITY: i32 = 100;

const DEFAULT_PREFIX: &str = "[sonde]";

/// Echoes every item to the log before passing it on.
///
/// Reads an optional `prefix` from `extension_config.console`.
pub struct ConsolePlugin {
    prefix: RwLock<String>,
    next: RwLock<Option<Arc<dyn ProcessingPlugin>>>,
}

impl Default for ConsolePlugin {
    fn default() -> Self {
        Self {
            prefix: RwLock::new(DEFAULT_PREFIX.to_string()),
            next: RwLock::new(None),
        }
    }
}

impl ConsolePlugin {
    pub fn prefix(&self) -> String {
        self.prefix.read().clone()
    }
}

impl ProcessingPlugin for ConsolePlugin {
    fn identifier(&self) -> &str {
        CONSOLE_PLUGIN_NAME
    }

    fn priority(&self) -> i32 {
        CONSOLE_PLUGIN_PRIORITY
    }

    fn initialize(
        &self,
        config: &Arc<Configuration>,
        _core: &TelemetryCore,
        _extensions: &[Plugin],
    ) -> Result<()> {
        let configured = config
            .extension_settings(CONSOLE_PLUGIN_NAME)
            .and_then(|settings| settings.get("prefix"))
            .and_then(|prefix| prefix.as_str());
        if let Some(prefix) = configured {
            *self.prefix.write() = prefix.to_string();
        }
        Ok(())
    }

    fn set_next_plugin(&self, next: Arc<dyn ProcessingPlugin>) {
        *self.next.write() = Some(next);
    }

    fn process_telemetry(&self, item: TelemetryItem) -> Result<()> {
        info!("{} {}", self.prefix(), serde_json::to_string(&item)?);
        let next = self.next.read().clone();
        match next {
            Some(next) => next.process_telemetry(item),
            None => Ok(()),
        }
    }
}

/// Registers the plugins the demo host can load by name.
pub fn register_builtin_extensions(core: &TelemetryCore) {
    core.register_extension(CONSOLE_PLUGIN_NAME, || {
        Plugin::processing(Arc::new(ConsolePlugin::default()))
    });
}
