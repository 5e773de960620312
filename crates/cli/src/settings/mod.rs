
use anyhow::{Context, Result};
use config::{Config as ConfigSource, Environment, File, FileFormat};
use dirs::home_dir;
use dotenvy::dotenv;
use log::info;
use sonde_core::Configuration;
use std::{fs, path::Path};

use crate::{
    cli_args::CliCommandArgs,
    console::CONSOLE_PLUGIN_NAME,
    file_utils::{ensure_file_directory_exists, expand_tilde},
};

const ENV_PREFIX: &str = "SONDE";
const CONFIG_FILE_NAME: &str = "config.toml";
const DEFAULT_INSTRUMENTATION_KEY: &str = "local-development";

/// Load and validate the configuration for a command.
///
/// # Precedence Order
/// 1. CLI parameters override all other sources
/// 2. `SONDE_` environment variables override the config file
/// 3. The config file provides base values and is created if missing
pub fn settings(args: &CliCommandArgs) -> Result<Configuration> {
    init_logging(&args.log_level);

    let home_path = sonde_home(args).context("Failed to determine sonde home directory")?;
    let config_path = format!("{}/{}", home_path.trim_end_matches('/'), CONFIG_FILE_NAME);
    ensure_config_file_exists(&config_path).context("Failed to ensure config file exists")?;

    info!("Loading configuration from {}", config_path);
    let config = load_config(&config_path, env_source())?;
    let config = apply_command_line_args(config, args);

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

pub fn init_logging(log_level: &str) {
    dotenv().ok();
    let filters = std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string());
    // a logger may already be installed, e.g. by tests
    let _ = pretty_env_logger::formatted_builder().parse_filters(&filters).try_init();
}

fn sonde_home(args: &CliCommandArgs) -> Option<String> {
    args.home_path
        .as_deref()
        .map(expand_tilde)
        .or_else(|| home_dir().map(|path| format!("{}/.sonde", path.to_string_lossy())))
}

pub fn default_configuration() -> Configuration {
    Configuration::new(DEFAULT_INSTRUMENTATION_KEY).with_extension_name(CONSOLE_PLUGIN_NAME)
}

/// Writes [`default_configuration`] to `config_path` unless a file is already there.
pub fn ensure_config_file_exists(config_path: &str) -> Result<()> {
    if Path::new(config_path).exists() {
        return Ok(());
    }
    ensure_file_directory_exists(config_path)?;

    let config_toml = toml::to_string(&default_configuration())
        .context("Failed to serialize default config")?;
    fs::write(config_path, config_toml).context("Failed to write default config to disk")
}

pub fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// Layers `env` over the TOML file at `config_path`.
pub fn load_config(config_path: &str, env: Environment) -> Result<Configuration> {
    ConfigSource::builder()
        .add_source(File::new(config_path, FileFormat::Toml))
        .add_source(env)
        .build()
        .context("Failed to build config")?
        .try_deserialize()
        .context("Failed to deserialize config")
}

pub fn apply_command_line_args(mut config: Configuration, args: &CliCommandArgs) -> Configuration {
    if let Some(key) = &args.instrumentation_key {
        config.instrumentation_key = key.clone();
    }
    if let Some(interval) = args.diagnostic_log_interval_ms {
        config.diagnostics.diagnostic_log_interval_ms = interval;
    }
    for name in &args.extensions {
        if !config.extension_names.contains(name) {
            config.extension_names.push(name.clone());
        }
    }
    config
}
