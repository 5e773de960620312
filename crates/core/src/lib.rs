//! # Sonde Core
//!
//! The composition-and-dispatch core of the sonde telemetry SDK.
//!
//! ## Overview
//!
//! [`TelemetryCore`] assembles plugins into an ordered processing pipeline
//! once, validates and enriches every telemetry item handed to
//! [`TelemetryCore::track`], and routes items through the pipeline to a
//! [`ChannelController`] that fans them out to transmission channels.
//!
//! ## Plugins
//!
//! A [`Plugin`] is one of:
//!
//! - [`InitOnlyPlugin`]: only set up, never sees telemetry
//! - [`ProcessingPlugin`]: a pipeline stage ordered by priority, forwarding each
//!   item to its successor
//! - a transmission channel: a processing stage with pause/resume/flush
//!   controls, owned by the channel controller
//!
//! Stages ranked below the controller (priority [`CHANNEL_CONTROLLER_PRIORITY`]
//! by default) form the processing chain. Channels must rank above it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sonde_core::{Configuration, MemoryChannel, Plugin, TelemetryCore};
//! use sonde_common::TelemetryItem;
//! use std::sync::Arc;
//!
//! # fn main() -> sonde_errors::Result<()> {
//! let core = TelemetryCore::new();
//! let channel = Arc::new(MemoryChannel::new("memory"));
//! core.initialize(Configuration::new("my-ikey"), vec![Plugin::channel(channel.clone())])?;
//!
//! core.track(TelemetryItem::new("PageView"))?;
//! assert_eq!(channel.sent_items().len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! Internal diagnostics raised while composing the pipeline are queued in the
//! [`DiagnosticLogger`] and tracked as telemetry by
//! [`TelemetryCore::poll_internal_logs`].

pub mod channel;
mod composer;
mod config;
pub mod diagnostics;
pub mod pipeline;
mod plugin;
mod registry;
pub mod validation;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

#[cfg(test)]
mod tests;

pub use channel::{
    CHANNEL_CONTROLLER_IDENTIFIER, CHANNEL_CONTROLLER_PRIORITY, ChannelControls, ChannelController,
    ChannelGroup, DefaultChannelController, MemoryChannel, TransmissionChannel,
};
pub use composer::TelemetryCore;
pub use config::{
    Configuration, DEFAULT_DIAGNOSTIC_LOG_INTERVAL, DEFAULT_MAX_MESSAGE_LIMIT, DiagnosticsConfig,
    ExtensionConfig, NOTIFICATION_MANAGER_KEY,
};
pub use diagnostics::{DiagnosticLogger, LoggingSeverity, MessageId, PollHandle};
pub use plugin::{ChannelHandle, InitOnlyPlugin, Plugin, ProcessingPlugin};
pub use registry::{PluginFactory, PluginRegistry};
