mod cli_args;
mod console;
mod file_utils;
mod listener;
mod settings;

use crate::{
    cli_args::{Cli, CliCommands, TrackArgs},
    console::register_builtin_extensions,
    listener::LoggingListener,
    settings::settings as load_settings,
};
use clap::Parser;
use log::{error, info};
use sonde_common::TelemetryItem;
use sonde_core::{Configuration, MemoryChannel, Plugin, TelemetryCore};
use sonde_events::{NotificationChannel, NotificationInfo};
use std::{io::Error, sync::Arc};

const DEMO_CHANNEL_ID: &str = "memory";

/// Loads the configuration and runs the selected command.
#[tokio::main()]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let config = load_settings(cli.command.common()).map_err(|e| Error::other(e.to_string()))?;

    match cli.command {
        CliCommands::Config(_) => {
            let rendered = toml::to_string(&config).map_err(|e| Error::other(e.to_string()))?;
            println!("{}", rendered);
            Ok(())
        }
        CliCommands::Track(args) => run_track(config, args).await.map_err(|e| {
            error!("track failed: {}", e);
            Error::other(e.to_string())
        }),
    }
}

async fn run_track(config: Configuration, args: TrackArgs) -> anyhow::Result<()> {
    let core = TelemetryCore::new();
    register_builtin_extensions(&core);

    let notifications = Arc::new(NotificationChannel::new());
    let mut subscriber = notifications.subscribe();
    core.add_notification_listener(notifications);
    core.add_notification_listener(Arc::new(LoggingListener));

    let channel = Arc::new(MemoryChannel::new(DEMO_CHANNEL_ID));
    core.initialize(config, vec![Plugin::channel(channel.clone())])?;

    let poll = core.poll_internal_logs();
    info!("polling internal logs every {:?}", poll.interval());

    for sequence in 0..args.count {
        let mut item = TelemetryItem::new(&args.name).with_property("sequence", sequence);
        for (key, value) in &args.properties {
            item = item.with_property(key.clone(), value.clone());
        }
        core.track(item)?;
    }

    let flushed = core.flush_internal_logs()?;
    poll.cancel();
    poll.join().await?;

    let mut notices: Vec<NotificationInfo> = Vec::new();
    while let Ok(info) = subscriber.try_recv() {
        notices.push(info);
    }

    for item in channel.sent_items() {
        println!("{}", serde_json::to_string(&item)?);
    }
    println!(
        "tracked {} events, flushed {} internal messages, {} notifications ({} discards)",
        args.count,
        flushed,
        notices.len(),
        notices.iter().filter(|info| info.is_error()).count()
    );
    Ok(())
}
