#![cfg(test)]

#[macro_use]
extern crate log;

use anyhow::Result;
use serde_json::json;
use sonde_common::{DiscardReason, TelemetryItem};
use sonde_core::{
    Configuration, MemoryChannel, MessageId, Plugin,
    TelemetryCore,
    test_utils::{CallLog, RecordingInitPlugin, RecordingPlugin},
};
use sonde_errors::SondeError;
use sonde_events::{NotificationChannel, NotificationEvent, NotificationListener};
use std::{sync::Arc, thread, time::Duration};

const IKEY: &str = "integration-ikey";

fn init_logging() {
    let _ = pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// Fails every sent notification.
struct FailingListener;

impl NotificationListener for FailingListener {
    fn events_sent(&self, _items: &[TelemetryItem]) -> Result<()> {
        anyhow::bail!("listener rejected send")
    }
}

#[test]
fn test_file_configuration_drives_pipeline() -> Result<()> {
    init_logging();
    let log = CallLog::default();
    let core = TelemetryCore::new();
    let (enrich_log, setup_log) = (log.clone(), log.clone());
    core.register_extension("enricher", move || {
        Plugin::processing(Arc::new(RecordingPlugin::new("enricher", 50, enrich_log.clone())))
    });
    core.register_extension("setup", move || {
        Plugin::init_only(Arc::new(RecordingInitPlugin::new("setup", setup_log.clone())))
    });

    let config: Configuration = toml::from_str(&format!(
        r#"
        instrumentation_key = "{IKEY}"
        extensions = ["enricher", "setup"]

        [diagnostics]
        logging_level_telemetry = 2
        "#
    ))?;
    let channel = Arc::new(MemoryChannel::new("memory"));
    core.initialize(config, vec![Plugin::channel(channel.clone())])?;

    core.track(TelemetryItem::new("Checkout").with_property("cart", 3))?;

    assert_eq!(log.entries_with_prefix("init:"), vec!["init:setup", "init:enricher"]);
    assert_eq!(log.entries_with_prefix("process:"), vec!["process:enricher:Checkout"]);
    let sent = channel.sent_items();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].ikey.as_deref(), Some(IKEY));
    assert_eq!(sent[0].data.as_ref().unwrap()["cart"], json!(3));
    Ok(())
}

#[tokio::test]
async fn test_notifications_reach_async_subscribers() -> Result<()> {
    init_logging();
    let core = TelemetryCore::new();
    let notifications = Arc::new(NotificationChannel::new());
    let mut subscriber = notifications.subscribe();
    core.add_notification_listener(notifications);
    core.initialize(
        Configuration::new(IKEY),
        vec![Plugin::channel(Arc::new(MemoryChannel::new("memory")))],
    )?;

    core.track(TelemetryItem::new("Good"))?;
    let err = core.track(TelemetryItem::default()).unwrap_err();
    assert_eq!(err.missing_field(), Some("name"));

    let sent = subscriber.recv().await?;
    assert_eq!(sent.event, NotificationEvent::EventsSent { names: vec!["Good".to_string()] });

    let discarded = subscriber.recv().await?;
    assert!(discarded.is_error());
    assert_eq!(
        discarded.event,
        NotificationEvent::EventsDiscarded {
            names: vec![String::new()],
            reason: DiscardReason::InvalidEvent,
        }
    );
    Ok(())
}

#[test]
fn test_tracking_from_many_threads() -> Result<()> {
    init_logging();
    let log = CallLog::default();
    let core = TelemetryCore::new();
    let channel = Arc::new(MemoryChannel::new("memory"));
    core.initialize(
        Configuration::new(IKEY),
        vec![
            Plugin::processing(Arc::new(RecordingPlugin::new("stage", 10, log.clone()))),
            Plugin::channel(channel.clone()),
        ],
    )?;

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let core = core.clone();
            thread::spawn(move || {
                for n in 0..25 {
                    core.track(TelemetryItem::new(format!("worker-{worker}-{n}")))?;
                }
                Ok::<_, SondeError>(())
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker panicked")?;
    }

    assert_eq!(channel.sent_items().len(), 100);
    assert_eq!(log.entries_with_prefix("process:stage").len(), 100);
    Ok(())
}

#[test]
fn test_listener_errors_surface_from_track() -> Result<()> {
    init_logging();
    let core = TelemetryCore::new();
    core.add_notification_listener(Arc::new(FailingListener));
    let channel = Arc::new(MemoryChannel::new("memory"));
    core.initialize(Configuration::new(IKEY), vec![Plugin::channel(channel.clone())])?;

    let err = core.track(TelemetryItem::new("evt")).unwrap_err();
    assert!(matches!(err, SondeError::Plugin(_)));
    assert_eq!(err.to_string(), "listener rejected send");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_internal_diagnostics_are_tracked_on_poll() -> Result<()> {
    init_logging();
    let log = CallLog::default();
    let core = TelemetryCore::new();
    let notifications = Arc::new(NotificationChannel::new());
    let mut subscriber = notifications.subscribe();
    core.add_notification_listener(notifications);

    let mut config = Configuration::new(IKEY);
    config.diagnostics.logging_level_telemetry = 2;
    config.diagnostics.diagnostic_log_interval_ms = 1_000;
    let channel = Arc::new(MemoryChannel::new("memory"));
    core.initialize(
        config,
        vec![
            Plugin::processing(Arc::new(RecordingPlugin::new("left", 10, log.clone()))),
            Plugin::processing(Arc::new(RecordingPlugin::new("right", 10, log.clone()))),
            Plugin::channel(channel.clone()),
        ],
    )?;
    assert_eq!(core.logger().queue_len(), 1);

    let poll = core.poll_internal_logs();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    poll.cancel();
    poll.join().await?;

    let name = format!("InternalMessageId: {}", MessageId::DUPLICATE_PRIORITY);
    let sent = channel.sent_items();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].name.as_deref(), Some(name.as_str()));
    assert_eq!(core.logger().queue_len(), 0);

    let info = subscriber.recv().await?;
    debug!("received {}", info.formatted_log);
    assert_eq!(info.event, NotificationEvent::EventsSent { names: vec![name] });
    Ok(())
}
