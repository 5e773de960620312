use anyhow::Result as AnyResult;
use parking_lot::RwLock;
use serde_json::{Value, json};
use sonde_common::{DiscardReason, SCHEMA_VERSION, TelemetryItem};
use sonde_errors::{ConfigurationError, SondeError};
use sonde_events::{MockNotificationListener, NotificationListener};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::Duration,
};

use crate::{
    CHANNEL_CONTROLLER_PRIORITY, ChannelControls, ChannelHandle, Configuration, DiagnosticsConfig,
    LoggingSeverity, MemoryChannel, MessageId, Plugin, ProcessingPlugin, TelemetryCore,
    channel::{MockChannelController, MockChannelControls},
    test_utils::{CallLog, RecordingController, RecordingInitPlugin, RecordingPlugin},
};

const IKEY: &str = "test-ikey";

fn recording_core(log: &CallLog) -> TelemetryCore {
    TelemetryCore::with_channel_controller(Arc::new(RecordingController::new(log.clone())))
}

fn recording(id: &str, priority: i32, log: &CallLog) -> Arc<RecordingPlugin> {
    Arc::new(RecordingPlugin::new(id, priority, log.clone()))
}

fn memory_channel() -> Arc<MemoryChannel> {
    Arc::new(MemoryChannel::new("memory"))
}

fn init_with_channel(core: &TelemetryCore, plugins: Vec<Plugin>) -> Arc<MemoryChannel> {
    let channel = memory_channel();
    let mut plugins = plugins;
    plugins.push(Plugin::channel(channel.clone()));
    core.initialize(Configuration::new(IKEY), plugins).unwrap();
    channel
}

/// Queues a fresh diagnostic message every time it processes an item.
#[derive(Default)]
struct DiagnosticEmitter {
    core: RwLock<Option<TelemetryCore>>,
    next: RwLock<Option<Arc<dyn ProcessingPlugin>>>,
    emitted: AtomicU32,
}

impl ProcessingPlugin for DiagnosticEmitter {
    fn identifier(&self) -> &str {
        "emitter"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn initialize(
        &self,
        _config: &Arc<Configuration>,
        core: &TelemetryCore,
        _extensions: &[Plugin],
    ) -> AnyResult<()> {
        *self.core.write() = Some(core.clone());
        Ok(())
    }

    fn set_next_plugin(&self, next: Arc<dyn ProcessingPlugin>) {
        *self.next.write() = Some(next);
    }

    fn process_telemetry(&self, item: TelemetryItem) -> AnyResult<()> {
        if let Some(core) = self.core.read().as_ref() {
            let id = 1_000 + self.emitted.fetch_add(1, Ordering::SeqCst);
            core.logger().throw_internal(
                LoggingSeverity::Critical,
                MessageId(id),
                "raised while flushing",
                None,
                false,
            );
        }
        let next = self.next.read().clone();
        match next {
            Some(next) => next.process_telemetry(item),
            None => Ok(()),
        }
    }
}

/// On its first item, queues id 50, runs a nested flush and then queues id 60.
#[derive(Default)]
struct NestedFlusher {
    core: RwLock<Option<TelemetryCore>>,
    next: RwLock<Option<Arc<dyn ProcessingPlugin>>>,
    fired: AtomicBool,
    nested_flushed: AtomicU32,
}

impl ProcessingPlugin for NestedFlusher {
    fn identifier(&self) -> &str {
        "nested-flusher"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn initialize(
        &self,
        _config: &Arc<Configuration>,
        core: &TelemetryCore,
        _extensions: &[Plugin],
    ) -> AnyResult<()> {
        *self.core.write() = Some(core.clone());
        Ok(())
    }

    fn set_next_plugin(&self, next: Arc<dyn ProcessingPlugin>) {
        *self.next.write() = Some(next);
    }

    fn process_telemetry(&self, item: TelemetryItem) -> AnyResult<()> {
        let core = self.core.read().clone();
        if let Some(core) = core {
            if !self.fired.swap(true, Ordering::SeqCst) {
                let logger = core.logger();
                logger.throw_internal(LoggingSeverity::Critical, MessageId(50), "during", None, false);
                let flushed = core.flush_internal_logs()?;
                self.nested_flushed.store(flushed as u32, Ordering::SeqCst);
                logger.throw_internal(LoggingSeverity::Critical, MessageId(60), "after", None, false);
            }
        }
        let next = self.next.read().clone();
        match next {
            Some(next) => next.process_telemetry(item),
            None => Ok(()),
        }
    }
}

#[test]
fn test_initialize_twice_fails_and_keeps_pipeline() {
    let log = CallLog::default();
    let core = recording_core(&log);
    let channel = init_with_channel(&core, vec![Plugin::processing(recording("a", 100, &log))]);

    let err = core
        .initialize(
            Configuration::new("other-ikey"),
            vec![Plugin::processing(recording("b", 50, &log))],
        )
        .unwrap_err();
    assert!(matches!(
        err,
        SondeError::Configuration(ConfigurationError::AlreadyInitialized)
    ));

    assert_eq!(core.configuration().unwrap().instrumentation_key, IKEY);
    core.track(TelemetryItem::new("evt")).unwrap();
    assert_eq!(log.entries_with_prefix("process:b"), Vec::<String>::new());
    assert_eq!(channel.sent_items()[0].ikey.as_deref(), Some(IKEY));
}

#[test]
fn test_links_by_priority_and_dispatches_to_lowest() {
    let log = CallLog::default();
    let core = recording_core(&log);
    let (a, b, c) = (recording("a", 100, &log), recording("b", 200, &log), recording("c", 300, &log));
    let channel = init_with_channel(
        &core,
        vec![
            Plugin::processing(c.clone()),
            Plugin::processing(a.clone()),
            Plugin::processing(b.clone()),
        ],
    );

    assert_eq!(a.next_identifier().as_deref(), Some("b"));
    assert_eq!(b.next_identifier().as_deref(), Some("c"));
    assert_eq!(c.next_identifier().as_deref(), Some("ChannelControllerPlugin"));

    core.track(TelemetryItem::new("PageView")).unwrap();
    assert_eq!(
        log.entries_with_prefix("process:"),
        vec![
            "process:a:PageView",
            "process:b:PageView",
            "process:c:PageView",
            "process:controller:PageView"
        ]
    );
    assert_eq!(channel.sent_items().len(), 1);
}

#[test]
fn test_controller_is_head_without_processing_plugins() {
    let log = CallLog::default();
    let core = recording_core(&log);
    let channel = init_with_channel(&core, vec![]);

    core.track(TelemetryItem::new("evt")).unwrap();
    assert_eq!(log.entries_with_prefix("process:"), vec!["process:controller:evt"]);
    assert_eq!(channel.sent_items().len(), 1);
}

#[test]
fn test_init_only_plugins_are_never_linked_or_dispatched() {
    let log = CallLog::default();
    let core = recording_core(&log);
    init_with_channel(
        &core,
        vec![
            Plugin::processing(recording("b", 200, &log)),
            Plugin::init_only(Arc::new(RecordingInitPlugin::new("first", log.clone()))),
            Plugin::processing(recording("a", 100, &log)),
            Plugin::init_only(Arc::new(RecordingInitPlugin::new("last", log.clone()))),
        ],
    );

    core.track(TelemetryItem::new("evt")).unwrap();

    let entries = log.entries();
    assert!(entries.iter().all(|entry| !entry.contains("first") || entry == "init:first"));
    assert!(entries.iter().all(|entry| !entry.contains("last") || entry == "init:last"));
    assert_eq!(log.entries_with_prefix("next:"), vec!["next:a->b", "next:b->ChannelControllerPlugin"]);
}

#[test]
fn test_initialization_order_starts_with_controller() {
    let log = CallLog::default();
    let core = recording_core(&log);
    init_with_channel(
        &core,
        vec![
            Plugin::processing(recording("b", 200, &log)),
            Plugin::processing(recording("a", 100, &log)),
            Plugin::init_only(Arc::new(RecordingInitPlugin::new("setup", log.clone()))),
        ],
    );

    assert_eq!(
        log.entries_with_prefix("init:"),
        vec!["init:controller", "init:setup", "init:a", "init:b"]
    );
}

#[test]
fn test_track_null_notifies_every_listener_once() {
    let core = TelemetryCore::new();
    init_with_channel(&core, vec![]);

    for _ in 0..2 {
        let mut listener = MockNotificationListener::new();
        listener
            .expect_events_discarded()
            .withf(|items, reason| items.is_empty() && *reason == DiscardReason::InvalidEvent)
            .times(1)
            .returning(|_, _| Ok(()));
        core.add_notification_listener(Arc::new(listener));
    }

    let err = core.track_raw(&Value::Null).unwrap_err();
    assert!(err.is_invalid_event());
}

#[test]
fn test_track_null_before_initialize_notifies_listeners() {
    let core = TelemetryCore::new();
    let mut listener = MockNotificationListener::new();
    listener
        .expect_events_discarded()
        .withf(|items, reason| items.is_empty() && *reason == DiscardReason::InvalidEvent)
        .times(1)
        .returning(|_, _| Ok(()));
    core.add_notification_listener(Arc::new(listener));

    let err = core.track_raw(&Value::Null).unwrap_err();
    assert!(err.is_invalid_event());
    assert!(!core.is_initialized());
}

#[test]
fn test_track_raw_rejects_non_item_payloads_and_accepts_items() {
    let core = TelemetryCore::new();
    let channel = init_with_channel(&core, vec![]);

    let err = core.track_raw(&json!(42)).unwrap_err();
    assert!(err.is_invalid_event());

    core.track_raw(&json!({ "name": "FromJson", "data": { "k": "v" } })).unwrap();
    let sent = channel.sent_items();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].name.as_deref(), Some("FromJson"));
}

#[test]
fn test_track_rejects_unnamed_items_after_discard_notification() {
    let core = TelemetryCore::new();
    let channel = init_with_channel(&core, vec![]);

    let mut listener = MockNotificationListener::new();
    listener
        .expect_events_discarded()
        .withf(|items, reason| items.len() == 1 && *reason == DiscardReason::InvalidEvent)
        .times(1)
        .returning(|_, _| Ok(()));
    core.add_notification_listener(Arc::new(listener));

    let err = core.track(TelemetryItem::default()).unwrap_err();
    assert_eq!(err.missing_field(), Some("name"));
    assert!(channel.sent_items().is_empty());
}

#[test]
fn test_track_stamps_time_and_version() {
    let core = TelemetryCore::new();
    let channel = init_with_channel(&core, vec![]);

    core.track(TelemetryItem::new("evt").with_ikey("explicit-ikey")).unwrap();

    let sent = &channel.sent_items()[0];
    assert_eq!(sent.ikey.as_deref(), Some("explicit-ikey"));
    assert_eq!(sent.version.as_deref(), Some(SCHEMA_VERSION));
    assert!(sent.has_time());
}

#[test]
fn test_base_data_without_base_type_is_accepted() {
    let core = TelemetryCore::new();
    let channel = init_with_channel(&core, vec![]);

    let mut item = TelemetryItem::new("evt").with_ikey(IKEY);
    item.base_data = Some(json!({ "x": 1 }));
    core.track(item).unwrap();

    let sent = channel.sent_items();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].base_data, Some(json!({ "x": 1 })));
    assert!(sent[0].base_type.is_none());
}

#[test]
fn test_track_before_initialize_fails() {
    let core = TelemetryCore::new();
    let err = core.track(TelemetryItem::new("evt")).unwrap_err();
    assert!(matches!(
        err,
        SondeError::Configuration(ConfigurationError::NotInitialized)
    ));
}

#[test]
fn test_no_channels_leaves_core_uninitialized() {
    let log = CallLog::default();
    let core = recording_core(&log);

    let err = core
        .initialize(
            Configuration::new(IKEY),
            vec![Plugin::processing(recording("a", 100, &log))],
        )
        .unwrap_err();
    assert!(matches!(err, SondeError::NoChannelsAvailable));
    assert!(!core.is_initialized());
    assert!(core.get_transmission_controls().is_empty());
    assert!(log.entries_with_prefix("init:a").is_empty());

    init_with_channel(&core, vec![]);
    assert!(core.is_initialized());
    assert_eq!(core.get_transmission_controls().len(), 1);
}

#[test]
fn test_custom_controller_receives_items_and_exposes_controls() {
    let mut controls = MockChannelControls::new();
    controls.expect_is_paused().return_const(false);
    let controls: Arc<dyn ChannelControls> = Arc::new(controls);

    let mut controller = MockChannelController::new();
    controller.expect_priority().return_const(CHANNEL_CONTROLLER_PRIORITY);
    controller
        .expect_initialize()
        .times(1)
        .returning(|config, _, extensions| {
            assert_eq!(config.instrumentation_key, IKEY);
            assert_eq!(extensions.len(), 1);
            Ok(())
        });
    controller
        .expect_channel_controls()
        .returning(move || vec![vec![controls.clone()]]);
    controller
        .expect_process_telemetry()
        .withf(|item| item.name.as_deref() == Some("evt"))
        .times(1)
        .returning(|_| Ok(()));

    let core = TelemetryCore::with_channel_controller(Arc::new(controller));
    core.initialize(Configuration::new(IKEY), vec![]).unwrap();
    core.track(TelemetryItem::new("evt")).unwrap();

    let groups = core.get_transmission_controls();
    assert_eq!(groups.len(), 1);
    assert!(!groups[0][0].is_paused());
}

#[test]
fn test_controller_without_channels_fails_initialization() {
    let mut controller = MockChannelController::new();
    controller.expect_priority().return_const(CHANNEL_CONTROLLER_PRIORITY);
    controller.expect_initialize().times(1).returning(|_, _, _| Ok(()));
    controller.expect_channel_controls().returning(|| vec![Vec::new()]);
    controller.expect_process_telemetry().never();

    let core = TelemetryCore::with_channel_controller(Arc::new(controller));
    let err = core.initialize(Configuration::new(IKEY), vec![]).unwrap_err();
    assert!(matches!(err, SondeError::NoChannelsAvailable));
    assert!(core.track(TelemetryItem::new("evt")).is_err());
}

#[test]
fn test_retry_after_missing_channels_links_once() {
    let log = CallLog::default();
    let core = recording_core(&log);
    let plugin = recording("a", 100, &log);

    let err = core
        .initialize(Configuration::new(IKEY), vec![Plugin::processing(plugin.clone())])
        .unwrap_err();
    assert!(matches!(err, SondeError::NoChannelsAvailable));
    assert!(log.entries_with_prefix("next:").is_empty());

    init_with_channel(&core, vec![Plugin::processing(plugin.clone())]);
    assert_eq!(log.entries_with_prefix("next:"), vec!["next:a->ChannelControllerPlugin"]);
    assert_eq!(log.entries_with_prefix("init:a"), vec!["init:a"]);
}

#[test]
fn test_missing_instrumentation_key_is_rejected() {
    let core = TelemetryCore::new();
    let err = core
        .initialize(Configuration::new(""), vec![Plugin::channel(memory_channel())])
        .unwrap_err();
    assert!(matches!(
        err,
        SondeError::Configuration(ConfigurationError::MissingInstrumentationKey)
    ));
    assert!(!core.is_initialized());
}

#[test]
fn test_channel_priority_must_exceed_controller() {
    let core = TelemetryCore::new();
    let channel = Arc::new(MemoryChannel::with_priority("low", 500));

    let err = core
        .initialize(Configuration::new(IKEY), vec![Plugin::channel(channel)])
        .unwrap_err();
    assert!(matches!(err, SondeError::Validation(ref msg) if msg.starts_with("Channel has invalid priority")));
}

#[test]
fn test_extensions_resolve_by_name() {
    let log = CallLog::default();
    let core = recording_core(&log);
    let factory_log = log.clone();
    core.register_extension("recorder", move || {
        Plugin::processing(Arc::new(RecordingPlugin::new("recorder", 100, factory_log.clone())))
    });

    let config = Configuration::new(IKEY)
        .with_extension_name("recorder")
        .with_extension(Plugin::channel(memory_channel()));
    core.initialize(config, vec![]).unwrap();

    core.track(TelemetryItem::new("evt")).unwrap();
    assert_eq!(log.entries_with_prefix("process:recorder"), vec!["process:recorder:evt"]);
}

#[test]
fn test_unresolvable_extension_name_fails_validation() {
    let core = TelemetryCore::new();
    let config = Configuration::new(IKEY)
        .with_extension_name("missing")
        .with_extension(Plugin::channel(memory_channel()));

    let err = core.initialize(config, vec![]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "validation: Extensions must provide callback to initialize: missing"
    );
}

#[test]
fn test_plugin_init_failure_propagates_and_allows_retry() {
    let log = CallLog::default();
    let core = recording_core(&log);
    let failing = Arc::new(RecordingPlugin::new("broken", 100, log.clone()).failing());

    let err = core
        .initialize(
            Configuration::new(IKEY),
            vec![Plugin::processing(failing), Plugin::channel(memory_channel())],
        )
        .unwrap_err();
    assert!(matches!(err, SondeError::Plugin(_)));
    assert_eq!(err.to_string(), "broken failed to initialize");
    assert!(!core.is_initialized());
    assert_eq!(core.logger().snapshot()[0].message_id, MessageId::PLUGIN_INIT_FAILED);

    init_with_channel(&core, vec![]);
    assert!(core.is_initialized());
}

#[test]
fn test_duplicate_priorities_are_reported_not_fatal() {
    let log = CallLog::default();
    let core = recording_core(&log);
    let config = Configuration {
        diagnostics: DiagnosticsConfig {
            logging_level_telemetry: 2,
            ..Default::default()
        },
        ..Configuration::new(IKEY)
    }
    .with_extension(Plugin::channel(memory_channel()));

    core.initialize(
        config,
        vec![
            Plugin::processing(recording("first", 100, &log)),
            Plugin::processing(recording("second", 100, &log)),
        ],
    )
    .unwrap();

    let queued = core.logger().snapshot();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].message_id, MessageId::DUPLICATE_PRIORITY);
    assert_eq!(queued[0].message, "Two extensions have same priority #100 - first, second");
}

#[test]
fn test_plugins_ranked_behind_controller_stay_idle() {
    let log = CallLog::default();
    let core = recording_core(&log);
    let idle = recording("idle", 600, &log);
    init_with_channel(&core, vec![Plugin::processing(idle.clone())]);

    core.track(TelemetryItem::new("evt")).unwrap();

    assert!(log.entries_with_prefix("init:idle").is_empty());
    assert!(idle.next_identifier().is_none());
    assert!(idle.processed().is_empty());
}

#[test]
fn test_listener_registered_twice_is_removed_entirely() {
    let core = TelemetryCore::new();
    init_with_channel(&core, vec![]);

    let mut mock = MockNotificationListener::new();
    mock.expect_events_discarded().never();
    let listener: Arc<dyn NotificationListener> = Arc::new(mock);
    core.add_notification_listener(listener.clone());
    core.add_notification_listener(listener.clone());
    assert_eq!(core.notification_manager().listener_count(), 2);

    core.remove_notification_listener(&listener);
    assert_eq!(core.notification_manager().listener_count(), 0);
    assert!(core.track_raw(&Value::Null).is_err());
}

#[test]
fn test_channels_report_sends_through_injected_manager() {
    let core = TelemetryCore::new();
    let mut listener = MockNotificationListener::new();
    listener
        .expect_events_sent()
        .withf(|items| items.len() == 1 && items[0].name.as_deref() == Some("evt"))
        .times(1)
        .returning(|_| Ok(()));
    core.add_notification_listener(Arc::new(listener));
    init_with_channel(&core, vec![]);

    assert!(core.configuration().unwrap().notification_manager().is_some());
    core.track(TelemetryItem::new("evt")).unwrap();
}

#[test]
fn test_configured_channel_groups_each_receive_items() {
    let core = TelemetryCore::new();
    let primary = Arc::new(MemoryChannel::with_priority("primary", 1000));
    let backup = Arc::new(MemoryChannel::with_priority("backup", 1000));
    backup.pause();

    let config = Configuration::new(IKEY)
        .with_channel_group(vec![ChannelHandle::new(primary.clone())])
        .with_channel_group(vec![ChannelHandle::new(backup.clone())]);
    core.initialize(config, vec![]).unwrap();

    core.track(TelemetryItem::new("evt")).unwrap();
    assert_eq!(primary.sent_items().len(), 1);
    assert!(backup.sent_items().is_empty());

    let groups = core.get_transmission_controls();
    assert_eq!(groups.len(), 2);
    assert!(groups[1][0].is_paused());
    groups[1][0].resume();
    assert_eq!(backup.sent_items().len(), 1);
}

#[test]
fn test_flush_drains_only_messages_present_at_start() {
    let core = TelemetryCore::new();
    let emitter = Arc::new(DiagnosticEmitter::default());
    let channel = init_with_channel(&core, vec![Plugin::processing(emitter)]);

    core.logger().throw_internal(LoggingSeverity::Critical, MessageId(1), "one", None, false);
    core.logger().throw_internal(
        LoggingSeverity::Critical,
        MessageId(2),
        "two",
        Some(json!({ "detail": true })),
        false,
    );

    assert_eq!(core.flush_internal_logs().unwrap(), 2);

    let sent: Vec<String> = channel.sent_items().into_iter().filter_map(|item| item.name).collect();
    assert_eq!(sent, vec!["InternalMessageId: 1", "InternalMessageId: 2"]);
    let leftover: Vec<MessageId> = core.logger().snapshot().into_iter().map(|m| m.message_id).collect();
    assert_eq!(leftover, vec![MessageId(1_000), MessageId(1_001)]);
}

#[tokio::test(start_paused = true)]
async fn test_poll_with_zero_interval_uses_default_period() {
    let core = TelemetryCore::new();
    let channel = memory_channel();
    let config = Configuration {
        diagnostics: DiagnosticsConfig {
            diagnostic_log_interval_ms: 0,
            ..Default::default()
        },
        ..Configuration::new(IKEY)
    };
    core.initialize(config, vec![Plugin::channel(channel.clone())]).unwrap();
    core.logger().throw_internal(LoggingSeverity::Critical, MessageId(7), "queued", None, false);

    let handle = core.poll_internal_logs();
    assert_eq!(handle.interval(), Duration::from_millis(10_000));

    tokio::time::sleep(Duration::from_millis(9_000)).await;
    assert!(channel.sent_items().is_empty());

    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert_eq!(channel.sent_items().len(), 1);
    assert_eq!(core.logger().queue_len(), 0);

    handle.cancel();
    handle.join().await.unwrap();
}

#[test]
fn test_nested_flush_neither_repeats_nor_loses_messages() {
    let core = TelemetryCore::new();
    let flusher = Arc::new(NestedFlusher::default());
    let channel = init_with_channel(&core, vec![Plugin::processing(flusher.clone())]);

    core.logger().throw_internal(LoggingSeverity::Critical, MessageId(1), "one", None, false);
    core.logger().throw_internal(LoggingSeverity::Critical, MessageId(2), "two", None, false);

    assert_eq!(core.flush_internal_logs().unwrap(), 2);
    assert_eq!(flusher.nested_flushed.load(Ordering::SeqCst), 1);

    let sent: Vec<String> = channel.sent_items().into_iter().filter_map(|item| item.name).collect();
    assert_eq!(
        sent,
        vec!["InternalMessageId: 50", "InternalMessageId: 1", "InternalMessageId: 2"]
    );
    let leftover: Vec<MessageId> = core.logger().snapshot().into_iter().map(|m| m.message_id).collect();
    assert_eq!(leftover, vec![MessageId(60)]);

    assert_eq!(core.flush_internal_logs().unwrap(), 1);
    assert_eq!(core.logger().queue_len(), 0);
}
