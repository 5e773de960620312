mod channel;
mod event;
mod listener;
mod manager;

pub use channel::{NotificationChannel, NotificationPublisher, NotificationSubscriber};
pub use event::{NotificationEvent, NotificationInfo};
pub use listener::{MockNotificationListener, NotificationListener};
pub use manager::NotificationManager;
