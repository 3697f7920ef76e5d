use std::sync::Arc;

use url::Url;

use crate::config::PushDefaults;
use crate::models::{
    ClientWindow, CoreError, Notification, NotificationClick, is_dismissal_action,
};
use crate::push::payload::decode_notification;

/// Platform surface for showing and closing notifications.
pub trait NotificationSink: Send + Sync {
    fn show(&self, notification: &Notification) -> Result<(), CoreError>;

    fn close(&self, notification: &Notification) -> Result<(), CoreError>;
}

/// Application windows controlled by the background worker.
pub trait WindowClients: Send + Sync {
    fn windows(&self) -> Result<Vec<ClientWindow>, CoreError>;

    fn focus(&self, window_id: u64) -> Result<(), CoreError>;

    fn open(&self, url: &str) -> Result<(), CoreError>;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ClickOutcome {
    Dismissed,
    Focused { window_id: u64 },
    Opened { url: String },
    /// The platform refused to focus or open a window; already logged.
    Unhandled,
}

pub struct PushDeliveryHandler {
    sink: Arc<dyn NotificationSink>,
    clients: Arc<dyn WindowClients>,
    defaults: PushDefaults,
}

impl PushDeliveryHandler {
    pub fn new(
        sink: Arc<dyn NotificationSink>,
        clients: Arc<dyn WindowClients>,
        defaults: PushDefaults,
    ) -> Self {
        Self {
            sink,
            clients,
            defaults,
        }
    }

    /// Handles one push message and returns what was shown. Display failures
    /// are logged, never returned.
    pub fn on_push(&self, data: Option<&[u8]>) -> Notification {
        let notification = decode_notification(data, &self.defaults);

        match self.sink.show(&notification) {
            Ok(()) => tracing::info!(
                title = %notification.title,
                target_url = %notification.target_url,
                "push notification displayed"
            ),
            Err(error) => tracing::warn!(
                kind = ?error.kind,
                message = %error.message,
                "failed to display push notification"
            ),
        }

        notification
    }

    pub fn on_notification_click(&self, click: &NotificationClick) -> ClickOutcome {
        if let Err(error) = self.sink.close(&click.notification) {
            tracing::warn!(message = %error.message, "failed to close notification");
        }

        if click.action.as_deref().is_some_and(is_dismissal_action) {
            return ClickOutcome::Dismissed;
        }

        let target = click.notification.target_url.as_str();
        match self.focus_existing(target) {
            Ok(Some(window_id)) => return ClickOutcome::Focused { window_id },
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(message = %error.message, "failed to focus an open window")
            }
        }

        match self.clients.open(target) {
            Ok(()) => ClickOutcome::Opened {
                url: target.to_string(),
            },
            Err(error) => {
                tracing::warn!(
                    url = %target,
                    message = %error.message,
                    "failed to open a window for notification"
                );
                ClickOutcome::Unhandled
            }
        }
    }

    fn focus_existing(&self, target: &str) -> Result<Option<u64>, CoreError> {
        let Some(window) = self
            .clients
            .windows()?
            .into_iter()
            .find(|window| window_matches(&window.url, target))
        else {
            return Ok(None);
        };

        self.clients.focus(window.id)?;
        Ok(Some(window.id))
    }
}

/// `target` may be absolute or relative to the window's own URL.
fn window_matches(window_url: &str, target: &str) -> bool {
    let Ok(window) = Url::parse(window_url) else {
        return window_url == target;
    };
    window
        .join(target)
        .map(|resolved| resolved == window)
        .unwrap_or(false)
}
