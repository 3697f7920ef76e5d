use storyapps_core::PlatformFuture;
use storyapps_core::models::{
    ClientWindow, CoreError, CoreErrorKind, Notification, PermissionState, PushSubscription,
};
use storyapps_core::push::{NotificationSink, WindowClients};
use storyapps_core::subscription::{PermissionPrompt, PushService};

/// Prints notifications to stdout.
pub struct TerminalNotifications;

impl NotificationSink for TerminalNotifications {
    fn show(&self, notification: &Notification) -> Result<(), CoreError> {
        println!("{}", notification.title);
        println!("  {}", notification.body);
        println!("  opens: {}", notification.target_url);
        for action in &notification.actions {
            println!("  [{}] {}", action.action, action.title);
        }
        Ok(())
    }

    fn close(&self, _notification: &Notification) -> Result<(), CoreError> {
        Ok(())
    }
}

/// A terminal has no app windows to focus; opening one prints the URL.
pub struct NoWindows;

impl WindowClients for NoWindows {
    fn windows(&self) -> Result<Vec<ClientWindow>, CoreError> {
        Ok(Vec::new())
    }

    fn focus(&self, _window_id: u64) -> Result<(), CoreError> {
        Ok(())
    }

    fn open(&self, url: &str) -> Result<(), CoreError> {
        println!("open {url}");
        Ok(())
    }
}

/// A terminal has no push service, so subscribing after login ends with the
/// manager reporting the platform as unsupported.
pub struct NoPushService;

impl PermissionPrompt for NoPushService {
    fn supported(&self) -> bool {
        false
    }

    fn current(&self) -> PermissionState {
        PermissionState::Denied
    }

    fn request(&self) -> PlatformFuture<'_, PermissionState> {
        Box::pin(async { Ok(PermissionState::Denied) })
    }
}

impl PushService for NoPushService {
    fn subscribe(&self, _application_server_key: Vec<u8>) -> PlatformFuture<'_, PushSubscription> {
        Box::pin(async {
            Err(CoreError::new(
                CoreErrorKind::SubscriptionUnavailable,
                "terminals cannot receive push messages",
            ))
        })
    }
}
