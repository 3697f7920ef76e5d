use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

impl NotificationAction {
    pub fn is_dismissal(&self) -> bool {
        is_dismissal_action(&self.action)
    }
}

pub fn is_dismissal_action(action: &str) -> bool {
    matches!(action, "close" | "dismiss")
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub target_url: String,
    pub actions: Vec<NotificationAction>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NotificationClick {
    pub notification: Notification,
    /// `None` when the notification body itself was clicked.
    pub action: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientWindow {
    pub id: u64,
    pub url: String,
}
