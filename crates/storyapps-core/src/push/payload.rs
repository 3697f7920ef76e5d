use serde::Deserialize;

use crate::config::PushDefaults;
use crate::models::{CoreError, CoreErrorKind, Notification, NotificationAction};

/// Caller-defined push message; any field may be absent or `null`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct PushPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub actions: Option<Vec<PushAction>>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct PushAction {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

pub fn parse_payload(data: &[u8]) -> Result<PushPayload, CoreError> {
    serde_json::from_slice::<PushPayload>(data).map_err(|error| {
        CoreError::new(
            CoreErrorKind::MalformedPushPayload,
            format!("push payload is not a structured message: {error}"),
        )
    })
}

/// Turns raw push data into a displayable notification. Never fails: data that
/// is not a structured message becomes the body of a plain notification.
pub fn decode_notification(data: Option<&[u8]>, defaults: &PushDefaults) -> Notification {
    let payload = match data {
        None => PushPayload::default(),
        Some(bytes) => match parse_payload(bytes) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(
                    kind = ?error.kind,
                    message = %error.message,
                    "delivering push payload as plain text"
                );
                PushPayload {
                    title: Some(defaults.fallback_title.clone()),
                    body: Some(String::from_utf8_lossy(bytes).into_owned()),
                    ..PushPayload::default()
                }
            }
        },
    };

    resolve(payload, defaults)
}

fn resolve(payload: PushPayload, defaults: &PushDefaults) -> Notification {
    Notification {
        title: non_blank(payload.title).unwrap_or_else(|| defaults.title.clone()),
        body: non_blank(payload.body).unwrap_or_else(|| defaults.body.clone()),
        icon: defaults.icon.clone(),
        badge: defaults.badge.clone(),
        target_url: non_blank(payload.url).unwrap_or_else(|| defaults.target_url.clone()),
        actions: payload
            .actions
            .unwrap_or_default()
            .into_iter()
            .filter_map(|action| {
                let id = non_blank(action.action)?;
                Some(NotificationAction {
                    title: non_blank(action.title).unwrap_or_else(|| id.clone()),
                    action: id,
                })
            })
            .collect(),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_payload_overrides_defaults() {
        let defaults = PushDefaults::default();
        let notification = decode_notification(
            Some(br#"{"title":"Story baru","body":"Ada cerita baru","url":"/#/detail/s1","actions":[{"action":"open","title":"Buka"}]}"#),
            &defaults,
        );

        assert_eq!(notification.title, "Story baru");
        assert_eq!(notification.body, "Ada cerita baru");
        assert_eq!(notification.target_url, "/#/detail/s1");
        assert_eq!(notification.actions.len(), 1);
        assert_eq!(notification.icon, defaults.icon);
    }

    #[test]
    fn blank_fields_fall_back_to_defaults() {
        let defaults = PushDefaults::default();
        let notification =
            decode_notification(Some(br#"{"title":"   ","body":""}"#), &defaults);

        assert_eq!(notification.title, defaults.title);
        assert_eq!(notification.body, defaults.body);
        assert_eq!(notification.target_url, "/");
    }

    #[test]
    fn null_and_partial_actions_keep_the_structured_message() {
        let defaults = PushDefaults::default();
        let without_actions = decode_notification(
            Some(br#"{"title":"New story","body":"Ayu posted","actions":null}"#),
            &defaults,
        );
        assert_eq!(without_actions.title, "New story");
        assert_eq!(without_actions.body, "Ayu posted");
        assert!(without_actions.actions.is_empty());

        let untitled = decode_notification(
            Some(br#"{"title":"New story","actions":[{"action":"open"},{"title":"Nameless"},{"action":"close","title":null}]}"#),
            &defaults,
        );
        assert_eq!(untitled.title, "New story");
        assert_eq!(
            untitled.actions,
            vec![
                NotificationAction {
                    action: "open".to_string(),
                    title: "open".to_string(),
                },
                NotificationAction {
                    action: "close".to_string(),
                    title: "close".to_string(),
                },
            ]
        );
    }

    #[test]
    fn non_object_json_is_treated_as_text() {
        let error = parse_payload(b"[1, 2, 3]").unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::MalformedPushPayload);
    }
}
