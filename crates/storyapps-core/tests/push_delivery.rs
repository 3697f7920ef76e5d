use std::sync::{Arc, Mutex};

use storyapps_core::config::PushDefaults;
use storyapps_core::models::{
    ClientWindow, CoreError, CoreErrorKind, Notification, NotificationAction, NotificationClick,
};
use storyapps_core::push::{ClickOutcome, NotificationSink, PushDeliveryHandler, WindowClients};

#[derive(Default)]
struct RecordingSink {
    shown: Mutex<Vec<Notification>>,
    closed: Mutex<usize>,
    fail_show: bool,
}

impl NotificationSink for RecordingSink {
    fn show(&self, notification: &Notification) -> Result<(), CoreError> {
        if self.fail_show {
            return Err(CoreError::new(CoreErrorKind::Internal, "display refused"));
        }
        self.shown.lock().unwrap().push(notification.clone());
        Ok(())
    }

    fn close(&self, _notification: &Notification) -> Result<(), CoreError> {
        *self.closed.lock().unwrap() += 1;
        Ok(())
    }
}

#[derive(Default)]
struct FakeWindows {
    open_windows: Vec<ClientWindow>,
    focused: Mutex<Vec<u64>>,
    opened: Mutex<Vec<String>>,
    fail_open: bool,
}

impl WindowClients for FakeWindows {
    fn windows(&self) -> Result<Vec<ClientWindow>, CoreError> {
        Ok(self.open_windows.clone())
    }

    fn focus(&self, window_id: u64) -> Result<(), CoreError> {
        self.focused.lock().unwrap().push(window_id);
        Ok(())
    }

    fn open(&self, url: &str) -> Result<(), CoreError> {
        if self.fail_open {
            return Err(CoreError::new(CoreErrorKind::Internal, "popup blocked"));
        }
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

fn handler(sink: Arc<RecordingSink>, windows: Arc<FakeWindows>) -> PushDeliveryHandler {
    PushDeliveryHandler::new(sink, windows, PushDefaults::default())
}

fn click(target_url: &str, action: Option<&str>) -> NotificationClick {
    NotificationClick {
        notification: Notification {
            title: "Story berhasil dibuat".to_string(),
            body: "Anda telah membuat story baru".to_string(),
            icon: PushDefaults::default().icon,
            badge: PushDefaults::default().badge,
            target_url: target_url.to_string(),
            actions: vec![NotificationAction {
                action: "dismiss".to_string(),
                title: "Close".to_string(),
            }],
        },
        action: action.map(str::to_string),
    }
}

#[test]
fn every_payload_shows_exactly_one_notification_with_text() {
    let payloads: Vec<Option<&[u8]>> = vec![
        None,
        Some(b""),
        Some(b"plain text from the server"),
        Some(b"{\"title\": 42}"),
        Some(br#"{"title":"Story berhasil dibuat","options":{"body":"nested"}}"#),
    ];

    for payload in payloads {
        let sink = Arc::new(RecordingSink::default());
        let handler = handler(sink.clone(), Arc::new(FakeWindows::default()));

        handler.on_push(payload);

        let shown = sink.shown.lock().unwrap();
        assert_eq!(shown.len(), 1, "payload {payload:?}");
        assert!(!shown[0].title.trim().is_empty());
        assert!(!shown[0].body.trim().is_empty());
    }
}

#[test]
fn plain_text_payload_uses_fallback_title() {
    let sink = Arc::new(RecordingSink::default());
    let notification = handler(sink, Arc::new(FakeWindows::default()))
        .on_push(Some(b"server says hi"));

    assert_eq!(notification.title, "Notification");
    assert_eq!(notification.body, "server says hi");
    assert_eq!(notification.target_url, "/");
}

#[test]
fn empty_push_uses_defaults() {
    let sink = Arc::new(RecordingSink::default());
    let notification = handler(sink, Arc::new(FakeWindows::default())).on_push(None);

    assert_eq!(notification.title, "New Notification");
    assert_eq!(notification.body, "You have received a notification.");
    assert_eq!(notification.icon, "public/icons/favicon-192x192.png");
    assert_eq!(notification.badge, "public/icons/favicon-72x72.png");
}

#[test]
fn display_failures_are_swallowed() {
    let sink = Arc::new(RecordingSink {
        fail_show: true,
        ..RecordingSink::default()
    });
    let notification = handler(sink, Arc::new(FakeWindows::default()))
        .on_push(Some(br#"{"title":"hello"}"#));
    assert_eq!(notification.title, "hello");
}

#[test]
fn dismiss_actions_only_close_the_notification() {
    let sink = Arc::new(RecordingSink::default());
    let windows = Arc::new(FakeWindows::default());
    let handler = handler(sink.clone(), windows.clone());

    assert_eq!(
        handler.on_notification_click(&click("/", Some("dismiss"))),
        ClickOutcome::Dismissed
    );
    assert_eq!(
        handler.on_notification_click(&click("/", Some("close"))),
        ClickOutcome::Dismissed
    );

    assert_eq!(*sink.closed.lock().unwrap(), 2);
    assert!(windows.opened.lock().unwrap().is_empty());
    assert!(windows.focused.lock().unwrap().is_empty());
}

#[test]
fn click_focuses_a_matching_window() {
    let sink = Arc::new(RecordingSink::default());
    let windows = Arc::new(FakeWindows {
        open_windows: vec![
            ClientWindow {
                id: 1,
                url: "http://localhost:9000/#/map".to_string(),
            },
            ClientWindow {
                id: 2,
                url: "http://localhost:9000/#/detail/s1".to_string(),
            },
        ],
        ..FakeWindows::default()
    });
    let handler = handler(sink.clone(), windows.clone());

    let outcome = handler.on_notification_click(&click("/#/detail/s1", None));

    assert_eq!(outcome, ClickOutcome::Focused { window_id: 2 });
    assert_eq!(*windows.focused.lock().unwrap(), vec![2]);
    assert_eq!(*sink.closed.lock().unwrap(), 1);
}

#[test]
fn click_opens_a_window_when_none_matches() {
    let windows = Arc::new(FakeWindows {
        open_windows: vec![ClientWindow {
            id: 7,
            url: "http://localhost:9000/#/map".to_string(),
        }],
        ..FakeWindows::default()
    });
    let handler = handler(Arc::new(RecordingSink::default()), windows.clone());

    let outcome = handler.on_notification_click(&click("/#/favorites", Some("open")));

    assert_eq!(
        outcome,
        ClickOutcome::Opened {
            url: "/#/favorites".to_string()
        }
    );
    assert_eq!(*windows.opened.lock().unwrap(), vec!["/#/favorites".to_string()]);
}

#[test]
fn window_failures_are_reported_as_unhandled() {
    let windows = Arc::new(FakeWindows {
        fail_open: true,
        ..FakeWindows::default()
    });
    let handler = handler(Arc::new(RecordingSink::default()), windows);

    assert_eq!(
        handler.on_notification_click(&click("/", None)),
        ClickOutcome::Unhandled
    );
}
