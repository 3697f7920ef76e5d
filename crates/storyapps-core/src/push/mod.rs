pub mod handler;
pub mod payload;

pub use handler::{ClickOutcome, NotificationSink, PushDeliveryHandler, WindowClients};
pub use payload::{PushAction, PushPayload, decode_notification, parse_payload};
