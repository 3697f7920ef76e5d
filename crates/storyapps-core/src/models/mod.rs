pub mod error;
pub mod http;
pub mod notification;
pub mod session;
pub mod story;
pub mod subscription;

pub use error::{CoreError, CoreErrorKind};
pub use http::{HttpRequest, HttpResponse, RequestDestination, RequestMode};
pub use notification::{
    ClientWindow, Notification, NotificationAction, NotificationClick, is_dismissal_action,
};
pub use session::Session;
pub use story::{Favorite, LocationFilter, NewStory, Story, StoryQuery};
pub use subscription::{PermissionState, PushSubscription, SubscriptionKeys};
