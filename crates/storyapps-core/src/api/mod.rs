pub mod ureq_client;

use std::sync::Arc;

use crate::models::{CoreError, CoreErrorKind, NewStory, PushSubscription, Session, Story, StoryQuery};

pub use ureq_client::UreqStoryApi;

pub type ApiResult<T> = Result<T, CoreError>;

/// The remote story API. Calls block; use [`call`] from async code.
pub trait StoryApi: Send + Sync {
    fn list_stories(&self, token: &str, query: &StoryQuery) -> ApiResult<Vec<Story>>;

    fn get_story(&self, token: &str, id: &str) -> ApiResult<Story>;

    /// Publishes as a guest when `token` is `None`.
    fn create_story(&self, token: Option<&str>, story: &NewStory) -> ApiResult<()>;

    fn login(&self, email: &str, password: &str) -> ApiResult<Session>;

    fn register(&self, name: &str, email: &str, password: &str) -> ApiResult<()>;

    fn vapid_public_key(&self) -> ApiResult<String>;

    fn subscribe_push(&self, token: &str, subscription: &PushSubscription) -> ApiResult<()>;

    fn unsubscribe_push(&self, token: &str, endpoint: &str) -> ApiResult<()>;
}

/// Runs a blocking API call on the blocking pool.
pub async fn call<T, F>(api: &Arc<dyn StoryApi>, operation: &'static str, request: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn StoryApi) -> ApiResult<T> + Send + 'static,
{
    let api = api.clone();
    tokio::task::spawn_blocking(move || request(api.as_ref()))
        .await
        .map_err(|join_error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("story api join failure: {join_error}"),
            )
            .with_operation(operation)
        })?
        .map_err(|error| error.with_operation(operation))
}
