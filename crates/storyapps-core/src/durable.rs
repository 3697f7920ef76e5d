//! Async handle over the offline story/favorite store.
//!
//! Every call runs its SQLite work on the blocking pool and owns its own
//! connection, so a caller that stops awaiting does not cancel the write: the
//! transaction still commits or rolls back on its own.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::{CoreError, CoreErrorKind, Favorite, PushSubscription, Session, Story};
use crate::persistence::{
    FavoriteStore, PersistenceResult, PushSubscriptionStore, SessionStore, StoryStore,
};
use crate::sqlite::SqliteStore;

#[derive(Clone)]
pub struct DurableStore {
    store: Arc<SqliteStore>,
}

impl DurableStore {
    /// Opens the store at `database_path`, creating it and running any pending
    /// schema upgrades. Concurrent opens against the same path all succeed.
    pub async fn open(database_path: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let store = Arc::new(SqliteStore::new(database_path));
        let migrating = store.clone();
        run_blocking("open", move || migrating.migrate_to_latest()).await?;
        tracing::debug!(
            path = %store.database_path().display(),
            "durable store opened"
        );
        Ok(Self { store })
    }

    pub fn database_path(&self) -> &Path {
        self.store.database_path()
    }

    pub async fn save_stories(&self, stories: Vec<Story>) -> PersistenceResult<Vec<Story>> {
        let store = self.store.clone();
        run_blocking("save_stories", move || {
            store.upsert_stories(&stories)?;
            tracing::debug!(count = stories.len(), "stories saved to durable store");
            Ok(stories)
        })
        .await
    }

    pub async fn get_stories(&self) -> PersistenceResult<Vec<Story>> {
        let store = self.store.clone();
        run_blocking("get_stories", move || store.list_stories()).await
    }

    pub async fn get_story_by_id(&self, id: impl Into<String>) -> PersistenceResult<Option<Story>> {
        let store = self.store.clone();
        let id = id.into();
        run_blocking("get_story_by_id", move || store.story(&id)).await
    }

    /// Deleting an id that is not cached succeeds.
    pub async fn delete_story(&self, id: impl Into<String>) -> PersistenceResult<()> {
        let store = self.store.clone();
        let id = id.into();
        run_blocking("delete_story", move || store.delete_story(&id)).await
    }

    pub async fn clear_stories(&self) -> PersistenceResult<()> {
        let store = self.store.clone();
        run_blocking("clear_stories", move || store.clear_stories()).await
    }

    pub async fn add_to_favorites(&self, story: Favorite) -> PersistenceResult<bool> {
        let store = self.store.clone();
        run_blocking("add_to_favorites", move || {
            store.upsert_favorite(&story)?;
            tracing::debug!(id = %story.id, "story added to favorites");
            Ok(true)
        })
        .await
    }

    pub async fn remove_from_favorites(&self, id: impl Into<String>) -> PersistenceResult<bool> {
        let store = self.store.clone();
        let id = id.into();
        run_blocking("remove_from_favorites", move || {
            store.delete_favorite(&id)?;
            tracing::debug!(id = %id, "story removed from favorites");
            Ok(true)
        })
        .await
    }

    pub async fn get_favorites(&self) -> PersistenceResult<Vec<Favorite>> {
        let store = self.store.clone();
        run_blocking("get_favorites", move || store.list_favorites()).await
    }

    pub async fn is_favorite(&self, id: impl Into<String>) -> PersistenceResult<bool> {
        let store = self.store.clone();
        let id = id.into();
        run_blocking("is_favorite", move || store.favorite_exists(&id)).await
    }

    /// Flips the favorite state of `story` and returns the new state. Two
    /// toggles racing on the same id resolve last-writer-wins.
    pub async fn toggle_favorite(&self, story: Favorite) -> PersistenceResult<bool> {
        if self.is_favorite(story.id.clone()).await? {
            self.remove_from_favorites(story.id).await?;
            Ok(false)
        } else {
            self.add_to_favorites(story).await
        }
    }

    pub async fn save_session(&self, session: Session) -> PersistenceResult<()> {
        let store = self.store.clone();
        run_blocking("save_session", move || store.save_session(&session)).await
    }

    pub async fn session(&self) -> PersistenceResult<Option<Session>> {
        let store = self.store.clone();
        run_blocking("session", move || store.session()).await
    }

    pub async fn clear_session(&self) -> PersistenceResult<()> {
        let store = self.store.clone();
        run_blocking("clear_session", move || store.clear_session()).await
    }

    pub async fn save_push_subscription(
        &self,
        subscription: PushSubscription,
    ) -> PersistenceResult<()> {
        let store = self.store.clone();
        run_blocking("save_push_subscription", move || {
            store.upsert_push_subscription(&subscription)
        })
        .await
    }

    pub async fn push_subscriptions(&self) -> PersistenceResult<Vec<PushSubscription>> {
        let store = self.store.clone();
        run_blocking("push_subscriptions", move || store.list_push_subscriptions()).await
    }

    pub async fn delete_push_subscription(
        &self,
        endpoint: impl Into<String>,
    ) -> PersistenceResult<()> {
        let store = self.store.clone();
        let endpoint = endpoint.into();
        run_blocking("delete_push_subscription", move || {
            store.delete_push_subscription(&endpoint)
        })
        .await
    }

    pub async fn clear_push_subscriptions(&self) -> PersistenceResult<()> {
        let store = self.store.clone();
        run_blocking("clear_push_subscriptions", move || {
            store.clear_push_subscriptions()
        })
        .await
    }
}

async fn run_blocking<T>(
    operation: &'static str,
    work: impl FnOnce() -> PersistenceResult<T> + Send + 'static,
) -> PersistenceResult<T>
where
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|join_error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("durable store join failure: {join_error}"),
            )
            .with_operation(operation)
        })?
}
