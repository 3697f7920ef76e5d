use crate::models::{CoreError, PushSubscription, Session, Story};

pub type PersistenceResult<T> = Result<T, CoreError>;

pub trait MigrationStore: Send + Sync {
    fn current_version(&self) -> PersistenceResult<i64>;

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()>;
}

pub trait StoryStore: Send + Sync {
    /// Upserts every record in a single transaction; a failure writes nothing.
    fn upsert_stories(&self, stories: &[Story]) -> PersistenceResult<()>;

    fn list_stories(&self) -> PersistenceResult<Vec<Story>>;

    fn story(&self, id: &str) -> PersistenceResult<Option<Story>>;

    fn delete_story(&self, id: &str) -> PersistenceResult<()>;

    fn clear_stories(&self) -> PersistenceResult<()>;
}

pub trait FavoriteStore: Send + Sync {
    fn upsert_favorite(&self, story: &Story) -> PersistenceResult<()>;

    fn delete_favorite(&self, id: &str) -> PersistenceResult<()>;

    fn list_favorites(&self) -> PersistenceResult<Vec<Story>>;

    fn favorite_exists(&self, id: &str) -> PersistenceResult<bool>;
}

pub trait SessionStore: Send + Sync {
    fn save_session(&self, session: &Session) -> PersistenceResult<()>;

    fn session(&self) -> PersistenceResult<Option<Session>>;

    fn clear_session(&self) -> PersistenceResult<()>;
}

pub trait PushSubscriptionStore: Send + Sync {
    fn upsert_push_subscription(&self, subscription: &PushSubscription) -> PersistenceResult<()>;

    fn list_push_subscriptions(&self) -> PersistenceResult<Vec<PushSubscription>>;

    fn delete_push_subscription(&self, endpoint: &str) -> PersistenceResult<()>;

    fn clear_push_subscriptions(&self) -> PersistenceResult<()>;
}
