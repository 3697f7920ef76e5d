//! Network reads written through to the durable store, with the store as the
//! fallback while offline.

use std::sync::Arc;

use crate::api::{self, StoryApi};
use crate::durable::DurableStore;
use crate::models::{CoreError, CoreErrorKind, NewStory, Session, Story, StoryQuery};
use crate::subscription::SubscriptionManager;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FeedSource {
    Network,
    Cache,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoryFeed {
    pub stories: Vec<Story>,
    pub source: FeedSource,
    /// Why the cached copy was served, for display.
    pub notice: Option<String>,
}

#[derive(Clone)]
pub struct StorySync {
    api: Arc<dyn StoryApi>,
    store: DurableStore,
    subscriptions: Option<Arc<SubscriptionManager>>,
}

impl StorySync {
    pub fn new(api: Arc<dyn StoryApi>, store: DurableStore) -> Self {
        Self {
            api,
            store,
            subscriptions: None,
        }
    }

    /// Subscribes to push through `manager` after every successful login.
    pub fn with_subscriptions(mut self, manager: Arc<SubscriptionManager>) -> Self {
        self.subscriptions = Some(manager);
        self
    }

    pub fn store(&self) -> &DurableStore {
        &self.store
    }

    /// Fetches a page of stories and caches it. A network failure serves the
    /// cached stories instead, possibly none. A failed cache write still
    /// returns the fetched stories.
    pub async fn refresh(&self, query: StoryQuery) -> Result<StoryFeed, CoreError> {
        let session = self.require_session("refresh").await?;

        let fetched = api::call(&self.api, "list_stories", move |api| {
            api.list_stories(&session.token, &query)
        })
        .await;

        match fetched {
            Ok(stories) => {
                if let Err(error) = self.store.save_stories(stories.clone()).await {
                    tracing::warn!(
                        kind = ?error.kind,
                        message = %error.message,
                        "could not cache fetched stories"
                    );
                }
                tracing::info!(count = stories.len(), "story feed refreshed from network");
                Ok(StoryFeed {
                    stories,
                    source: FeedSource::Network,
                    notice: None,
                })
            }
            Err(error) if error.kind == CoreErrorKind::NetworkError => {
                let stories = self.store.get_stories().await?;
                tracing::warn!(
                    cached = stories.len(),
                    message = %error.message,
                    "network unavailable; serving cached stories"
                );
                Ok(StoryFeed {
                    stories,
                    source: FeedSource::Cache,
                    notice: Some("You are offline. Showing saved stories.".to_string()),
                })
            }
            Err(error) => Err(error),
        }
    }

    /// Detail from the network, else the cached story, else the saved
    /// favorite.
    pub async fn story_detail(&self, id: &str) -> Result<Story, CoreError> {
        let session = self.require_session("story_detail").await?;

        let remote_id = id.to_string();
        let fetched = api::call(&self.api, "get_story", move |api| {
            api.get_story(&session.token, &remote_id)
        })
        .await;

        let error = match fetched {
            Ok(story) => return Ok(story),
            Err(error) if error.kind == CoreErrorKind::NetworkError => error,
            Err(error) => return Err(error),
        };

        if let Some(story) = self.store.get_story_by_id(id).await? {
            tracing::debug!(id = %id, "serving cached story detail");
            return Ok(story);
        }
        let favorite = self
            .store
            .get_favorites()
            .await?
            .into_iter()
            .find(|story| story.id == id);
        favorite.ok_or(error)
    }

    /// Publishes with the session if there is one, otherwise as a guest.
    pub async fn create_story(&self, story: NewStory) -> Result<(), CoreError> {
        let token = self.store.session().await?.map(|session| session.token);
        let guest = token.is_none();
        api::call(&self.api, "create_story", move |api| {
            api.create_story(token.as_deref(), &story)
        })
        .await?;
        tracing::info!(guest, "story published");
        Ok(())
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, CoreError> {
        let email = email.to_string();
        let password = password.to_string();
        let session = api::call(&self.api, "login", move |api| api.login(&email, &password)).await?;
        self.store.save_session(session.clone()).await?;
        tracing::info!(user_id = %session.user_id, "logged in");

        if let Some(subscriptions) = &self.subscriptions {
            if subscriptions.subscribe().await.is_none() {
                tracing::debug!("logged in without a push subscription");
            }
        }
        Ok(session)
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<(), CoreError> {
        let name = name.to_string();
        let email = email.to_string();
        let password = password.to_string();
        api::call(&self.api, "register", move |api| {
            api.register(&name, &email, &password)
        })
        .await
    }

    /// Clears cached stories, the session and the local push mirror.
    /// Favorites stay, and the server-side subscription is not deregistered.
    pub async fn logout(&self) -> Result<(), CoreError> {
        self.store.clear_stories().await?;
        self.store.clear_session().await?;
        self.store.clear_push_subscriptions().await?;
        tracing::info!("logged out; cached stories cleared");
        Ok(())
    }

    async fn require_session(&self, operation: &'static str) -> Result<Session, CoreError> {
        self.store.session().await?.ok_or_else(|| {
            CoreError::new(CoreErrorKind::AuthRequired, "You must login first")
                .with_operation(operation)
        })
    }
}
