use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use storyapps_core::PlatformFuture;
use storyapps_core::api::{ApiResult, StoryApi};
use storyapps_core::durable::DurableStore;
use storyapps_core::models::{
    CoreError, CoreErrorKind, LocationFilter, NewStory, PermissionState, PushSubscription,
    Session, Story, StoryQuery, SubscriptionKeys,
};
use storyapps_core::subscription::{PermissionPrompt, PushService, SubscriptionManager};
use storyapps_core::sync::{FeedSource, StorySync};

fn test_db_path(test_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("storyapps-{test_name}-{nanos}.sqlite3"))
}

fn story(id: &str) -> Story {
    Story {
        id: id.to_string(),
        name: "Dimas".to_string(),
        description: format!("story {id}"),
        photo_url: format!("https://story-api.dicoding.dev/images/stories/{id}.jpg"),
        lat: Some(-6.9),
        lon: Some(107.6),
        created_at: "2024-05-01T06:34:18.598Z".to_string(),
    }
}

struct FakeApi {
    online: AtomicBool,
    stories: Vec<Story>,
    queries: Mutex<Vec<StoryQuery>>,
    created_with: Mutex<Vec<Option<String>>>,
    subscribed: Mutex<Vec<(String, String)>>,
}

impl FakeApi {
    fn new(stories: Vec<Story>) -> Self {
        Self {
            online: AtomicBool::new(true),
            stories,
            queries: Mutex::new(Vec::new()),
            created_with: Mutex::new(Vec::new()),
            subscribed: Mutex::new(Vec::new()),
        }
    }

    fn go_offline(&self) {
        self.online.store(false, Ordering::SeqCst);
    }

    fn check_online(&self) -> ApiResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoreError::new(CoreErrorKind::NetworkError, "Failed to fetch"))
        }
    }
}

impl StoryApi for FakeApi {
    fn list_stories(&self, token: &str, query: &StoryQuery) -> ApiResult<Vec<Story>> {
        self.check_online()?;
        assert_eq!(token, "token-abc");
        self.queries.lock().unwrap().push(*query);
        Ok(self.stories.clone())
    }

    fn get_story(&self, _token: &str, id: &str) -> ApiResult<Story> {
        self.check_online()?;
        self.stories
            .iter()
            .find(|story| story.id == id)
            .cloned()
            .ok_or_else(|| CoreError::new(CoreErrorKind::Api, "Story not found"))
    }

    fn create_story(&self, token: Option<&str>, _story: &NewStory) -> ApiResult<()> {
        self.check_online()?;
        self.created_with
            .lock()
            .unwrap()
            .push(token.map(str::to_string));
        Ok(())
    }

    fn login(&self, email: &str, password: &str) -> ApiResult<Session> {
        self.check_online()?;
        if password != "secret-password" {
            return Err(CoreError::new(CoreErrorKind::Api, "Invalid password"));
        }
        Ok(Session {
            user_id: "user-1".to_string(),
            name: email.split('@').next().unwrap_or_default().to_string(),
            token: "token-abc".to_string(),
        })
    }

    fn register(&self, _name: &str, _email: &str, _password: &str) -> ApiResult<()> {
        self.check_online()
    }

    fn vapid_public_key(&self) -> ApiResult<String> {
        self.check_online()?;
        let mut point = vec![0x04];
        point.extend([7u8; 64]);
        Ok(URL_SAFE_NO_PAD.encode(point))
    }

    fn subscribe_push(&self, token: &str, subscription: &PushSubscription) -> ApiResult<()> {
        self.check_online()?;
        self.subscribed
            .lock()
            .unwrap()
            .push((token.to_string(), subscription.endpoint.clone()));
        Ok(())
    }

    fn unsubscribe_push(&self, _token: &str, _endpoint: &str) -> ApiResult<()> {
        Err(CoreError::new(CoreErrorKind::Internal, "not scripted"))
    }
}

struct GrantedPrompt;

impl PermissionPrompt for GrantedPrompt {
    fn supported(&self) -> bool {
        true
    }

    fn current(&self) -> PermissionState {
        PermissionState::Granted
    }

    fn request(&self) -> PlatformFuture<'_, PermissionState> {
        Box::pin(async { Ok(PermissionState::Granted) })
    }
}

struct FakePushService;

impl PushService for FakePushService {
    fn subscribe(&self, _application_server_key: Vec<u8>) -> PlatformFuture<'_, PushSubscription> {
        Box::pin(async {
            Ok(PushSubscription {
                endpoint: "https://fcm.googleapis.com/fcm/send/after-login".to_string(),
                keys: SubscriptionKeys {
                    p256dh: "BNc-p256dh".to_string(),
                    auth: "auth-secret".to_string(),
                },
            })
        })
    }
}

async fn sync_with(test_name: &str, api: Arc<FakeApi>) -> StorySync {
    let store = DurableStore::open(test_db_path(test_name))
        .await
        .expect("store should open");
    StorySync::new(api, store)
}

fn new_story() -> NewStory {
    NewStory {
        description: "Pantai Kuta".to_string(),
        photo: vec![0xff, 0xd8],
        photo_file_name: "kuta.jpg".to_string(),
        photo_content_type: "image/jpeg".to_string(),
        lat: None,
        lon: None,
    }
}

#[tokio::test]
async fn refresh_requires_login() {
    let sync = sync_with("refresh-no-session", Arc::new(FakeApi::new(vec![story("s1")]))).await;

    let error = sync.refresh(StoryQuery::default()).await.unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::AuthRequired);
}

#[tokio::test]
async fn refresh_writes_through_and_serves_cache_offline() {
    let api = Arc::new(FakeApi::new(vec![story("s1"), story("s2")]));
    let sync = sync_with("refresh-offline", api.clone()).await;
    sync.login("ayu@example.test", "secret-password").await.unwrap();

    let query = StoryQuery {
        location: LocationFilter::WithLocation,
        ..StoryQuery::default()
    };
    let online = sync.refresh(query).await.unwrap();
    assert_eq!(online.source, FeedSource::Network);
    assert_eq!(online.stories.len(), 2);
    assert_eq!(api.queries.lock().unwrap()[0].location.as_query_value(), 1);

    api.go_offline();
    let offline = sync.refresh(query).await.unwrap();
    assert_eq!(offline.source, FeedSource::Cache);
    assert_eq!(offline.stories, online.stories);
    assert!(offline.notice.is_some());
}

#[tokio::test]
async fn offline_detail_falls_back_to_cache_then_favorites() {
    let api = Arc::new(FakeApi::new(vec![story("s1")]));
    let sync = sync_with("detail-offline", api.clone()).await;
    sync.login("ayu@example.test", "secret-password").await.unwrap();
    sync.refresh(StoryQuery::default()).await.unwrap();
    sync.store().add_to_favorites(story("fav-only")).await.unwrap();

    api.go_offline();
    assert_eq!(sync.story_detail("s1").await.unwrap(), story("s1"));
    assert_eq!(sync.story_detail("fav-only").await.unwrap(), story("fav-only"));
    assert_eq!(
        sync.story_detail("unknown").await.unwrap_err().kind,
        CoreErrorKind::NetworkError
    );
}

#[tokio::test]
async fn api_errors_are_not_masked_by_the_cache() {
    let api = Arc::new(FakeApi::new(vec![]));
    let sync = sync_with("detail-api-error", api).await;
    sync.login("ayu@example.test", "secret-password").await.unwrap();

    let error = sync.story_detail("missing").await.unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::Api);
    assert_eq!(error.operation, Some("get_story"));
}

#[tokio::test]
async fn create_story_posts_as_guest_without_session() {
    let api = Arc::new(FakeApi::new(vec![]));
    let sync = sync_with("create-story", api.clone()).await;

    sync.create_story(new_story()).await.unwrap();
    sync.login("ayu@example.test", "secret-password").await.unwrap();
    sync.create_story(new_story()).await.unwrap();

    assert_eq!(
        *api.created_with.lock().unwrap(),
        vec![None, Some("token-abc".to_string())]
    );
}

#[tokio::test]
async fn failed_login_stores_no_session() {
    let sync = sync_with("login-failure", Arc::new(FakeApi::new(vec![]))).await;

    let error = sync.login("ayu@example.test", "wrong").await.unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::Api);
    assert_eq!(sync.store().session().await.unwrap(), None);
}

#[tokio::test]
async fn logout_clears_stories_session_and_push_mirror_but_keeps_favorites() {
    let api = Arc::new(FakeApi::new(vec![story("s1")]));
    let sync = sync_with("logout", api).await;
    sync.login("ayu@example.test", "secret-password").await.unwrap();
    sync.refresh(StoryQuery::default()).await.unwrap();
    sync.store().add_to_favorites(story("s1")).await.unwrap();
    sync.store()
        .save_push_subscription(PushSubscription {
            endpoint: "https://push.example.test/send/1".to_string(),
            keys: SubscriptionKeys {
                p256dh: "p".to_string(),
                auth: "a".to_string(),
            },
        })
        .await
        .unwrap();

    sync.logout().await.unwrap();

    let store = sync.store();
    assert!(store.get_stories().await.unwrap().is_empty());
    assert_eq!(store.session().await.unwrap(), None);
    assert!(store.push_subscriptions().await.unwrap().is_empty());
    assert_eq!(store.get_favorites().await.unwrap(), vec![story("s1")]);
}

#[tokio::test]
async fn refresh_returns_fetched_stories_when_caching_fails() {
    // An empty id violates the stories table check, so the batch write fails.
    let api = Arc::new(FakeApi::new(vec![story("s1"), story("")]));
    let sync = sync_with("refresh-write-failure", api).await;
    sync.login("ayu@example.test", "secret-password").await.unwrap();

    let feed = sync.refresh(StoryQuery::default()).await.unwrap();

    assert_eq!(feed.source, FeedSource::Network);
    assert_eq!(feed.stories, vec![story("s1"), story("")]);
    assert!(sync.store().get_stories().await.unwrap().is_empty());
}

#[tokio::test]
async fn login_subscribes_to_push_and_mirrors_to_server() {
    let api = Arc::new(FakeApi::new(vec![]));
    let store = DurableStore::open(test_db_path("login-subscribes"))
        .await
        .expect("store should open");
    let manager = SubscriptionManager::new(
        Arc::new(GrantedPrompt),
        Arc::new(FakePushService),
        api.clone(),
        store.clone(),
    );
    let sync = StorySync::new(api.clone(), store.clone()).with_subscriptions(Arc::new(manager));

    sync.login("ayu@example.test", "secret-password").await.unwrap();

    let mirrored = store.push_subscriptions().await.unwrap();
    assert_eq!(mirrored.len(), 1);
    assert_eq!(
        mirrored[0].endpoint,
        "https://fcm.googleapis.com/fcm/send/after-login"
    );
    assert_eq!(
        *api.subscribed.lock().unwrap(),
        vec![(
            "token-abc".to_string(),
            "https://fcm.googleapis.com/fcm/send/after-login".to_string()
        )]
    );
}

#[tokio::test]
async fn failed_login_does_not_subscribe() {
    let api = Arc::new(FakeApi::new(vec![]));
    let store = DurableStore::open(test_db_path("login-failure-no-push"))
        .await
        .expect("store should open");
    let manager = SubscriptionManager::new(
        Arc::new(GrantedPrompt),
        Arc::new(FakePushService),
        api.clone(),
        store.clone(),
    );
    let sync = StorySync::new(api.clone(), store.clone()).with_subscriptions(Arc::new(manager));

    sync.login("ayu@example.test", "wrong").await.unwrap_err();

    assert!(store.push_subscriptions().await.unwrap().is_empty());
    assert!(api.subscribed.lock().unwrap().is_empty());
}
