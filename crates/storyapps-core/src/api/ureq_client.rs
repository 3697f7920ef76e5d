use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::json;
use tokio::runtime::Handle;
use url::Url;

use crate::api::{ApiResult, StoryApi};
use crate::cache::{CacheRouter, FetchResult, UreqFetcher};
use crate::models::{
    CoreError, CoreErrorKind, HttpRequest, NewStory, PushSubscription, Session, Story, StoryQuery,
};

/// Blocking client for the story REST API.
#[derive(Clone)]
pub struct UreqStoryApi {
    base_url: String,
    transport: Transport,
}

#[derive(Clone)]
enum Transport {
    Direct(UreqFetcher),
    /// Every request goes through the router, so reads follow its API cache
    /// policy. Requests block on `runtime` and must be sent from a thread
    /// outside it, as [`crate::api::call`] does.
    Routed {
        router: Arc<CacheRouter>,
        runtime: Handle,
    },
}

impl Transport {
    fn send(&self, request: HttpRequest) -> FetchResult {
        match self {
            Transport::Direct(fetcher) => fetcher.fetch_blocking(&request),
            Transport::Routed { router, runtime } => runtime.block_on(router.handle(request)),
        }
    }
}

enum Body {
    Empty,
    Json(String),
    Multipart { boundary: String, bytes: Vec<u8> },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListStoriesResponse {
    #[serde(default)]
    list_story: Vec<Story>,
}

#[derive(Deserialize)]
struct StoryResponse {
    story: Story,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    login_result: Session,
}

#[derive(Deserialize)]
struct VapidResponse {
    data: VapidData,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VapidData {
    vapid_public_key: String,
}

impl UreqStoryApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: normalize_base(base_url.into()),
            transport: Transport::Direct(UreqFetcher::new(timeout)),
        }
    }

    /// Client whose requests are answered by `router`, network or cache.
    pub fn routed(base_url: impl Into<String>, router: Arc<CacheRouter>, runtime: Handle) -> Self {
        Self {
            base_url: normalize_base(base_url.into()),
            transport: Transport::Routed { router, runtime },
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> ApiResult<Url> {
        let raw = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        Url::parse(&raw).map_err(|error| {
            CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("invalid story api url '{raw}': {error}"),
            )
        })
    }

    fn send<T: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Body,
    ) -> ApiResult<T> {
        let url = self.url(path)?;
        tracing::debug!(method, url = %url, authenticated = token.is_some(), "story api request");

        let mut request = HttpRequest::new(method, url);
        if let Some(token) = token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        request = match body {
            Body::Empty => request,
            Body::Json(payload) => request
                .header("Content-Type", "application/json")
                .with_body(payload),
            Body::Multipart { boundary, bytes } => request
                .header(
                    "Content-Type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .with_body(bytes),
        };

        let response = self.transport.send(request)?;
        let text = String::from_utf8_lossy(&response.body);
        if !response.is_success() {
            return Err(status_error(response.status, &text));
        }
        decode(&text)
    }
}

fn normalize_base(base_url: String) -> String {
    base_url.trim_end_matches('/').to_string()
}

impl StoryApi for UreqStoryApi {
    fn list_stories(&self, token: &str, query: &StoryQuery) -> ApiResult<Vec<Story>> {
        let token = require_token(Some(token))?;
        let path = format!(
            "stories?page={}&size={}&location={}",
            query.page,
            query.size,
            query.location.as_query_value()
        );
        let response: ListStoriesResponse = self.send("GET", &path, Some(token), Body::Empty)?;
        Ok(response.list_story)
    }

    fn get_story(&self, token: &str, id: &str) -> ApiResult<Story> {
        let token = require_token(Some(token))?;
        let response: StoryResponse =
            self.send("GET", &format!("stories/{id}"), Some(token), Body::Empty)?;
        Ok(response.story)
    }

    fn create_story(&self, token: Option<&str>, story: &NewStory) -> ApiResult<()> {
        let token = token.filter(|token| !token.is_empty());
        let path = if token.is_some() { "stories" } else { "stories/guest" };
        let boundary = multipart_boundary();
        let bytes = multipart_body(&boundary, story);
        let _: IgnoredAny =
            self.send("POST", path, token, Body::Multipart { boundary, bytes })?;
        Ok(())
    }

    fn login(&self, email: &str, password: &str) -> ApiResult<Session> {
        let payload = json!({ "email": email, "password": password }).to_string();
        let response: LoginResponse = self.send("POST", "login", None, Body::Json(payload))?;
        Ok(response.login_result)
    }

    fn register(&self, name: &str, email: &str, password: &str) -> ApiResult<()> {
        let payload = json!({ "name": name, "email": email, "password": password }).to_string();
        let _: IgnoredAny = self.send("POST", "register", None, Body::Json(payload))?;
        Ok(())
    }

    fn vapid_public_key(&self) -> ApiResult<String> {
        let response: VapidResponse =
            self.send("GET", "stories/vapidPublicKey", None, Body::Empty)?;
        Ok(response.data.vapid_public_key)
    }

    fn subscribe_push(&self, token: &str, subscription: &PushSubscription) -> ApiResult<()> {
        let token = require_token(Some(token))?;
        let payload = serde_json::to_string(subscription).map_err(|error| {
            CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("cannot encode push subscription: {error}"),
            )
        })?;
        let _: IgnoredAny = self.send(
            "POST",
            "notifications/subscribe",
            Some(token),
            Body::Json(payload),
        )?;
        Ok(())
    }

    fn unsubscribe_push(&self, token: &str, endpoint: &str) -> ApiResult<()> {
        let token = require_token(Some(token))?;
        let payload = json!({ "endpoint": endpoint }).to_string();
        let _: IgnoredAny = self.send(
            "DELETE",
            "notifications/subscribe",
            Some(token),
            Body::Json(payload),
        )?;
        Ok(())
    }
}

fn require_token(token: Option<&str>) -> ApiResult<&str> {
    token.filter(|token| !token.is_empty()).ok_or_else(|| {
        CoreError::new(
            CoreErrorKind::AuthRequired,
            "you must log in before calling this endpoint",
        )
    })
}

fn decode<T: DeserializeOwned>(text: &str) -> ApiResult<T> {
    let envelope: Envelope = serde_json::from_str(text).map_err(invalid_response)?;
    if envelope.error {
        return Err(CoreError::new(
            CoreErrorKind::Api,
            envelope
                .message
                .unwrap_or_else(|| "story api reported an error".to_string()),
        ));
    }
    serde_json::from_str(text).map_err(invalid_response)
}

fn status_error(status: u16, text: &str) -> CoreError {
    let message = serde_json::from_str::<Envelope>(text)
        .ok()
        .and_then(|envelope| envelope.message)
        .unwrap_or_else(|| format!("story api returned status {status}"));
    let kind = if status == 401 {
        CoreErrorKind::AuthRequired
    } else {
        CoreErrorKind::Api
    };
    CoreError::new(kind, message)
}

fn invalid_response(error: serde_json::Error) -> CoreError {
    CoreError::new(
        CoreErrorKind::Api,
        format!("story api returned an unreadable response: {error}"),
    )
}

fn multipart_boundary() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_nanos())
        .unwrap_or(0);
    format!("----storyapps-{nanos:x}")
}

/// `lat`/`lon` are only sent as a pair.
fn multipart_body(boundary: &str, story: &NewStory) -> Vec<u8> {
    let mut body = Vec::with_capacity(story.photo.len() + 512);

    let text_field = |body: &mut Vec<u8>, name: &str, value: &str| {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    };

    text_field(&mut body, "description", &story.description);
    if let (Some(lat), Some(lon)) = (story.lat, story.lon) {
        text_field(&mut body, "lat", &lat.to_string());
        text_field(&mut body, "lon", &lon.to_string());
    }

    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"photo\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            story.photo_file_name, story.photo_content_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(&story.photo);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}
