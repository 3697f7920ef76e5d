use std::future::Future;
use std::io::Read;
use std::pin::Pin;
use std::time::Duration;

use crate::models::{CoreError, CoreErrorKind, HttpRequest, HttpResponse};

pub type FetchResult = Result<HttpResponse, CoreError>;

pub type FetchFuture = Pin<Box<dyn Future<Output = FetchResult> + Send>>;

/// The network side of the cache router. A non-2xx HTTP status is still a
/// response; only transport failures are errors.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, request: HttpRequest) -> FetchFuture;
}

const MAX_BODY_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct UreqFetcher {
    agent: ureq::Agent,
}

impl UreqFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    /// Sends `request` on the calling thread.
    pub fn fetch_blocking(&self, request: &HttpRequest) -> FetchResult {
        fetch_blocking(&self.agent, request)
    }
}

impl Fetcher for UreqFetcher {
    fn fetch(&self, request: HttpRequest) -> FetchFuture {
        let agent = self.agent.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || fetch_blocking(&agent, &request))
                .await
                .map_err(|join_error| {
                    CoreError::new(
                        CoreErrorKind::Internal,
                        format!("network fetch join failure: {join_error}"),
                    )
                })?
        })
    }
}

fn fetch_blocking(agent: &ureq::Agent, request: &HttpRequest) -> FetchResult {
    let mut call = agent.request(&request.method, request.url.as_str());
    for (name, value) in &request.headers {
        call = call.set(name, value);
    }

    let sent = if request.body.is_empty() {
        call.call()
    } else {
        call.send_bytes(&request.body)
    };

    let response = match sent {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(ureq::Error::Transport(transport)) => {
            return Err(CoreError::new(
                CoreErrorKind::NetworkError,
                format!("{} '{}' failed: {transport}", request.method, request.url),
            ));
        }
    };

    let status = response.status();
    let mut converted = HttpResponse::new(status, Vec::new());
    for name in response.headers_names() {
        if let Some(value) = response.header(&name) {
            converted = converted.header(name.clone(), value);
        }
    }

    let mut body = Vec::new();
    response
        .into_reader()
        .take(MAX_BODY_BYTES)
        .read_to_end(&mut body)
        .map_err(|error| {
            CoreError::new(
                CoreErrorKind::NetworkError,
                format!("reading body of '{}' failed: {error}", request.url),
            )
        })?;
    converted.body = body;
    Ok(converted)
}
