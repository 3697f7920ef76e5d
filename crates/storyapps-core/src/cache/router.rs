use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use tokio::task::JoinSet;
use url::Url;

use crate::cache::expiration::ExpirationPolicy;
use crate::cache::fetcher::{FetchFuture, FetchResult, Fetcher};
use crate::cache::storage::CacheStorage;
use crate::cache::strategy::{CacheNames, CacheRole, CacheRule, CacheStrategy, Cacheable};
use crate::config::CacheConfig;
use crate::models::{CoreError, CoreErrorKind, HttpRequest, HttpResponse};

/// Sits between the application's requests and the network, answering each
/// from the cache or the network according to the first matching rule.
pub struct CacheRouter {
    names: CacheNames,
    rules: Vec<CacheRule>,
    storage: Arc<CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    app_shell: Url,
    precache: Vec<Url>,
    background: Mutex<JoinSet<()>>,
}

impl CacheRouter {
    pub fn new(
        names: CacheNames,
        rules: Vec<CacheRule>,
        storage: Arc<CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        app_shell: Url,
    ) -> Self {
        Self {
            names,
            rules,
            storage,
            fetcher,
            precache: vec![app_shell.clone()],
            app_shell,
            background: Mutex::new(JoinSet::new()),
        }
    }

    /// Router with the standard rule table, names and precache list from
    /// `config`.
    pub fn from_config(
        config: &CacheConfig,
        api_base: &Url,
        storage: Arc<CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, CoreError> {
        let scope = parse_url(&config.scope_url)?;
        let app_shell = join_url(&scope, &config.app_shell)?;
        let precache = config
            .precache
            .iter()
            .map(|path| join_url(&scope, path))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(
            CacheNames::new(config.prefix.clone(), config.generation.clone()),
            CacheRule::standard_rules(config, api_base),
            storage,
            fetcher,
            app_shell,
        )
        .with_precache(precache))
    }

    pub fn with_precache(mut self, urls: Vec<Url>) -> Self {
        self.precache = urls;
        if !self.precache.contains(&self.app_shell) {
            self.precache.push(self.app_shell.clone());
        }
        self
    }

    pub fn names(&self) -> &CacheNames {
        &self.names
    }

    pub fn storage(&self) -> &Arc<CacheStorage> {
        &self.storage
    }

    /// Only `GET` requests are routed; every other method goes to the network.
    pub fn rule_for(&self, request: &HttpRequest) -> Option<&CacheRule> {
        if !request.is_get() {
            return None;
        }
        self.rules.iter().find(|rule| rule.matcher.matches(request))
    }

    /// Answers `request`. Precached URLs come from the precache before any
    /// rule applies. Fails with `NetworkError` only when neither network nor
    /// cache can answer and the request is not a navigation.
    pub async fn handle(&self, request: HttpRequest) -> FetchResult {
        if !request.is_get() {
            return self.fetcher.fetch(request).await;
        }

        if let Some(precached) = self.lookup_precache(&request) {
            return Ok(precached);
        }

        let outcome = match self.rule_for(&request) {
            Some(rule) => self.apply(rule, &request).await,
            None => self.fetcher.fetch(request.clone()).await,
        };

        match outcome {
            Ok(response) => Ok(response),
            Err(error) => self.catch(&request, error),
        }
    }

    /// Fetches every precache URL into the current generation's precache.
    pub async fn install(&self) -> Result<usize, CoreError> {
        let cache_name = self.names.name_for(CacheRole::Precache);
        self.storage.open(&cache_name);

        for url in &self.precache {
            let response = self.fetcher.fetch(HttpRequest::get(url.clone())).await?;
            if !response.is_success() {
                return Err(CoreError::new(
                    CoreErrorKind::NetworkError,
                    format!("precache of '{url}' returned status {}", response.status),
                )
                .with_operation("install"));
            }
            self.storage.put(&cache_name, url.as_str(), response);
        }

        tracing::info!(
            cache = %cache_name,
            entries = self.precache.len(),
            "precache installed"
        );
        Ok(self.precache.len())
    }

    /// Deletes caches left behind by earlier generations and returns their
    /// names. Caches that do not carry this app's prefix are left alone.
    pub fn activate(&self) -> Vec<String> {
        let stale: Vec<String> = self
            .storage
            .keys()
            .into_iter()
            .filter(|name| self.names.is_stale(name))
            .collect();

        for name in &stale {
            self.storage.delete(name);
            tracing::info!(cache = %name, "deleting old cache generation");
        }

        for role in [
            CacheRole::Precache,
            CacheRole::Pages,
            CacheRole::Assets,
            CacheRole::Images,
            CacheRole::Api,
        ] {
            self.storage.open(&self.names.name_for(role));
        }

        stale
    }

    /// Waits for background revalidations started so far, including any they
    /// start in turn. Dropping the router aborts revalidations still pending,
    /// so hosts call this before shutting down to keep their cache updates.
    pub async fn wait_until_idle(&self) {
        loop {
            let mut pending = {
                let mut background = self
                    .background
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut *background)
            };

            if pending.is_empty() {
                return;
            }

            while let Some(result) = pending.join_next().await {
                if let Err(join_error) = result {
                    tracing::warn!(error = %join_error, "background cache update did not finish");
                }
            }
        }
    }

    async fn apply(&self, rule: &CacheRule, request: &HttpRequest) -> FetchResult {
        match rule.strategy {
            CacheStrategy::NetworkFirst { network_timeout } => {
                self.network_first(rule, request, network_timeout).await
            }
            CacheStrategy::StaleWhileRevalidate => self.stale_while_revalidate(rule, request).await,
            CacheStrategy::CacheFirst => self.cache_first(rule, request).await,
        }
    }

    async fn network_first(
        &self,
        rule: &CacheRule,
        request: &HttpRequest,
        network_timeout: Option<Duration>,
    ) -> FetchResult {
        let mut network = self.fetcher.fetch(request.clone());

        let network_result = match network_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut network).await {
                Ok(result) => result,
                Err(_) => {
                    if let Some(cached) = self.lookup(rule, request) {
                        tracing::debug!(
                            url = %request.url,
                            timeout_ms = limit.as_millis() as u64,
                            "network slower than timeout; serving cached copy"
                        );
                        self.spawn_background(self.cache_update(rule, request, network));
                        return Ok(cached);
                    }
                    network.await
                }
            },
            None => network.await,
        };

        match network_result {
            Ok(response) => {
                self.store(rule, request, &response);
                Ok(response)
            }
            Err(error) => match self.lookup(rule, request) {
                Some(cached) => {
                    tracing::debug!(
                        url = %request.url,
                        message = %error.message,
                        "network failed; serving cached copy"
                    );
                    Ok(cached)
                }
                None => Err(error),
            },
        }
    }

    async fn stale_while_revalidate(&self, rule: &CacheRule, request: &HttpRequest) -> FetchResult {
        let network = self.fetcher.fetch(request.clone());

        match self.lookup(rule, request) {
            Some(cached) => {
                self.spawn_background(self.cache_update(rule, request, network));
                Ok(cached)
            }
            None => {
                let response = network.await?;
                self.store(rule, request, &response);
                Ok(response)
            }
        }
    }

    async fn cache_first(&self, rule: &CacheRule, request: &HttpRequest) -> FetchResult {
        if let Some(cached) = self.lookup(rule, request) {
            return Ok(cached);
        }

        let response = self.fetcher.fetch(request.clone()).await?;
        self.store(rule, request, &response);
        Ok(response)
    }

    fn catch(&self, request: &HttpRequest, error: CoreError) -> FetchResult {
        if request.is_navigation() {
            let precache = self.names.name_for(CacheRole::Precache);
            let shell = self
                .storage
                .lookup(&precache, self.app_shell.as_str())
                .or_else(|| self.storage.match_any(self.app_shell.as_str()));
            if let Some(shell) = shell {
                tracing::debug!(url = %request.url, "serving app shell for offline navigation");
                return Ok(shell);
            }
        }

        tracing::warn!(
            url = %request.url,
            message = %error.message,
            "request could not be answered from network or cache"
        );
        Err(CoreError::new(
            CoreErrorKind::NetworkError,
            format!("no network or cached response for '{}': {}", request.url, error.message),
        ))
    }

    fn lookup_precache(&self, request: &HttpRequest) -> Option<HttpResponse> {
        let cached = self
            .storage
            .lookup(&self.names.name_for(CacheRole::Precache), request.cache_key())?;
        tracing::debug!(url = %request.url, "serving precached response");
        Some(cached)
    }

    fn lookup(&self, rule: &CacheRule, request: &HttpRequest) -> Option<HttpResponse> {
        self.storage.lookup_fresh(
            &self.names.name_for(rule.role),
            request.cache_key(),
            &rule.expiration,
            SystemTime::now(),
        )
    }

    fn store(&self, rule: &CacheRule, request: &HttpRequest, response: &HttpResponse) {
        store_response(
            &self.storage,
            &self.names.name_for(rule.role),
            &rule.expiration,
            &rule.cacheable,
            request.cache_key(),
            response,
        );
    }

    fn cache_update(
        &self,
        rule: &CacheRule,
        request: &HttpRequest,
        network: FetchFuture,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>> {
        let storage = self.storage.clone();
        let cache_name = self.names.name_for(rule.role);
        let expiration = rule.expiration;
        let cacheable = rule.cacheable.clone();
        let url = request.cache_key().to_string();

        Box::pin(async move {
            match network.await {
                Ok(response) => {
                    store_response(&storage, &cache_name, &expiration, &cacheable, &url, &response)
                }
                Err(error) => tracing::debug!(
                    url = %url,
                    message = %error.message,
                    "background cache update failed"
                ),
            }
        })
    }

    fn spawn_background(&self, task: impl Future<Output = ()> + Send + 'static) {
        let mut background = self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while background.try_join_next().is_some() {}
        background.spawn(task);
    }
}

fn store_response(
    storage: &CacheStorage,
    cache_name: &str,
    expiration: &ExpirationPolicy,
    cacheable: &Cacheable,
    url: &str,
    response: &HttpResponse,
) {
    if !cacheable.allows(response.status) {
        return;
    }
    storage.put(cache_name, url, response.clone());
    let evicted = storage.enforce(cache_name, expiration, SystemTime::now());
    if !evicted.is_empty() {
        tracing::debug!(cache = %cache_name, evicted = evicted.len(), "cache entries expired");
    }
}

fn parse_url(raw: &str) -> Result<Url, CoreError> {
    Url::parse(raw).map_err(|error| {
        CoreError::new(CoreErrorKind::InvalidInput, format!("invalid url '{raw}': {error}"))
    })
}

fn join_url(base: &Url, path: &str) -> Result<Url, CoreError> {
    base.join(path).map_err(|error| {
        CoreError::new(
            CoreErrorKind::InvalidInput,
            format!("cannot resolve '{path}' against '{base}': {error}"),
        )
    })
}
