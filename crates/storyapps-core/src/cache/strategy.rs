use std::time::Duration;

use url::Url;

use crate::cache::expiration::ExpirationPolicy;
use crate::config::CacheConfig;
use crate::models::{HttpRequest, RequestDestination};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CacheStrategy {
    /// Prefer the network. With a timeout, a slow network yields to a cached
    /// copy while the request keeps refreshing the cache in the background.
    NetworkFirst { network_timeout: Option<Duration> },
    StaleWhileRevalidate,
    CacheFirst,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Cacheable {
    Successful,
    Statuses(Vec<u16>),
}

impl Cacheable {
    pub fn allows(&self, status: u16) -> bool {
        match self {
            Cacheable::Successful => (200..300).contains(&status),
            Cacheable::Statuses(statuses) => statuses.contains(&status),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CacheRole {
    Precache,
    Pages,
    Assets,
    Images,
    Api,
}

impl CacheRole {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheRole::Precache => "precache",
            CacheRole::Pages => "pages-cache",
            CacheRole::Assets => "assets-cache",
            CacheRole::Images => "images-cache",
            CacheRole::Api => "api-cache",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RouteMatcher {
    Destinations(Vec<RequestDestination>),
    /// ASCII serialization of the origin, e.g. `https://story-api.dicoding.dev`.
    Origin(String),
}

impl RouteMatcher {
    pub fn origin_of(url: &Url) -> Self {
        RouteMatcher::Origin(url.origin().ascii_serialization())
    }

    pub fn matches(&self, request: &HttpRequest) -> bool {
        match self {
            RouteMatcher::Destinations(destinations) => {
                destinations.contains(&request.destination)
            }
            RouteMatcher::Origin(origin) => request.url.origin().ascii_serialization() == *origin,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CacheRule {
    pub role: CacheRole,
    pub matcher: RouteMatcher,
    pub strategy: CacheStrategy,
    pub expiration: ExpirationPolicy,
    pub cacheable: Cacheable,
}

impl CacheRule {
    /// Documents, static assets, images, then the story API; first match wins.
    pub fn standard_rules(config: &CacheConfig, api_base: &Url) -> Vec<CacheRule> {
        vec![
            CacheRule {
                role: CacheRole::Pages,
                matcher: RouteMatcher::Destinations(vec![RequestDestination::Document]),
                strategy: CacheStrategy::NetworkFirst {
                    network_timeout: config.network_timeout(),
                },
                expiration: ExpirationPolicy::new(config.pages.max_entries, config.pages.max_age()),
                cacheable: Cacheable::Successful,
            },
            CacheRule {
                role: CacheRole::Assets,
                matcher: RouteMatcher::Destinations(vec![
                    RequestDestination::Style,
                    RequestDestination::Script,
                    RequestDestination::Font,
                ]),
                strategy: CacheStrategy::StaleWhileRevalidate,
                expiration: ExpirationPolicy::new(
                    config.assets.max_entries,
                    config.assets.max_age(),
                ),
                cacheable: Cacheable::Successful,
            },
            CacheRule {
                role: CacheRole::Images,
                matcher: RouteMatcher::Destinations(vec![RequestDestination::Image]),
                strategy: CacheStrategy::CacheFirst,
                expiration: ExpirationPolicy::new(
                    config.images.max_entries,
                    config.images.max_age(),
                ),
                cacheable: Cacheable::Successful,
            },
            CacheRule {
                role: CacheRole::Api,
                matcher: RouteMatcher::origin_of(api_base),
                strategy: CacheStrategy::NetworkFirst {
                    network_timeout: config.network_timeout(),
                },
                expiration: ExpirationPolicy::new(config.api.max_entries, config.api.max_age()),
                cacheable: Cacheable::Statuses(vec![0, 200]),
            },
        ]
    }
}

/// Cache names are `"{prefix}-{generation}-{role}"`; a generation bump
/// makes every older name stale.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CacheNames {
    prefix: String,
    generation: String,
}

impl CacheNames {
    pub fn new(prefix: impl Into<String>, generation: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            generation: generation.into(),
        }
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    pub fn name_for(&self, role: CacheRole) -> String {
        format!("{}-{}-{}", self.prefix, self.generation, role.as_str())
    }

    /// Belongs to this app but to another generation. Names without the
    /// app prefix are never stale.
    pub fn is_stale(&self, cache_name: &str) -> bool {
        let owned = format!("{}-", self.prefix);
        let current = format!("{}-{}-", self.prefix, self.generation);
        cache_name.starts_with(&owned) && !cache_name.starts_with(&current)
    }
}
