pub mod expiration;
pub mod fetcher;
pub mod router;
pub mod storage;
pub mod strategy;

pub use expiration::ExpirationPolicy;
pub use fetcher::{FetchFuture, FetchResult, Fetcher, UreqFetcher};
pub use router::CacheRouter;
pub use storage::CacheStorage;
pub use strategy::{CacheNames, CacheRole, CacheRule, CacheStrategy, Cacheable, RouteMatcher};
