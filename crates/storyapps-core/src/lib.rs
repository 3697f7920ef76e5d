pub mod api;
pub mod cache;
pub mod config;
pub mod durable;
pub mod models;
pub mod navigation;
pub mod persistence;
pub mod push;
pub mod sqlite;
pub mod subscription;
pub mod sync;

use std::future::Future;
use std::pin::Pin;

use crate::models::CoreError;

/// Future returned by platform and page trait methods.
pub type PlatformFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CoreError>> + Send + 'a>>;
