use std::collections::HashMap;

use crate::PlatformFuture;
use crate::models::{CoreError, CoreErrorKind};

/// A location inside the app, parsed from the URL hash (`#/detail/{id}`).
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Route {
    Home,
    AddStory,
    Map,
    Detail { id: String },
    Login,
    Register,
    Favorites,
    NotFound { path: String },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RouteKind {
    Home,
    AddStory,
    Map,
    Detail,
    Login,
    Register,
    Favorites,
    NotFound,
}

impl Route {
    /// The resource segment is matched case-insensitively; the id keeps its
    /// case. Segments after the id are ignored.
    pub fn parse(hash: &str) -> Route {
        let path = hash.trim().trim_start_matches('#');
        let mut segments = path.split('/').skip(1);
        let resource = segments
            .next()
            .filter(|segment| !segment.is_empty())
            .map(str::to_ascii_lowercase);
        let id = segments.next().filter(|segment| !segment.is_empty());

        match (resource.as_deref(), id) {
            (None, _) if path.is_empty() || path.starts_with('/') => Route::Home,
            (Some("add"), _) => Route::AddStory,
            (Some("map"), _) => Route::Map,
            (Some("detail"), Some(id)) => Route::Detail { id: id.to_string() },
            (Some("login"), _) => Route::Login,
            (Some("register"), _) => Route::Register,
            (Some("favorites"), _) => Route::Favorites,
            _ => Route::NotFound {
                path: path.to_string(),
            },
        }
    }

    pub fn kind(&self) -> RouteKind {
        match self {
            Route::Home => RouteKind::Home,
            Route::AddStory => RouteKind::AddStory,
            Route::Map => RouteKind::Map,
            Route::Detail { .. } => RouteKind::Detail,
            Route::Login => RouteKind::Login,
            Route::Register => RouteKind::Register,
            Route::Favorites => RouteKind::Favorites,
            Route::NotFound { .. } => RouteKind::NotFound,
        }
    }

    pub fn to_hash(&self) -> String {
        match self {
            Route::Home => "#/".to_string(),
            Route::AddStory => "#/add".to_string(),
            Route::Map => "#/map".to_string(),
            Route::Detail { id } => format!("#/detail/{id}"),
            Route::Login => "#/login".to_string(),
            Route::Register => "#/register".to_string(),
            Route::Favorites => "#/favorites".to_string(),
            Route::NotFound { path } => format!("#{path}"),
        }
    }
}

/// A screen of the app. `before_unload` runs when the user navigates away,
/// so pages release cameras, timers or map handles there.
pub trait Page: Send {
    fn render(&mut self) -> PlatformFuture<'_, String>;

    fn after_render(&mut self) -> PlatformFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn before_unload(&mut self) {}
}

pub type PageFactory = Box<dyn Fn(&Route) -> Box<dyn Page> + Send + Sync>;

#[derive(Default)]
pub struct RouteTable {
    pages: HashMap<RouteKind, PageFactory>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        kind: RouteKind,
        factory: impl Fn(&Route) -> Box<dyn Page> + Send + Sync + 'static,
    ) -> Self {
        self.pages.insert(kind, Box::new(factory));
        self
    }

    /// Unregistered routes resolve to the `NotFound` page when one is
    /// registered.
    pub fn resolve(&self, route: &Route) -> Option<Box<dyn Page>> {
        self.pages
            .get(&route.kind())
            .or_else(|| self.pages.get(&RouteKind::NotFound))
            .map(|factory| factory(route))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RenderedPage {
    pub route: Route,
    pub content: String,
}

/// Owns the active page and runs the page lifecycle on every hash change.
pub struct Navigator {
    table: RouteTable,
    current: Option<(Route, Box<dyn Page>)>,
}

impl Navigator {
    pub fn new(table: RouteTable) -> Self {
        Self {
            table,
            current: None,
        }
    }

    pub fn current_route(&self) -> Option<&Route> {
        self.current.as_ref().map(|(route, _)| route)
    }

    pub async fn navigate(&mut self, hash: &str) -> Result<RenderedPage, CoreError> {
        self.unload();

        let route = Route::parse(hash);
        let mut page = self.table.resolve(&route).ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("no page registered for '{}'", route.to_hash()),
            )
            .with_operation("navigate")
        })?;

        tracing::debug!(route = ?route.kind(), "rendering page");
        let content = page.render().await?;
        page.after_render().await?;
        self.current = Some((route.clone(), page));

        Ok(RenderedPage { route, content })
    }

    /// Runs `before_unload` on the active page, if any.
    pub fn unload(&mut self) {
        if let Some((route, mut page)) = self.current.take() {
            tracing::debug!(route = ?route.kind(), "unloading page");
            page.before_unload();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_static_routes_case_insensitively() {
        assert_eq!(Route::parse(""), Route::Home);
        assert_eq!(Route::parse("#/"), Route::Home);
        assert_eq!(Route::parse("#/ADD"), Route::AddStory);
        assert_eq!(Route::parse("#/favorites"), Route::Favorites);
    }

    #[test]
    fn detail_keeps_id_case_and_needs_an_id() {
        assert_eq!(
            Route::parse("#/Detail/story-AbC/edit"),
            Route::Detail {
                id: "story-AbC".to_string()
            }
        );
        assert_eq!(
            Route::parse("#/detail"),
            Route::NotFound {
                path: "/detail".to_string()
            }
        );
    }
}
