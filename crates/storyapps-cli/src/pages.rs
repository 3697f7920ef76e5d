use std::fmt::Write as _;

use storyapps_core::PlatformFuture;
use storyapps_core::durable::DurableStore;
use storyapps_core::models::{CoreError, CoreErrorKind, LocationFilter, Story, StoryQuery};
use storyapps_core::navigation::{Page, Route, RouteKind, RouteTable};
use storyapps_core::sync::{FeedSource, StorySync};

pub fn route_table(sync: StorySync) -> RouteTable {
    let home = sync.clone();
    let map = sync.clone();
    let detail = sync.clone();
    let favorites = sync.store().clone();

    RouteTable::new()
        .register(RouteKind::Home, move |_| {
            Box::new(HomePage { sync: home.clone() })
        })
        .register(RouteKind::Map, move |_| {
            Box::new(MapPage { sync: map.clone() })
        })
        .register(RouteKind::Detail, move |route| {
            let id = match route {
                Route::Detail { id } => id.clone(),
                _ => String::new(),
            };
            Box::new(DetailPage {
                sync: detail.clone(),
                id,
            })
        })
        .register(RouteKind::Favorites, move |_| {
            Box::new(FavoritesPage {
                store: favorites.clone(),
            })
        })
        .register(RouteKind::AddStory, |_| {
            Box::new(HintPage {
                title: "Add Story",
                hint: "Publish with `storyapps post --photo <file> --description <text>`.",
            })
        })
        .register(RouteKind::Login, |_| {
            Box::new(HintPage {
                title: "Login",
                hint: "Sign in with `storyapps login --email <email> --password <password>`.",
            })
        })
        .register(RouteKind::Register, |_| {
            Box::new(HintPage {
                title: "Register",
                hint: "Create an account with `storyapps register --name <name> --email <email> --password <password>`.",
            })
        })
        .register(RouteKind::NotFound, |route| {
            Box::new(NotFoundPage {
                path: route.to_hash(),
            })
        })
}

struct HomePage {
    sync: StorySync,
}

impl Page for HomePage {
    fn render(&mut self) -> PlatformFuture<'_, String> {
        Box::pin(async move {
            let query = StoryQuery {
                location: LocationFilter::WithLocation,
                ..StoryQuery::default()
            };
            let mut out = String::from("Stories\n");
            let feed = match self.sync.refresh(query).await {
                Ok(feed) => feed,
                Err(error) => {
                    write_unavailable(&mut out, &error);
                    return Ok(out);
                }
            };

            if let Some(notice) = &feed.notice {
                let _ = writeln!(out, "({notice})");
            }
            if feed.stories.is_empty() {
                let empty = match feed.source {
                    FeedSource::Network => "No stories yet.",
                    FeedSource::Cache => "No saved stories available offline.",
                };
                out.push_str(empty);
                out.push('\n');
            }
            for story in &feed.stories {
                write_story_line(&mut out, story);
            }
            Ok(out)
        })
    }
}

struct MapPage {
    sync: StorySync,
}

impl Page for MapPage {
    fn render(&mut self) -> PlatformFuture<'_, String> {
        Box::pin(async move {
            let query = StoryQuery {
                location: LocationFilter::WithLocation,
                size: 50,
                ..StoryQuery::default()
            };
            let mut out = String::from("Story map\n");
            let feed = match self.sync.refresh(query).await {
                Ok(feed) => feed,
                Err(error) => {
                    write_unavailable(&mut out, &error);
                    return Ok(out);
                }
            };

            for story in feed.stories.iter().filter(|story| story.has_location()) {
                let _ = writeln!(
                    out,
                    "  ({:.4}, {:.4})  {} by {}",
                    story.lat.unwrap_or_default(),
                    story.lon.unwrap_or_default(),
                    story.id,
                    story.name
                );
            }
            Ok(out)
        })
    }
}

struct DetailPage {
    sync: StorySync,
    id: String,
}

impl Page for DetailPage {
    fn render(&mut self) -> PlatformFuture<'_, String> {
        Box::pin(async move {
            let story = match self.sync.story_detail(&self.id).await {
                Ok(story) => story,
                Err(error) => {
                    let mut out = format!("Story {}\n", self.id);
                    write_unavailable(&mut out, &error);
                    return Ok(out);
                }
            };
            let saved = match self.sync.store().is_favorite(story.id.clone()).await {
                Ok(saved) => Some(saved),
                Err(error) => {
                    tracing::warn!(message = %error.message, "favorite state unavailable");
                    None
                }
            };

            let mut out = String::new();
            let _ = writeln!(out, "{} ({})", story.name, story.id);
            let _ = writeln!(out, "{}", story.description);
            let _ = writeln!(out, "Photo: {}", story.photo_url);
            let _ = writeln!(out, "Posted: {}", story.created_at);
            if let (Some(lat), Some(lon)) = (story.lat, story.lon) {
                let _ = writeln!(out, "Location: {lat}, {lon}");
            }
            let saved = match saved {
                Some(true) => "yes",
                Some(false) => "no",
                None => "unknown",
            };
            let _ = writeln!(out, "Saved: {saved}");
            Ok(out)
        })
    }
}

struct FavoritesPage {
    store: DurableStore,
}

impl Page for FavoritesPage {
    fn render(&mut self) -> PlatformFuture<'_, String> {
        Box::pin(async move {
            let mut out = String::from("Saved stories\n");
            let favorites = match self.store.get_favorites().await {
                Ok(favorites) => favorites,
                Err(error) => {
                    write_unavailable(&mut out, &error);
                    return Ok(out);
                }
            };
            if favorites.is_empty() {
                out.push_str("You have not saved any stories.\n");
            }
            for story in &favorites {
                write_story_line(&mut out, story);
            }
            Ok(out)
        })
    }
}

struct HintPage {
    title: &'static str,
    hint: &'static str,
}

impl Page for HintPage {
    fn render(&mut self) -> PlatformFuture<'_, String> {
        let content = format!("{}\n{}\n", self.title, self.hint);
        Box::pin(async move { Ok(content) })
    }
}

struct NotFoundPage {
    path: String,
}

impl Page for NotFoundPage {
    fn render(&mut self) -> PlatformFuture<'_, String> {
        let content = format!(
            "404 Page Not Found\nNothing lives at '{}'. Try `storyapps open '#/'`.\n",
            self.path
        );
        Box::pin(async move { Ok(content) })
    }
}

/// Failed loads render as a notice; the page itself never fails.
fn write_unavailable(out: &mut String, error: &CoreError) {
    tracing::warn!(kind = ?error.kind, message = %error.message, "page data unavailable");
    let hint = match error.kind {
        CoreErrorKind::AuthRequired => "Log in with `storyapps login` to see stories.",
        _ => "Stories could not be loaded. Try again later.",
    };
    let _ = writeln!(out, "{hint}");
}

fn write_story_line(out: &mut String, story: &Story) {
    let _ = writeln!(out, "  [{}] {}: {}", story.id, story.name, story.description);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_data_renders_a_hint_instead_of_failing() {
        let mut signed_out = String::new();
        write_unavailable(
            &mut signed_out,
            &CoreError::new(CoreErrorKind::AuthRequired, "You must login first"),
        );
        assert!(signed_out.contains("storyapps login"));

        let mut broken_store = String::new();
        write_unavailable(
            &mut broken_store,
            &CoreError::new(CoreErrorKind::StorageUnavailable, "disk I/O error"),
        );
        assert!(broken_store.contains("Try again later"));
    }
}
