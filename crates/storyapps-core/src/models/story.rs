use serde::{Deserialize, Serialize};

/// A story as returned by the remote API and cached offline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    pub name: String,
    pub description: String,
    pub photo_url: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    pub created_at: String,
}

impl Story {
    pub fn has_location(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }
}

/// Favorites share the story shape; they live in their own collection.
pub type Favorite = Story;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LocationFilter {
    #[default]
    Any,
    WithLocation,
}

impl LocationFilter {
    pub fn as_query_value(self) -> u8 {
        match self {
            LocationFilter::Any => 0,
            LocationFilter::WithLocation => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StoryQuery {
    pub page: u32,
    pub size: u32,
    pub location: LocationFilter,
}

impl Default for StoryQuery {
    fn default() -> Self {
        Self {
            page: 1,
            size: 10,
            location: LocationFilter::Any,
        }
    }
}

/// Payload for publishing a new story.
#[derive(Clone, Debug, PartialEq)]
pub struct NewStory {
    pub description: String,
    pub photo: Vec<u8>,
    pub photo_file_name: String,
    pub photo_content_type: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}
