use crate::{
    geo::GeoPoint,
    model::{
        Id, named_variants,
        user::{AssigneeRef, UserMarker, UserRef},
        validation::ValidationError,
    },
};
use serde::{Deserialize, Serialize, Serializer, ser::SerializeStruct};
use std::collections::BTreeSet;
use time::OffsetDateTime;

pub const TITLE_MAX_LEN: usize = 200;
pub const DESCRIPTION_MAX_LEN: usize = 5000;
pub const COMMENT_MAX_LEN: usize = 2000;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct CommentMarker;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Roads,
    Lighting,
    Sanitation,
    Water,
    Parks,
    Safety,
    Other,
}

named_variants!(Category as "category" {
    Roads => "roads",
    Lighting => "lighting",
    Sanitation => "sanitation",
    Water => "water",
    Parks => "parks",
    Safety => "safety",
    Other => "other",
});

/// Triage state of a post. Any state may follow any other.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Reported,
    InProgress,
    Resolved,
}

named_variants!(Status as "status" {
    Reported => "reported",
    InProgress => "in_progress",
    Resolved => "resolved",
});

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

named_variants!(MediaKind as "media kind" {
    Image => "image",
    Video => "video",
});

/// The single photo or video attached to a post.
///
/// Flattened into a post this serializes as either `imageUrl` or `videoUrl`.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub enum Media {
    #[serde(rename = "imageUrl")]
    Image(String),
    #[serde(rename = "videoUrl")]
    Video(String),
}

impl Media {
    #[must_use]
    pub fn new(kind: MediaKind, url: String) -> Self {
        match kind {
            MediaKind::Image => Media::Image(url),
            MediaKind::Video => Media::Video(url),
        }
    }

    #[must_use]
    pub fn kind(&self) -> MediaKind {
        match self {
            Media::Image(_) => MediaKind::Image,
            Media::Video(_) => MediaKind::Video,
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Media::Image(url) | Media::Video(url) => url,
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct Location {
    pub point: GeoPoint,
    pub address: Option<String>,
}

impl Serialize for Location {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut location = serializer.serialize_struct("Location", 3)?;
        location.serialize_field("type", "Point")?;
        location.serialize_field(
            "coordinates",
            &[self.point.longitude(), self.point.latitude()],
        )?;
        location.serialize_field("address", &self.address)?;
        location.end()
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Id<CommentMarker>,
    pub user: UserRef,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Clone, PartialEq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Id<PostMarker>,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub location: Location,
    #[serde(flatten)]
    pub media: Option<Media>,
    pub status: Status,
    pub author: UserRef,
    pub assigned_to: Option<AssigneeRef>,
    pub upvotes: BTreeSet<Id<UserMarker>>,
    pub likes: BTreeSet<Id<UserMarker>>,
    pub shares: u64,
    pub comments: Vec<Comment>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Fields of a post submission as they arrive from a form, before validation.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct PostForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub lat: Option<String>,
    pub lng: Option<String>,
    pub address: Option<String>,
}

/// Validated content of a new post.
#[derive(Clone, PartialEq, Debug)]
pub struct PostContent {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub location: Location,
}

impl PostForm {
    pub fn validate(self) -> Result<PostContent, ValidationError> {
        let title = required_text("title", self.title, TITLE_MAX_LEN)?;
        let description = required_text("description", self.description, DESCRIPTION_MAX_LEN)?;
        let category: Category = required("category", self.category)?.trim().parse()?;
        let latitude = parse_coordinate("lat", self.lat)?;
        let longitude = parse_coordinate("lng", self.lng)?;
        let point = GeoPoint::new(longitude, latitude)?;
        let address = self
            .address
            .map(|address| address.trim().to_owned())
            .filter(|address| !address.is_empty());

        Ok(PostContent {
            title,
            description,
            category,
            location: Location { point, address },
        })
    }
}

fn required(field: &'static str, value: Option<String>) -> Result<String, ValidationError> {
    value.ok_or(ValidationError::MissingField(field))
}

/// Trims `value` and checks it is neither blank nor longer than `max_len`.
pub fn required_text(
    field: &'static str,
    value: Option<String>,
    max_len: usize,
) -> Result<String, ValidationError> {
    let value = required(field, value)?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankField(field));
    }
    if trimmed.chars().count() > max_len {
        return Err(ValidationError::TooLong { field, max_len });
    }
    Ok(trimmed.to_owned())
}

fn parse_coordinate(field: &'static str, value: Option<String>) -> Result<f64, ValidationError> {
    let value = required(field, value)?;
    value
        .trim()
        .parse()
        .map_err(|_| ValidationError::InvalidNumber { field, value })
}

/// A validated post ready to be stored.
#[derive(Clone, PartialEq, Debug)]
pub struct NewPost {
    pub author: Id<UserMarker>,
    pub content: PostContent,
    pub media: Option<Media>,
}

/// Partial update of a post's triage fields. Absent fields stay untouched.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostUpdate {
    pub status: Option<Status>,
    pub assigned_to: Option<Id<UserMarker>>,
}

impl PostUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.assigned_to.is_none()
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Reaction {
    Like,
    Upvote,
}

/// Result of flipping a user's membership in a reaction set.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct ToggleOutcome {
    pub count: u64,
    pub member: bool,
}
