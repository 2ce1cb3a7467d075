use crate::{
    geo::InvalidCoordinatesError,
    model::{Id, UnknownVariantError, user::UserMarker},
};
use thiserror::Error;

/// Client input that cannot be accepted. Always the caller's fault.
#[derive(Clone, PartialEq, Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Field must not be blank: {0}")]
    BlankField(&'static str),
    #[error("Field {field} exceeds {max_len} characters")]
    TooLong { field: &'static str, max_len: usize },
    #[error("Field {field} is not a number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error(transparent)]
    UnknownVariant(#[from] UnknownVariantError),
    #[error(transparent)]
    Coordinates(#[from] InvalidCoordinatesError),
    #[error("Invalid near query {0:?}, expected lat,lng[,radius]")]
    InvalidNear(String),
    #[error("{field} must be between 1 and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },
    #[error("Unsupported media file: {0}")]
    UnsupportedMedia(String),
    #[error("Media file exceeds the limit of {limit} bytes")]
    MediaTooLarge { limit: usize },
    #[error("Only one media file may be attached")]
    DuplicateMedia,
    #[error("Unknown assignee: {0}")]
    UnknownAssignee(Id<UserMarker>),
}
