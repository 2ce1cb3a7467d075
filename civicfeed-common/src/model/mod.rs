pub mod auth;
pub mod post;
pub mod query;
pub mod user;
pub mod validation;

use crate::{
    geo::InvalidCoordinatesError,
    model::{auth::InvalidAuthTokenHashError, user::InvalidUserNameError},
    snowflake::{Epoch, Snowflake, SnowflakeGenerator},
};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, marker::PhantomData};
use thiserror::Error;
use time::{OffsetDateTime, macros::datetime};

/// A stored value that does not map back onto the model.
#[derive(Clone, PartialEq, Debug, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    UserName(#[from] InvalidUserNameError),
    #[error(transparent)]
    Variant(#[from] UnknownVariantError),
    #[error(transparent)]
    Coordinates(#[from] InvalidCoordinatesError),
    #[error(transparent)]
    TokenHash(#[from] InvalidAuthTokenHashError),
    #[error("Session lifetime must be positive, got {0} seconds")]
    NonPositiveLifetime(i64),
    #[error("Media kind and url must be stored together")]
    IncompleteMedia,
    #[error("Counter was negative: {0}")]
    NegativeCounter(i64),
}

/// Text that names none of the variants of an enum.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
#[error("Unknown {kind}: {value:?}")]
pub struct UnknownVariantError {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct CivicFeedEpoch;
impl Epoch for CivicFeedEpoch {
    const EPOCH_TIME: OffsetDateTime = datetime!(2025-01-01 00:00 UTC);
}

pub type CivicFeedSnowflake = Snowflake<CivicFeedEpoch>;
pub type CivicFeedSnowflakeGenerator = SnowflakeGenerator<CivicFeedEpoch>;

#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Id<Marker>(CivicFeedSnowflake, #[serde(skip)] PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(snowflake: CivicFeedSnowflake) -> Self {
        Self(snowflake, PhantomData)
    }

    #[must_use]
    pub fn snowflake(self) -> CivicFeedSnowflake {
        self.0
    }

    /// The id as stored in a signed 64 bit database column.
    #[must_use]
    pub fn to_db(self) -> i64 {
        self.0.get().cast_signed()
    }

    #[must_use]
    pub fn from_db(value: i64) -> Self {
        value.cast_unsigned().into()
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> From<CivicFeedSnowflake> for Id<Marker> {
    fn from(value: CivicFeedSnowflake) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<Id<Marker>> for CivicFeedSnowflake {
    fn from(value: Id<Marker>) -> Self {
        value.0
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        Id::new(CivicFeedSnowflake::new(value))
    }
}

impl<Marker> From<Id<Marker>> for u64 {
    fn from(value: Id<Marker>) -> Self {
        value.snowflake().get()
    }
}

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum whose
/// variants map one to one onto lowercase names.
macro_rules! named_variants {
    ($name:ident as $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::model::UnknownVariantError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err($crate::model::UnknownVariantError {
                        kind: $kind,
                        value: s.to_owned(),
                    }),
                }
            }
        }
    };
}

pub(crate) use named_variants;

#[cfg(test)]
mod tests {
    use crate::model::{Id, post::PostMarker};

    #[test]
    fn ids_round_trip_through_signed_columns() {
        for raw in [0_u64, 42, u64::MAX >> 1, u64::MAX] {
            let id = Id::<PostMarker>::from(raw);
            assert_eq!(Id::<PostMarker>::from_db(id.to_db()), id);
        }
    }

    #[test]
    fn ids_serialize_as_numbers() {
        let id = Id::<PostMarker>::from(1234);
        assert_eq!(serde_json::to_string(&id).unwrap(), "1234");
        assert_eq!(serde_json::from_str::<Id<PostMarker>>("1234").unwrap(), id);
    }
}
