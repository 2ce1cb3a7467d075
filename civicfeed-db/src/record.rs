use civicfeed_common::{
    geo::GeoPoint,
    model::{
        Id, ModelValidationError,
        auth::Authentication,
        post::{Comment, Location, Media, MediaKind, Post},
        user::{AssigneeRef, User, UserName, UserRef},
    },
};
use sqlx::FromRow;
use std::collections::BTreeSet;
use time::{Duration, OffsetDateTime};

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct UserRecord {
    pub user_id: i64,
    pub name: String,
    pub role: String,
    pub department: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct AuthenticationRecord {
    pub user_id: i64,
    pub token_hash: Vec<u8>,
    pub created_at: OffsetDateTime,
    pub expires_after_seconds: Option<i64>,
}

#[derive(Clone, PartialEq, Debug, FromRow)]
pub(crate) struct PostRecord {
    pub post_id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub longitude: f64,
    pub latitude: f64,
    pub address: Option<String>,
    pub media_kind: Option<String>,
    pub media_url: Option<String>,
    pub status: String,
    pub author_id: i64,
    pub author_name: String,
    pub assigned_to: Option<i64>,
    pub assignee_name: Option<String>,
    pub assignee_department: Option<String>,
    pub shares: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct ReactionRecord {
    pub post_id: i64,
    pub user_id: i64,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct CommentRecord {
    pub comment_id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub text: String,
    pub created_at: OffsetDateTime,
}

/// Reactions and comments of one post, gathered from their own tables.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub(crate) struct PostChildren {
    pub likes: Vec<i64>,
    pub upvotes: Vec<i64>,
    pub comments: Vec<CommentRecord>,
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.user_id),
            name: UserName::new(value.name)?,
            role: value.role.parse()?,
            department: value.department,
            created_at: value.created_at,
        })
    }
}

impl TryFrom<AuthenticationRecord> for Authentication {
    type Error = ModelValidationError;

    fn try_from(value: AuthenticationRecord) -> Result<Self, Self::Error> {
        let expires_after = value
            .expires_after_seconds
            .map(|seconds| {
                if seconds > 0 {
                    Ok(Duration::seconds(seconds))
                } else {
                    Err(ModelValidationError::NonPositiveLifetime(seconds))
                }
            })
            .transpose()?;

        Ok(Self {
            user: Id::from_db(value.user_id),
            token_hash: value.token_hash.try_into()?,
            created_at: value.created_at,
            expires_after,
        })
    }
}

impl TryFrom<CommentRecord> for Comment {
    type Error = ModelValidationError;

    fn try_from(value: CommentRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.comment_id),
            user: UserRef {
                id: Id::from_db(value.user_id),
                name: UserName::new(value.user_name)?,
            },
            text: value.text,
            created_at: value.created_at,
        })
    }
}

impl PostRecord {
    pub fn into_post(self, children: PostChildren) -> Result<Post, ModelValidationError> {
        let media = match (self.media_kind, self.media_url) {
            (Some(kind), Some(url)) => Some(Media::new(kind.parse::<MediaKind>()?, url)),
            (None, None) => None,
            _ => return Err(ModelValidationError::IncompleteMedia),
        };

        let assigned_to = match (self.assigned_to, self.assignee_name) {
            (Some(id), Some(name)) => Some(AssigneeRef {
                id: Id::from_db(id),
                name: UserName::new(name)?,
                department: self.assignee_department,
            }),
            _ => None,
        };

        let shares = u64::try_from(self.shares)
            .map_err(|_| ModelValidationError::NegativeCounter(self.shares))?;

        Ok(Post {
            id: Id::from_db(self.post_id),
            title: self.title,
            description: self.description,
            category: self.category.parse()?,
            location: Location {
                point: GeoPoint::new(self.longitude, self.latitude)?,
                address: self.address,
            },
            media,
            status: self.status.parse()?,
            author: UserRef {
                id: Id::from_db(self.author_id),
                name: UserName::new(self.author_name)?,
            },
            assigned_to,
            upvotes: children.upvotes.into_iter().map(Id::from_db).collect::<BTreeSet<_>>(),
            likes: children.likes.into_iter().map(Id::from_db).collect(),
            shares,
            comments: children
                .comments
                .into_iter()
                .map(Comment::try_from)
                .collect::<Result<_, _>>()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
