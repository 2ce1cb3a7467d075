use async_trait::async_trait;
use civicfeed_common::{
    model::{
        Id, ModelValidationError,
        auth::{AuthTokenHash, Authentication},
        post::{Comment, NewPost, Post, PostMarker, PostUpdate, Reaction, ToggleOutcome},
        query::{Pagination, PostFilter},
        user::{User, UserMarker},
    },
    snowflake::SnowflakeError,
};
use thiserror::Error;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("Could not generate an id: {0}")]
    Snowflake(#[from] SnowflakeError),
    #[error("Referenced user {0} does not exist")]
    MissingUser(Id<UserMarker>),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Persistence for users, sessions and posts.
///
/// Post reads return fully resolved posts: author, assignee and comment authors
/// carry their names. Operations addressing a single post return `None` when
/// the post does not exist.
#[async_trait]
pub trait Store: Send + Sync {
    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>>;

    async fn fetch_auth(&self, token_hash: &AuthTokenHash) -> Result<Option<Authentication>>;

    /// Newest first, or nearest first when filtering by proximity.
    async fn list_posts(&self, filter: &PostFilter, pagination: Pagination) -> Result<Vec<Post>>;

    /// All posts by `user_id`, newest first.
    async fn fetch_user_posts(&self, user_id: Id<UserMarker>) -> Result<Vec<Post>>;

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>>;

    async fn create_post(&self, post: &NewPost) -> Result<Post>;

    async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        update: &PostUpdate,
    ) -> Result<Option<Post>>;

    /// Appends a comment and returns the post's full comment list.
    async fn append_comment(
        &self,
        post_id: Id<PostMarker>,
        user_id: Id<UserMarker>,
        text: &str,
    ) -> Result<Option<Vec<Comment>>>;

    async fn toggle_reaction(
        &self,
        post_id: Id<PostMarker>,
        reaction: Reaction,
        user_id: Id<UserMarker>,
    ) -> Result<Option<ToggleOutcome>>;

    async fn increment_shares(&self, post_id: Id<PostMarker>) -> Result<Option<u64>>;
}
