//! A [`Store`] kept entirely in process memory.
//!
//! Posts are stored with bare user ids, exactly like the database rows, and
//! resolved against the user table on every read.

use crate::store::{DbError, Result, Store};
use async_trait::async_trait;
use civicfeed_common::{
    model::{
        CivicFeedSnowflakeGenerator, Id,
        auth::{AuthTokenHash, Authentication},
        post::{
            Comment, CommentMarker, Media, NewPost, Post, PostContent, PostMarker, PostUpdate,
            Reaction, Status, ToggleOutcome,
        },
        query::{Pagination, PostFilter},
        user::{AssigneeRef, CreateUser, User, UserMarker, UserRef},
    },
    snowflake::NodeId,
};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
};
use time::OffsetDateTime;

#[derive(Clone, Debug)]
struct StoredComment {
    id: Id<CommentMarker>,
    user: Id<UserMarker>,
    text: String,
    created_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
struct StoredPost {
    id: Id<PostMarker>,
    content: PostContent,
    media: Option<Media>,
    status: Status,
    author: Id<UserMarker>,
    assigned_to: Option<Id<UserMarker>>,
    upvotes: BTreeSet<Id<UserMarker>>,
    likes: BTreeSet<Id<UserMarker>>,
    shares: u64,
    comments: Vec<StoredComment>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Id<UserMarker>, User>,
    sessions: HashMap<AuthTokenHash, Authentication>,
    posts: BTreeMap<Id<PostMarker>, StoredPost>,
}

impl Tables {
    fn user(&self, user_id: Id<UserMarker>) -> Result<&User> {
        self.users.get(&user_id).ok_or(DbError::MissingUser(user_id))
    }

    fn resolve_comment(&self, comment: &StoredComment) -> Result<Comment> {
        Ok(Comment {
            id: comment.id,
            user: UserRef::from(self.user(comment.user)?),
            text: comment.text.clone(),
            created_at: comment.created_at,
        })
    }

    fn resolve(&self, post: &StoredPost) -> Result<Post> {
        let assigned_to = post
            .assigned_to
            .map(|assignee| self.user(assignee).map(AssigneeRef::from))
            .transpose()?;
        let comments = post
            .comments
            .iter()
            .map(|comment| self.resolve_comment(comment))
            .collect::<Result<Vec<_>>>()?;

        Ok(Post {
            id: post.id,
            title: post.content.title.clone(),
            description: post.content.description.clone(),
            category: post.content.category,
            location: post.content.location.clone(),
            media: post.media.clone(),
            status: post.status,
            author: UserRef::from(self.user(post.author)?),
            assigned_to,
            upvotes: post.upvotes.clone(),
            likes: post.likes.clone(),
            shares: post.shares,
            comments,
            created_at: post.created_at,
            updated_at: post.updated_at,
        })
    }
}

fn newest_first(a: &StoredPost, b: &StoredPost) -> Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

pub struct MemoryStore {
    tables: Mutex<Tables>,
    snowflake_generator: Mutex<CivicFeedSnowflakeGenerator>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(NodeId::default(), NodeId::default())
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new(worker_id: NodeId, process_id: NodeId) -> Self {
        Self {
            tables: Mutex::default(),
            snowflake_generator: Mutex::new(CivicFeedSnowflakeGenerator::new(
                worker_id, process_id,
            )),
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id<Marker>(&self) -> Result<Id<Marker>> {
        let snowflake = self
            .snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate()?;
        Ok(snowflake.into())
    }

    /// Seeds a user. Users and sessions are provisioned outside the api.
    pub fn create_user(&self, user: &CreateUser) -> Result<User> {
        let user = User {
            id: self.next_id()?,
            name: user.name.clone(),
            role: user.role,
            department: user.department.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.tables().users.insert(user.id, user.clone());
        Ok(user)
    }

    pub fn create_auth(&self, authentication: &Authentication) -> Result<()> {
        let mut tables = self.tables();
        tables.user(authentication.user)?;
        tables
            .sessions
            .insert(authentication.token_hash.clone(), authentication.clone());
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        Ok(self.tables().users.get(&user_id).cloned())
    }

    async fn fetch_auth(&self, token_hash: &AuthTokenHash) -> Result<Option<Authentication>> {
        Ok(self.tables().sessions.get(token_hash).cloned())
    }

    async fn list_posts(&self, filter: &PostFilter, pagination: Pagination) -> Result<Vec<Post>> {
        let tables = self.tables();

        let mut matching: Vec<(&StoredPost, f64)> = tables
            .posts
            .values()
            .filter(|post| filter.category.is_none_or(|category| post.content.category == category))
            .filter(|post| filter.status.is_none_or(|status| post.status == status))
            .filter_map(|post| match filter.near {
                Some(near) => {
                    let point = post.content.location.point;
                    near.contains(point)
                        .then(|| (post, near.point.distance_meters(point)))
                }
                None => Some((post, 0.0)),
            })
            .collect();

        if filter.near.is_some() {
            matching.sort_by(|(a, a_distance), (b, b_distance)| {
                a_distance.total_cmp(b_distance).then(b.id.cmp(&a.id))
            });
        } else {
            matching.sort_by(|(a, _), (b, _)| newest_first(a, b));
        }

        let offset = usize::try_from(pagination.offset()).unwrap_or(usize::MAX);
        matching
            .into_iter()
            .skip(offset)
            .take(pagination.limit() as usize)
            .map(|(post, _)| tables.resolve(post))
            .collect()
    }

    async fn fetch_user_posts(&self, user_id: Id<UserMarker>) -> Result<Vec<Post>> {
        let tables = self.tables();

        let mut posts: Vec<&StoredPost> = tables
            .posts
            .values()
            .filter(|post| post.author == user_id)
            .collect();
        posts.sort_by(|a, b| newest_first(a, b));

        posts.into_iter().map(|post| tables.resolve(post)).collect()
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let tables = self.tables();
        tables
            .posts
            .get(&post_id)
            .map(|post| tables.resolve(post))
            .transpose()
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post> {
        let post_id = self.next_id()?;
        let now = OffsetDateTime::now_utc();

        let mut tables = self.tables();
        tables.user(post.author)?;

        let stored = StoredPost {
            id: post_id,
            content: post.content.clone(),
            media: post.media.clone(),
            status: Status::Reported,
            author: post.author,
            assigned_to: None,
            upvotes: BTreeSet::new(),
            likes: BTreeSet::new(),
            shares: 0,
            comments: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let created = tables.resolve(&stored)?;
        tables.posts.insert(post_id, stored);

        Ok(created)
    }

    async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        update: &PostUpdate,
    ) -> Result<Option<Post>> {
        let mut tables = self.tables();
        if let Some(assignee) = update.assigned_to {
            tables.user(assignee)?;
        }

        let Some(post) = tables.posts.get_mut(&post_id) else {
            return Ok(None);
        };
        if let Some(status) = update.status {
            post.status = status;
        }
        if let Some(assignee) = update.assigned_to {
            post.assigned_to = Some(assignee);
        }
        post.updated_at = OffsetDateTime::now_utc();

        let post = post.clone();
        tables.resolve(&post).map(Some)
    }

    async fn append_comment(
        &self,
        post_id: Id<PostMarker>,
        user_id: Id<UserMarker>,
        text: &str,
    ) -> Result<Option<Vec<Comment>>> {
        let comment_id = self.next_id()?;
        let now = OffsetDateTime::now_utc();

        let mut tables = self.tables();
        tables.user(user_id)?;

        let Some(post) = tables.posts.get_mut(&post_id) else {
            return Ok(None);
        };
        post.comments.push(StoredComment {
            id: comment_id,
            user: user_id,
            text: text.to_owned(),
            created_at: now,
        });
        post.updated_at = now;

        let comments = post.comments.clone();
        comments
            .iter()
            .map(|comment| tables.resolve_comment(comment))
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    async fn toggle_reaction(
        &self,
        post_id: Id<PostMarker>,
        reaction: Reaction,
        user_id: Id<UserMarker>,
    ) -> Result<Option<ToggleOutcome>> {
        let mut tables = self.tables();
        let Some(post) = tables.posts.get_mut(&post_id) else {
            return Ok(None);
        };

        let members = match reaction {
            Reaction::Like => &mut post.likes,
            Reaction::Upvote => &mut post.upvotes,
        };
        let member = if members.remove(&user_id) {
            false
        } else {
            members.insert(user_id);
            true
        };

        Ok(Some(ToggleOutcome {
            count: members.len() as u64,
            member,
        }))
    }

    async fn increment_shares(&self, post_id: Id<PostMarker>) -> Result<Option<u64>> {
        let mut tables = self.tables();
        Ok(tables.posts.get_mut(&post_id).map(|post| {
            post.shares += 1;
            post.updated_at = OffsetDateTime::now_utc();
            post.shares
        }))
    }
}
