use crate::{
    record::{
        AuthenticationRecord, CommentRecord, PostChildren, PostRecord, ReactionRecord, UserRecord,
    },
    store::{Result, Store},
};
use async_trait::async_trait;
use civicfeed_common::{
    geo::{EARTH_RADIUS_METERS, GeoPoint},
    model::{
        CivicFeedSnowflakeGenerator, Id,
        auth::{AuthTokenHash, Authentication},
        post::{
            Comment, CommentMarker, NewPost, Post, PostMarker, PostUpdate, Reaction,
            ToggleOutcome,
        },
        query::{Pagination, PostFilter},
        user::{User, UserMarker},
    },
    snowflake::NodeId,
};
use sqlx::{
    PgPool, Postgres, QueryBuilder, postgres::PgPoolOptions, query, query_as, query_scalar,
};
use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};
use tracing::debug;

const POST_COLUMNS: &str = "
    posts.post_id,
    posts.title,
    posts.description,
    posts.category,
    posts.longitude,
    posts.latitude,
    posts.address,
    posts.media_kind,
    posts.media_url,
    posts.status,
    posts.author_id,
    author.name AS author_name,
    posts.assigned_to,
    assignee.name AS assignee_name,
    assignee.department AS assignee_department,
    posts.shares,
    posts.created_at,
    posts.updated_at";

const POST_SOURCE: &str = "
    FROM
        posts.posts
        JOIN users.users AS author ON author.user_id = posts.author_id
        LEFT JOIN users.users AS assignee ON assignee.user_id = posts.assigned_to";

/// Meters per degree of latitude.
const METERS_PER_DEGREE: f64 = EARTH_RADIUS_METERS * std::f64::consts::PI / 180.0;

pub struct DbClient {
    pool: PgPool,
    snowflake_generator: Mutex<CivicFeedSnowflakeGenerator>,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool, worker_id: NodeId, process_id: NodeId) -> Self {
        let snowflake_generator =
            Mutex::new(CivicFeedSnowflakeGenerator::new(worker_id, process_id));

        Self {
            pool,
            snowflake_generator,
        }
    }

    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        worker_id: NodeId,
        process_id: NodeId,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool, worker_id, process_id))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }

    fn next_id<Marker>(&self) -> Result<Id<Marker>> {
        let snowflake = self
            .snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate()?;
        Ok(snowflake.into())
    }

    async fn post_exists(&self, post_id: Id<PostMarker>) -> Result<bool> {
        let exists = query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM posts.posts WHERE posts.post_id = $1)",
        )
        .bind(post_id.to_db())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn fetch_comments(&self, post_ids: &[i64]) -> Result<Vec<CommentRecord>> {
        let records = query_as::<_, CommentRecord>(
            "
            SELECT
                comments.comment_id,
                comments.post_id,
                comments.user_id,
                users.name AS user_name,
                comments.text,
                comments.created_at
            FROM
                posts.comments
                JOIN users.users ON users.user_id = comments.user_id
            WHERE
                comments.post_id = ANY($1)
            ORDER BY
                comments.created_at,
                comments.comment_id
            ",
        )
        .bind(post_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn fetch_reactions(
        &self,
        reaction: Reaction,
        post_ids: &[i64],
    ) -> Result<Vec<ReactionRecord>> {
        let sql = format!(
            "SELECT post_id, user_id FROM {} WHERE post_id = ANY($1)",
            reaction_table(reaction)
        );
        let records = query_as::<_, ReactionRecord>(&sql)
            .bind(post_ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    /// Joins reactions and comments onto post rows, keeping the row order.
    async fn resolve_posts(&self, records: Vec<PostRecord>) -> Result<Vec<Post>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let post_ids: Vec<i64> = records.iter().map(|record| record.post_id).collect();
        let mut children: HashMap<i64, PostChildren> = HashMap::new();

        for like in self.fetch_reactions(Reaction::Like, &post_ids).await? {
            children.entry(like.post_id).or_default().likes.push(like.user_id);
        }
        for upvote in self.fetch_reactions(Reaction::Upvote, &post_ids).await? {
            children
                .entry(upvote.post_id)
                .or_default()
                .upvotes
                .push(upvote.user_id);
        }
        for comment in self.fetch_comments(&post_ids).await? {
            children
                .entry(comment.post_id)
                .or_default()
                .comments
                .push(comment);
        }

        let posts = records
            .into_iter()
            .map(|record| {
                let post_children = children.remove(&record.post_id).unwrap_or_default();
                record.into_post(post_children)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(posts)
    }
}

fn reaction_table(reaction: Reaction) -> &'static str {
    match reaction {
        Reaction::Like => "posts.likes",
        Reaction::Upvote => "posts.upvotes",
    }
}

/// Pushes the haversine distance in meters between a post and `point`.
fn push_distance(query: &mut QueryBuilder<'_, Postgres>, point: GeoPoint) {
    query
        .push("(2 * ")
        .push(EARTH_RADIUS_METERS)
        .push(" * asin(least(1.0::float8, sqrt(power(sin(radians(posts.latitude - ")
        .push_bind(point.latitude())
        .push(") / 2), 2) + cos(radians(")
        .push_bind(point.latitude())
        .push(")) * cos(radians(posts.latitude)) * power(sin(radians(posts.longitude - ")
        .push_bind(point.longitude())
        .push(") / 2), 2)))))");
}

#[async_trait]
impl Store for DbClient {
    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT
                users.user_id,
                users.name,
                users.role,
                users.department,
                users.created_at
            FROM
                users.users
            WHERE
                users.user_id = $1
            ",
        )
        .bind(user_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    async fn fetch_auth(&self, token_hash: &AuthTokenHash) -> Result<Option<Authentication>> {
        let record = query_as::<_, AuthenticationRecord>(
            "
            SELECT
                sessions.user_id,
                sessions.token_hash,
                sessions.created_at,
                sessions.expires_after_seconds
            FROM
                users.sessions
            WHERE
                sessions.token_hash = $1
            ",
        )
        .bind(&token_hash.0[..])
        .fetch_optional(&self.pool)
        .await?;

        let authentication = record.map(Authentication::try_from).transpose()?;
        Ok(authentication)
    }

    async fn list_posts(&self, filter: &PostFilter, pagination: Pagination) -> Result<Vec<Post>> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT ");
        query.push(POST_COLUMNS);
        if let Some(near) = filter.near {
            query.push(", ");
            push_distance(&mut query, near.point);
            query.push(" AS distance_meters");
        }
        query.push(POST_SOURCE);
        query.push(" WHERE TRUE");

        if let Some(category) = filter.category {
            query.push(" AND posts.category = ").push_bind(category.as_str());
        }
        if let Some(status) = filter.status {
            query.push(" AND posts.status = ").push_bind(status.as_str());
        }

        if let Some(near) = filter.near {
            // Latitude band, then exact distance.
            let band = near.radius_meters / METERS_PER_DEGREE;
            query
                .push(" AND posts.latitude BETWEEN ")
                .push_bind(near.point.latitude() - band)
                .push(" AND ")
                .push_bind(near.point.latitude() + band);
            query.push(" AND ");
            push_distance(&mut query, near.point);
            query
                .push(" <= ")
                .push_bind(near.radius_meters)
                .push(" ORDER BY distance_meters, posts.post_id DESC");
        } else {
            query.push(" ORDER BY posts.created_at DESC, posts.post_id DESC");
        }

        query
            .push(" LIMIT ")
            .push_bind(i64::from(pagination.limit()))
            .push(" OFFSET ")
            .push_bind(pagination.offset().cast_signed());

        let records = query
            .build_query_as::<PostRecord>()
            .fetch_all(&self.pool)
            .await?;
        debug!(count = records.len(), "Listed posts");

        self.resolve_posts(records).await
    }

    async fn fetch_user_posts(&self, user_id: Id<UserMarker>) -> Result<Vec<Post>> {
        let sql = format!(
            "SELECT {POST_COLUMNS} {POST_SOURCE}
            WHERE posts.author_id = $1
            ORDER BY posts.created_at DESC, posts.post_id DESC"
        );
        let records = query_as::<_, PostRecord>(&sql)
            .bind(user_id.to_db())
            .fetch_all(&self.pool)
            .await?;

        self.resolve_posts(records).await
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} {POST_SOURCE} WHERE posts.post_id = $1");
        let record = query_as::<_, PostRecord>(&sql)
            .bind(post_id.to_db())
            .fetch_optional(&self.pool)
            .await?;

        let Some(record) = record else {
            return Ok(None);
        };
        let mut posts = self.resolve_posts(vec![record]).await?;
        Ok(posts.pop())
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post> {
        let post_id = self.next_id::<PostMarker>()?;
        let content = &post.content;

        query(
            "
            INSERT INTO posts.posts (
                post_id, title, description, category, longitude, latitude, address,
                media_kind, media_url, author_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(post_id.to_db())
        .bind(&content.title)
        .bind(&content.description)
        .bind(content.category.as_str())
        .bind(content.location.point.longitude())
        .bind(content.location.point.latitude())
        .bind(content.location.address.as_deref())
        .bind(post.media.as_ref().map(|media| media.kind().as_str()))
        .bind(post.media.as_ref().map(|media| media.url().to_owned()))
        .bind(post.author.to_db())
        .execute(&self.pool)
        .await?;

        let created = self
            .fetch_post(post_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        Ok(created)
    }

    async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        update: &PostUpdate,
    ) -> Result<Option<Post>> {
        let updated = query_scalar::<_, i64>(
            "
            UPDATE posts.posts
            SET
                status = COALESCE($2, posts.status),
                assigned_to = COALESCE($3, posts.assigned_to),
                updated_at = now()
            WHERE
                posts.post_id = $1
            RETURNING posts.post_id
            ",
        )
        .bind(post_id.to_db())
        .bind(update.status.map(|status| status.as_str()))
        .bind(update.assigned_to.map(Id::to_db))
        .fetch_optional(&self.pool)
        .await?;

        if updated.is_none() {
            return Ok(None);
        }
        self.fetch_post(post_id).await
    }

    async fn append_comment(
        &self,
        post_id: Id<PostMarker>,
        user_id: Id<UserMarker>,
        text: &str,
    ) -> Result<Option<Vec<Comment>>> {
        let comment_id = self.next_id::<CommentMarker>()?;

        let inserted = query(
            "
            WITH touched AS (
                UPDATE posts.posts SET updated_at = now()
                WHERE posts.post_id = $2
                RETURNING posts.post_id
            )
            INSERT INTO posts.comments (comment_id, post_id, user_id, text)
            SELECT $1, touched.post_id, $3, $4 FROM touched
            ",
        )
        .bind(comment_id.to_db())
        .bind(post_id.to_db())
        .bind(user_id.to_db())
        .bind(text)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Ok(None);
        }

        let comments = self
            .fetch_comments(&[post_id.to_db()])
            .await?
            .into_iter()
            .map(Comment::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(comments))
    }

    async fn toggle_reaction(
        &self,
        post_id: Id<PostMarker>,
        reaction: Reaction,
        user_id: Id<UserMarker>,
    ) -> Result<Option<ToggleOutcome>> {
        if !self.post_exists(post_id).await? {
            return Ok(None);
        }

        let table = reaction_table(reaction);
        let mut transaction = self.pool.begin().await?;

        let delete = format!("DELETE FROM {table} WHERE post_id = $1 AND user_id = $2");
        let removed = query(&delete)
            .bind(post_id.to_db())
            .bind(user_id.to_db())
            .execute(&mut *transaction)
            .await?
            .rows_affected()
            > 0;

        if !removed {
            let insert = format!(
                "INSERT INTO {table} (post_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING"
            );
            query(&insert)
                .bind(post_id.to_db())
                .bind(user_id.to_db())
                .execute(&mut *transaction)
                .await?;
        }

        let count_sql = format!("SELECT count(*) FROM {table} WHERE post_id = $1");
        let count = query_scalar::<_, i64>(&count_sql)
            .bind(post_id.to_db())
            .fetch_one(&mut *transaction)
            .await?;

        transaction.commit().await?;

        Ok(Some(ToggleOutcome {
            count: count.cast_unsigned(),
            member: !removed,
        }))
    }

    async fn increment_shares(&self, post_id: Id<PostMarker>) -> Result<Option<u64>> {
        let shares = query_scalar::<_, i64>(
            "
            UPDATE posts.posts
            SET shares = posts.shares + 1, updated_at = now()
            WHERE posts.post_id = $1
            RETURNING posts.shares
            ",
        )
        .bind(post_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        Ok(shares.map(i64::cast_unsigned))
    }
}
