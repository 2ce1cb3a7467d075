use crate::{
    server::{
        Result, ServerError, ServerRouter,
        auth::AuthenticatedUser,
        extract::{Json, Query},
    },
    service::{PostService, media::MediaUpload},
};
use axum::{
    extract::{
        Multipart, State,
        multipart::{Field, MultipartRejection},
    },
    http::StatusCode,
};
use axum_extra::routing::{RouterExt, TypedPath};
use civicfeed_common::model::{
    Id,
    post::{Category, Comment, Post, PostForm, PostMarker, PostUpdate, Status},
    query::{NearQuery, Pagination, PostFilter},
    validation::ValidationError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(list_posts)
        .typed_post(create_post)
        .typed_get(list_own_posts)
        .typed_get(get_post)
        .typed_put(update_post)
        .typed_post(add_comment)
        .typed_post(toggle_like)
        .typed_post(toggle_upvote)
        .typed_post(share_post)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts", rejection(ServerError))]
struct PostsPath();

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
struct ListPostsQuery {
    category: Option<String>,
    status: Option<String>,
    near: Option<String>,
    limit: Option<u32>,
    page: Option<u32>,
}

impl ListPostsQuery {
    fn into_parts(self) -> Result<(PostFilter, Pagination), ValidationError> {
        let category = self
            .category
            .map(|category| category.parse::<Category>())
            .transpose()?;
        let status = self
            .status
            .map(|status| status.parse::<Status>())
            .transpose()?;
        let near = self
            .near
            .map(|near| near.parse::<NearQuery>())
            .transpose()?;
        let pagination = Pagination::new(self.limit, self.page)?;

        Ok((
            PostFilter {
                category,
                status,
                near,
            },
            pagination,
        ))
    }
}

async fn list_posts(
    PostsPath(): PostsPath,
    State(posts): State<Arc<PostService>>,
    Query(query): Query<ListPostsQuery>,
) -> Result<Json<Vec<Post>>> {
    let (filter, pagination) = query.into_parts()?;
    let posts = posts.list(&filter, pagination).await?;

    Ok(Json(posts))
}

async fn create_post(
    PostsPath(): PostsPath,
    State(posts): State<Arc<PostService>>,
    user: AuthenticatedUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Post>)> {
    let (form, upload) = read_post_form(multipart?, posts.max_upload_bytes()).await?;
    let post = posts.create(user.user_id(), form, upload).await?;

    Ok((StatusCode::CREATED, Json(post)))
}

async fn read_post_form(
    mut multipart: Multipart,
    max_upload_bytes: usize,
) -> Result<(PostForm, Option<MediaUpload>)> {
    let mut form = PostForm::default();
    let mut upload = None;

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        let slot = match name.as_str() {
            "media" | "image" | "video" => {
                let Some(file) = read_upload(field, max_upload_bytes).await? else {
                    continue;
                };
                if upload.replace(file).is_some() {
                    return Err(ValidationError::DuplicateMedia.into());
                }
                continue;
            }
            "title" => &mut form.title,
            "description" => &mut form.description,
            "category" => &mut form.category,
            "lat" => &mut form.lat,
            "lng" => &mut form.lng,
            "address" => &mut form.address,
            _ => {
                debug!(field = name, "Ignoring unknown form field");
                continue;
            }
        };
        *slot = Some(field.text().await?);
    }

    Ok((form, upload))
}

/// Reads a file part, `None` for the empty part a form sends without a file.
async fn read_upload(mut field: Field<'_>, max_bytes: usize) -> Result<Option<MediaUpload>> {
    let file_name = field.file_name().map(str::to_owned);
    let content_type = field.content_type().map(str::to_owned);

    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await? {
        if bytes.len() + chunk.len() > max_bytes {
            return Err(ValidationError::MediaTooLarge { limit: max_bytes }.into());
        }
        bytes.extend_from_slice(&chunk);
    }

    if bytes.is_empty() {
        return Ok(None);
    }

    Ok(Some(MediaUpload {
        file_name,
        content_type,
        bytes,
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/user", rejection(ServerError))]
struct OwnPostsPath();

async fn list_own_posts(
    OwnPostsPath(): OwnPostsPath,
    State(posts): State<Arc<PostService>>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Post>>> {
    let posts = posts.list_by_user(user.user_id()).await?;

    Ok(Json(posts))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}", rejection(ServerError))]
struct PostPath {
    id: Id<PostMarker>,
}

async fn get_post(
    PostPath { id }: PostPath,
    State(posts): State<Arc<PostService>>,
) -> Result<Json<Post>> {
    let post = posts.get(id).await?;

    Ok(Json(post))
}

async fn update_post(
    PostPath { id }: PostPath,
    State(posts): State<Arc<PostService>>,
    user: AuthenticatedUser,
    body: Result<Json<PostUpdate>, ServerError>,
) -> Result<Json<Post>> {
    // Permission first, a stranger's payload is never looked at.
    let current = posts.authorize_update(id, user.caller()).await?;
    let Json(update) = body?;
    let post = posts.apply_update(current, user.caller(), update).await?;

    Ok(Json(post))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/comments", rejection(ServerError))]
struct CommentsPath {
    id: Id<PostMarker>,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
struct CommentBody {
    text: Option<String>,
}

async fn add_comment(
    CommentsPath { id }: CommentsPath,
    State(posts): State<Arc<PostService>>,
    user: AuthenticatedUser,
    Json(body): Json<CommentBody>,
) -> Result<Json<Vec<Comment>>> {
    let comments = posts.add_comment(id, user.user_id(), body.text).await?;

    Ok(Json(comments))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/like", rejection(ServerError))]
struct LikePath {
    id: Id<PostMarker>,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
struct LikeResponse {
    likes: u64,
    user_liked: bool,
}

async fn toggle_like(
    LikePath { id }: LikePath,
    State(posts): State<Arc<PostService>>,
    user: AuthenticatedUser,
) -> Result<Json<LikeResponse>> {
    let outcome = posts.toggle_like(id, user.user_id()).await?;

    Ok(Json(LikeResponse {
        likes: outcome.count,
        user_liked: outcome.member,
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/upvote", rejection(ServerError))]
struct UpvotePath {
    id: Id<PostMarker>,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpvoteResponse {
    upvotes: u64,
    has_upvoted: bool,
}

async fn toggle_upvote(
    UpvotePath { id }: UpvotePath,
    State(posts): State<Arc<PostService>>,
    user: AuthenticatedUser,
) -> Result<Json<UpvoteResponse>> {
    let outcome = posts.toggle_upvote(id, user.user_id()).await?;

    Ok(Json(UpvoteResponse {
        upvotes: outcome.count,
        has_upvoted: outcome.member,
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/share", rejection(ServerError))]
struct SharePath {
    id: Id<PostMarker>,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct ShareResponse {
    shares: u64,
}

async fn share_post(
    SharePath { id }: SharePath,
    State(posts): State<Arc<PostService>>,
    _user: AuthenticatedUser,
) -> Result<Json<ShareResponse>> {
    let shares = posts.share(id).await?;

    Ok(Json(ShareResponse { shares }))
}

#[cfg(test)]
mod tests {
    use crate::server::routes::posts::ListPostsQuery;
    use civicfeed_common::model::{
        post::{Category, Status},
        validation::ValidationError,
    };

    #[test]
    fn list_query_parses_filters() {
        let query = ListPostsQuery {
            category: Some("roads".to_owned()),
            status: Some("in_progress".to_owned()),
            near: Some("40.0,-75.0,1000".to_owned()),
            limit: Some(5),
            page: Some(2),
        };

        let (filter, pagination) = query.into_parts().unwrap();
        assert_eq!(filter.category, Some(Category::Roads));
        assert_eq!(filter.status, Some(Status::InProgress));
        assert!((filter.near.unwrap().radius_meters - 1000.0).abs() < f64::EPSILON);
        assert_eq!(pagination.offset(), 5);
    }

    #[test]
    fn list_query_rejects_unknown_variants() {
        let query = ListPostsQuery {
            status: Some("closed".to_owned()),
            ..ListPostsQuery::default()
        };

        assert!(matches!(
            query.into_parts(),
            Err(ValidationError::UnknownVariant(_))
        ));
    }
}
