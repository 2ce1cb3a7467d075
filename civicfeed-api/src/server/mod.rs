use crate::service::{PostService, ServiceError};
use axum::{
    Router,
    extract::{
        DefaultBodyLimit, FromRef, Request,
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::typed_header::TypedHeaderRejection;
use civicfeed_common::model::{
    Id,
    auth::{AuthTokenDecodeError, AuthTokenHashError},
    user::UserMarker,
    validation::ValidationError,
};
use civicfeed_db::{DbError, Store};
use extract::Json;
use serde::Serialize;
use std::{path::PathBuf, sync::Arc};
use thiserror::Error;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::error;

pub mod auth;
pub mod extract;
mod routes;

/// Room for multipart boundaries and the text fields next to the file.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub store: Arc<dyn Store>,
    pub posts: Arc<PostService>,
}

impl ServerState {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, posts: Arc<PostService>) -> Self {
        Self { store, posts }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AppOptions {
    pub api_prefix: String,
    pub upload_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

pub fn app(state: ServerState, options: &AppOptions) -> Router {
    let prefix = options.api_prefix.trim_end_matches('/');
    let mut router = if prefix.is_empty() {
        ServerRouter::new().merge(routes::routes())
    } else {
        ServerRouter::new().nest(prefix, routes::routes())
    };

    router = router.route("/health", get(health));
    if let Some(upload_dir) = &options.upload_dir {
        router = router.nest_service("/uploads", ServeDir::new(upload_dir));
    }

    router
        .fallback(fallback)
        .layer(DefaultBodyLimit::max(
            options
                .max_upload_bytes
                .saturating_add(MULTIPART_OVERHEAD_BYTES),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Query rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("Multipart body rejected: {0}")]
    MultipartRejection(#[from] MultipartRejection),
    #[error("Multipart body could not be read: {0}")]
    Multipart(#[from] MultipartError),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Authorization header was missing or invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error("The provided auth token could not be decoded: {0}")]
    InvalidAuthToken(#[from] AuthTokenDecodeError),
    #[error("The auth token could not be hashed: {0}")]
    AuthTokenHash(#[from] AuthTokenHashError),
    #[error("Provided token was invalid")]
    InvalidToken,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("User with id {0} was not found.")]
    UserByIdNotFound(Id<UserMarker>),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::UserByIdNotFound(_)
            | ServerError::Service(ServiceError::PostNotFound(_)) => StatusCode::NOT_FOUND,
            ServerError::InvalidAuthorizationHeader(_)
            | ServerError::InvalidAuthToken(_)
            | ServerError::InvalidToken => StatusCode::UNAUTHORIZED,
            ServerError::Service(ServiceError::Forbidden { .. }) => StatusCode::FORBIDDEN,
            ServerError::Multipart(err) => err.status(),
            ServerError::QueryRejection(_)
            | ServerError::JsonRejection(_)
            | ServerError::MultipartRejection(_)
            | ServerError::Validation(_)
            | ServerError::Service(ServiceError::Validation(_)) => StatusCode::BAD_REQUEST,
            ServerError::JsonResponse(_)
            | ServerError::Database(_)
            | ServerError::AuthTokenHash(_)
            | ServerError::Service(ServiceError::Store(_) | ServiceError::Media(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Auth failures never echo their cause back to the client.
    fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidAuthorizationHeader(_)
                | ServerError::InvalidAuthToken(_)
                | ServerError::AuthTokenHash(_)
                | ServerError::InvalidToken
        )
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct ErrorResponse {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        error!(error = %self, %status, "Replying with error");

        let error_response = if status.is_server_error() {
            ErrorResponse {
                message: "Internal server error".to_owned(),
                error: (!self.is_auth_failure()).then(|| self.to_string()),
            }
        } else if self.is_auth_failure() {
            ErrorResponse {
                message: status
                    .canonical_reason()
                    .unwrap_or("Unauthorized")
                    .to_owned(),
                error: None,
            }
        } else {
            ErrorResponse {
                message: self.to_string(),
                error: None,
            }
        };
        (status, Json(error_response)).into_response()
    }
}
