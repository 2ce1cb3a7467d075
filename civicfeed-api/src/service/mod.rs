//! The post resource service.
//!
//! Transport independent: callers hand in already authenticated [`Caller`]s and
//! parsed input, the service validates, authorizes and talks to its
//! collaborators.

pub mod media;
pub mod notify;

use crate::service::{
    media::{MediaError, MediaStore, MediaUpload},
    notify::{StatusEvent, StatusNotifier},
};
use civicfeed_common::model::{
    Id,
    post::{
        COMMENT_MAX_LEN, Comment, NewPost, Post, PostForm, PostMarker, PostUpdate, Reaction,
        ToggleOutcome, required_text,
    },
    query::{Pagination, PostFilter},
    user::{Caller, UserMarker},
    validation::ValidationError,
};
use civicfeed_db::{DbError, Store};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Post with id {0} was not found.")]
    PostNotFound(Id<PostMarker>),
    #[error("User {user} may not modify post {post}.")]
    Forbidden {
        user: Id<UserMarker>,
        post: Id<PostMarker>,
    },
    #[error(transparent)]
    Store(#[from] DbError),
    #[error(transparent)]
    Media(#[from] MediaError),
}

pub struct PostService {
    store: Arc<dyn Store>,
    media: Arc<dyn MediaStore>,
    notifier: Arc<dyn StatusNotifier>,
    max_upload_bytes: usize,
}

impl PostService {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        media: Arc<dyn MediaStore>,
        notifier: Arc<dyn StatusNotifier>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            store,
            media,
            notifier,
            max_upload_bytes,
        }
    }

    #[must_use]
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub async fn list(&self, filter: &PostFilter, pagination: Pagination) -> Result<Vec<Post>> {
        Ok(self.store.list_posts(filter, pagination).await?)
    }

    pub async fn list_by_user(&self, user_id: Id<UserMarker>) -> Result<Vec<Post>> {
        Ok(self.store.fetch_user_posts(user_id).await?)
    }

    pub async fn get(&self, post_id: Id<PostMarker>) -> Result<Post> {
        self.store
            .fetch_post(post_id)
            .await?
            .ok_or(ServiceError::PostNotFound(post_id))
    }

    /// Validates the form before the upload is stored, so a rejected form
    /// never leaves a file behind.
    pub async fn create(
        &self,
        author: Id<UserMarker>,
        form: PostForm,
        upload: Option<MediaUpload>,
    ) -> Result<Post> {
        let content = form.validate()?;
        let accepted = upload
            .map(|upload| upload.accept(self.max_upload_bytes))
            .transpose()?;

        let media = match accepted {
            Some(accepted) => Some(self.media.store(accepted).await?),
            None => None,
        };

        let post = self
            .store
            .create_post(&NewPost {
                author,
                content,
                media,
            })
            .await?;

        info!(post_id = %post.id, %author, category = %post.category, "Created post");
        Ok(post)
    }

    /// Loads a post and checks that `caller` may change it.
    pub async fn authorize_update(
        &self,
        post_id: Id<PostMarker>,
        caller: Caller,
    ) -> Result<Post> {
        let current = self.get(post_id).await?;
        if !caller.may_manage(current.author.id) {
            return Err(ServiceError::Forbidden {
                user: caller.id,
                post: post_id,
            });
        }

        Ok(current)
    }

    /// Applies `update` to a post returned by [`Self::authorize_update`].
    pub async fn apply_update(
        &self,
        current: Post,
        caller: Caller,
        update: PostUpdate,
    ) -> Result<Post> {
        let post_id = current.id;

        if let Some(assignee) = update.assigned_to
            && self.store.fetch_user(assignee).await?.is_none()
        {
            return Err(ValidationError::UnknownAssignee(assignee).into());
        }

        if update.is_empty() {
            return Ok(current);
        }

        let updated = self
            .store
            .update_post(post_id, &update)
            .await?
            .ok_or(ServiceError::PostNotFound(post_id))?;

        if updated.status != current.status {
            info!(%post_id, from = %current.status, to = %updated.status, "Post status changed");
            self.notifier
                .publish(StatusEvent::new(post_id, updated.status, caller.id));
        }

        Ok(updated)
    }

    pub async fn add_comment(
        &self,
        post_id: Id<PostMarker>,
        user_id: Id<UserMarker>,
        text: Option<String>,
    ) -> Result<Vec<Comment>> {
        let text = required_text("text", text, COMMENT_MAX_LEN)?;

        let comments = self
            .store
            .append_comment(post_id, user_id, &text)
            .await?
            .ok_or(ServiceError::PostNotFound(post_id))?;

        debug!(%post_id, %user_id, count = comments.len(), "Added comment");
        Ok(comments)
    }

    pub async fn toggle_like(
        &self,
        post_id: Id<PostMarker>,
        user_id: Id<UserMarker>,
    ) -> Result<ToggleOutcome> {
        self.toggle(post_id, Reaction::Like, user_id).await
    }

    pub async fn toggle_upvote(
        &self,
        post_id: Id<PostMarker>,
        user_id: Id<UserMarker>,
    ) -> Result<ToggleOutcome> {
        self.toggle(post_id, Reaction::Upvote, user_id).await
    }

    async fn toggle(
        &self,
        post_id: Id<PostMarker>,
        reaction: Reaction,
        user_id: Id<UserMarker>,
    ) -> Result<ToggleOutcome> {
        let outcome = self
            .store
            .toggle_reaction(post_id, reaction, user_id)
            .await?
            .ok_or(ServiceError::PostNotFound(post_id))?;

        debug!(%post_id, %user_id, ?reaction, member = outcome.member, "Toggled reaction");
        Ok(outcome)
    }

    pub async fn share(&self, post_id: Id<PostMarker>) -> Result<u64> {
        self.store
            .increment_shares(post_id)
            .await?
            .ok_or(ServiceError::PostNotFound(post_id))
    }
}

#[cfg(test)]
mod tests {
    use crate::service::{
        PostService, ServiceError,
        media::{AcceptedUpload, MediaError, MediaStore, MediaUpload},
        notify::{BroadcastNotifier, STATUS_UPDATE_EVENT},
    };
    use async_trait::async_trait;
    use civicfeed_common::model::{
        Id,
        post::{Category, Media, MediaKind, Post, PostForm, PostMarker, PostUpdate, Status},
        query::{Pagination, PostFilter},
        user::{Caller, CreateUser, Role, User, UserName},
        validation::ValidationError,
    };
    use civicfeed_db::memory::MemoryStore;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingMediaStore {
        stored: Mutex<Vec<MediaKind>>,
    }

    #[async_trait]
    impl MediaStore for RecordingMediaStore {
        async fn store(&self, upload: AcceptedUpload) -> Result<Media, MediaError> {
            let mut stored = self.stored.lock().unwrap();
            stored.push(upload.kind);
            Ok(Media::new(
                upload.kind,
                format!("https://media.test/{}.{}", stored.len(), upload.extension),
            ))
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        media: Arc<RecordingMediaStore>,
        notifier: Arc<BroadcastNotifier>,
        service: PostService,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::default());
            let media = Arc::new(RecordingMediaStore::default());
            let notifier = Arc::new(BroadcastNotifier::new(8));
            let service = PostService::new(store.clone(), media.clone(), notifier.clone(), 1024);
            Self {
                store,
                media,
                notifier,
                service,
            }
        }

        fn user(&self, name: &str, role: Role) -> Caller {
            let user: User = self
                .store
                .create_user(&CreateUser {
                    name: UserName::new(name.to_owned()).unwrap(),
                    role,
                    department: None,
                })
                .unwrap();
            Caller {
                id: user.id,
                role: user.role,
            }
        }

        async fn update(
            &self,
            post_id: Id<PostMarker>,
            caller: Caller,
            update: PostUpdate,
        ) -> Result<Post, ServiceError> {
            let current = self.service.authorize_update(post_id, caller).await?;
            self.service.apply_update(current, caller, update).await
        }
    }

    fn form(lat: &str, lng: &str) -> PostForm {
        PostForm {
            title: Some("Overflowing bin".to_owned()),
            description: Some("Corner of 5th and Pine".to_owned()),
            category: Some("sanitation".to_owned()),
            lat: Some(lat.to_owned()),
            lng: Some(lng.to_owned()),
            address: Some("5th & Pine".to_owned()),
        }
    }

    #[tokio::test]
    async fn created_posts_are_reported_by_their_author() {
        let fixture = Fixture::new();
        let author = fixture.user("Ada", Role::Citizen);

        let post = fixture
            .service
            .create(author.id, form("40.0", "-75.0"), None)
            .await
            .unwrap();

        assert_eq!(post.status, Status::Reported);
        assert_eq!(post.author.id, author.id);
        assert_eq!(post.author.name.get(), "Ada");
        assert_eq!(post.category, Category::Sanitation);
        assert_eq!(post.media, None);
        assert_eq!(post.location.address.as_deref(), Some("5th & Pine"));
    }

    #[tokio::test]
    async fn uploads_become_exactly_one_media_url() {
        let fixture = Fixture::new();
        let author = fixture.user("Ada", Role::Citizen);

        let upload = MediaUpload {
            file_name: Some("clip.mp4".to_owned()),
            content_type: Some("video/mp4".to_owned()),
            bytes: vec![0; 16],
        };
        let post = fixture
            .service
            .create(author.id, form("40.0", "-75.0"), Some(upload))
            .await
            .unwrap();

        assert_eq!(
            post.media,
            Some(Media::Video("https://media.test/1.mp4".to_owned()))
        );
    }

    #[tokio::test]
    async fn invalid_forms_store_no_media() {
        let fixture = Fixture::new();
        let author = fixture.user("Ada", Role::Citizen);

        let upload = MediaUpload {
            file_name: Some("photo.png".to_owned()),
            content_type: Some("image/png".to_owned()),
            bytes: vec![0; 16],
        };
        let bad_form = PostForm {
            title: None,
            ..form("40.0", "-75.0")
        };
        let err = fixture
            .service
            .create(author.id, bad_form, Some(upload))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Validation(ValidationError::MissingField("title"))
        ));
        assert!(fixture.media.stored.lock().unwrap().is_empty());

        let too_big = MediaUpload {
            file_name: Some("photo.png".to_owned()),
            content_type: None,
            bytes: vec![0; 2048],
        };
        let err = fixture
            .service
            .create(author.id, form("40.0", "-75.0"), Some(too_big))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Validation(ValidationError::MediaTooLarge { limit: 1024 })
        ));
    }

    #[tokio::test]
    async fn strangers_may_not_update_regardless_of_payload() {
        let fixture = Fixture::new();
        let author = fixture.user("Ada", Role::Citizen);
        let stranger = fixture.user("Eve", Role::Citizen);
        let post = fixture
            .service
            .create(author.id, form("40.0", "-75.0"), None)
            .await
            .unwrap();

        for update in [
            PostUpdate::default(),
            PostUpdate {
                status: Some(Status::Resolved),
                assigned_to: None,
            },
            PostUpdate {
                status: None,
                assigned_to: Some(Id::from(12_345_u64)),
            },
        ] {
            let err = fixture.update(post.id, stranger, update).await.unwrap_err();
            assert!(matches!(err, ServiceError::Forbidden { .. }), "{err:?}");
        }
    }

    #[tokio::test]
    async fn authors_and_municipal_staff_may_update() {
        let fixture = Fixture::new();
        let author = fixture.user("Ada", Role::Citizen);
        let clerk = fixture.user("Grace", Role::Municipal);
        let post = fixture
            .service
            .create(author.id, form("40.0", "-75.0"), None)
            .await
            .unwrap();
        let mut events = fixture.notifier.subscribe();

        let assigned = fixture
            .update(
                post.id,
                clerk,
                PostUpdate {
                    status: None,
                    assigned_to: Some(clerk.id),
                },
            )
            .await
            .unwrap();
        assert_eq!(assigned.status, Status::Reported);
        assert_eq!(assigned.assigned_to.unwrap().id, clerk.id);

        let resolved = fixture
            .update(
                post.id,
                author,
                PostUpdate {
                    status: Some(Status::Resolved),
                    assigned_to: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(resolved.status, Status::Resolved);
        assert_eq!(resolved.assigned_to.unwrap().id, clerk.id);

        let event = events.try_recv().unwrap();
        assert_eq!(event.event, STATUS_UPDATE_EVENT);
        assert_eq!(event.post_id, post.id);
        assert_eq!(event.status, Status::Resolved);
        assert_eq!(event.updated_by, author.id);
        assert!(events.try_recv().is_err());

        // Going backwards is allowed.
        let reopened = fixture
            .update(
                post.id,
                clerk,
                PostUpdate {
                    status: Some(Status::Reported),
                    assigned_to: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(reopened.status, Status::Reported);
    }

    #[tokio::test]
    async fn unknown_assignees_and_posts_are_rejected() {
        let fixture = Fixture::new();
        let clerk = fixture.user("Grace", Role::Municipal);
        let post = fixture
            .service
            .create(clerk.id, form("40.0", "-75.0"), None)
            .await
            .unwrap();

        let err = fixture
            .update(
                post.id,
                clerk,
                PostUpdate {
                    status: None,
                    assigned_to: Some(Id::from(404_u64)),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Validation(ValidationError::UnknownAssignee(_))
        ));

        let missing = Id::from(1_u64);
        assert!(matches!(
            fixture.update(missing, clerk, PostUpdate::default()).await,
            Err(ServiceError::PostNotFound(id)) if id == missing
        ));
        assert!(matches!(
            fixture.service.get(missing).await,
            Err(ServiceError::PostNotFound(_))
        ));
    }

    #[tokio::test]
    async fn comments_append_in_order() {
        let fixture = Fixture::new();
        let author = fixture.user("Ada", Role::Citizen);
        let neighbour = fixture.user("Bob", Role::Citizen);
        let post = fixture
            .service
            .create(author.id, form("40.0", "-75.0"), None)
            .await
            .unwrap();

        fixture
            .service
            .add_comment(post.id, author.id, Some("first".to_owned()))
            .await
            .unwrap();
        let comments = fixture
            .service
            .add_comment(post.id, neighbour.id, Some("  second ".to_owned()))
            .await
            .unwrap();

        let texts: Vec<_> = comments.iter().map(|comment| comment.text.as_str()).collect();
        assert_eq!(texts, ["first", "second"]);
        assert_eq!(comments[1].user.name.get(), "Bob");

        assert!(matches!(
            fixture
                .service
                .add_comment(post.id, author.id, Some("   ".to_owned()))
                .await,
            Err(ServiceError::Validation(ValidationError::BlankField("text")))
        ));
        assert!(matches!(
            fixture
                .service
                .add_comment(Id::from(3_u64), author.id, Some("hi".to_owned()))
                .await,
            Err(ServiceError::PostNotFound(_))
        ));
    }

    #[tokio::test]
    async fn toggles_flip_membership_and_count_distinct_users() {
        let fixture = Fixture::new();
        let author = fixture.user("Ada", Role::Citizen);
        let post = fixture
            .service
            .create(author.id, form("40.0", "-75.0"), None)
            .await
            .unwrap();

        let on = fixture.service.toggle_like(post.id, author.id).await.unwrap();
        let off = fixture.service.toggle_like(post.id, author.id).await.unwrap();
        assert!(on.member && on.count == 1);
        assert!(!off.member && off.count == 0);

        let mut last = None;
        for name in ["a", "b", "c", "d"] {
            let user = fixture.user(name, Role::Citizen);
            last = Some(fixture.service.toggle_upvote(post.id, user.id).await.unwrap());
        }
        assert_eq!(last.unwrap().count, 4);
    }

    #[tokio::test]
    async fn shares_count_up() {
        let fixture = Fixture::new();
        let author = fixture.user("Ada", Role::Citizen);
        let post = fixture
            .service
            .create(author.id, form("40.0", "-75.0"), None)
            .await
            .unwrap();

        assert_eq!(fixture.service.share(post.id).await.unwrap(), 1);
        assert_eq!(fixture.service.share(post.id).await.unwrap(), 2);
        assert_eq!(fixture.service.get(post.id).await.unwrap().shares, 2);
    }

    #[tokio::test]
    async fn near_scenario() {
        let fixture = Fixture::new();
        let author = fixture.user("Ada", Role::Citizen);
        let roads = PostForm {
            category: Some("roads".to_owned()),
            ..form("40.0", "-75.0")
        };
        let post = fixture.service.create(author.id, roads, None).await.unwrap();

        let near_here = PostFilter {
            near: Some("40.0,-75.0,1000".parse().unwrap()),
            ..PostFilter::default()
        };
        let found = fixture
            .service
            .list(&near_here, Pagination::default())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, post.id);

        let far_away = PostFilter {
            near: Some("41.0,-75.0,1000".parse().unwrap()),
            ..PostFilter::default()
        };
        assert!(
            fixture
                .service
                .list(&far_away, Pagination::default())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn lists_own_posts_only() {
        let fixture = Fixture::new();
        let ada = fixture.user("Ada", Role::Citizen);
        let bob = fixture.user("Bob", Role::Citizen);

        let first = fixture
            .service
            .create(ada.id, form("1.0", "1.0"), None)
            .await
            .unwrap();
        fixture
            .service
            .create(bob.id, form("1.0", "1.0"), None)
            .await
            .unwrap();
        let second = fixture
            .service
            .create(ada.id, form("1.0", "1.0"), None)
            .await
            .unwrap();

        let own: Vec<_> = fixture
            .service
            .list_by_user(ada.id)
            .await
            .unwrap()
            .into_iter()
            .map(|post| post.id)
            .collect();
        assert_eq!(own, [second.id, first.id]);
    }
}
