//! Uploaded photos and videos.

use async_trait::async_trait;
use civicfeed_common::model::{
    post::{Media, MediaKind},
    validation::ValidationError,
};
use std::{io, path::PathBuf};
use thiserror::Error;
use tracing::debug;

/// Accepted file extensions and the kind of media each one holds.
pub const ALLOWED_EXTENSIONS: [(&str, MediaKind); 7] = [
    ("jpeg", MediaKind::Image),
    ("jpg", MediaKind::Image),
    ("png", MediaKind::Image),
    ("gif", MediaKind::Image),
    ("mp4", MediaKind::Video),
    ("mov", MediaKind::Video),
    ("avi", MediaKind::Video),
];

fn allowed_extension(extension: &str) -> Option<(&'static str, MediaKind)> {
    ALLOWED_EXTENSIONS
        .iter()
        .copied()
        .find(|(allowed, _)| allowed.eq_ignore_ascii_case(extension))
}

/// A file part as received, before any checks.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct MediaUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// An upload that passed type and size checks.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct AcceptedUpload {
    pub kind: MediaKind,
    pub extension: &'static str,
    pub bytes: Vec<u8>,
}

impl MediaUpload {
    fn extension(&self) -> Option<&str> {
        self.file_name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, extension)| extension)
            .filter(|extension| !extension.is_empty())
    }

    /// Kind named by the content type, or `None` when no type was sent.
    fn declared_kind(&self) -> Result<Option<MediaKind>, ValidationError> {
        let Some(content_type) = self.content_type.as_deref() else {
            return Ok(None);
        };
        let top_level = content_type
            .split_once('/')
            .map_or(content_type, |(top_level, _)| top_level);

        match top_level.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(Some(MediaKind::Image)),
            "video" => Ok(Some(MediaKind::Video)),
            _ => Err(ValidationError::UnsupportedMedia(content_type.to_owned())),
        }
    }

    /// Checks size and type and decides whether the file is an image or a video.
    pub fn accept(self, max_bytes: usize) -> Result<AcceptedUpload, ValidationError> {
        if self.bytes.len() > max_bytes {
            return Err(ValidationError::MediaTooLarge { limit: max_bytes });
        }

        let declared_kind = self.declared_kind()?;

        let (extension, kind) = match self.extension() {
            Some(extension) => allowed_extension(extension)
                .ok_or_else(|| ValidationError::UnsupportedMedia(extension.to_owned()))?,
            None => self
                .content_type
                .as_deref()
                .and_then(mime_guess::get_mime_extensions_str)
                .and_then(|extensions| {
                    extensions
                        .iter()
                        .find_map(|extension| allowed_extension(extension))
                })
                .ok_or_else(|| {
                    ValidationError::UnsupportedMedia(
                        self.content_type.clone().unwrap_or_default(),
                    )
                })?,
        };

        if declared_kind.is_some_and(|declared| declared != kind) {
            return Err(ValidationError::UnsupportedMedia(format!(
                "{} sent as {}",
                extension,
                self.content_type.unwrap_or_default()
            )));
        }

        Ok(AcceptedUpload {
            kind,
            extension,
            bytes: self.bytes,
        })
    }
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Could not write media file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Somewhere to put uploaded files that hands back a public url.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn store(&self, upload: AcceptedUpload) -> Result<Media, MediaError>;
}

/// Writes uploads into a local directory under random names.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct LocalMediaStore {
    directory: PathBuf,
    base_url: String,
}

impl LocalMediaStore {
    #[must_use]
    pub fn new(directory: PathBuf, base_url: String) -> Self {
        Self {
            directory,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn store(&self, upload: AcceptedUpload) -> Result<Media, MediaError> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|source| MediaError::Write {
                path: self.directory.clone(),
                source,
            })?;

        let file_name = format!("{:016x}.{}", rand::random::<u64>(), upload.extension);
        let path = self.directory.join(&file_name);
        tokio::fs::write(&path, &upload.bytes)
            .await
            .map_err(|source| MediaError::Write {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), bytes = upload.bytes.len(), "Stored media file");
        Ok(Media::new(
            upload.kind,
            format!("{}/{file_name}", self.base_url),
        ))
    }
}
