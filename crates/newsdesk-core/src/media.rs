//! Image blob storage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::{
    domain::{MediaRef, UserId},
    errors::Error,
    store::write_atomic,
    Result,
};

/// Hex chars of the content hash kept in the file name.
const HASH_PREFIX_LEN: usize = 16;

/// Port for storing uploaded images.
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Store `bytes` uploaded by `user`. Storing the same bytes twice for the
    /// same user yields the same reference (and overwrites the file).
    async fn store(&self, user: UserId, bytes: &[u8]) -> Result<MediaRef>;

    /// Best-effort delete. Returns whether a file was removed; a missing file is not an error.
    async fn remove(&self, media: &MediaRef) -> bool;

    async fn exists(&self, media: &MediaRef) -> bool;

    /// Absolute location of a blob, for transports that upload from disk.
    fn path(&self, media: &MediaRef) -> Result<PathBuf>;

    /// Directory holding all blobs (handed to the publish sink).
    fn dir(&self) -> &Path;
}

/// Media sink backed by a plain directory: `<dir>/<user_id>_<sha256 prefix>.jpg`.
#[derive(Clone, Debug)]
pub struct FsMediaSink {
    dir: PathBuf,
}

impl FsMediaSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

pub fn media_key(user: UserId, bytes: &[u8]) -> MediaRef {
    let digest = Sha256::digest(bytes);
    let hex = digest
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>();
    MediaRef(format!("{}_{}.jpg", user.0, &hex[..HASH_PREFIX_LEN]))
}

/// Reject anything that is not a plain file name.
fn check_ref(media: &MediaRef) -> Result<()> {
    let s = media.as_str();
    let bad = s.is_empty()
        || s.starts_with('.')
        || s.contains('/')
        || s.contains('\\')
        || s.contains('\0');
    if bad {
        return Err(Error::InvalidPath {
            path: PathBuf::from(s),
            reason: "media reference must be a plain file name".to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl MediaSink for FsMediaSink {
    async fn store(&self, user: UserId, bytes: &[u8]) -> Result<MediaRef> {
        if bytes.is_empty() {
            return Err(Error::Validation("The image is empty.".to_string()));
        }
        let media = media_key(user, bytes);
        let path = self.path(&media)?;
        write_atomic(&path, bytes).await?;
        debug!(user_id = user.0, media = %media, size = bytes.len(), "media stored");
        Ok(media)
    }

    async fn remove(&self, media: &MediaRef) -> bool {
        let Ok(path) = self.path(media) else {
            return false;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(media = %media, "media removed");
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(media = %media, error = %e, "failed to remove media");
                false
            }
        }
    }

    async fn exists(&self, media: &MediaRef) -> bool {
        let Ok(path) = self.path(media) else {
            return false;
        };
        tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    fn path(&self, media: &MediaRef) -> Result<PathBuf> {
        check_ref(media)?;
        Ok(self.dir.join(media.as_str()))
    }

    fn dir(&self) -> &Path {
        &self.dir
    }
}
