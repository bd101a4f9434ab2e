use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    article::{Article, TITLE_MAX_CHARS, CONTENT_MAX_CHARS},
    domain::{ArticleId, ChatId, MediaRef, UserId},
};

/// What happens to the image of an article being edited.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageChange {
    Keep,
    /// A new blob, already stored; the old one is deleted on commit.
    Replace(MediaRef),
    Remove,
}

/// Where a user is in the add or edit flow. Each variant carries only the
/// draft fields collected so far.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    AwaitingPhoto {
        id: ArticleId,
    },
    AwaitingTitle {
        id: ArticleId,
        image: MediaRef,
    },
    AwaitingContent {
        id: ArticleId,
        image: MediaRef,
        title: String,
    },
    EditAwaitingPhotoOrSkip {
        target: Article,
    },
    EditAwaitingTitle {
        target: Article,
        image: ImageChange,
    },
    EditAwaitingContent {
        target: Article,
        image: ImageChange,
        /// `None` keeps the current title.
        title: Option<String>,
    },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::AwaitingPhoto { .. } => "awaiting_photo",
            Step::AwaitingTitle { .. } => "awaiting_title",
            Step::AwaitingContent { .. } => "awaiting_content",
            Step::EditAwaitingPhotoOrSkip { .. } => "edit_awaiting_photo_or_skip",
            Step::EditAwaitingTitle { .. } => "edit_awaiting_title",
            Step::EditAwaitingContent { .. } => "edit_awaiting_content",
        }
    }

    /// Media stored during this session that no committed article owns yet.
    pub fn pending_media(&self) -> Option<&MediaRef> {
        match self {
            Step::AwaitingTitle { image, .. } | Step::AwaitingContent { image, .. } => Some(image),
            Step::EditAwaitingTitle {
                image: ImageChange::Replace(m),
                ..
            }
            | Step::EditAwaitingContent {
                image: ImageChange::Replace(m),
                ..
            } => Some(m),
            _ => None,
        }
    }

    /// The question the user is expected to answer.
    pub fn prompt(&self) -> String {
        match self {
            Step::AwaitingPhoto { id } => {
                format!("📷 Article #{id}: send a photo for it, or /cancel.")
            }
            Step::AwaitingTitle { .. } => {
                format!("✍️ Now send the title (up to {TITLE_MAX_CHARS} characters).")
            }
            Step::AwaitingContent { .. } => {
                format!("📝 Now send the text (up to {CONTENT_MAX_CHARS} characters).")
            }
            Step::EditAwaitingPhotoOrSkip { target } => format!(
                "📷 Editing #{}: send a new photo, <code>skip</code> to keep the current one{}.",
                target.id,
                if target.image.is_some() {
                    ", or <code>remove</code> to drop it"
                } else {
                    ""
                }
            ),
            Step::EditAwaitingTitle { target, .. } => format!(
                "✍️ Send the new title (up to {TITLE_MAX_CHARS} characters) or <code>skip</code> to keep \"{}\".",
                crate::formatting::escape_html(&target.title)
            ),
            Step::EditAwaitingContent { .. } => format!(
                "📝 Send the new text (up to {CONTENT_MAX_CHARS} characters) or <code>skip</code> to keep it."
            ),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Session {
    pub user_id: UserId,
    pub chat_id: ChatId,
    /// Display name captured when the session started.
    pub author: String,
    pub step: Step,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        let idle = now.signed_duration_since(self.last_activity);
        idle.to_std().map(|d| d > timeout).unwrap_or(false)
    }
}

/// One async lock per user so a user's updates are handled strictly in order.
#[derive(Default)]
pub struct UserLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl UserLocks {
    /// Wait for the user's lock. Entries nobody holds or waits on are dropped here.
    pub async fn lock_user(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.retain(|_, l| Arc::strong_count(l) > 1);
            map.entry(user_id.0)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    pub(crate) async fn tracked(&self) -> usize {
        self.inner.lock().await.len()
    }
}
