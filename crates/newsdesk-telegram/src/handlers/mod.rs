//! Telegram update handlers.
//!
//! Every message is reduced to a transport-neutral `IncomingUpdate` and handed
//! to the conversation engine, which does its own per-user serialization.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::debug;

use newsdesk_core::{
    domain::{ChatId, UserId},
    messaging::types::{Command, IncomingUpdate, PhotoPayload, UpdateKind},
};

use crate::router::AppState;

/// One size of an uploaded photo.
#[derive(Clone, Debug)]
pub(crate) struct PhotoChoice {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };

    let photos: Vec<PhotoChoice> = msg
        .photo()
        .map(|sizes| {
            sizes
                .iter()
                .map(|p| PhotoChoice {
                    file_id: p.file.id.clone(),
                    width: p.width,
                    height: p.height,
                })
                .collect()
        })
        .unwrap_or_default();

    let kind = classify(msg.text(), &photos);
    let update = IncomingUpdate {
        chat_id: ChatId(msg.chat.id.0),
        user_id: UserId(user.id.0 as i64),
        display_name: display_name(&user.full_name(), user.username.as_deref()),
        kind,
    };
    debug!(user_id = update.user_id.0, "incoming message");

    state.engine.handle(update).await;
    Ok(())
}

pub(crate) fn classify(text: Option<&str>, photos: &[PhotoChoice]) -> UpdateKind {
    if let Some(best) = photos
        .iter()
        .max_by_key(|p| u64::from(p.width) * u64::from(p.height))
    {
        return UpdateKind::Photo(PhotoPayload {
            file_id: best.file_id.clone(),
        });
    }

    match text {
        Some(t) => match Command::parse(t) {
            Some(cmd) => UpdateKind::Command(cmd),
            None => UpdateKind::Text(t.to_string()),
        },
        None => UpdateKind::Unsupported,
    }
}

pub(crate) fn display_name(full_name: &str, username: Option<&str>) -> String {
    let full_name = full_name.trim();
    if !full_name.is_empty() {
        return full_name.to_string();
    }
    match username {
        Some(u) if !u.is_empty() => format!("@{u}"),
        _ => "anonymous".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(id: &str, w: u32, h: u32) -> PhotoChoice {
        PhotoChoice {
            file_id: id.to_string(),
            width: w,
            height: h,
        }
    }

    #[test]
    fn picks_largest_photo_size() {
        let kind = classify(
            Some("ignored text"),
            &[size("s", 90, 90), size("l", 1280, 720), size("m", 320, 240)],
        );
        match kind {
            UpdateKind::Photo(p) => assert_eq!(p.file_id, "l"),
            other => panic!("expected photo, got {other:?}"),
        }
    }

    #[test]
    fn text_and_commands() {
        assert!(matches!(
            classify(Some("/edit@news_bot 4"), &[]),
            UpdateKind::Command(c) if c.name == "edit" && c.args == "4"
        ));
        assert!(matches!(
            classify(Some("Opening hours"), &[]),
            UpdateKind::Text(t) if t == "Opening hours"
        ));
        assert!(matches!(classify(None, &[]), UpdateKind::Unsupported));
    }

    #[test]
    fn display_name_falls_back_to_username() {
        assert_eq!(display_name("Olena K", Some("olena")), "Olena K");
        assert_eq!(display_name(" ", Some("olena")), "@olena");
        assert_eq!(display_name("", None), "anonymous");
    }
}
