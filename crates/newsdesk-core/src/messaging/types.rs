use crate::domain::{ChatId, UserId};

/// Transport-neutral inbound update.
#[derive(Clone, Debug)]
pub struct IncomingUpdate {
    pub chat_id: ChatId,
    pub user_id: UserId,
    /// Display name shown as article author.
    pub display_name: String,
    pub kind: UpdateKind,
}

#[derive(Clone, Debug)]
pub enum UpdateKind {
    Command(Command),
    Text(String),
    Photo(PhotoPayload),
    /// Anything else (stickers, voice, documents, ...).
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    /// Lowercase command name without the leading `/` or `@botname`.
    pub name: String,
    pub args: String,
}

impl Command {
    /// Parse `/cmd@botname arg1 ...`. Returns `None` for text that is not a command.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if !text.starts_with('/') {
            return None;
        }
        let mut parts = text.splitn(2, char::is_whitespace);
        let first = parts.next().unwrap_or("");
        let args = parts.next().unwrap_or("").trim().to_string();

        let name = first
            .trim_start_matches('/')
            .split('@')
            .next()
            .unwrap_or("")
            .to_lowercase();
        if name.is_empty() {
            return None;
        }
        Some(Self { name, args })
    }
}

#[derive(Clone, Debug)]
pub struct PhotoPayload {
    /// Transport file id used to download the largest size.
    pub file_id: String,
}

/// Capabilities / limits of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub max_message_len: usize,
    pub max_caption_len: usize,
}
