use std::path::Path;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::MessagingCapabilities,
    Result,
};

/// Outbound side of the chat transport, plus media download.
///
/// Telegram is the first implementation; text is Telegram-style HTML.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;

    /// Send a stored image from disk with an HTML caption.
    async fn send_photo(&self, chat_id: ChatId, path: &Path, caption_html: &str)
        -> Result<MessageRef>;

    /// Download the bytes of an inbound file (photo) by its transport id.
    async fn fetch_media(&self, file_id: &str) -> Result<Vec<u8>>;
}
