use async_trait::async_trait;

use crate::{
    chunker::Segment,
    domain::{ChatId, MessageRef, UserId},
    messaging::types::MessagingCapabilities,
    Result,
};

/// Cross-messenger port.
///
/// Telegram is the first implementation; the shape is designed so future
/// adapters can fit behind the same interface with capability flags.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    /// Deliver one segment of an answer batch; returns a handle for edits.
    async fn send_segment(&self, chat_id: ChatId, segment: &Segment) -> Result<MessageRef>;

    /// Plain user-facing notice (errors, hints).
    async fn send_notice(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;

    /// Channel-fallback notice that mentions the requester directly. Used when
    /// the normal reply path failed; implementations must not assume the
    /// original message still exists.
    async fn send_notice_mentioning(
        &self,
        chat_id: ChatId,
        user: UserId,
        text: &str,
    ) -> Result<MessageRef>;

    /// Attach a single callback button to an already-sent message.
    async fn attach_reply_button(
        &self,
        msg: MessageRef,
        label: &str,
        callback_data: &str,
    ) -> Result<()>;

    /// Remove any buttons from a message (affordance expiry).
    async fn clear_buttons(&self, msg: MessageRef) -> Result<()>;

    /// Best-effort "the bot is working" indicator.
    async fn send_typing(&self, chat_id: ChatId) -> Result<()>;
}
