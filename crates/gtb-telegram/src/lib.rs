//! Telegram adapter (teloxide).
//!
//! Implements the `gtb-core` MessagingPort over the Telegram Bot API.
//! Segments render as HTML: bold title line, italic author line, body,
//! italic footer line. Transient 429s are retried once via RetryAfter.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode},
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use gtb_core::{
    chunker::Segment,
    domain::{ChatId, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{port::MessagingPort, types::MessagingCapabilities},
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }

    async fn send_html(&self, chat_id: ChatId, html: String) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.clone())
                    .parse_mode(ParseMode::Html)
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_edit: true,
            supports_buttons: true,
            max_message_len: 4096,
        }
    }

    async fn send_segment(&self, chat_id: ChatId, segment: &Segment) -> Result<MessageRef> {
        self.send_html(chat_id, render_segment_html(segment)).await
    }

    async fn send_notice(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        self.send_html(chat_id, escape_html(text)).await
    }

    async fn send_notice_mentioning(
        &self,
        chat_id: ChatId,
        user: UserId,
        text: &str,
    ) -> Result<MessageRef> {
        let html = format!(
            "<a href=\"tg://user?id={}\">You have a message</a>\n{}",
            user.0,
            escape_html(text)
        );
        self.send_html(chat_id, html).await
    }

    async fn attach_reply_button(
        &self,
        msg: MessageRef,
        label: &str,
        callback_data: &str,
    ) -> Result<()> {
        let markup = InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
            label.to_string(),
            callback_data.to_string(),
        )]]);
        self.with_retry(|| {
            self.bot
                .edit_message_reply_markup(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
                .reply_markup(markup.clone())
        })
        .await?;
        Ok(())
    }

    async fn clear_buttons(&self, msg: MessageRef) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .edit_message_reply_markup(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
        })
        .await?;
        Ok(())
    }

    async fn send_typing(&self, chat_id: ChatId) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .send_chat_action(Self::tg_chat(chat_id), teloxide::types::ChatAction::Typing)
        })
        .await?;
        Ok(())
    }
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Render a segment into one Telegram HTML message. The body is model
/// output and gets escaped verbatim; no markdown interpretation.
pub fn render_segment_html(segment: &Segment) -> String {
    let mut out = String::new();
    if let Some(title) = &segment.title {
        out.push_str(&format!("<b>{}</b>\n", escape_html(title)));
    }
    if let Some(author) = &segment.author {
        out.push_str(&format!("<i>{}</i>\n", escape_html(author)));
    }
    out.push_str(&escape_html(&segment.body));
    if let Some(footer) = &segment.footer {
        out.push_str(&format!("\n\n<i>{}</i>", escape_html(footer)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html_entities() {
        assert_eq!(escape_html("a < b && c > d"), "a &lt; b &amp;&amp; c &gt; d");
    }

    #[test]
    fn renders_full_segment() {
        let seg = Segment {
            title: Some("Prompt: 1 < 2?".to_string()),
            author: Some("Responding as: John Robot".to_string()),
            body: "Yes.".to_string(),
            footer: Some("Model: 3.0 Flash | API Call #7".to_string()),
        };
        let html = render_segment_html(&seg);
        assert_eq!(
            html,
            "<b>Prompt: 1 &lt; 2?</b>\n<i>Responding as: John Robot</i>\nYes.\n\n<i>Model: 3.0 Flash | API Call #7</i>"
        );
    }

    #[test]
    fn renders_bare_continuation_segment() {
        let seg = Segment {
            title: Some("Part 2/3".to_string()),
            author: Some("Responding as: Pirate".to_string()),
            body: "more text".to_string(),
            footer: None,
        };
        let html = render_segment_html(&seg);
        assert!(html.starts_with("<b>Part 2/3</b>\n"));
        assert!(html.ends_with("more text"));
    }
}
