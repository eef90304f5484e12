//! Telegram update handlers.
//!
//! Each handler validates auth, then routes into the core request pipeline.
//! Commands configure per-chat preferences; plain text and /ask run a
//! question; callbacks drive the follow-up Reply button.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use gtb_core::domain::UserId;
use gtb_core::security::is_authorized;

use crate::router::AppState;

mod ask;
mod callback;
mod commands;
mod text;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = msg.chat.id.0;
    let user_id = msg.from().map(|u| u.id.0);

    if !is_authorized(
        user_id.map(|id| UserId(id as i64)),
        &state.cfg.telegram_allowed_users,
    ) {
        let _ = bot
            .send_message(
                msg.chat.id,
                "Unauthorized. Contact the bot owner for access.",
            )
            .await;
        return Ok(());
    }

    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            return commands::handle_command(bot, msg, state).await;
        }

        // Sequentialize questions per chat so answers never interleave.
        let _guard = state.chat_locks.lock_chat(chat_id).await;
        return text::handle_text(bot, msg, state).await;
    }

    let _ = bot
        .send_message(msg.chat.id, "Send a text question, or /help for commands.")
        .await;

    Ok(())
}
