use std::sync::Arc;

use teloxide::prelude::*;
use tokio::time::Instant;

use gtb_core::domain::UserId;
use gtb_core::security::is_authorized;

use crate::router::{AppState, PendingFollowup};

/// Handle a Reply button press: claim the ticket (single use), disable the
/// button, and arm this chat to treat the next text message as a follow-up.
pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let user_id = q.from.id.0 as i64;

    if !is_authorized(Some(UserId(user_id)), &state.cfg.telegram_allowed_users) {
        let _ = bot
            .answer_callback_query(cb_id)
            .text("Unauthorized".to_string())
            .await;
        return Ok(());
    }

    let data = q.data.clone().unwrap_or_default();
    let Some(id) = data
        .strip_prefix("followup:")
        .and_then(|s| s.parse::<u64>().ok())
    else {
        let _ = bot.answer_callback_query(cb_id).await;
        return Ok(());
    };

    let Some(ticket) = state.pipeline.followups().claim(id).await else {
        // Expired or already used; make the stale button disappear too.
        let _ = bot
            .answer_callback_query(cb_id)
            .text("This reply window has expired.".to_string())
            .await;
        if let Some(msg) = &q.message {
            let _ = bot.edit_message_reply_markup(msg.chat.id, msg.id).await;
        }
        return Ok(());
    };

    // Single use: the button goes away the moment it is claimed.
    let _ = state.messenger.clear_buttons(ticket.message).await;
    let _ = bot
        .answer_callback_query(cb_id)
        .text("Send your follow-up question.".to_string())
        .await;

    let chat_id = ticket.message.chat_id;
    let preview: String = ticket.turn.question.chars().take(80).collect();
    let _ = state
        .messenger
        .send_notice(
            chat_id,
            &format!("Replying to \"{preview}\" - send your follow-up question now."),
        )
        .await;

    // Scoped to the user who pressed the button, not the whole chat.
    state.pending_followups.lock().await.insert(
        (chat_id.0, user_id),
        PendingFollowup {
            ticket,
            deadline: Instant::now() + state.cfg.followup_timeout,
        },
    );

    Ok(())
}
