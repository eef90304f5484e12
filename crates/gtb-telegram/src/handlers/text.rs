use std::sync::Arc;

use teloxide::prelude::*;
use tokio::time::Instant;

use gtb_core::pipeline::RequestPipeline;

use crate::handlers::ask::{fresh_request, run_question, QuestionContext};
use crate::router::AppState;

/// Plain text is a question. If this user has a claimed Reply button
/// pending in this chat, the text becomes the follow-up and carries the
/// stored turn.
pub async fn handle_text(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text().map(|s| s.trim().to_string()) else {
        return Ok(());
    };
    if text.is_empty() {
        return Ok(());
    }

    let chat_id = msg.chat.id.0;
    let user_id = user.id.0 as i64;

    let pending = state
        .pending_followups
        .lock()
        .await
        .remove(&(chat_id, user_id));

    let request = match pending {
        Some(p) if Instant::now() <= p.deadline => {
            RequestPipeline::followup_request(p.ticket, text)
        }
        Some(_) => {
            let _ = bot
                .send_message(
                    msg.chat.id,
                    "That follow-up window has closed; answering as a new question.",
                )
                .await;
            fresh_request(&state, chat_id, user_id, text).await
        }
        None => fresh_request(&state, chat_id, user_id, text).await,
    };

    run_question(
        QuestionContext {
            bot,
            state,
            chat_id,
            user_id,
        },
        request,
    )
    .await
}
