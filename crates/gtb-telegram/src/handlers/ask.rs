use std::sync::Arc;

use teloxide::{prelude::*, types::ChatAction};

use gtb_core::{
    domain::UserId,
    pipeline::{AskRequest, PipelineOutcome},
    security::RateDecision,
};

use crate::router::AppState;

#[derive(Clone)]
pub struct QuestionContext {
    pub bot: Bot,
    pub state: Arc<AppState>,
    pub chat_id: i64,
    pub user_id: i64,
}

/// Build a fresh request from per-chat preferences.
pub async fn fresh_request(state: &AppState, chat_id: i64, user_id: i64, question: String) -> AskRequest {
    let prefs = state.prefs.lock().await.get(&chat_id).cloned().unwrap_or_default();
    AskRequest {
        chat_id: gtb_core::domain::ChatId(chat_id),
        user: UserId(user_id),
        question,
        model: prefs.model,
        personality: prefs.personality,
        context: None,
        user_context: None,
    }
}

/// Rate-limit, then run one request through the pipeline with a typing
/// indicator alive for the duration.
pub async fn run_question(ctx: QuestionContext, request: AskRequest) -> ResponseResult<()> {
    let QuestionContext {
        bot,
        state,
        chat_id,
        user_id,
    } = ctx;

    {
        let mut rl = state.rate_limiter.lock().await;
        if let RateDecision::Limited { retry_after } = rl.check(UserId(user_id)) {
            let _ = bot
                .send_message(
                    teloxide::types::ChatId(chat_id),
                    format!(
                        "Rate limited. Please wait {:.1} seconds.",
                        retry_after.as_secs_f64()
                    ),
                )
                .await;
            return Ok(());
        }
    }

    // Typing loop (best-effort).
    let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel::<()>();
    let bot_for_typing = bot.clone();
    let chat_for_typing = teloxide::types::ChatId(chat_id);
    let typing_task = tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(3));
        loop {
            tokio::select! {
              _ = tick.tick() => {
                let _ = bot_for_typing.send_chat_action(chat_for_typing, ChatAction::Typing).await;
              }
              _ = &mut stop_rx => break,
            }
        }
    });

    let outcome = state.pipeline.run(request).await;
    if outcome != PipelineOutcome::Delivered {
        tracing::info!(chat = chat_id, ?outcome, "request did not complete normally");
    }

    let _ = stop_tx.send(());
    let _ = typing_task.await;

    Ok(())
}
