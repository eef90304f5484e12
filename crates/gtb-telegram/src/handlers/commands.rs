use std::sync::Arc;

use teloxide::{prelude::*, types::ParseMode};

use crate::escape_html;
use crate::handlers::ask::{fresh_request, run_question, QuestionContext};
use crate::router::AppState;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

/// `/ask question | context` — everything after the first `|` is treated as
/// relevant text from a previous message and rides along as labeled context.
fn split_ask_arg(arg: &str) -> (String, Option<String>) {
    match arg.split_once('|') {
        Some((q, ctx)) if !ctx.trim().is_empty() => {
            (q.trim().to_string(), Some(ctx.trim().to_string()))
        }
        Some((q, _)) => (q.trim().to_string(), None),
        None => (arg.trim().to_string(), None),
    }
}

async fn send_html(bot: &Bot, chat_id: i64, html: String) {
    let _ = bot
        .send_message(teloxide::types::ChatId(chat_id), html)
        .parse_mode(ParseMode::Html)
        .await;
}

pub async fn handle_command(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let user_id = user.id.0 as i64;
    let chat_id = msg.chat.id.0;

    let (cmd, arg) = parse_command(text);

    match cmd.as_str() {
        "start" | "help" => {
            let default_model = escape_html(&state.cfg.default_model);
            let default_personality = escape_html(&state.cfg.default_personality);
            let body = format!(
                "<b>Gemini Telegram Bot</b>\n\n\
Ask a question and get an answer from Google Gemini. Long answers arrive \
in numbered parts; press the Reply button under an answer to ask a \
follow-up that keeps its context.\n\n\
<b>Commands:</b>\n\
/ask &lt;question&gt; [| &lt;context&gt;] - Ask a question (plain text works too); \
text after | is sent as context from a previous message\n\
/model [name] - Show or set the model for this chat\n\
/models - List available models\n\
/personality [name] - Show or set the answer personality\n\
/personalities - List available personalities\n\
/usage - Show today's API call count\n\
/help - Show this message\n\n\
Default model: {default_model}\n\
Default personality: {default_personality}"
            );
            send_html(&bot, chat_id, body).await;
            Ok(())
        }

        "ask" => {
            let (question, user_context) = split_ask_arg(&arg);
            if question.is_empty() {
                let _ = bot
                    .send_message(msg.chat.id, "Usage: /ask <question> [| <context>]")
                    .await;
                return Ok(());
            }
            let _guard = state.chat_locks.lock_chat(chat_id).await;
            let mut request = fresh_request(&state, chat_id, user_id, question).await;
            request.user_context = user_context;
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

        "model" => {
            if arg.is_empty() {
                let current = {
                    let prefs = state.prefs.lock().await;
                    prefs
                        .get(&chat_id)
                        .and_then(|p| p.model.clone())
                        .unwrap_or_else(|| state.cfg.default_model.clone())
                };
                let _ = bot
                    .send_message(
                        msg.chat.id,
                        format!("Current model: {current}\nSet one with /model <name>; see /models."),
                    )
                    .await;
                return Ok(());
            }

            if state.cfg.models.get(&arg).is_none() {
                let _ = bot
                    .send_message(
                        msg.chat.id,
                        format!("Unknown model '{arg}'. See /models for choices."),
                    )
                    .await;
                return Ok(());
            }

            state.prefs.lock().await.entry(chat_id).or_default().model = Some(arg.clone());
            let _ = bot
                .send_message(msg.chat.id, format!("Model for this chat set to {arg}."))
                .await;
            Ok(())
        }

        "models" => {
            let mut body = String::from("<b>Available models:</b>\n");
            for choice in state.cfg.models.choices() {
                body.push_str(&format!(
                    "- {} (<code>{}</code>)\n",
                    escape_html(&choice.display_name),
                    escape_html(&choice.api_id)
                ));
            }
            send_html(&bot, chat_id, body).await;
            Ok(())
        }

        "personality" => {
            if arg.is_empty() {
                let current = {
                    let prefs = state.prefs.lock().await;
                    prefs
                        .get(&chat_id)
                        .and_then(|p| p.personality.clone())
                        .unwrap_or_else(|| state.cfg.default_personality.clone())
                };
                let _ = bot
                    .send_message(
                        msg.chat.id,
                        format!(
                            "Current personality: {current}\nSet one with /personality <name>; see /personalities."
                        ),
                    )
                    .await;
                return Ok(());
            }

            if !state.personalities.names().any(|n| n == arg) {
                let _ = bot
                    .send_message(
                        msg.chat.id,
                        format!("Unknown personality '{arg}'. See /personalities for choices."),
                    )
                    .await;
                return Ok(());
            }

            state
                .prefs
                .lock()
                .await
                .entry(chat_id)
                .or_default()
                .personality = Some(arg.clone());
            let _ = bot
                .send_message(
                    msg.chat.id,
                    format!("Personality for this chat set to {arg}."),
                )
                .await;
            Ok(())
        }

        "personalities" => {
            if state.personalities.is_empty() {
                let _ = bot
                    .send_message(msg.chat.id, "No personalities are loaded.")
                    .await;
                return Ok(());
            }
            let mut body = String::from("<b>Available personalities:</b>\n");
            for name in state.personalities.names() {
                body.push_str(&format!("- {}\n", escape_html(name)));
            }
            send_html(&bot, chat_id, body).await;
            Ok(())
        }

        "usage" => {
            let count = state.usage.get_count().await;
            let _ = bot
                .send_message(msg.chat.id, format!("API calls today: {count}"))
                .await;
            Ok(())
        }

        _ => {
            let _ = bot
                .send_message(msg.chat.id, "Unknown command. See /help.")
                .await;
            Ok(())
        }
    }
}
