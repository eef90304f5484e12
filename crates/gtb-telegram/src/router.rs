use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

use gtb_core::{
    config::Config, followup::FollowupTicket, messaging::port::MessagingPort,
    model::client::ModelClient, personality::PersonalityTable, pipeline::RequestPipeline,
    security::RateLimiter, usage::UsageTracker,
};

use crate::handlers;
use crate::TelegramMessenger;

/// Per-chat overrides set via /model and /personality. Absent entries fall
/// back to the configured defaults.
#[derive(Clone, Debug, Default)]
pub struct ChatPrefs {
    pub model: Option<String>,
    pub personality: Option<String>,
}

/// A claimed Reply button waiting for the claiming user's next text message.
/// Keyed by (chat id, user id) so another user's message in the same chat
/// never consumes the window.
pub struct PendingFollowup {
    pub ticket: FollowupTicket,
    pub deadline: Instant,
}

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub pipeline: Arc<RequestPipeline>,
    pub messenger: Arc<dyn MessagingPort>,
    pub usage: Arc<UsageTracker>,
    pub personalities: Arc<PersonalityTable>,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
    pub chat_locks: Arc<ChatLocks>,
    pub prefs: Arc<Mutex<HashMap<i64, ChatPrefs>>>,
    pub pending_followups: Arc<Mutex<HashMap<(i64, i64), PendingFollowup>>>,
}

#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub async fn run_polling(
    cfg: Arc<Config>,
    model: Arc<dyn ModelClient>,
    usage: Arc<UsageTracker>,
    personalities: Arc<PersonalityTable>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    if let Ok(me) = bot.get_me().await {
        tracing::info!(username = me.username(), "bot started");
    }
    tracing::info!(
        allowed_users = cfg.telegram_allowed_users.len(),
        data_file = %cfg.data_file.display(),
        "configuration loaded"
    );
    if personalities.is_empty() {
        tracing::warn!("no personalities loaded; requests will be rejected");
    }

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));

    let caps = messenger.capabilities();
    if cfg.body_limit >= caps.max_message_len {
        tracing::warn!(
            body_limit = cfg.body_limit,
            platform_max = caps.max_message_len,
            "body limit leaves no headroom for segment decoration"
        );
    }

    let pipeline = Arc::new(RequestPipeline::new(
        cfg.clone(),
        model,
        messenger.clone(),
        usage.clone(),
        personalities.clone(),
        Arc::new(gtb_core::followup::FollowupRegistry::new()),
    ));

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        pipeline,
        messenger,
        usage,
        personalities,
        rate_limiter: Arc::new(Mutex::new(RateLimiter::new(
            cfg.rate_limit_enabled,
            cfg.rate_limit_requests,
            cfg.rate_limit_window,
        ))),
        chat_locks: Arc::new(ChatLocks::default()),
        prefs: Arc::new(Mutex::new(HashMap::new())),
        pending_followups: Arc::new(Mutex::new(HashMap::new())),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gtb_core::context::ConversationTurn;
    use gtb_core::domain::{ChatId, MessageId, MessageRef, UserId};
    use gtb_core::model::types::ModelChoice;

    fn pending(user: i64) -> PendingFollowup {
        PendingFollowup {
            ticket: FollowupTicket {
                turn: ConversationTurn {
                    question: "q".to_string(),
                    answer: "a".to_string(),
                },
                model: ModelChoice {
                    display_name: "3.0 Flash".to_string(),
                    api_id: "gemini-3-flash-preview".to_string(),
                },
                personality: "John Robot".to_string(),
                message: MessageRef {
                    chat_id: ChatId(1),
                    message_id: MessageId(10),
                },
                user: UserId(user),
            },
            deadline: Instant::now() + std::time::Duration::from_secs(300),
        }
    }

    #[tokio::test]
    async fn claimed_window_belongs_to_the_claiming_user() {
        let map: Mutex<HashMap<(i64, i64), PendingFollowup>> = Mutex::new(HashMap::new());
        map.lock().await.insert((1, 42), pending(42));

        // Another user in the same chat does not consume the window.
        assert!(map.lock().await.remove(&(1, 99)).is_none());

        let taken = map.lock().await.remove(&(1, 42)).expect("window kept");
        assert_eq!(taken.ticket.user, UserId(42));
        assert!(map.lock().await.is_empty());
    }
}
