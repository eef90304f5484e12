//! Per-question orchestration: prompt build, model invocation, usage
//! accounting, chunked delivery, and the follow-up affordance.
//!
//! Every failure path ends in exactly one user-visible apologetic message;
//! technical detail goes to the logs only. Nothing here retries
//! automatically.

use std::sync::Arc;

use tokio::time::sleep;

use crate::{
    chunker::{split_answer, ChunkLimits, ResponseMeta},
    config::Config,
    context::{build_context_prompt, build_followup_prompt, cap_context, ConversationTurn},
    domain::{ChatId, UserId},
    followup::{FollowupRegistry, FollowupTicket},
    messaging::port::MessagingPort,
    model::{
        client::ModelClient,
        types::{GenerateOutcome, GenerateRequest, InvocationErrorKind, ModelChoice},
    },
    personality::PersonalityTable,
    usage::UsageTracker,
};

/// One inbound question, normalized for the pipeline.
#[derive(Clone, Debug)]
pub struct AskRequest {
    pub chat_id: ChatId,
    pub user: UserId,
    pub question: String,
    /// Model display name; `None` uses the configured default.
    pub model: Option<String>,
    /// Personality name; `None` uses the configured default.
    pub personality: Option<String>,
    /// Prior turn supplied by an activated follow-up affordance.
    pub context: Option<ConversationTurn>,
    /// Free-form context the user supplied alongside the question
    /// (ignored when a follow-up turn is present).
    pub user_context: Option<String>,
}

/// Terminal state of one pipeline run. The pipeline never propagates errors
/// past this boundary; callers use the outcome for logging and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineOutcome {
    Delivered,
    Blocked,
    Empty,
    InvocationFailed,
    NoPersonalities,
    PartialDelivery,
}

pub struct RequestPipeline {
    cfg: Arc<Config>,
    model: Arc<dyn ModelClient>,
    messenger: Arc<dyn MessagingPort>,
    usage: Arc<UsageTracker>,
    personalities: Arc<PersonalityTable>,
    followups: Arc<FollowupRegistry>,
}

impl RequestPipeline {
    pub fn new(
        cfg: Arc<Config>,
        model: Arc<dyn ModelClient>,
        messenger: Arc<dyn MessagingPort>,
        usage: Arc<UsageTracker>,
        personalities: Arc<PersonalityTable>,
        followups: Arc<FollowupRegistry>,
    ) -> Self {
        Self {
            cfg,
            model,
            messenger,
            usage,
            personalities,
            followups,
        }
    }

    pub fn followups(&self) -> Arc<FollowupRegistry> {
        self.followups.clone()
    }

    /// Turn a claimed follow-up ticket plus one new question into the next
    /// pipeline request. The stored turn becomes the sole context.
    pub fn followup_request(ticket: FollowupTicket, new_question: String) -> AskRequest {
        AskRequest {
            chat_id: ticket.message.chat_id,
            user: ticket.user,
            question: new_question,
            model: Some(ticket.model.display_name),
            personality: Some(ticket.personality),
            context: Some(ticket.turn),
            user_context: None,
        }
    }

    /// Run one question → answer cycle to a terminal state.
    pub async fn run(&self, req: AskRequest) -> PipelineOutcome {
        let Some(model) = self.resolve_model(req.model.as_deref()) else {
            // Unreachable with a validated config; still degrade politely.
            tracing::error!("no usable model configured");
            self.notify(req.chat_id, req.user, "Sorry, I encountered an unexpected error.")
                .await;
            return PipelineOutcome::InvocationFailed;
        };

        let Some((personality_name, instruction)) =
            self.personalities.resolve(req.personality.as_deref())
        else {
            self.notify(
                req.chat_id,
                req.user,
                "Error: No personalities configured or loaded. Cannot process request.",
            )
            .await;
            return PipelineOutcome::NoPersonalities;
        };

        let final_prompt = match (&req.context, &req.user_context) {
            (Some(turn), _) => {
                let capped = cap_context(&turn.answer, self.cfg.max_context_chars);
                build_followup_prompt(&turn.question, &capped, &req.question)
            }
            (None, Some(ctx)) => {
                let capped = cap_context(ctx, self.cfg.max_context_chars);
                build_context_prompt(&capped, &req.question)
            }
            (None, None) => req.question.clone(),
        };

        tracing::info!(
            chat = req.chat_id.0,
            model = %model.display_name,
            personality = %personality_name,
            prompt_len = final_prompt.len(),
            "processing question"
        );

        let outcome = self
            .model
            .generate(GenerateRequest {
                model_api_id: model.api_id.clone(),
                prompt: final_prompt,
                system_instruction: instruction,
            })
            .await;

        let answer = match outcome {
            Ok(GenerateOutcome::Answered { text }) => text,
            Ok(GenerateOutcome::Blocked { reason }) => {
                tracing::info!(?reason, "response blocked by safety filter");
                self.notify(
                    req.chat_id,
                    req.user,
                    "The model refused to answer (safety filter).",
                )
                .await;
                return PipelineOutcome::Blocked;
            }
            Ok(GenerateOutcome::Empty) => {
                tracing::info!("model returned no response");
                self.notify(req.chat_id, req.user, "The model returned no response.")
                    .await;
                return PipelineOutcome::Empty;
            }
            Err(e) => {
                tracing::error!(kind = ?e.kind, detail = %e.detail, "model invocation failed");
                self.notify(req.chat_id, req.user, user_message_for(e.kind))
                    .await;
                return PipelineOutcome::InvocationFailed;
            }
        };

        // Only answered requests count against the daily budget.
        let call_count = self.usage.increment().await;

        let batch = split_answer(
            &req.question,
            &answer,
            ChunkLimits {
                body_limit: self.cfg.body_limit,
                title_limit: self.cfg.title_limit,
            },
            &ResponseMeta {
                model_display: model.display_name.clone(),
                personality: personality_name.clone(),
                api_call_count: call_count,
            },
        );

        let total = batch.len();
        let mut last_message = None;
        for (i, segment) in batch.iter().enumerate() {
            match self.messenger.send_segment(req.chat_id, segment).await {
                Ok(msg) => last_message = Some(msg),
                Err(e) => {
                    tracing::error!(part = i + 1, total, error = %e, "segment delivery failed");
                    self.notify(
                        req.chat_id,
                        req.user,
                        "Sorry, I could not deliver the full answer.",
                    )
                    .await;
                    return PipelineOutcome::PartialDelivery;
                }
            }

            // Pace multi-part batches for the platform's rate limits.
            if i + 1 < total {
                sleep(self.cfg.segment_delay).await;
            }
        }

        if let Some(message) = last_message {
            self.attach_followup(message, req, model, personality_name, answer)
                .await;
        }

        PipelineOutcome::Delivered
    }

    /// Register the Reply affordance on the last delivered segment and arm
    /// its expiry timer. Best-effort: a failed button edit never fails the
    /// already-delivered answer.
    async fn attach_followup(
        &self,
        message: crate::domain::MessageRef,
        req: AskRequest,
        model: ModelChoice,
        personality: String,
        answer: String,
    ) {
        let id = self
            .followups
            .register(FollowupTicket {
                turn: ConversationTurn {
                    question: req.question,
                    answer,
                },
                model,
                personality,
                message,
                user: req.user,
            })
            .await;

        if let Err(e) = self
            .messenger
            .attach_reply_button(message, "↪ Reply", &format!("followup:{id}"))
            .await
        {
            tracing::warn!(error = %e, "could not attach reply button");
            return;
        }

        let followups = self.followups.clone();
        let messenger = self.messenger.clone();
        let timeout = self.cfg.followup_timeout;
        tokio::spawn(async move {
            sleep(timeout).await;
            if let Some(msg) = followups.expire(id).await {
                // The message may be gone by now; that is fine.
                if let Err(e) = messenger.clear_buttons(msg).await {
                    tracing::debug!(error = %e, "could not disable expired reply button");
                }
            }
        });
    }

    fn resolve_model(&self, display_name: Option<&str>) -> Option<ModelChoice> {
        let requested = display_name.and_then(|n| self.cfg.models.get(n));
        requested
            .or_else(|| self.cfg.models.get(&self.cfg.default_model))
            .cloned()
    }

    /// One user-visible message, then fall back to a channel mention if the
    /// normal reply path is gone. Never raises past the pipeline boundary.
    async fn notify(&self, chat_id: ChatId, user: UserId, text: &str) {
        if self.messenger.send_notice(chat_id, text).await.is_ok() {
            return;
        }
        if let Err(e) = self
            .messenger
            .send_notice_mentioning(chat_id, user, text)
            .await
        {
            tracing::error!(error = %e, "error notification fallback failed");
        }
    }
}

fn user_message_for(kind: InvocationErrorKind) -> &'static str {
    match kind {
        InvocationErrorKind::Credentials => {
            "Sorry, I can't reach the AI service right now. Please tell the bot owner."
        }
        InvocationErrorKind::Quota => {
            "Sorry, I've hit my limit with the AI service. Please try again later."
        }
        InvocationErrorKind::Transient => {
            "Sorry, the AI service seems to be having trouble. Please try again in a moment."
        }
        InvocationErrorKind::Unknown => "Sorry, I encountered a critical unexpected error.",
    }
}
