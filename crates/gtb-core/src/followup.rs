//! Single-use "Reply" follow-up affordances.
//!
//! Each delivered answer registers one ticket carrying the question/answer
//! pair plus the model and personality it was produced with. A ticket is an
//! explicit two-state object: Active until claimed or expired, then
//! permanently inert.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use tokio::sync::Mutex;

use crate::{
    context::ConversationTurn,
    domain::{MessageRef, UserId},
    model::types::ModelChoice,
};

#[derive(Clone, Debug)]
pub struct FollowupTicket {
    pub turn: ConversationTurn,
    pub model: ModelChoice,
    pub personality: String,
    /// The last delivered segment, where the Reply button lives.
    pub message: MessageRef,
    pub user: UserId,
}

#[derive(Debug)]
enum TicketState {
    Active(FollowupTicket),
    Expired,
}

/// In-memory registry of pending follow-up affordances.
#[derive(Debug, Default)]
pub struct FollowupRegistry {
    next_id: AtomicU64,
    tickets: Mutex<HashMap<u64, TicketState>>,
}

impl FollowupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, ticket: FollowupTicket) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut map = self.tickets.lock().await;

        // Expired tickets are inert either way; drop them on the next insert
        // so a long-lived process does not accumulate them.
        map.retain(|_, st| matches!(st, TicketState::Active(_)));

        map.insert(id, TicketState::Active(ticket));
        id
    }

    /// Consume an Active ticket. Single-use: a second claim, or a claim after
    /// expiry, returns `None`.
    pub async fn claim(&self, id: u64) -> Option<FollowupTicket> {
        let mut map = self.tickets.lock().await;
        match map.remove(&id) {
            Some(TicketState::Active(t)) => Some(t),
            Some(TicketState::Expired) | None => None,
        }
    }

    /// Transition Active → Expired. Returns the message the button is
    /// attached to, so the caller can attempt a best-effort visual disable.
    pub async fn expire(&self, id: u64) -> Option<MessageRef> {
        let mut map = self.tickets.lock().await;
        match map.get_mut(&id) {
            Some(st @ TicketState::Active(_)) => {
                let TicketState::Active(t) = std::mem::replace(st, TicketState::Expired) else {
                    return None;
                };
                Some(t.message)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatId, MessageId};

    fn ticket() -> FollowupTicket {
        FollowupTicket {
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
            user: UserId(42),
        }
    }

    #[tokio::test]
    async fn claim_is_single_use() {
        let reg = FollowupRegistry::new();
        let id = reg.register(ticket()).await;

        assert!(reg.claim(id).await.is_some());
        assert!(reg.claim(id).await.is_none());
    }

    #[tokio::test]
    async fn expired_ticket_is_inert() {
        let reg = FollowupRegistry::new();
        let id = reg.register(ticket()).await;

        let msg = reg.expire(id).await;
        assert_eq!(msg, Some(ticket().message));

        assert!(reg.claim(id).await.is_none());
        // Expiry itself is idempotent.
        assert!(reg.expire(id).await.is_none());
    }

    #[tokio::test]
    async fn expire_after_claim_returns_nothing() {
        let reg = FollowupRegistry::new();
        let id = reg.register(ticket()).await;

        assert!(reg.claim(id).await.is_some());
        assert!(reg.expire(id).await.is_none());
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let reg = FollowupRegistry::new();
        let a = reg.register(ticket()).await;
        let b = reg.register(ticket()).await;
        assert_ne!(a, b);
    }
}
