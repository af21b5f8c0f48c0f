//! In-process harness for driving `AppCore` synchronously: actions, inbound events and
//! completions go straight into `handle_message`; requests never resolve on their own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use flume::Receiver;
use serde_json::Value;

use crate::actions::AppAction;
use crate::dispatcher::RawEvent;
use crate::error::ChatError;
use crate::model::{
    BlockStatus, Conversation, Message, MessageContent, MessageStatus, Participant,
};
use crate::state::AppState;
use crate::transport::{
    BlockResult, ConversationPage, ConversationPatch, CreateConversationRequest,
    CredentialProvider, CurrentUser, EventChannel, ListConversationsQuery, ListMessagesQuery,
    RequestChannel, SendMessageRequest, Transports,
};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

use super::{AppConfig, AppCore};

pub(super) const ME: &str = "me";

/// Every request stays in flight; tests complete them by hand with [`Harness::complete`].
struct PendingRequests;

#[async_trait]
impl RequestChannel for PendingRequests {
    async fn list_conversations(
        &self,
        _query: ListConversationsQuery,
    ) -> Result<ConversationPage, ChatError> {
        std::future::pending().await
    }

    async fn get_conversation(&self, _id: &str) -> Result<Conversation, ChatError> {
        std::future::pending().await
    }

    async fn create_conversation(
        &self,
        _payload: CreateConversationRequest,
    ) -> Result<Conversation, ChatError> {
        std::future::pending().await
    }

    async fn update_conversation(
        &self,
        _id: &str,
        _patch: ConversationPatch,
    ) -> Result<Conversation, ChatError> {
        std::future::pending().await
    }

    async fn delete_conversation(&self, _id: &str) -> Result<(), ChatError> {
        std::future::pending().await
    }

    async fn list_messages(&self, _query: ListMessagesQuery) -> Result<Vec<Message>, ChatError> {
        std::future::pending().await
    }

    async fn send_message(&self, _request: SendMessageRequest) -> Result<Message, ChatError> {
        std::future::pending().await
    }

    async fn delete_message(&self, _id: &str) -> Result<(), ChatError> {
        std::future::pending().await
    }

    async fn get_block_status(&self, _conversation_id: &str) -> Result<BlockStatus, ChatError> {
        std::future::pending().await
    }

    async fn set_block(
        &self,
        _conversation_id: &str,
        _target_user_id: &str,
    ) -> Result<BlockResult, ChatError> {
        std::future::pending().await
    }

    async fn clear_block(
        &self,
        _conversation_id: &str,
        _target_user_id: &str,
    ) -> Result<BlockResult, ChatError> {
        std::future::pending().await
    }
}

#[derive(Default)]
pub(super) struct RecordingEvents {
    emitted: Mutex<Vec<(String, Value)>>,
}

impl EventChannel for RecordingEvents {
    fn emit(&self, name: &str, payload: Value) {
        self.emitted
            .lock()
            .unwrap()
            .push((name.to_string(), payload));
    }
}

#[derive(Default)]
pub(super) struct FixedCredentials {
    cleared: AtomicBool,
}

impl FixedCredentials {
    pub(super) fn cleared(&self) -> bool {
        self.cleared.load(Ordering::SeqCst)
    }
}

impl CredentialProvider for FixedCredentials {
    fn access_token(&self) -> Option<String> {
        (!self.cleared()).then(|| "token".to_string())
    }

    fn refresh_tokens(&self) -> Result<(), ChatError> {
        Ok(())
    }

    fn clear_session(&self) {
        self.cleared.store(true, Ordering::SeqCst);
    }

    fn current_user(&self) -> Option<CurrentUser> {
        Some(CurrentUser {
            id: ME.to_string(),
            display_name: "Me".to_string(),
        })
    }
}

pub(super) struct Harness {
    pub(super) core: AppCore,
    pub(super) updates: Receiver<AppUpdate>,
    pub(super) events: Arc<RecordingEvents>,
    pub(super) credentials: Arc<FixedCredentials>,
    shared: Arc<RwLock<AppState>>,
    // Keeps the core's sender connected; timer and request completions land here unread.
    _core_rx: Receiver<CoreMsg>,
}

impl Harness {
    pub(super) fn new() -> Self {
        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded();
        let shared = Arc::new(RwLock::new(AppState::empty()));
        let events = Arc::new(RecordingEvents::default());
        let credentials = Arc::new(FixedCredentials::default());
        let transports = Transports {
            requests: Arc::new(PendingRequests),
            events: events.clone(),
            credentials: credentials.clone(),
        };
        let core = AppCore::new(
            update_tx,
            core_tx,
            AppConfig::default(),
            shared.clone(),
            transports,
        )
        .unwrap();
        Self {
            core,
            updates: update_rx,
            events,
            credentials,
            shared,
            _core_rx: core_rx,
        }
    }

    /// A harness holding one conversation per id, each with counterpart `p-{id}`.
    pub(super) fn with_conversations(ids: &[&str]) -> Self {
        let mut h = Self::new();
        h.act(AppAction::ListConversations {
            page: 0,
            include_archived: false,
        });
        let items: Vec<Conversation> = ids
            .iter()
            .map(|id| conversation(id, &format!("p-{id}")))
            .collect();
        let token = h.core.list_token;
        h.complete(InternalEvent::ConversationsListed {
            token,
            page: 0,
            page_size: 10,
            include_archived: false,
            result: Ok(ConversationPage {
                total: items.len() as u32,
                items,
            }),
        });
        h
    }

    pub(super) fn act(&mut self, action: AppAction) {
        self.core.handle_message(CoreMsg::Action(action));
    }

    pub(super) fn complete(&mut self, event: InternalEvent) {
        self.core
            .handle_message(CoreMsg::Internal(Box::new(event)));
    }

    pub(super) fn inbound(&mut self, name: &str, payload: Value) {
        self.core
            .handle_message(CoreMsg::Inbound(RawEvent::new(name, payload)));
    }

    /// `n` messages from the counterpart while `chat_id` is not open.
    pub(super) fn receive_unread(&mut self, chat_id: &str, n: i64) {
        for i in 0..n {
            let m = message(chat_id, &format!("{chat_id}-unread-{i}"), "peer", 100 + i);
            self.inbound("newMessage", serde_json::to_value(m).unwrap());
        }
    }

    pub(super) fn unread(&self, chat_id: &str) -> u32 {
        self.core
            .conversations
            .get(chat_id)
            .map(|c| c.unread_count)
            .unwrap_or(0)
    }

    pub(super) fn emitted(&self) -> Vec<(String, Value)> {
        self.events.emitted.lock().unwrap().clone()
    }

    pub(super) fn emitted_names(&self) -> Vec<String> {
        self.emitted().into_iter().map(|(name, _)| name).collect()
    }

    pub(super) fn mark_read_ids(&self) -> Vec<String> {
        self.emitted()
            .into_iter()
            .filter(|(name, _)| name == "mark_read")
            .filter_map(|(_, p)| p["messageId"].as_str().map(ToString::to_string))
            .collect()
    }

    pub(super) fn typing_flags(&self) -> Vec<bool> {
        self.emitted()
            .into_iter()
            .filter(|(name, _)| name == "typing")
            .filter_map(|(_, p)| p["isTyping"].as_bool())
            .collect()
    }

    pub(super) fn shared_state(&self) -> AppState {
        self.shared.read().unwrap().clone()
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
}

pub(super) fn message(chat_id: &str, id: &str, sender: &str, minute: i64) -> Message {
    Message {
        id: id.to_string(),
        conversation_id: chat_id.to_string(),
        sender_id: sender.to_string(),
        content: MessageContent::text(format!("text of {id}")),
        status: MessageStatus::Sent,
        created_at: base_time() + Duration::minutes(minute),
        is_deleted: false,
    }
}

pub(super) fn conversation(id: &str, peer: &str) -> Conversation {
    Conversation {
        id: id.to_string(),
        other_participant: Participant {
            id: peer.to_string(),
            display_name: format!("User {peer}"),
            ..Participant::default()
        },
        last_message_preview: None,
        unread_count: 0,
        last_activity_at: None,
        block_status: None,
        is_archived: false,
    }
}
