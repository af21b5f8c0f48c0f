//! In-memory transports for driving a real `ChatApp`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use courier_core::error::ChatError;
use courier_core::model::{
    BlockStatus, Conversation, Message, MessageContent, MessageStatus, Participant,
};
use courier_core::transport::{
    BlockResult, ConversationPage, ConversationPatch, CreateConversationRequest,
    CredentialProvider, CurrentUser, EventChannel, ListConversationsQuery, ListMessagesQuery,
    RequestChannel, SendMessageRequest, Transports,
};
use serde_json::Value;
use tokio::sync::Notify;

pub const ME: &str = "me";

/// Request channel answering from in-memory fixtures. `listMessages` for a conversation can be
/// held back with [`ScriptedRequests::hold_messages`] until the returned gate is notified.
#[derive(Default)]
pub struct ScriptedRequests {
    conversations: Mutex<Vec<Conversation>>,
    pages: Mutex<HashMap<(String, u32), Vec<Message>>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    failing_sends: AtomicBool,
    next_id: AtomicU64,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRequests {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_conversations(self: &Arc<Self>, items: Vec<Conversation>) -> Arc<Self> {
        *self.conversations.lock().unwrap() = items;
        self.clone()
    }

    /// The page `listMessages` returns for `(conversation, skip)`. Unscripted pages are empty.
    pub fn script_page(&self, conversation_id: &str, skip: u32, page: Vec<Message>) {
        self.pages
            .lock()
            .unwrap()
            .insert((conversation_id.to_string(), skip), page);
    }

    /// Hold the next `listMessages` call for `conversation_id` until the gate is notified.
    pub fn hold_messages(&self, conversation_id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(conversation_id.to_string(), gate.clone());
        gate
    }

    pub fn fail_sends(&self) {
        self.failing_sends.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn find(&self, id: &str) -> Result<Conversation, ChatError> {
        self.conversations
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| ChatError::network(404, format!("no conversation {id}")))
    }
}

#[async_trait]
impl RequestChannel for ScriptedRequests {
    async fn list_conversations(
        &self,
        query: ListConversationsQuery,
    ) -> Result<ConversationPage, ChatError> {
        self.record(format!(
            "listConversations:{}:{}:{}",
            query.skip, query.limit, query.include_archived
        ));
        let all: Vec<Conversation> = self
            .conversations
            .lock()
            .unwrap()
            .iter()
            .filter(|c| query.include_archived || !c.is_archived)
            .cloned()
            .collect();
        let items = all
            .iter()
            .skip(query.skip as usize)
            .take(query.limit as usize)
            .cloned()
            .collect();
        Ok(ConversationPage {
            items,
            total: all.len() as u32,
        })
    }

    async fn get_conversation(&self, id: &str) -> Result<Conversation, ChatError> {
        self.record(format!("getConversation:{id}"));
        self.find(id)
    }

    async fn create_conversation(
        &self,
        payload: CreateConversationRequest,
    ) -> Result<Conversation, ChatError> {
        self.record(format!("createConversation:{}", payload.participant_id));
        let created = conversation(
            &format!("c-{}", payload.participant_id),
            &payload.participant_id,
        );
        self.conversations.lock().unwrap().insert(0, created.clone());
        Ok(created)
    }

    async fn update_conversation(
        &self,
        id: &str,
        patch: ConversationPatch,
    ) -> Result<Conversation, ChatError> {
        self.record(format!("updateConversation:{id}"));
        let mut conversations = self.conversations.lock().unwrap();
        let c = conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ChatError::network(404, format!("no conversation {id}")))?;
        if let Some(archived) = patch.is_archived {
            c.is_archived = archived;
        }
        Ok(c.clone())
    }

    async fn delete_conversation(&self, id: &str) -> Result<(), ChatError> {
        self.record(format!("deleteConversation:{id}"));
        self.conversations.lock().unwrap().retain(|c| c.id != id);
        Ok(())
    }

    async fn list_messages(&self, query: ListMessagesQuery) -> Result<Vec<Message>, ChatError> {
        self.record(format!(
            "listMessages:{}:{}:{}",
            query.conversation_id, query.skip, query.limit
        ));
        let gate = self.gates.lock().unwrap().remove(&query.conversation_id);
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let page = self
            .pages
            .lock()
            .unwrap()
            .get(&(query.conversation_id.clone(), query.skip))
            .cloned()
            .unwrap_or_default();
        Ok(page.into_iter().take(query.limit as usize).collect())
    }

    async fn send_message(&self, request: SendMessageRequest) -> Result<Message, ChatError> {
        self.record(format!("sendMessage:{}", request.conversation_id));
        if self.failing_sends.load(Ordering::SeqCst) {
            return Err(ChatError::network(503, "unavailable"));
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(Message {
            id: format!("sent-{n}"),
            conversation_id: request.conversation_id,
            sender_id: ME.to_string(),
            content: request.content,
            status: MessageStatus::Sent,
            created_at: base_time() + Duration::minutes(1_000 + n as i64),
            is_deleted: false,
        })
    }

    async fn delete_message(&self, id: &str) -> Result<(), ChatError> {
        self.record(format!("deleteMessage:{id}"));
        Ok(())
    }

    async fn get_block_status(&self, conversation_id: &str) -> Result<BlockStatus, ChatError> {
        self.record(format!("getBlockStatus:{conversation_id}"));
        Ok(BlockStatus::unblocked())
    }

    async fn set_block(
        &self,
        conversation_id: &str,
        target_user_id: &str,
    ) -> Result<BlockResult, ChatError> {
        self.record(format!("setBlock:{conversation_id}:{target_user_id}"));
        Ok(BlockResult {
            conversation: self.find(conversation_id)?,
            block_status: BlockStatus {
                blocked_by_me: true,
                blocked_by_other: false,
                can_send_messages: false,
            },
        })
    }

    async fn clear_block(
        &self,
        conversation_id: &str,
        target_user_id: &str,
    ) -> Result<BlockResult, ChatError> {
        self.record(format!("clearBlock:{conversation_id}:{target_user_id}"));
        Ok(BlockResult {
            conversation: self.find(conversation_id)?,
            block_status: BlockStatus::unblocked(),
        })
    }
}

#[derive(Default)]
pub struct RecordingEvents {
    emitted: Mutex<Vec<(String, Value)>>,
}

impl RecordingEvents {
    pub fn emitted(&self) -> Vec<(String, Value)> {
        self.emitted.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.emitted().iter().filter(|(n, _)| n == name).count()
    }

    pub fn payloads(&self, name: &str) -> Vec<Value> {
        self.emitted()
            .into_iter()
            .filter(|(n, _)| n == name)
            .map(|(_, p)| p)
            .collect()
    }
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
pub struct MockCredentials {
    cleared: AtomicBool,
}

impl MockCredentials {
    pub fn cleared(&self) -> bool {
        self.cleared.load(Ordering::SeqCst)
    }
}

impl CredentialProvider for MockCredentials {
    fn access_token(&self) -> Option<String> {
        (!self.cleared()).then(|| "access".to_string())
    }

    fn refresh_tokens(&self) -> Result<(), ChatError> {
        Ok(())
    }

    fn clear_session(&self) {
        self.cleared.store(true, Ordering::SeqCst);
    }

    fn current_user(&self) -> Option<CurrentUser> {
        (!self.cleared()).then(|| CurrentUser {
            id: ME.to_string(),
            display_name: "Me".to_string(),
        })
    }
}

pub struct Mocks {
    pub requests: Arc<ScriptedRequests>,
    pub events: Arc<RecordingEvents>,
    pub credentials: Arc<MockCredentials>,
}

impl Mocks {
    pub fn new(conversations: Vec<Conversation>) -> Self {
        Self {
            requests: ScriptedRequests::new().with_conversations(conversations),
            events: Arc::new(RecordingEvents::default()),
            credentials: Arc::new(MockCredentials::default()),
        }
    }

    pub fn transports(&self) -> Transports {
        Transports {
            requests: self.requests.clone(),
            events: self.events.clone(),
            credentials: self.credentials.clone(),
        }
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
}

pub fn message(conversation_id: &str, id: &str, sender: &str, minute: i64) -> Message {
    Message {
        id: id.to_string(),
        conversation_id: conversation_id.to_string(),
        sender_id: sender.to_string(),
        content: MessageContent::text(format!("text of {id}")),
        status: MessageStatus::Sent,
        created_at: base_time() + Duration::minutes(minute),
        is_deleted: false,
    }
}

/// Messages `{cid}-m{from}` ..= `{cid}-m{to}` from the counterpart, one minute apart.
pub fn page(conversation_id: &str, from: i64, to: i64) -> Vec<Message> {
    (from..=to)
        .map(|i| {
            message(
                conversation_id,
                &format!("{conversation_id}-m{i:02}"),
                &format!("p-{conversation_id}"),
                i,
            )
        })
        .collect()
}

pub fn conversation(id: &str, peer: &str) -> Conversation {
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
