//! Collaborator interfaces: the request channel (REST-like), the realtime event channel and
//! the credential store. Implementations live outside this crate; the core only talks to these
//! traits.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::model::{BlockStatus, Conversation, Message, MessageContent};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListConversationsQuery {
    pub skip: u32,
    pub limit: u32,
    pub include_archived: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConversationPage {
    pub items: Vec<Conversation>,
    pub total: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMessagesQuery {
    pub conversation_id: String,
    pub counterpart_id: String,
    pub skip: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    pub participant_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub conversation_id: String,
    pub content: MessageContent,
    pub counterpart_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockResult {
    pub conversation: Conversation,
    pub block_status: BlockStatus,
}

/// Request/response transport. Every call fails with [`ChatError::Network`] on a non-success
/// status; the core wraps each call in its configured deadline and maps expiry to
/// [`ChatError::Timeout`].
#[async_trait]
pub trait RequestChannel: Send + Sync + 'static {
    async fn list_conversations(
        &self,
        query: ListConversationsQuery,
    ) -> Result<ConversationPage, ChatError>;

    async fn get_conversation(&self, id: &str) -> Result<Conversation, ChatError>;

    async fn create_conversation(
        &self,
        payload: CreateConversationRequest,
    ) -> Result<Conversation, ChatError>;

    async fn update_conversation(
        &self,
        id: &str,
        patch: ConversationPatch,
    ) -> Result<Conversation, ChatError>;

    async fn delete_conversation(&self, id: &str) -> Result<(), ChatError>;

    async fn list_messages(&self, query: ListMessagesQuery) -> Result<Vec<Message>, ChatError>;

    async fn send_message(&self, request: SendMessageRequest) -> Result<Message, ChatError>;

    async fn delete_message(&self, id: &str) -> Result<(), ChatError>;

    async fn get_block_status(&self, conversation_id: &str) -> Result<BlockStatus, ChatError>;

    async fn set_block(
        &self,
        conversation_id: &str,
        target_user_id: &str,
    ) -> Result<BlockResult, ChatError>;

    async fn clear_block(
        &self,
        conversation_id: &str,
        target_user_id: &str,
    ) -> Result<BlockResult, ChatError>;
}

/// Actions the core pushes onto the realtime channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    JoinConversation {
        conversation_id: String,
    },
    LeaveConversation {
        conversation_id: String,
    },
    MarkRead {
        conversation_id: String,
        message_id: String,
        user_id: String,
    },
    Typing {
        conversation_id: String,
        counterpart_id: String,
        is_typing: bool,
    },
    /// Broadcast companion to a REST send; fire-and-forget.
    SendMessage {
        conversation_id: String,
        message: Message,
    },
}

impl OutboundEvent {
    pub fn conversation_id(&self) -> &str {
        match self {
            Self::JoinConversation { conversation_id }
            | Self::LeaveConversation { conversation_id }
            | Self::MarkRead {
                conversation_id, ..
            }
            | Self::Typing {
                conversation_id, ..
            }
            | Self::SendMessage {
                conversation_id, ..
            } => conversation_id,
        }
    }
}

/// Bidirectional push transport. Inbound traffic is delivered through
/// [`crate::EventSink`]; this trait covers the outbound half. `emit` must not block: it is
/// called from the app actor thread.
pub trait EventChannel: Send + Sync + 'static {
    fn emit(&self, name: &str, payload: serde_json::Value);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default, alias = "username")]
    pub display_name: String,
}

/// Credential store. Token format is opaque to the core.
pub trait CredentialProvider: Send + Sync + 'static {
    fn access_token(&self) -> Option<String>;
    fn refresh_tokens(&self) -> Result<(), ChatError>;
    fn clear_session(&self);
    fn current_user(&self) -> Option<CurrentUser>;
}

/// The collaborators a [`crate::ChatApp`] is constructed with.
#[derive(Clone)]
pub struct Transports {
    pub requests: Arc<dyn RequestChannel>,
    pub events: Arc<dyn EventChannel>,
    pub credentials: Arc<dyn CredentialProvider>,
}
