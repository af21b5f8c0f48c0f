//! Event dispatcher: the boundary between the loosely typed realtime channel and the core.
//!
//! Inbound payloads are validated here and turned into [`InboundEvent`]s; nothing untyped gets
//! past this module. Outbound [`OutboundEvent`]s are encoded to `(name, payload)` pairs.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ChatError;
use crate::model::{validate_id, Conversation, Message};
use crate::transport::OutboundEvent;

/// An event as delivered by the realtime transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub name: String,
    pub payload: Value,
}

impl RawEvent {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Connected,
    Disconnected,
    ChannelError {
        reason: String,
    },
    NewMessage(Message),
    MessageRead {
        conversation_id: String,
        message_id: String,
        user_id: String,
    },
    Typing {
        conversation_id: String,
        is_typing: bool,
    },
    Presence {
        user_id: String,
        is_online: bool,
    },
    ConversationCreated(Conversation),
}

impl InboundEvent {
    /// Log-safe event tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::ChannelError { .. } => "channelError",
            Self::NewMessage(_) => "newMessage",
            Self::MessageRead { .. } => "messageRead",
            Self::Typing { .. } => "typing",
            Self::Presence { .. } => "presence",
            Self::ConversationCreated(_) => "conversationCreated",
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageReadPayload {
    #[serde(alias = "chatId")]
    conversation_id: String,
    message_id: String,
    user_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypingPayload {
    #[serde(alias = "chatId")]
    conversation_id: String,
    is_typing: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresencePayload {
    user_id: String,
    is_online: Option<bool>,
    status: Option<String>,
}

/// Validate and convert a raw event.
///
/// Returns `Ok(None)` for event names the core does not consume and
/// [`ChatError::MalformedEvent`] when a consumed event is missing required fields.
pub fn parse_inbound(raw: &RawEvent) -> Result<Option<InboundEvent>, ChatError> {
    let event = match raw.name.as_str() {
        "connected" | "connect" | "CONNECT" => InboundEvent::Connected,
        "disconnected" | "disconnect" | "DISCONNECT" => InboundEvent::Disconnected,
        "channelError" | "error" | "ERROR" => InboundEvent::ChannelError {
            reason: error_reason(&raw.payload),
        },
        "newMessage" | "receive_message" | "NEW_MESSAGE" => {
            let message: Message = decode("newMessage", &raw.payload)?;
            check_id("newMessage", "id", &message.id)?;
            check_id("newMessage", "conversationId", &message.conversation_id)?;
            check_id("newMessage", "senderId", &message.sender_id)?;
            InboundEvent::NewMessage(message)
        }
        "messageRead" | "messages_read" => {
            let p: MessageReadPayload = decode("messageRead", &raw.payload)?;
            check_id("messageRead", "conversationId", &p.conversation_id)?;
            check_id("messageRead", "messageId", &p.message_id)?;
            check_id("messageRead", "userId", &p.user_id)?;
            InboundEvent::MessageRead {
                conversation_id: p.conversation_id,
                message_id: p.message_id,
                user_id: p.user_id,
            }
        }
        "typing" | "user_typing" => {
            let p: TypingPayload = decode("typing", &raw.payload)?;
            check_id("typing", "conversationId", &p.conversation_id)?;
            InboundEvent::Typing {
                conversation_id: p.conversation_id,
                is_typing: p.is_typing,
            }
        }
        "presence" | "user_status_update" => {
            let p: PresencePayload = decode("presence", &raw.payload)?;
            check_id("presence", "userId", &p.user_id)?;
            let is_online = match (p.is_online, p.status.as_deref()) {
                (Some(online), _) => online,
                (None, Some("online")) => true,
                (None, Some("offline")) => false,
                (None, Some(other)) => {
                    return Err(ChatError::malformed(
                        "presence",
                        format!("unknown status {other:?}"),
                    ))
                }
                (None, None) => {
                    return Err(ChatError::malformed(
                        "presence",
                        "missing `isOnline` or `status`",
                    ))
                }
            };
            InboundEvent::Presence {
                user_id: p.user_id,
                is_online,
            }
        }
        "conversationCreated" | "new_conversation" => {
            let conversation: Conversation = decode("conversationCreated", &raw.payload)?;
            check_id("conversationCreated", "id", &conversation.id)?;
            InboundEvent::ConversationCreated(conversation)
        }
        _ => return Ok(None),
    };
    Ok(Some(event))
}

fn decode<T: serde::de::DeserializeOwned>(kind: &str, payload: &Value) -> Result<T, ChatError> {
    T::deserialize(payload).map_err(|e| ChatError::malformed(kind, e.to_string()))
}

fn check_id(kind: &str, field: &str, value: &str) -> Result<(), ChatError> {
    validate_id(field, value).map_err(|e| ChatError::malformed(kind, e.to_string()))
}

fn error_reason(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("reason")
            .or_else(|| map.get("message"))
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .unwrap_or_else(|| payload.to_string()),
        Value::Null => "unknown".to_string(),
        other => other.to_string(),
    }
}

/// Encode an outbound action as the channel's `(event name, payload)`.
pub fn encode_outbound(event: &OutboundEvent) -> (&'static str, Value) {
    match event {
        OutboundEvent::JoinConversation { conversation_id } => {
            ("join_chat", json!({ "conversationId": conversation_id }))
        }
        OutboundEvent::LeaveConversation { conversation_id } => {
            ("leave_chat", json!({ "conversationId": conversation_id }))
        }
        OutboundEvent::MarkRead {
            conversation_id,
            message_id,
            user_id,
        } => (
            "mark_read",
            json!({
                "conversationId": conversation_id,
                "messageId": message_id,
                "userId": user_id,
            }),
        ),
        OutboundEvent::Typing {
            conversation_id,
            counterpart_id,
            is_typing,
        } => (
            "typing",
            json!({
                "conversationId": conversation_id,
                "counterpartId": counterpart_id,
                "isTyping": is_typing,
            }),
        ),
        OutboundEvent::SendMessage {
            conversation_id,
            message,
        } => (
            "send_message",
            json!({ "conversationId": conversation_id, "message": message }),
        ),
    }
}
