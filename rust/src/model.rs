//! Domain types shared by the stores, the transports and the event dispatcher.
//!
//! Field names follow the server's JSON (camelCase, Mongo-style `_id` accepted as an alias), so
//! the same types are used for request/response payloads and for realtime events.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Delivery status of a message.
///
/// The variant order is the delivery order: `Sent < Delivered < Seen`. A message's status only
/// ever moves forward, see [`MessageStatus::advance`].
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    #[serde(alias = "Sent", alias = "SENT")]
    Sent,
    #[serde(alias = "Delivered", alias = "DELIVERED")]
    Delivered,
    #[serde(alias = "Seen", alias = "SEEN", alias = "read")]
    Seen,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Seen => "seen",
        }
    }

    /// Move to `next` if it is later than the current status. Returns whether it changed.
    pub fn advance(&mut self, next: MessageStatus) -> bool {
        match (*self, next) {
            (Self::Sent, Self::Delivered | Self::Seen) | (Self::Delivered, Self::Seen) => {
                *self = next;
                true
            }
            (Self::Sent, Self::Sent)
            | (Self::Delivered, Self::Sent | Self::Delivered)
            | (Self::Seen, _) => false,
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageContent {
    pub text: String,
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(alias = "chatId")]
    pub conversation_id: String,
    pub sender_id: String,
    pub content: MessageContent,
    #[serde(default)]
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
}

impl Message {
    /// Timeline order: `created_at` ascending, ties broken by `id`.
    pub fn timeline_cmp(&self, other: &Self) -> Ordering {
        Self::compare_timeline_keys(&self.created_at, &self.id, &other.created_at, &other.id)
    }

    pub fn compare_timeline_keys(
        a_created_at: &DateTime<Utc>,
        a_id: &str,
        b_created_at: &DateTime<Utc>,
        b_id: &str,
    ) -> Ordering {
        a_created_at.cmp(b_created_at).then_with(|| a_id.cmp(b_id))
    }
}

/// Summary of the counterpart user, denormalised onto each conversation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default, alias = "username")]
    pub display_name: String,
    #[serde(default, alias = "profilePic")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub hide_online_status: bool,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockStatus {
    #[serde(alias = "isBlockedByMe")]
    pub blocked_by_me: bool,
    #[serde(alias = "isBlockedByOther")]
    pub blocked_by_other: bool,
    pub can_send_messages: bool,
}

impl Default for BlockStatus {
    fn default() -> Self {
        Self::unblocked()
    }
}

impl BlockStatus {
    pub fn unblocked() -> Self {
        Self {
            blocked_by_me: false,
            blocked_by_other: false,
            can_send_messages: true,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked_by_me || self.blocked_by_other
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(alias = "_id")]
    pub id: String,
    pub other_participant: Participant,
    #[serde(default, alias = "lastMessage")]
    pub last_message_preview: Option<String>,
    #[serde(default, alias = "unreadMessagesCount")]
    pub unread_count: u32,
    #[serde(default)]
    pub last_activity_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub block_status: Option<BlockStatus>,
    #[serde(default)]
    pub is_archived: bool,
}

impl Conversation {
    /// Fold a newly merged message into the denormalised preview fields.
    pub fn touch_with(&mut self, message: &Message) {
        self.last_message_preview = Some(message.content.text.clone());
        let newer = self
            .last_activity_at
            .map(|at| message.created_at >= at)
            .unwrap_or(true);
        if newer {
            self.last_activity_at = Some(message.created_at);
        }
    }
}

/// Reject empty or whitespace-bearing identifiers. Used at every store entry point.
pub(crate) fn validate_id(what: &str, id: &str) -> Result<(), ChatError> {
    if id.is_empty() {
        return Err(ChatError::InvalidArgument(format!("{what} must not be empty")));
    }
    if id.chars().any(char::is_whitespace) {
        return Err(ChatError::InvalidArgument(format!(
            "{what} contains whitespace: {id:?}"
        )));
    }
    Ok(())
}
