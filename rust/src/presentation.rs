//! Presentation adapter: pure projections from the stores into the view records in
//! [`crate::state`]. No side effects, no network.

use crate::conversations::ConversationStore;
use crate::model::{BlockStatus, Conversation, Message};
use crate::state::{BlockBanner, ChatMessage, ChatSummary, ChatViewState, ScrollDirective, SyncPhase};
use crate::timeline::TimelineStore;

pub const DELETED_MESSAGE_TEXT: &str = "This message was deleted";

/// The sync engine's per-conversation view inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSnapshot {
    pub chat_id: String,
    pub phase: SyncPhase,
    pub has_more: bool,
    pub scroll: Option<ScrollDirective>,
    pub error: Option<String>,
    pub block_status_loading: bool,
}

/// Conversation list rows, newest activity first. Archived conversations are hidden unless
/// the list cursor includes them.
pub fn chat_summaries(store: &ConversationStore) -> Vec<ChatSummary> {
    let include_archived = store.cursor().include_archived;
    let mut list: Vec<ChatSummary> = store
        .iter()
        .filter(|c| include_archived || !c.is_archived)
        .map(|c| chat_summary(store, c))
        .collect();
    list.sort_by_key(|c| std::cmp::Reverse(c.last_activity_at_ms.unwrap_or(0)));
    list
}

fn chat_summary(store: &ConversationStore, c: &Conversation) -> ChatSummary {
    ChatSummary {
        chat_id: c.id.clone(),
        participant_id: c.other_participant.id.clone(),
        participant_name: c.other_participant.display_name.clone(),
        avatar_url: c.other_participant.avatar_url.clone(),
        is_online: online(c),
        last_message: c.last_message_preview.clone(),
        last_activity_at_ms: c.last_activity_at.map(|t| t.timestamp_millis()),
        unread_count: c.unread_count,
        is_archived: c.is_archived,
        is_typing: store.is_typing(&c.id),
    }
}

pub fn chat_view(
    conversations: &ConversationStore,
    timelines: &TimelineStore,
    sync: &SyncSnapshot,
    local_user_id: Option<&str>,
) -> ChatViewState {
    let conversation = conversations.get(&sync.chat_id);
    let participant_id = conversation
        .map(|c| c.other_participant.id.clone())
        .unwrap_or_default();
    let participant_name = conversation
        .map(|c| c.other_participant.display_name.clone())
        .unwrap_or_default();

    let messages: Vec<ChatMessage> = timelines
        .get_ordered(&sync.chat_id)
        .map(|it| it.map(|m| chat_message(m, local_user_id)).collect())
        .unwrap_or_default();

    let block_status = conversations.block_status(&sync.chat_id);
    let banner = block_banner(block_status, sync.block_status_loading, &participant_name);
    let can_send = block_status.map(|s| s.can_send_messages).unwrap_or(true)
        && !sync.block_status_loading;

    let typing_indicator = conversations
        .is_typing(&sync.chat_id)
        .then(|| typing_text(&participant_name));

    ChatViewState {
        chat_id: sync.chat_id.clone(),
        participant_id,
        is_online: conversation.map(online).unwrap_or(false),
        participant_name,
        phase: sync.phase,
        messages,
        show_load_more_spinner: sync.phase == SyncPhase::LoadingOlder,
        has_more: sync.has_more,
        no_more_messages: !sync.has_more && sync.phase != SyncPhase::InitialLoading,
        typing_indicator,
        banner,
        can_send,
        scroll: sync.scroll.clone(),
        error: sync.error.clone(),
    }
}

pub fn chat_message(m: &Message, local_user_id: Option<&str>) -> ChatMessage {
    ChatMessage {
        id: m.id.clone(),
        sender_id: m.sender_id.clone(),
        display_text: if m.is_deleted {
            DELETED_MESSAGE_TEXT.to_string()
        } else {
            m.content.text.clone()
        },
        timestamp_ms: m.created_at.timestamp_millis(),
        is_mine: local_user_id == Some(m.sender_id.as_str()),
        status: m.status,
        is_deleted: m.is_deleted,
    }
}

pub fn typing_text(participant_name: &str) -> String {
    if participant_name.is_empty() {
        "typing...".to_string()
    } else {
        format!("{participant_name} is typing...")
    }
}

pub fn block_banner(
    status: Option<BlockStatus>,
    loading: bool,
    participant_name: &str,
) -> BlockBanner {
    if loading {
        return BlockBanner::Loading;
    }
    match status {
        Some(s) if s.blocked_by_me => BlockBanner::BlockedByMe {
            participant_name: participant_name.to_string(),
        },
        Some(s) if s.blocked_by_other => BlockBanner::BlockedByOther {
            participant_name: participant_name.to_string(),
        },
        Some(s) if !s.can_send_messages => BlockBanner::CannotSend,
        _ => BlockBanner::None,
    }
}

// Participants can hide their presence from others.
fn online(c: &Conversation) -> bool {
    c.other_participant.is_online && !c.other_participant.hide_online_status
}
