use crate::model::MessageStatus;

/// Snapshot handed to the UI after every state change. `rev` increases by one per snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct AppState {
    pub rev: u64,
    pub connection: ConnectionStatus,
    pub busy: BusyState,
    pub chat_list: Vec<ChatSummary>,
    pub chat_list_has_more: bool,
    pub current_chat: Option<ChatViewState>,
    pub error: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            connection: ConnectionStatus::Connecting,
            busy: BusyState::idle(),
            chat_list: vec![],
            chat_list_has_more: false,
            current_chat: None,
            error: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error { reason: String },
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// "In flight" flags for operations the UI should reflect with a spinner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusyState {
    pub loading_chat_list: bool,
    pub creating_chat: bool,
    pub sending_message: bool,
    pub updating_block: bool,
}

impl BusyState {
    pub fn idle() -> Self {
        Self {
            loading_chat_list: false,
            creating_chat: false,
            sending_message: false,
            updating_block: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatSummary {
    pub chat_id: String,
    pub participant_id: String,
    pub participant_name: String,
    pub avatar_url: Option<String>,
    pub is_online: bool,
    pub last_message: Option<String>,
    pub last_activity_at_ms: Option<i64>,
    pub unread_count: u32,
    pub is_archived: bool,
    pub is_typing: bool,
}

/// Lifecycle of the open conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    Idle,
    InitialLoading,
    Ready,
    LoadingOlder,
    Closed,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::InitialLoading => "initial_loading",
            Self::Ready => "ready",
            Self::LoadingOlder => "loading_older",
            Self::Closed => "closed",
        }
    }

    /// Whether live events for the conversation are applied to its timeline.
    pub fn accepts_events(&self) -> bool {
        matches!(self, Self::InitialLoading | Self::Ready | Self::LoadingOlder)
    }
}

/// A one-shot instruction for the message list viewport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScrollDirective {
    ToNewest {
        smooth: bool,
    },
    /// Keep `anchor_message_id` on screen with `target_message_id` (a newly loaded message a
    /// few rows above it) at the top of the viewport.
    RevealAbove {
        anchor_message_id: String,
        target_message_id: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockBanner {
    None,
    Loading,
    BlockedByMe { participant_name: String },
    BlockedByOther { participant_name: String },
    CannotSend,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatViewState {
    pub chat_id: String,
    pub participant_id: String,
    pub participant_name: String,
    pub is_online: bool,
    pub phase: SyncPhase,
    pub messages: Vec<ChatMessage>,
    pub show_load_more_spinner: bool,
    pub has_more: bool,
    pub no_more_messages: bool,
    pub typing_indicator: Option<String>,
    pub banner: BlockBanner,
    pub can_send: bool,
    pub scroll: Option<ScrollDirective>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub display_text: String,
    pub timestamp_ms: i64,
    pub is_mine: bool,
    pub status: MessageStatus,
    pub is_deleted: bool,
}
