use crate::dispatcher::RawEvent;
use crate::error::ChatError;
use crate::model::{BlockStatus, Conversation, Message};
use crate::state::AppState;
use crate::transport::{BlockResult, ConversationPage};
use crate::AppAction;

#[derive(Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Inbound(RawEvent),
    Internal(Box<InternalEvent>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypingTimer {
    /// Local input went idle; emit typing-stop.
    LocalIdle,
    /// No stop event arrived for the counterpart's typing indicator.
    RemoteExpiry,
}

/// Async completions. Each carries the context it was issued for so the actor can drop it
/// when that context is gone.
#[derive(Debug)]
pub enum InternalEvent {
    // Conversation list
    ConversationsListed {
        token: u64,
        page: u32,
        page_size: u32,
        include_archived: bool,
        result: Result<ConversationPage, ChatError>,
    },
    ConversationCreated {
        session: u64,
        participant_id: String,
        result: Result<Conversation, ChatError>,
    },
    ConversationRefreshed {
        chat_id: String,
        result: Result<Conversation, ChatError>,
    },
    ArchiveUpdated {
        chat_id: String,
        archived: bool,
        result: Result<Conversation, ChatError>,
    },
    ConversationDeleted {
        chat_id: String,
        result: Result<(), ChatError>,
    },

    // Open conversation
    InitialPageLoaded {
        chat_id: String,
        open_token: u64,
        result: Result<Vec<Message>, ChatError>,
    },
    OlderPageLoaded {
        chat_id: String,
        open_token: u64,
        skip: u32,
        result: Result<Vec<Message>, ChatError>,
    },

    // Messages
    MessageSent {
        chat_id: String,
        result: Result<Message, ChatError>,
    },
    MessageDeleted {
        chat_id: String,
        message_id: String,
        result: Result<(), ChatError>,
    },

    // Blocking
    BlockStatusFetched {
        chat_id: String,
        result: Result<BlockStatus, ChatError>,
    },
    BlockUpdated {
        chat_id: String,
        blocked: bool,
        result: Result<BlockResult, ChatError>,
    },

    TypingTimerFired {
        kind: TypingTimer,
        chat_id: String,
        generation: u64,
    },
}
