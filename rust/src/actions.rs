#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    // Conversation list
    ListConversations {
        page: u32,
        include_archived: bool,
    },
    CreateConversation {
        participant_id: String,
    },
    RefreshConversation {
        chat_id: String,
    },
    SetArchived {
        chat_id: String,
        archived: bool,
    },
    DeleteConversation {
        chat_id: String,
    },

    // Open conversation
    OpenChat {
        chat_id: String,
    },
    CloseChat,
    /// The top sentinel of the message list scrolled into view. `anchor_message_id` is the
    /// message currently at the top of the viewport.
    TopSentinelVisible {
        chat_id: String,
        anchor_message_id: Option<String>,
    },
    ScrolledToNewest {
        chat_id: String,
    },
    BottomVisibilityChanged {
        chat_id: String,
        visible: bool,
    },

    // Messages
    SendMessage {
        chat_id: String,
        text: String,
    },
    DeleteMessage {
        chat_id: String,
        message_id: String,
    },
    InputChanged {
        chat_id: String,
    },
    InputBlurred {
        chat_id: String,
    },

    // Blocking
    BlockUser {
        chat_id: String,
    },
    UnblockUser {
        chat_id: String,
    },
    FetchBlockStatus {
        chat_id: String,
    },

    // UI
    ClearError,

    // Session
    Logout,
}

impl AppAction {
    /// Log-safe action tag (never includes message text).
    pub fn tag(&self) -> &'static str {
        match self {
            // Conversation list
            AppAction::ListConversations { .. } => "ListConversations",
            AppAction::CreateConversation { .. } => "CreateConversation",
            AppAction::RefreshConversation { .. } => "RefreshConversation",
            AppAction::SetArchived { .. } => "SetArchived",
            AppAction::DeleteConversation { .. } => "DeleteConversation",

            // Open conversation
            AppAction::OpenChat { .. } => "OpenChat",
            AppAction::CloseChat => "CloseChat",
            AppAction::TopSentinelVisible { .. } => "TopSentinelVisible",
            AppAction::ScrolledToNewest { .. } => "ScrolledToNewest",
            AppAction::BottomVisibilityChanged { .. } => "BottomVisibilityChanged",

            // Messages
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::DeleteMessage { .. } => "DeleteMessage",
            AppAction::InputChanged { .. } => "InputChanged",
            AppAction::InputBlurred { .. } => "InputBlurred",

            // Blocking
            AppAction::BlockUser { .. } => "BlockUser",
            AppAction::UnblockUser { .. } => "UnblockUser",
            AppAction::FetchBlockStatus { .. } => "FetchBlockStatus",

            // UI
            AppAction::ClearError => "ClearError",

            // Session
            AppAction::Logout => "Logout",
        }
    }
}
