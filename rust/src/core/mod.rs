mod config;
mod requests;
mod sync;
mod typing;

#[cfg(test)]
mod test_support;

pub use config::{default_app_config_json, load_app_config, AppConfig};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use anyhow::Context;
use flume::Sender;

use crate::actions::AppAction;
use crate::conversations::ConversationStore;
use crate::dispatcher::{encode_outbound, parse_inbound, InboundEvent, RawEvent};
use crate::error::ChatError;
use crate::model::{validate_id, Conversation, MessageContent, MessageStatus};
use crate::presentation;
use crate::state::{AppState, BusyState, ConnectionStatus};
use crate::timeline::TimelineStore;
use crate::transport::{
    BlockResult, ConversationPage, ConversationPatch, CreateConversationRequest, CredentialProvider,
    EventChannel, ListConversationsQuery, OutboundEvent, RequestChannel, SendMessageRequest,
    Transports,
};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

pub struct AppCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    config: AppConfig,
    runtime: tokio::runtime::Runtime,

    requests: Arc<dyn RequestChannel>,
    events: Arc<dyn EventChannel>,
    credentials: Arc<dyn CredentialProvider>,

    conversations: ConversationStore,
    timelines: TimelineStore,

    open: Option<sync::OpenChat>,
    // Bumped per open cycle; page completions carrying an older token are stale.
    open_token: u64,
    // Bumped per conversation-list request; only the latest one applies.
    list_token: u64,
    // Bumped on logout.
    session: u64,

    // Message ids already marked read, per conversation.
    marked_read: HashMap<String, HashSet<String>>,
    typing: typing::TypingTimers,
    sends_in_flight: u32,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        config: AppConfig,
        shared_state: Arc<RwLock<AppState>>,
        transports: Transports,
    ) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .build()
            .context("build tokio runtime")?;

        let conversations = ConversationStore::new(config.conversation_page_size);
        let this = Self {
            state: AppState::empty(),
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            requests: transports.requests,
            events: transports.events,
            credentials: transports.credentials,
            conversations,
            timelines: TimelineStore::new(),
            open: None,
            open_token: 0,
            list_token: 0,
            session: 0,
            marked_read: HashMap::new(),
            typing: typing::TypingTimers::default(),
            sends_in_flight: 0,
        };

        // Ensure ChatApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        Ok(this)
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    /// Rebuild the derived view records from the stores.
    fn project_views(&mut self) {
        self.state.chat_list = presentation::chat_summaries(&self.conversations);
        self.state.chat_list_has_more = self
            .conversations
            .cursor()
            .has_more(self.conversations.iter().count());
        let me = self.local_user_id();
        self.state.current_chat = self.open.as_ref().map(|open| {
            presentation::chat_view(
                &self.conversations,
                &self.timelines,
                &open.snapshot(),
                me.as_deref(),
            )
        });
    }

    fn set_busy(&mut self, f: impl FnOnce(&mut BusyState)) {
        f(&mut self.state.busy);
    }

    fn local_user_id(&self) -> Option<String> {
        self.credentials.current_user().map(|u| u.id)
    }

    fn counterpart_of(&self, chat_id: &str) -> Option<String> {
        if let Some(open) = self.open.as_ref().filter(|o| o.chat_id == chat_id) {
            return Some(open.counterpart_id.clone());
        }
        self.conversations
            .get(chat_id)
            .map(|c| c.other_participant.id.clone())
            .filter(|id| !id.is_empty())
    }

    fn emit_outbound(&self, event: OutboundEvent) {
        let (name, payload) = encode_outbound(&event);
        tracing::debug!(event = name, chat_id = event.conversation_id(), "emit");
        self.events.emit(name, payload);
    }

    fn discard_stale(&self, context: String) {
        let err = ChatError::StaleResponseDiscarded { context };
        tracing::debug!(%err, "dropping response");
    }

    fn report(&mut self, context: &'static str, err: ChatError) {
        match &err {
            ChatError::InvalidArgument(_) => tracing::error!(context, %err, "rejected"),
            _ => tracing::warn!(context, %err, "failed"),
        }
        self.state.error = Some(err.to_string());
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        let before = self.state.clone();
        match msg {
            CoreMsg::Action(action) => {
                // Never log `?action` directly: it can carry message text.
                let tag = action.tag();
                tracing::info!(action = tag, "dispatch");
                if let Err(e) = self.handle_action(action) {
                    self.report(tag, e);
                }
            }
            CoreMsg::Inbound(raw) => self.handle_raw_event(raw),
            CoreMsg::Internal(internal) => {
                if let Err(e) = self.handle_internal(*internal) {
                    self.report("completion", e);
                }
            }
        }
        self.project_views();
        if self.state != before {
            self.emit_state();
        }
    }

    fn handle_raw_event(&mut self, raw: RawEvent) {
        let event = match parse_inbound(&raw) {
            Ok(Some(event)) => event,
            Ok(None) => {
                tracing::debug!(event = %raw.name, "ignoring unhandled event");
                return;
            }
            Err(e) => {
                tracing::warn!(event = %raw.name, %e, "dropping malformed event");
                return;
            }
        };
        let tag = event.tag();
        // Background traffic: failures are logged, never surfaced as a user error.
        if let Err(e) = self.handle_inbound(event) {
            tracing::warn!(event = tag, %e, "inbound event not applied");
        }
    }

    fn handle_inbound(&mut self, event: InboundEvent) -> Result<(), ChatError> {
        tracing::debug!(event = event.tag(), "inbound");
        match event {
            InboundEvent::Connected => {
                self.state.connection = ConnectionStatus::Connected;
                self.rejoin_open_room();
            }
            InboundEvent::Disconnected => {
                self.state.connection = ConnectionStatus::Disconnected;
            }
            InboundEvent::ChannelError { reason } => {
                tracing::warn!(%reason, "event channel error");
                self.state.connection = ConnectionStatus::Error { reason };
            }
            InboundEvent::NewMessage(message) => self.on_new_message(message)?,
            InboundEvent::MessageRead {
                conversation_id,
                message_id,
                user_id,
            } => {
                let changed =
                    self.timelines
                        .update_status(&conversation_id, &message_id, MessageStatus::Seen)?;
                tracing::debug!(
                    chat_id = %conversation_id,
                    message_id = %message_id,
                    reader = %user_id,
                    changed,
                    "message read"
                );
            }
            InboundEvent::Typing {
                conversation_id,
                is_typing,
            } => self.handle_remote_typing(&conversation_id, is_typing)?,
            InboundEvent::Presence { user_id, is_online } => {
                self.conversations.set_presence(&user_id, is_online)?
            }
            InboundEvent::ConversationCreated(conversation) => {
                self.conversations.insert_front(conversation)?
            }
        }
        Ok(())
    }

    fn handle_action(&mut self, action: AppAction) -> Result<(), ChatError> {
        match action {
            // Conversation list
            AppAction::ListConversations {
                page,
                include_archived,
            } => self.list_conversations(page, include_archived),
            AppAction::CreateConversation { participant_id } => {
                self.create_conversation(participant_id)
            }
            AppAction::RefreshConversation { chat_id } => self.refresh_conversation(chat_id),
            AppAction::SetArchived { chat_id, archived } => self.set_archived(chat_id, archived),
            AppAction::DeleteConversation { chat_id } => self.delete_conversation(chat_id),

            // Open conversation
            AppAction::OpenChat { chat_id } => self.open_chat(&chat_id),
            AppAction::CloseChat => {
                self.close_chat();
                Ok(())
            }
            AppAction::TopSentinelVisible {
                chat_id,
                anchor_message_id,
            } => self.load_older(&chat_id, anchor_message_id),
            AppAction::ScrolledToNewest { chat_id } => self.scrolled_to_newest(&chat_id),
            AppAction::BottomVisibilityChanged { chat_id, visible } => {
                self.set_bottom_visible(&chat_id, visible)
            }

            // Messages
            AppAction::SendMessage { chat_id, text } => self.send_message(chat_id, text),
            AppAction::DeleteMessage {
                chat_id,
                message_id,
            } => self.delete_message(chat_id, message_id),
            AppAction::InputChanged { chat_id } => self.handle_input_changed(&chat_id),
            AppAction::InputBlurred { chat_id } => {
                validate_id("conversation id", &chat_id)?;
                self.stop_local_typing(&chat_id);
                Ok(())
            }

            // Blocking
            AppAction::BlockUser { chat_id } => self.update_block(chat_id, true),
            AppAction::UnblockUser { chat_id } => self.update_block(chat_id, false),
            AppAction::FetchBlockStatus { chat_id } => {
                validate_id("conversation id", &chat_id)?;
                self.conversations.invalidate_block_status(&chat_id);
                if let Some(open) = self.open.as_mut().filter(|o| o.chat_id == chat_id) {
                    open.block_status_loading = true;
                }
                self.request_block_status(&chat_id);
                Ok(())
            }

            // UI
            AppAction::ClearError => {
                self.state.error = None;
                self.conversations.set_error(None);
                if let Some(open) = self.open.as_mut() {
                    open.error = None;
                }
                Ok(())
            }

            // Session
            AppAction::Logout => {
                self.logout();
                Ok(())
            }
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) -> Result<(), ChatError> {
        match internal {
            InternalEvent::ConversationsListed {
                token,
                page,
                page_size,
                include_archived,
                result,
            } => {
                // Ignore superseded list requests.
                if token != self.list_token {
                    self.discard_stale(format!("conversation page {page} (list #{token})"));
                    return Ok(());
                }
                self.set_busy(|b| b.loading_chat_list = false);
                match result {
                    Ok(ConversationPage { items, total }) => {
                        self.conversations
                            .replace_page(page, page_size, include_archived, items, total)?;
                        self.conversations.set_error(None);
                    }
                    Err(e) => {
                        let message = format!("failed to load conversations: {e}");
                        self.conversations.set_error(Some(message.clone()));
                        self.state.error = Some(message);
                    }
                }
            }
            InternalEvent::ConversationCreated {
                session,
                participant_id,
                result,
            } => {
                if session != self.session {
                    self.discard_stale(format!("conversation with {participant_id}"));
                    return Ok(());
                }
                self.set_busy(|b| b.creating_chat = false);
                match result {
                    Ok(conversation) => {
                        let chat_id = conversation.id.clone();
                        self.conversations.insert_front(conversation)?;
                        self.open_chat(&chat_id)?;
                    }
                    Err(e) => self.state.error = Some(format!("failed to start conversation: {e}")),
                }
            }
            InternalEvent::ConversationRefreshed { chat_id, result } => match result {
                Ok(conversation) => self.apply_server_copy(&chat_id, conversation)?,
                Err(e) => self.state.error = Some(format!("failed to refresh conversation: {e}")),
            },
            InternalEvent::ArchiveUpdated {
                chat_id,
                archived,
                result,
            } => match result {
                Ok(conversation) => {
                    self.apply_server_copy(&chat_id, conversation)?;
                    self.conversations.set_archived(&chat_id, archived)?;
                }
                Err(e) => self.state.error = Some(format!("failed to update conversation: {e}")),
            },
            InternalEvent::ConversationDeleted { chat_id, result } => match result {
                Ok(()) => {
                    if self.open.as_ref().is_some_and(|o| o.chat_id == chat_id) {
                        self.close_chat();
                    }
                    self.typing.cancel_chat(&chat_id);
                    self.timelines.clear(&chat_id)?;
                    self.marked_read.remove(&chat_id);
                    self.conversations.remove(&chat_id)?;
                }
                Err(e) => self.state.error = Some(format!("failed to delete conversation: {e}")),
            },
            InternalEvent::InitialPageLoaded {
                chat_id,
                open_token,
                result,
            } => self.on_initial_page(chat_id, open_token, result)?,
            InternalEvent::OlderPageLoaded {
                chat_id,
                open_token,
                skip,
                result,
            } => self.on_older_page(chat_id, open_token, skip, result)?,
            InternalEvent::MessageSent { chat_id, result } => {
                self.sends_in_flight = self.sends_in_flight.saturating_sub(1);
                let sending = self.sends_in_flight > 0;
                self.set_busy(|b| b.sending_message = sending);
                match result {
                    Ok(message) => self.on_message_sent(&chat_id, message)?,
                    Err(e) => self.state.error = Some(format!("failed to send message: {e}")),
                }
            }
            InternalEvent::MessageDeleted {
                chat_id,
                message_id,
                result,
            } => match result {
                Ok(()) => {
                    let affected = self.timelines.remove_message(&message_id)?;
                    for id in &affected {
                        if let Some(marked) = self.marked_read.get_mut(id) {
                            marked.remove(&message_id);
                        }
                    }
                    tracing::debug!(chat_id = %chat_id, message_id = %message_id, ?affected, "message deleted");
                }
                Err(e) => self.state.error = Some(format!("failed to delete message: {e}")),
            },
            InternalEvent::BlockStatusFetched { chat_id, result } => {
                self.on_block_status(&chat_id, result)?
            }
            InternalEvent::BlockUpdated {
                chat_id,
                blocked,
                result,
            } => {
                self.set_busy(|b| b.updating_block = false);
                match result {
                    Ok(BlockResult {
                        conversation,
                        block_status,
                    }) => {
                        self.apply_server_copy(&chat_id, conversation)?;
                        self.conversations.set_block_status(&chat_id, block_status)?;
                    }
                    Err(e) => {
                        let verb = if blocked { "block" } else { "unblock" };
                        self.state.error = Some(format!("failed to {verb} user: {e}"));
                    }
                }
            }
            InternalEvent::TypingTimerFired {
                kind,
                chat_id,
                generation,
            } => self.handle_typing_timer(kind, &chat_id, generation)?,
        }
        Ok(())
    }

    /// Replace a held conversation with the server's copy. Conversations that are no longer
    /// held (deleted, or logged out since the request) are left alone.
    fn apply_server_copy(
        &mut self,
        chat_id: &str,
        conversation: Conversation,
    ) -> Result<(), ChatError> {
        if conversation.id != chat_id {
            return Err(ChatError::InvalidArgument(format!(
                "server returned conversation {} for {chat_id}",
                conversation.id
            )));
        }
        if !self.conversations.contains(chat_id) {
            self.discard_stale(format!("conversation {chat_id} is no longer held"));
            return Ok(());
        }
        self.conversations.upsert(conversation)
    }

    fn list_conversations(&mut self, page: u32, include_archived: bool) -> Result<(), ChatError> {
        self.list_token += 1;
        let token = self.list_token;
        let page_size = self.config.conversation_page_size;
        let query = ListConversationsQuery {
            skip: page.saturating_mul(page_size),
            limit: page_size,
            include_archived,
        };
        self.set_busy(|b| b.loading_chat_list = true);

        let requests = self.requests.clone();
        self.spawn_request(
            "listConversations",
            async move { requests.list_conversations(query).await },
            move |result| InternalEvent::ConversationsListed {
                token,
                page,
                page_size,
                include_archived,
                result,
            },
        );
        Ok(())
    }

    fn create_conversation(&mut self, participant_id: String) -> Result<(), ChatError> {
        validate_id("participant id", &participant_id)?;
        self.set_busy(|b| b.creating_chat = true);

        let requests = self.requests.clone();
        let session = self.session;
        let payload = CreateConversationRequest {
            participant_id: participant_id.clone(),
        };
        self.spawn_request(
            "createConversation",
            async move { requests.create_conversation(payload).await },
            move |result| InternalEvent::ConversationCreated {
                session,
                participant_id,
                result,
            },
        );
        Ok(())
    }

    fn refresh_conversation(&mut self, chat_id: String) -> Result<(), ChatError> {
        validate_id("conversation id", &chat_id)?;
        let requests = self.requests.clone();
        let id = chat_id.clone();
        self.spawn_request(
            "getConversation",
            async move { requests.get_conversation(&id).await },
            move |result| InternalEvent::ConversationRefreshed { chat_id, result },
        );
        Ok(())
    }

    fn set_archived(&mut self, chat_id: String, archived: bool) -> Result<(), ChatError> {
        validate_id("conversation id", &chat_id)?;
        let requests = self.requests.clone();
        let id = chat_id.clone();
        let patch = ConversationPatch {
            is_archived: Some(archived),
        };
        self.spawn_request(
            "updateConversation",
            async move { requests.update_conversation(&id, patch).await },
            move |result| InternalEvent::ArchiveUpdated {
                chat_id,
                archived,
                result,
            },
        );
        Ok(())
    }

    fn delete_conversation(&mut self, chat_id: String) -> Result<(), ChatError> {
        validate_id("conversation id", &chat_id)?;
        let requests = self.requests.clone();
        let id = chat_id.clone();
        self.spawn_request(
            "deleteConversation",
            async move { requests.delete_conversation(&id).await },
            move |result| InternalEvent::ConversationDeleted { chat_id, result },
        );
        Ok(())
    }

    fn send_message(&mut self, chat_id: String, text: String) -> Result<(), ChatError> {
        validate_id("conversation id", &chat_id)?;
        if text.trim().is_empty() {
            return Ok(());
        }
        if let Some(status) = self.conversations.block_status(&chat_id) {
            if !status.can_send_messages {
                self.state.error = Some("you can't send messages in this conversation".into());
                return Ok(());
            }
        }
        let counterpart_id = self.counterpart_of(&chat_id).ok_or_else(|| {
            ChatError::InvalidArgument(format!("unknown conversation {chat_id}"))
        })?;
        self.stop_local_typing(&chat_id);
        self.sends_in_flight += 1;
        self.set_busy(|b| b.sending_message = true);

        let requests = self.requests.clone();
        let request = SendMessageRequest {
            conversation_id: chat_id.clone(),
            content: MessageContent::text(text),
            counterpart_id,
        };
        self.spawn_request(
            "sendMessage",
            async move { requests.send_message(request).await },
            move |result| InternalEvent::MessageSent { chat_id, result },
        );
        Ok(())
    }

    fn delete_message(&mut self, chat_id: String, message_id: String) -> Result<(), ChatError> {
        validate_id("conversation id", &chat_id)?;
        validate_id("message id", &message_id)?;
        let requests = self.requests.clone();
        let id = message_id.clone();
        self.spawn_request(
            "deleteMessage",
            async move { requests.delete_message(&id).await },
            move |result| InternalEvent::MessageDeleted {
                chat_id,
                message_id,
                result,
            },
        );
        Ok(())
    }

    fn update_block(&mut self, chat_id: String, block: bool) -> Result<(), ChatError> {
        validate_id("conversation id", &chat_id)?;
        let target = self.counterpart_of(&chat_id).ok_or_else(|| {
            ChatError::InvalidArgument(format!("unknown conversation {chat_id}"))
        })?;
        self.set_busy(|b| b.updating_block = true);

        let requests = self.requests.clone();
        let id = chat_id.clone();
        self.spawn_request(
            if block { "setBlock" } else { "clearBlock" },
            async move {
                if block {
                    requests.set_block(&id, &target).await
                } else {
                    requests.clear_block(&id, &target).await
                }
            },
            move |result| InternalEvent::BlockUpdated {
                chat_id,
                blocked: block,
                result,
            },
        );
        Ok(())
    }

    fn logout(&mut self) {
        self.close_chat();
        self.credentials.clear_session();
        self.typing.cancel_all();
        self.timelines.clear_all();
        self.conversations.reset();
        self.marked_read.clear();
        // Every completion still in flight belongs to the old session.
        self.open_token += 1;
        self.list_token += 1;
        self.session += 1;
        self.sends_in_flight = 0;
        self.state.busy = BusyState::idle();
        self.state.error = None;
        tracing::info!("logged out");
    }
}
