//! Per-open-conversation sync state machine.
//!
//! `Idle -> InitialLoading -> Ready <-> LoadingOlder`, and `Closed -> Idle` when the selection
//! moves away. Every open cycle gets a fresh token; page completions carry the token (and, for
//! older pages, the skip they were issued with) and are dropped when they no longer match.

use crate::error::ChatError;
use crate::model::{validate_id, BlockStatus, Message, MessageStatus};
use crate::presentation::SyncSnapshot;
use crate::state::{ScrollDirective, SyncPhase};
use crate::transport::{ListMessagesQuery, OutboundEvent};
use crate::updates::InternalEvent;

use super::AppCore;

#[derive(Debug, Clone)]
pub(super) struct OpenChat {
    pub(super) chat_id: String,
    pub(super) counterpart_id: String,
    pub(super) token: u64,
    pub(super) phase: SyncPhase,
    pub(super) has_more: bool,
    pub(super) joined: bool,
    /// Skip of the older-page fetch in flight.
    pub(super) pending_skip: Option<u32>,
    pub(super) anchor: Option<String>,
    pub(super) scroll: Option<ScrollDirective>,
    /// Single-shot: the unread count was reset in this open cycle.
    pub(super) unread_reset_done: bool,
    pub(super) bottom_visible: bool,
    pub(super) block_status_loading: bool,
    pub(super) error: Option<String>,
}

impl OpenChat {
    fn new(chat_id: &str, counterpart_id: String, token: u64) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            counterpart_id,
            token,
            phase: SyncPhase::InitialLoading,
            has_more: false,
            joined: false,
            pending_skip: None,
            anchor: None,
            scroll: None,
            unread_reset_done: false,
            bottom_visible: false,
            block_status_loading: false,
            error: None,
        }
    }

    pub(super) fn is_loaded(&self) -> bool {
        matches!(self.phase, SyncPhase::Ready | SyncPhase::LoadingOlder)
    }

    pub(super) fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            chat_id: self.chat_id.clone(),
            phase: self.phase,
            has_more: self.has_more,
            scroll: self.scroll.clone(),
            error: self.error.clone(),
            block_status_loading: self.block_status_loading,
        }
    }
}

impl AppCore {
    fn open_for(&mut self, chat_id: &str) -> Option<&mut OpenChat> {
        self.open.as_mut().filter(|o| o.chat_id == chat_id)
    }

    fn open_for_token(&mut self, chat_id: &str, token: u64) -> Option<&mut OpenChat> {
        self.open
            .as_mut()
            .filter(|o| o.chat_id == chat_id && o.token == token)
    }

    pub(super) fn open_chat(&mut self, chat_id: &str) -> Result<(), ChatError> {
        validate_id("conversation id", chat_id)?;
        if let Some(open) = self.open.as_ref() {
            if open.chat_id == chat_id && open.phase.accepts_events() {
                tracing::debug!(chat_id = %chat_id, phase = open.phase.as_str(), "already open");
                return Ok(());
            }
        }
        let counterpart_id = self.counterpart_of(chat_id).ok_or_else(|| {
            ChatError::InvalidArgument(format!("unknown conversation {chat_id}"))
        })?;

        self.close_chat();
        self.conversations.select(Some(chat_id))?;
        self.open_token += 1;
        let token = self.open_token;
        let mut open = OpenChat::new(chat_id, counterpart_id.clone(), token);
        if self.conversations.block_status(chat_id).is_none() {
            open.block_status_loading = true;
            self.request_block_status(chat_id);
        }
        self.open = Some(open);
        tracing::info!(chat_id = %chat_id, token, "open chat");

        let requests = self.requests.clone();
        let query = ListMessagesQuery {
            conversation_id: chat_id.to_string(),
            counterpart_id,
            skip: 0,
            limit: self.config.message_page_size,
        };
        let chat_id = chat_id.to_string();
        self.spawn_request(
            "listMessages",
            async move { requests.list_messages(query).await },
            move |result| InternalEvent::InitialPageLoaded {
                chat_id,
                open_token: token,
                result,
            },
        );
        Ok(())
    }

    /// Leave the open conversation, if any. Its typing state is cleared both ways and late
    /// completions for it are dropped by token.
    pub(super) fn close_chat(&mut self) {
        let Some(chat_id) = self.open.as_ref().map(|o| o.chat_id.clone()) else {
            return;
        };
        self.stop_local_typing(&chat_id);
        self.typing.cancel_chat(&chat_id);
        if let Err(e) = self.conversations.set_typing(&chat_id, false) {
            tracing::warn!(chat_id = %chat_id, %e, "clear typing on close");
        }
        let Some(mut open) = self.open.take() else {
            return;
        };
        open.phase = SyncPhase::Closed;
        tracing::info!(chat_id = %chat_id, "close chat");
        if open.joined {
            self.emit_outbound(OutboundEvent::LeaveConversation {
                conversation_id: open.chat_id.clone(),
            });
        }
        self.conversations.clear_selection();
    }

    pub(super) fn on_initial_page(
        &mut self,
        chat_id: String,
        token: u64,
        result: Result<Vec<Message>, ChatError>,
    ) -> Result<(), ChatError> {
        if self.open_for_token(&chat_id, token).is_none() {
            self.discard_stale(format!("initial page of {chat_id} (open #{token})"));
            return Ok(());
        }
        let merged = result.and_then(|page| self.merge_page(&chat_id, page, true));
        let page_size = self.config.message_page_size as usize;
        match merged {
            Ok(fetched) => {
                if let Some(open) = self.open_for_token(&chat_id, token) {
                    open.phase = SyncPhase::Ready;
                    open.has_more = fetched >= page_size;
                    open.scroll = Some(ScrollDirective::ToNewest { smooth: false });
                    open.error = None;
                    open.joined = true;
                }
                tracing::info!(chat_id = %chat_id, fetched, "initial page loaded");
                self.emit_outbound(OutboundEvent::JoinConversation {
                    conversation_id: chat_id,
                });
                self.emit_read_receipts();
            }
            Err(e) => {
                tracing::warn!(chat_id = %chat_id, %e, "initial load failed");
                let message = format!("failed to load messages: {e}");
                if let Some(open) = self.open_for_token(&chat_id, token) {
                    open.phase = SyncPhase::Idle;
                    open.error = Some(message.clone());
                }
                self.conversations.set_error(Some(message.clone()));
                self.state.error = Some(message);
            }
        }
        Ok(())
    }

    /// Scroll-to-top: fetch the next older page unless one is in flight or none remain.
    pub(super) fn load_older(
        &mut self,
        chat_id: &str,
        anchor_message_id: Option<String>,
    ) -> Result<(), ChatError> {
        validate_id("conversation id", chat_id)?;
        let skip = u32::try_from(self.timelines.len(chat_id)).unwrap_or(u32::MAX);
        let limit = self.config.message_page_size;
        let Some(open) = self.open_for(chat_id) else {
            tracing::debug!(chat_id = %chat_id, "load older for a conversation that is not open");
            return Ok(());
        };
        if open.phase != SyncPhase::Ready || !open.has_more {
            tracing::debug!(
                chat_id,
                phase = open.phase.as_str(),
                has_more = open.has_more,
                "load older skipped"
            );
            return Ok(());
        }
        open.phase = SyncPhase::LoadingOlder;
        open.pending_skip = Some(skip);
        open.anchor = anchor_message_id;
        open.scroll = None;
        let token = open.token;
        let query = ListMessagesQuery {
            conversation_id: chat_id.to_string(),
            counterpart_id: open.counterpart_id.clone(),
            skip,
            limit,
        };

        let requests = self.requests.clone();
        let chat_id = chat_id.to_string();
        self.spawn_request(
            "listMessages",
            async move { requests.list_messages(query).await },
            move |result| InternalEvent::OlderPageLoaded {
                chat_id,
                open_token: token,
                skip,
                result,
            },
        );
        Ok(())
    }

    pub(super) fn on_older_page(
        &mut self,
        chat_id: String,
        token: u64,
        skip: u32,
        result: Result<Vec<Message>, ChatError>,
    ) -> Result<(), ChatError> {
        let anchor = match self.open_for_token(&chat_id, token) {
            Some(open)
                if open.phase == SyncPhase::LoadingOlder && open.pending_skip == Some(skip) =>
            {
                open.phase = SyncPhase::Ready;
                open.pending_skip = None;
                open.anchor.take()
            }
            _ => {
                self.discard_stale(format!("older page of {chat_id} at skip {skip}"));
                return Ok(());
            }
        };

        let merged = result.and_then(|page| self.merge_page(&chat_id, page, false));
        match merged {
            Ok(fetched) => {
                let has_more = fetched >= self.config.message_page_size as usize;
                let scroll = if fetched > 0 {
                    anchor.and_then(|a| self.reveal_above(&chat_id, &a))
                } else {
                    None
                };
                if let Some(open) = self.open_for_token(&chat_id, token) {
                    open.has_more = has_more;
                    open.scroll = scroll;
                }
                tracing::debug!(chat_id = %chat_id, skip, fetched, has_more, "older page loaded");
                self.emit_read_receipts();
            }
            // Recovered locally: the spinner stops and `has_more` stays, so scrolling retries.
            Err(e) => tracing::warn!(chat_id = %chat_id, skip, %e, "load older failed"),
        }
        Ok(())
    }

    /// Merge a fetched page into the timeline and return how many messages the server sent.
    /// The first page replaces an empty timeline; anything else is merged.
    fn merge_page(
        &mut self,
        chat_id: &str,
        page: Vec<Message>,
        initial: bool,
    ) -> Result<usize, ChatError> {
        let fetched = page.len();
        let (page, foreign): (Vec<Message>, Vec<Message>) = page
            .into_iter()
            .partition(|m| m.conversation_id == chat_id);
        if !foreign.is_empty() {
            tracing::warn!(
                chat_id,
                dropped = foreign.len(),
                "page contained messages of other conversations"
            );
        }
        if initial && self.timelines.is_empty(chat_id) {
            self.timelines.replace(chat_id, page)?;
        } else {
            self.timelines.prepend_page(chat_id, page)?;
        }
        Ok(fetched)
    }

    /// Directive keeping `anchor` on screen with up to `reveal_above_anchor` newly loaded
    /// messages above it.
    fn reveal_above(&self, chat_id: &str, anchor: &str) -> Option<ScrollDirective> {
        let index = self.timelines.position(chat_id, anchor)?;
        let above = self.config.reveal_above_anchor.min(index);
        if above == 0 {
            return None;
        }
        let target = self.timelines.message_at(chat_id, index - above)?;
        Some(ScrollDirective::RevealAbove {
            anchor_message_id: anchor.to_string(),
            target_message_id: target.id.clone(),
        })
    }

    /// The view finished scrolling to the newest message. The first time this happens after
    /// the initial load of an open cycle, the unread count is reset.
    pub(super) fn scrolled_to_newest(&mut self, chat_id: &str) -> Result<(), ChatError> {
        validate_id("conversation id", chat_id)?;
        let Some(open) = self.open_for(chat_id) else {
            return Ok(());
        };
        open.bottom_visible = true;
        if !open.is_loaded() {
            return Ok(());
        }
        if matches!(open.scroll, Some(ScrollDirective::ToNewest { .. })) {
            open.scroll = None;
        }
        if open.unread_reset_done {
            return Ok(());
        }
        open.unread_reset_done = true;
        self.conversations.reset_unread(chat_id)?;
        tracing::debug!(chat_id = %chat_id, "unread reset");
        Ok(())
    }

    pub(super) fn set_bottom_visible(
        &mut self,
        chat_id: &str,
        visible: bool,
    ) -> Result<(), ChatError> {
        validate_id("conversation id", chat_id)?;
        if let Some(open) = self.open_for(chat_id) {
            open.bottom_visible = visible;
        }
        Ok(())
    }

    /// A live message. The conversation list always learns about it. The timeline takes it
    /// while the conversation is open, and also while closed if a sequence is already held, so
    /// a later reopen merges page 0 onto a contiguous history.
    pub(super) fn on_new_message(&mut self, message: Message) -> Result<(), ChatError> {
        let me = self.local_user_id();
        self.conversations
            .apply_incoming_message(&message, me.as_deref())?;

        let chat_id = message.conversation_id.clone();
        let own = me.as_deref() == Some(message.sender_id.as_str());
        let follow = self
            .open
            .as_ref()
            .filter(|o| o.chat_id == chat_id && o.phase.accepts_events())
            .map(|o| o.bottom_visible || own);
        if follow.is_none() && self.timelines.is_empty(&chat_id) {
            return Ok(());
        }
        if !self.timelines.append(&chat_id, message)? {
            tracing::debug!(chat_id = %chat_id, "duplicate message ignored");
            return Ok(());
        }
        let Some(follow) = follow else {
            tracing::debug!(chat_id = %chat_id, "appended to a closed conversation");
            return Ok(());
        };
        if follow {
            if let Some(open) = self.open_for(&chat_id) {
                open.scroll = Some(ScrollDirective::ToNewest { smooth: true });
            }
        }
        self.emit_read_receipts();
        Ok(())
    }

    /// Own message confirmed by the request channel.
    pub(super) fn on_message_sent(
        &mut self,
        chat_id: &str,
        message: Message,
    ) -> Result<(), ChatError> {
        if message.conversation_id != chat_id {
            return Err(ChatError::InvalidArgument(format!(
                "sent message {} belongs to {}, not {chat_id}",
                message.id, message.conversation_id
            )));
        }
        let me = self.local_user_id();
        self.conversations
            .apply_incoming_message(&message, me.as_deref())?;

        let open_here = self
            .open
            .as_ref()
            .is_some_and(|o| o.chat_id == chat_id && o.phase.accepts_events());
        if open_here || !self.timelines.is_empty(chat_id) {
            self.timelines.append(chat_id, message.clone())?;
        }
        if let Some(open) = self.open_for(chat_id).filter(|_| open_here) {
            open.scroll = Some(ScrollDirective::ToNewest { smooth: true });
        }
        self.emit_outbound(OutboundEvent::SendMessage {
            conversation_id: chat_id.to_string(),
            message,
        });
        Ok(())
    }

    /// Emit one mark-read per message of the open timeline that someone else sent and that is
    /// not yet seen. Each message is marked at most once.
    pub(super) fn emit_read_receipts(&mut self) {
        let Some(open) = self.open.as_ref().filter(|o| o.is_loaded()) else {
            return;
        };
        let chat_id = open.chat_id.clone();
        let Some(me) = self.local_user_id() else {
            return;
        };
        let Ok(messages) = self.timelines.get_ordered(&chat_id) else {
            return;
        };
        let marked = self.marked_read.entry(chat_id.clone()).or_default();
        let unread: Vec<String> = messages
            .filter(|m| m.sender_id != me && m.status != MessageStatus::Seen)
            .filter(|m| marked.insert(m.id.clone()))
            .map(|m| m.id.clone())
            .collect();
        for message_id in unread {
            self.emit_outbound(OutboundEvent::MarkRead {
                conversation_id: chat_id.clone(),
                message_id,
                user_id: me.clone(),
            });
        }
    }

    /// After a reconnect the room membership is gone; join again (joins are idempotent).
    pub(super) fn rejoin_open_room(&mut self) {
        let Some(chat_id) = self
            .open
            .as_ref()
            .filter(|o| o.joined)
            .map(|o| o.chat_id.clone())
        else {
            return;
        };
        tracing::info!(chat_id = %chat_id, "rejoining room after reconnect");
        self.emit_outbound(OutboundEvent::JoinConversation {
            conversation_id: chat_id,
        });
    }

    pub(super) fn request_block_status(&self, chat_id: &str) {
        let requests = self.requests.clone();
        let chat_id = chat_id.to_string();
        let id = chat_id.clone();
        self.spawn_request(
            "getBlockStatus",
            async move { requests.get_block_status(&id).await },
            move |result| InternalEvent::BlockStatusFetched { chat_id, result },
        );
    }

    pub(super) fn on_block_status(
        &mut self,
        chat_id: &str,
        result: Result<BlockStatus, ChatError>,
    ) -> Result<(), ChatError> {
        if let Some(open) = self.open_for(chat_id) {
            open.block_status_loading = false;
        }
        match result {
            Ok(status) => self.conversations.set_block_status(chat_id, status)?,
            Err(e) => tracing::warn!(chat_id = %chat_id, %e, "block status unavailable"),
        }
        Ok(())
    }
}
