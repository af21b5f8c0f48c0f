//! Conversation store: the conversation list, the current selection and per-conversation
//! ephemeral state (typing, presence, block status).

use std::collections::{HashMap, VecDeque};

use crate::error::ChatError;
use crate::model::{validate_id, BlockStatus, Conversation, Message};

/// How many recently counted message ids are remembered per conversation, so a re-delivered
/// event is not counted as unread twice.
const UNREAD_DEDUP_WINDOW: usize = 256;

/// Pagination cursor of the conversation list itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListCursor {
    pub page: u32,
    pub page_size: u32,
    pub include_archived: bool,
    pub total: u32,
}

impl ListCursor {
    pub fn skip(&self) -> u32 {
        self.page.saturating_mul(self.page_size)
    }

    pub fn has_more(&self, held: usize) -> bool {
        (held as u32) < self.total
    }
}

#[derive(Debug)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    cursor: ListCursor,
    current: Option<String>,
    typing: HashMap<String, bool>,
    presence: HashMap<String, bool>,
    block_status: HashMap<String, BlockStatus>,
    counted_unread: HashMap<String, VecDeque<String>>,
    error: Option<String>,
}

impl ConversationStore {
    pub fn new(page_size: u32) -> Self {
        Self {
            conversations: Vec::new(),
            cursor: ListCursor {
                page: 0,
                page_size,
                include_archived: false,
                total: 0,
            },
            current: None,
            typing: HashMap::new(),
            presence: HashMap::new(),
            block_status: HashMap::new(),
            counted_unread: HashMap::new(),
            error: None,
        }
    }

    /// Replace the slice of the held list that `page` covers with `items`. Entries with the same
    /// id elsewhere in the list are dropped so the list stays unique.
    pub fn replace_page(
        &mut self,
        page: u32,
        page_size: u32,
        include_archived: bool,
        items: Vec<Conversation>,
        total: u32,
    ) -> Result<(), ChatError> {
        for c in &items {
            validate_id("conversation id", &c.id)?;
        }
        let start = (page as usize).saturating_mul(page_size as usize);
        let end = start.saturating_add(page_size as usize);

        let mut kept: Vec<Conversation> = Vec::with_capacity(self.conversations.len());
        let mut insert_at = None;
        for (i, c) in std::mem::take(&mut self.conversations).into_iter().enumerate() {
            if i == start {
                insert_at = Some(kept.len());
            }
            if (start..end).contains(&i) || items.iter().any(|n| n.id == c.id) {
                continue;
            }
            kept.push(c);
        }
        let at = insert_at.unwrap_or(kept.len());

        for c in &items {
            if let Some(status) = c.block_status {
                self.block_status.entry(c.id.clone()).or_insert(status);
            }
        }
        let items = items.into_iter().map(|mut c| {
            if let Some(online) = self.presence.get(&c.other_participant.id) {
                c.other_participant.is_online = *online;
            }
            c
        });
        kept.splice(at..at, items);
        self.conversations = kept;

        self.cursor = ListCursor {
            page,
            page_size,
            include_archived,
            total,
        };
        Ok(())
    }

    pub fn cursor(&self) -> ListCursor {
        self.cursor
    }

    pub fn select(&mut self, conversation_id: Option<&str>) -> Result<(), ChatError> {
        if let Some(id) = conversation_id {
            validate_id("conversation id", id)?;
        }
        self.current = conversation_id.map(ToString::to_string);
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.current = None;
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn get(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == conversation_id)
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.get(conversation_id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conversation> + '_ {
        self.conversations.iter()
    }

    /// Fold a live message into its conversation. Returns `false` when the conversation is not
    /// held (its `conversationCreated` event will carry the preview when it arrives).
    ///
    /// The unread count only grows for conversations other than the current one, only for
    /// messages authored by someone else, and at most once per message id.
    pub fn apply_incoming_message(
        &mut self,
        message: &Message,
        local_user_id: Option<&str>,
    ) -> Result<bool, ChatError> {
        validate_id("conversation id", &message.conversation_id)?;
        let is_current = self.current.as_deref() == Some(message.conversation_id.as_str());
        let Some(conversation) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == message.conversation_id)
        else {
            return Ok(false);
        };
        conversation.touch_with(message);

        let own = local_user_id == Some(message.sender_id.as_str());
        if is_current || own {
            return Ok(true);
        }
        let counted = self
            .counted_unread
            .entry(message.conversation_id.clone())
            .or_default();
        if counted.iter().any(|id| id == &message.id) {
            return Ok(true);
        }
        if counted.len() == UNREAD_DEDUP_WINDOW {
            counted.pop_front();
        }
        counted.push_back(message.id.clone());
        conversation.unread_count = conversation.unread_count.saturating_add(1);
        Ok(true)
    }

    pub fn reset_unread(&mut self, conversation_id: &str) -> Result<(), ChatError> {
        validate_id("conversation id", conversation_id)?;
        if let Some(c) = self.get_mut(conversation_id) {
            c.unread_count = 0;
        }
        Ok(())
    }

    /// Insert a conversation at the front of the list, or refresh it in place when held.
    pub fn insert_front(&mut self, conversation: Conversation) -> Result<(), ChatError> {
        validate_id("conversation id", &conversation.id)?;
        if self.contains(&conversation.id) {
            return self.upsert(conversation);
        }
        if let Some(status) = conversation.block_status {
            self.block_status.insert(conversation.id.clone(), status);
        }
        self.conversations.insert(0, conversation);
        self.cursor.total = self.cursor.total.saturating_add(1);
        Ok(())
    }

    /// Replace a held conversation with a fresher server copy, keeping the locally tracked
    /// unread count and presence.
    pub fn upsert(&mut self, mut conversation: Conversation) -> Result<(), ChatError> {
        validate_id("conversation id", &conversation.id)?;
        if let Some(online) = self.presence.get(&conversation.other_participant.id) {
            conversation.other_participant.is_online = *online;
        }
        match self.get_mut(&conversation.id) {
            Some(held) => {
                conversation.unread_count = held.unread_count;
                *held = conversation;
            }
            None => self.conversations.push(conversation),
        }
        Ok(())
    }

    pub fn remove(&mut self, conversation_id: &str) -> Result<Option<Conversation>, ChatError> {
        validate_id("conversation id", conversation_id)?;
        let Some(idx) = self
            .conversations
            .iter()
            .position(|c| c.id == conversation_id)
        else {
            return Ok(None);
        };
        self.typing.remove(conversation_id);
        self.block_status.remove(conversation_id);
        self.counted_unread.remove(conversation_id);
        if self.current.as_deref() == Some(conversation_id) {
            self.current = None;
        }
        self.cursor.total = self.cursor.total.saturating_sub(1);
        Ok(Some(self.conversations.remove(idx)))
    }

    pub fn set_archived(&mut self, conversation_id: &str, archived: bool) -> Result<(), ChatError> {
        validate_id("conversation id", conversation_id)?;
        if let Some(c) = self.get_mut(conversation_id) {
            c.is_archived = archived;
        }
        Ok(())
    }

    pub fn set_block_status(
        &mut self,
        conversation_id: &str,
        status: BlockStatus,
    ) -> Result<(), ChatError> {
        validate_id("conversation id", conversation_id)?;
        self.block_status.insert(conversation_id.to_string(), status);
        if let Some(c) = self.get_mut(conversation_id) {
            c.block_status = Some(status);
        }
        Ok(())
    }

    /// Drop the cached block status so the next open fetches it again.
    pub fn invalidate_block_status(&mut self, conversation_id: &str) {
        self.block_status.remove(conversation_id);
    }

    pub fn block_status(&self, conversation_id: &str) -> Option<BlockStatus> {
        self.block_status.get(conversation_id).copied()
    }

    pub fn set_typing(&mut self, conversation_id: &str, is_typing: bool) -> Result<(), ChatError> {
        validate_id("conversation id", conversation_id)?;
        if is_typing {
            self.typing.insert(conversation_id.to_string(), true);
        } else {
            self.typing.remove(conversation_id);
        }
        Ok(())
    }

    pub fn is_typing(&self, conversation_id: &str) -> bool {
        self.typing.get(conversation_id).copied().unwrap_or(false)
    }

    /// Record a participant's presence and mirror it onto every conversation with them.
    pub fn set_presence(&mut self, participant_id: &str, is_online: bool) -> Result<(), ChatError> {
        validate_id("participant id", participant_id)?;
        self.presence.insert(participant_id.to_string(), is_online);
        for c in self
            .conversations
            .iter_mut()
            .filter(|c| c.other_participant.id == participant_id)
        {
            c.other_participant.is_online = is_online;
        }
        Ok(())
    }

    pub fn is_online(&self, participant_id: &str) -> Option<bool> {
        self.presence.get(participant_id).copied()
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.error = error;
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn reset(&mut self) {
        let page_size = self.cursor.page_size;
        *self = Self::new(page_size);
    }

    fn get_mut(&mut self, conversation_id: &str) -> Option<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
    }
}
