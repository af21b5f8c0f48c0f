//! Message timeline store: one ordered, deduplicated message sequence per conversation.
//!
//! Each timeline is kept sorted by `(created_at, id)` at all times, so merges from pagination
//! and live events can land in any order without a later re-sort.

use std::collections::{HashMap, HashSet};

use crate::error::ChatError;
use crate::model::{validate_id, Message, MessageStatus};

#[derive(Debug, Default, Clone)]
struct Timeline {
    messages: Vec<Message>,
    ids: HashSet<String>,
}

impl Timeline {
    fn insert_sorted(&mut self, message: Message) -> bool {
        if self.ids.contains(&message.id) {
            return false;
        }
        let at = self
            .messages
            .partition_point(|m| m.timeline_cmp(&message).is_lt());
        self.ids.insert(message.id.clone());
        self.messages.insert(at, message);
        true
    }
}

#[derive(Debug, Default)]
pub struct TimelineStore {
    timelines: HashMap<String, Timeline>,
}

impl TimelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `message` unless its id is already present. Returns whether it was inserted.
    pub fn append(&mut self, conversation_id: &str, message: Message) -> Result<bool, ChatError> {
        check_owner(conversation_id, &message)?;
        Ok(self
            .timelines
            .entry(conversation_id.to_string())
            .or_default()
            .insert_sorted(message))
    }

    /// Merge an older page. Messages whose id is already present are dropped; existing messages
    /// keep their relative order. Returns how many were added.
    pub fn prepend_page(
        &mut self,
        conversation_id: &str,
        messages: Vec<Message>,
    ) -> Result<usize, ChatError> {
        validate_id("conversation id", conversation_id)?;
        for m in &messages {
            check_owner(conversation_id, m)?;
        }
        let timeline = self
            .timelines
            .entry(conversation_id.to_string())
            .or_default();
        let mut added = 0;
        for m in messages {
            if timeline.insert_sorted(m) {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Replace the whole sequence. Used for the first page of an empty timeline.
    pub fn replace(
        &mut self,
        conversation_id: &str,
        messages: Vec<Message>,
    ) -> Result<usize, ChatError> {
        validate_id("conversation id", conversation_id)?;
        for m in &messages {
            check_owner(conversation_id, m)?;
        }
        let mut timeline = Timeline::default();
        for m in messages {
            timeline.insert_sorted(m);
        }
        let len = timeline.messages.len();
        self.timelines.insert(conversation_id.to_string(), timeline);
        Ok(len)
    }

    /// Advance a message's status. A missing message is not an error: it may simply not be
    /// loaded on this client yet.
    pub fn update_status(
        &mut self,
        conversation_id: &str,
        message_id: &str,
        status: MessageStatus,
    ) -> Result<bool, ChatError> {
        validate_id("conversation id", conversation_id)?;
        validate_id("message id", message_id)?;
        let Some(timeline) = self.timelines.get_mut(conversation_id) else {
            return Ok(false);
        };
        Ok(timeline
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .map(|m| m.status.advance(status))
            .unwrap_or(false))
    }

    /// Messages in timeline order. The iterator is cheap to clone, so callers can restart it.
    pub fn get_ordered(
        &self,
        conversation_id: &str,
    ) -> Result<impl Iterator<Item = &Message> + Clone + '_, ChatError> {
        validate_id("conversation id", conversation_id)?;
        Ok(self
            .timelines
            .get(conversation_id)
            .map(|t| t.messages.iter())
            .into_iter()
            .flatten())
    }

    pub fn clear(&mut self, conversation_id: &str) -> Result<(), ChatError> {
        validate_id("conversation id", conversation_id)?;
        self.timelines.remove(conversation_id);
        Ok(())
    }

    pub fn clear_all(&mut self) {
        self.timelines.clear();
    }

    /// Physically remove a message from every timeline holding it. Returns the affected
    /// conversation ids.
    pub fn remove_message(&mut self, message_id: &str) -> Result<Vec<String>, ChatError> {
        validate_id("message id", message_id)?;
        let mut affected = Vec::new();
        for (cid, timeline) in self.timelines.iter_mut() {
            if timeline.ids.remove(message_id) {
                timeline.messages.retain(|m| m.id != message_id);
                affected.push(cid.clone());
            }
        }
        Ok(affected)
    }

    pub fn len(&self, conversation_id: &str) -> usize {
        self.timelines
            .get(conversation_id)
            .map(|t| t.messages.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, conversation_id: &str) -> bool {
        self.len(conversation_id) == 0
    }

    pub fn contains(&self, conversation_id: &str, message_id: &str) -> bool {
        self.timelines
            .get(conversation_id)
            .map(|t| t.ids.contains(message_id))
            .unwrap_or(false)
    }

    /// Index of `message_id` in timeline order.
    pub fn position(&self, conversation_id: &str, message_id: &str) -> Option<usize> {
        self.timelines
            .get(conversation_id)?
            .messages
            .iter()
            .position(|m| m.id == message_id)
    }

    pub fn message_at(&self, conversation_id: &str, index: usize) -> Option<&Message> {
        self.timelines.get(conversation_id)?.messages.get(index)
    }
}

fn check_owner(conversation_id: &str, message: &Message) -> Result<(), ChatError> {
    validate_id("conversation id", conversation_id)?;
    validate_id("message id", &message.id)?;
    if message.conversation_id != conversation_id {
        return Err(ChatError::InvalidArgument(format!(
            "message {} belongs to {}, not {conversation_id}",
            message.id, message.conversation_id
        )));
    }
    Ok(())
}
