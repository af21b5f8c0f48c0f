use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::error::ChatError;
use crate::model::validate_id;
use crate::transport::OutboundEvent;
use crate::updates::{CoreMsg, InternalEvent, TypingTimer};

use super::AppCore;

struct Armed {
    generation: u64,
    task: JoinHandle<()>,
}

/// Cancellable typing timers keyed by `(kind, conversation)`.
///
/// A fired timer reports its generation; re-arming or cancelling bumps it, so a timer event that
/// was already queued when its timer got reset is recognised and dropped.
#[derive(Default)]
pub(super) struct TypingTimers {
    armed: HashMap<(TypingTimer, String), Armed>,
    /// Conversations we emitted typing-start for and have not stopped yet.
    local_active: HashSet<String>,
    next_generation: u64,
}

impl TypingTimers {
    fn arm(
        &mut self,
        kind: TypingTimer,
        chat_id: &str,
        spawn: impl FnOnce(u64) -> JoinHandle<()>,
    ) -> u64 {
        self.cancel(kind, chat_id);
        self.next_generation += 1;
        let generation = self.next_generation;
        let task = spawn(generation);
        self.armed
            .insert((kind, chat_id.to_string()), Armed { generation, task });
        generation
    }

    fn cancel(&mut self, kind: TypingTimer, chat_id: &str) -> bool {
        match self.armed.remove(&(kind, chat_id.to_string())) {
            Some(armed) => {
                armed.task.abort();
                true
            }
            None => false,
        }
    }

    /// Consume a fired timer. False when it was re-armed or cancelled in the meantime.
    fn take_fired(&mut self, kind: TypingTimer, chat_id: &str, generation: u64) -> bool {
        let key = (kind, chat_id.to_string());
        match self.armed.get(&key) {
            Some(armed) if armed.generation == generation => {
                self.armed.remove(&key);
                true
            }
            _ => false,
        }
    }

    pub(super) fn cancel_chat(&mut self, chat_id: &str) {
        self.cancel(TypingTimer::LocalIdle, chat_id);
        self.cancel(TypingTimer::RemoteExpiry, chat_id);
        self.local_active.remove(chat_id);
    }

    pub(super) fn cancel_all(&mut self) {
        for (_, armed) in self.armed.drain() {
            armed.task.abort();
        }
        self.local_active.clear();
    }
}

impl AppCore {
    fn arm_typing_timer(&mut self, kind: TypingTimer, chat_id: &str, after: Duration) {
        let tx = self.core_sender.clone();
        let handle = self.runtime.handle().clone();
        let chat = chat_id.to_string();
        self.typing.arm(kind, chat_id, move |generation| {
            handle.spawn(async move {
                tokio::time::sleep(after).await;
                let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::TypingTimerFired {
                    kind,
                    chat_id: chat,
                    generation,
                })));
            })
        });
    }

    /// Local keystroke: emit typing-start unless already typing, then (re)arm the idle timer.
    pub(super) fn handle_input_changed(&mut self, chat_id: &str) -> Result<(), ChatError> {
        validate_id("conversation id", chat_id)?;
        let Some(counterpart_id) = self.counterpart_of(chat_id) else {
            tracing::debug!(chat_id = %chat_id, "typing in unknown conversation");
            return Ok(());
        };
        if self.typing.local_active.insert(chat_id.to_string()) {
            self.emit_outbound(OutboundEvent::Typing {
                conversation_id: chat_id.to_string(),
                counterpart_id,
                is_typing: true,
            });
        }
        let idle = self.config.typing_idle();
        self.arm_typing_timer(TypingTimer::LocalIdle, chat_id, idle);
        Ok(())
    }

    /// Emit typing-stop if a typing-start is outstanding. Used on idle, send, blur and close.
    pub(super) fn stop_local_typing(&mut self, chat_id: &str) {
        self.typing.cancel(TypingTimer::LocalIdle, chat_id);
        if !self.typing.local_active.remove(chat_id) {
            return;
        }
        let counterpart_id = self.counterpart_of(chat_id).unwrap_or_default();
        self.emit_outbound(OutboundEvent::Typing {
            conversation_id: chat_id.to_string(),
            counterpart_id,
            is_typing: false,
        });
    }

    pub(super) fn handle_remote_typing(
        &mut self,
        chat_id: &str,
        is_typing: bool,
    ) -> Result<(), ChatError> {
        self.conversations.set_typing(chat_id, is_typing)?;
        if is_typing {
            let expiry = self.config.typing_expiry();
            self.arm_typing_timer(TypingTimer::RemoteExpiry, chat_id, expiry);
        } else {
            self.typing.cancel(TypingTimer::RemoteExpiry, chat_id);
        }
        Ok(())
    }

    #[cfg(test)]
    pub(super) fn typing_generation(&self, kind: TypingTimer, chat_id: &str) -> Option<u64> {
        self.typing
            .armed
            .get(&(kind, chat_id.to_string()))
            .map(|a| a.generation)
    }

    pub(super) fn handle_typing_timer(
        &mut self,
        kind: TypingTimer,
        chat_id: &str,
        generation: u64,
    ) -> Result<(), ChatError> {
        if !self.typing.take_fired(kind, chat_id, generation) {
            tracing::debug!(chat_id = %chat_id, ?kind, generation, "superseded typing timer");
            return Ok(());
        }
        match kind {
            TypingTimer::LocalIdle => self.stop_local_typing(chat_id),
            TypingTimer::RemoteExpiry => self.conversations.set_typing(chat_id, false)?,
        }
        Ok(())
    }
}
