use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::message::{Message, MessageKind};

/// What the delivery layer hands the controller. Inserts arrive in server
/// order but may duplicate across a reconnect plus polling overlap; the
/// controller de-duplicates by message id.
#[derive(Debug, Clone)]
pub enum DeliveryEvent {
    /// Initial full ordered list.
    Snapshot(Vec<Message>),
    Inserted(Message),
    /// Metadata change (edit, reaction, read marker, soft delete).
    Updated(Message),
    /// Physical removal.
    Deleted(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewEffect {
    ScrollToTail,
}

/// Optimistic entry shown while the append round-trip is outstanding.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSend {
    pub local_id: Uuid,
    pub kind: MessageKind,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseOutcome {
    /// The host must issue a ClearTyping write before dropping timers.
    pub clear_typing: bool,
}

pub struct ChatController {
    viewer_id: Uuid,
    /// Conversation-level "delete for me" watermark, fixed at open time.
    cleared_at: Option<DateTime<Utc>>,
    messages: Vec<Message>,
    pending: Vec<PendingSend>,
    draft: String,
    at_tail: bool,
    send_in_flight: bool,
    busy_message: Option<Uuid>,
    typing: bool,
    closed: bool,
}

impl ChatController {
    pub fn new(viewer_id: Uuid, cleared_at: Option<DateTime<Utc>>) -> Self {
        Self {
            viewer_id,
            cleared_at,
            messages: Vec::new(),
            pending: Vec::new(),
            draft: String::new(),
            at_tail: true,
            send_in_flight: false,
            busy_message: None,
            typing: false,
            closed: false,
        }
    }

    pub fn visible(&self) -> &[Message] {
        &self.messages
    }

    pub fn pending(&self) -> &[PendingSend] {
        &self.pending
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, draft: &str) {
        if !self.closed {
            self.draft = draft.to_string();
        }
    }

    /// The host reports scroll position; auto-scroll on new inserts only
    /// happens while the viewer is already at the tail.
    pub fn set_at_tail(&mut self, at_tail: bool) {
        self.at_tail = at_tail;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn insert_position(&self, message: &Message) -> usize {
        self.messages
            .partition_point(|m| (m.created_at, m.id) <= (message.created_at, message.id))
    }

    pub fn apply(&mut self, event: DeliveryEvent) -> Option<ViewEffect> {
        if self.closed {
            return None;
        }
        match event {
            DeliveryEvent::Snapshot(list) => {
                let mut list: Vec<Message> = list
                    .into_iter()
                    .filter(|m| m.visible_to(self.viewer_id, self.cleared_at))
                    .collect();
                list.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
                list.dedup_by_key(|m| m.id);
                self.messages = list;
                Some(ViewEffect::ScrollToTail)
            }
            DeliveryEvent::Inserted(message) => {
                if !message.visible_to(self.viewer_id, self.cleared_at) {
                    return None;
                }
                if let Some(slot) = self.messages.iter_mut().find(|m| m.id == message.id) {
                    // Duplicate across reconnect/polling overlap: treat as a
                    // patch, never re-append.
                    *slot = message;
                    return None;
                }
                let pos = self.insert_position(&message);
                self.messages.insert(pos, message);
                if self.at_tail {
                    Some(ViewEffect::ScrollToTail)
                } else {
                    None
                }
            }
            DeliveryEvent::Updated(message) => {
                if !message.visible_to(self.viewer_id, self.cleared_at) {
                    // Soft-deleted on another of the viewer's devices.
                    self.messages.retain(|m| m.id != message.id);
                    return None;
                }
                if let Some(slot) = self.messages.iter_mut().find(|m| m.id == message.id) {
                    *slot = message;
                }
                // Metadata-only change: no re-sort, no viewport movement.
                None
            }
            DeliveryEvent::Deleted(message_id) => {
                self.messages.retain(|m| m.id != message_id);
                None
            }
        }
    }

    /// Optimistic send. The composer clears immediately; at most one append
    /// is in flight at a time.
    pub fn begin_send(&mut self, kind: MessageKind) -> Option<PendingSend> {
        if self.closed || self.send_in_flight || self.draft.trim().is_empty() {
            return None;
        }
        let pending = PendingSend {
            local_id: Uuid::new_v4(),
            kind,
            content: std::mem::take(&mut self.draft),
        };
        self.typing = false; // sending ends composing
        self.send_in_flight = true;
        self.pending.push(pending.clone());
        Some(pending)
    }

    /// Server confirmed the append: the pending entry is replaced by the
    /// authoritative message.
    pub fn confirm_send(&mut self, local_id: Uuid, message: Message) -> Option<ViewEffect> {
        self.pending.retain(|p| p.local_id != local_id);
        self.send_in_flight = false;
        self.apply(DeliveryEvent::Inserted(message))
    }

    /// Transient failure: roll the optimistic entry back and restore the
    /// draft so nothing the user typed is lost.
    pub fn fail_send(&mut self, local_id: Uuid) {
        if let Some(pos) = self.pending.iter().position(|p| p.local_id == local_id) {
            let pending = self.pending.remove(pos);
            if self.draft.is_empty() {
                self.draft = pending.content;
            }
        }
        self.send_in_flight = false;
    }

    /// Guard for edit/reaction writes: at most one outstanding per
    /// controller, so the same actor cannot interleave read-modify-writes.
    pub fn begin_action(&mut self, message_id: Uuid) -> bool {
        if self.closed || self.busy_message.is_some() {
            return false;
        }
        self.busy_message = Some(message_id);
        true
    }

    pub fn finish_action(&mut self, message_id: Uuid) {
        if self.busy_message == Some(message_id) {
            self.busy_message = None;
        }
    }

    /// Composing bookkeeping. Returns true when the flag transitions and a
    /// SetTyping write is due; the host owns the 3-second idle timer and
    /// calls `stop_typing` from it.
    pub fn start_typing(&mut self) -> bool {
        if self.closed || self.typing {
            return false;
        }
        self.typing = true;
        true
    }

    pub fn stop_typing(&mut self) -> bool {
        if !self.typing {
            return false;
        }
        self.typing = false;
        true
    }

    /// Deterministic teardown: after this, late delivery events are no-ops.
    pub fn close(&mut self) -> CloseOutcome {
        let clear_typing = self.typing;
        self.typing = false;
        self.closed = true;
        CloseOutcome { clear_typing }
    }
}
