use crate::models::{Message, MessageKind};
use crate::utils::display_timestamp;

/// Append-only, ordered log of the current session's messages.
///
/// Ids come from a counter that survives [`clear`](Self::clear), so they stay
/// strictly increasing across sessions as well as within one.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: Vec<Message>,
    next_id: u64,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, kind: MessageKind, content: impl Into<String>) -> &Message {
        self.next_id += 1;
        self.entries.push(Message {
            id: self.next_id,
            kind,
            content: content.into(),
            timestamp: display_timestamp(),
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
