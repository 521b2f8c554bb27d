//! Bounded conversation buffers and prompt assembly.

use std::collections::VecDeque;

use theater_core::{ChatMessage, Persona, Role};

/// FIFO buffer that evicts its oldest entry once `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedBuffer<T> {
    /// A zero capacity is bumped to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `item`, returning the evicted entry if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    /// The newest `n` entries, oldest first.
    pub fn last_n(&self, n: usize) -> impl Iterator<Item = &T> {
        self.items.iter().skip(self.items.len().saturating_sub(n))
    }

    #[must_use]
    pub fn back(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// One entry of a session's history: a system note or a persona's line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub role: Role,
    /// Persona name for persona output, `None` for system notes.
    pub speaker: Option<String>,
    pub content: String,
}

impl HistoryRecord {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            speaker: None,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn persona(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            speaker: Some(name.into()),
            content: content.into(),
        }
    }

    /// Render the record from the point of view of `speaker`: its own lines
    /// become assistant turns, everyone else's become named user turns.
    #[must_use]
    pub fn to_message(&self, speaker: &str) -> ChatMessage {
        match (&self.role, &self.speaker) {
            (Role::Assistant, Some(name)) if name == speaker => {
                ChatMessage::assistant(self.content.clone())
            }
            (_, Some(name)) => ChatMessage::user(format!("{name}: {}", self.content)),
            (_, None) => ChatMessage::system(self.content.clone()),
        }
    }
}

/// Builds the message list for one completion request.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    /// System prompt for `persona`, then the history window, then the
    /// current message as the final user turn.
    ///
    /// When the newest history record is the current message it is not
    /// repeated.
    #[must_use]
    pub fn build_messages(
        &self,
        persona: &Persona,
        history: &BoundedBuffer<HistoryRecord>,
        current_message: &str,
    ) -> Vec<ChatMessage> {
        let mut records: Vec<&HistoryRecord> = history.iter().collect();
        if records
            .last()
            .is_some_and(|r| r.content == current_message)
        {
            records.pop();
        }

        let mut messages = Vec::with_capacity(records.len() + 2);
        messages.push(ChatMessage::system(persona.system_prompt()));
        messages.extend(records.into_iter().map(|r| r.to_message(&persona.name)));
        messages.push(ChatMessage::user(current_message));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persona(name: &str) -> Persona {
        Persona {
            name: name.to_string(),
            emoji: String::new(),
            personality: "Test persona.".to_string(),
            style: String::new(),
        }
    }

    #[test]
    fn buffer_evicts_oldest_first() {
        let mut buffer = BoundedBuffer::new(3);
        assert_eq!(buffer.push(1), None);
        assert_eq!(buffer.push(2), None);
        assert_eq!(buffer.push(3), None);
        assert_eq!(buffer.push(4), Some(1));
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn buffer_never_exceeds_capacity() {
        let mut buffer = BoundedBuffer::new(5);
        for i in 0..1000 {
            buffer.push(i);
            assert!(buffer.len() <= 5);
        }
        assert_eq!(buffer.back(), Some(&999));
    }

    #[test]
    fn zero_capacity_is_bumped() {
        let mut buffer = BoundedBuffer::new(0);
        buffer.push("a");
        buffer.push("b");
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn last_n_returns_newest_in_order() {
        let mut buffer = BoundedBuffer::new(8);
        for i in 0..6 {
            buffer.push(i);
        }
        assert_eq!(buffer.last_n(3).copied().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(buffer.last_n(10).count(), 6);
    }

    #[test]
    fn records_render_from_speaker_perspective() {
        let own = HistoryRecord::persona("Minji", "hello!");
        let other = HistoryRecord::persona("Junho", "good evening.");
        let note = HistoryRecord::system("Topic change: films");

        assert_eq!(own.to_message("Minji"), ChatMessage::assistant("hello!"));
        assert_eq!(
            other.to_message("Minji"),
            ChatMessage::user("Junho: good evening.")
        );
        assert_eq!(
            note.to_message("Minji"),
            ChatMessage::system("Topic change: films")
        );
    }

    #[test]
    fn prompt_skips_duplicate_current_message() {
        let mut history = BoundedBuffer::new(4);
        history.push(HistoryRecord::system("Opening line: hi"));
        history.push(HistoryRecord::persona("Junho", "How are you?"));

        let messages = PromptBuilder.build_messages(&persona("Minji"), &history, "How are you?");

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.starts_with("You are Minji."));
        assert_eq!(messages[1], ChatMessage::system("Opening line: hi"));
        assert_eq!(messages[2], ChatMessage::user("How are you?"));
    }

    #[test]
    fn prompt_with_empty_history() {
        let history = BoundedBuffer::new(4);
        let messages = PromptBuilder.build_messages(&persona("Junho"), &history, "Hi!");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1], ChatMessage::user("Hi!"));
    }
}
