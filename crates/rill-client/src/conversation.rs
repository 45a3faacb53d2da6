//! Conversation state: the append-only message log plus transient
//! streaming status exposed to renderers.

use crate::types::Message;

/// Conversation state owned by one [`ChatSession`](crate::ChatSession).
///
/// Messages are append-only; the streaming buffer is working memory for
/// the in-flight assistant turn and is only meaningful while
/// `is_streaming` is true. Invariant: `is_streaming` implies `is_loading`.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    is_loading: bool,
    is_streaming: bool,
    streaming_buffer: String,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to the log
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Enter the streaming phase of a send turn
    pub fn begin_turn(&mut self) {
        self.is_loading = true;
        self.is_streaming = true;
        self.streaming_buffer.clear();
    }

    /// Grow the live view of the in-flight assistant turn
    pub fn append_delta(&mut self, text: &str) {
        self.streaming_buffer.push_str(text);
    }

    /// Leave the streaming phase, success or failure
    pub fn end_turn(&mut self) {
        self.is_loading = false;
        self.is_streaming = false;
        self.streaming_buffer.clear();
    }

    /// Mark a non-streaming request (upload) in flight
    pub fn set_loading(&mut self, loading: bool) {
        self.is_loading = loading;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    /// Live partial text of the in-flight assistant turn
    pub fn streaming_content(&self) -> &str {
        &self.streaming_buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_implies_loading() {
        let mut conv = Conversation::new();
        conv.begin_turn();
        assert!(conv.is_streaming());
        assert!(conv.is_loading());
    }

    #[test]
    fn test_buffer_cleared_at_turn_boundaries() {
        let mut conv = Conversation::new();
        conv.begin_turn();
        conv.append_delta("partial");
        assert_eq!(conv.streaming_content(), "partial");

        conv.end_turn();
        assert_eq!(conv.streaming_content(), "");
        assert!(!conv.is_loading());
        assert!(!conv.is_streaming());

        conv.begin_turn();
        assert_eq!(conv.streaming_content(), "");
    }

    #[test]
    fn test_messages_append_in_order() {
        let mut conv = Conversation::new();
        conv.push(Message::user("a"));
        conv.push(Message::assistant("b"));
        let contents: Vec<_> = conv.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b"]);
    }
}
