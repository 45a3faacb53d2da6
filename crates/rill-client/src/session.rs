//! Chat session orchestration
//!
//! [`ChatSession`] owns the conversation state for one session identity
//! and drives both operations the renderer can invoke: a streamed send
//! and a one-shot document upload. Transport and decode failures never
//! escape this boundary; they become plain-language assistant messages
//! and the state machine always returns to idle.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::broadcast;

use crate::{
    conversation::Conversation,
    decoder::{FrameDecoder, StreamDelta},
    identity::SessionIdentity,
    reconcile::strip_prompt_echo,
    transport::{ChatRequest, Transport},
    types::Message,
};

/// User-facing notice appended when a send turn fails
const SEND_FAILURE_NOTICE: &str = "Sorry, I encountered an error. Please try again.";

/// Default acknowledgement when the server sends none back for an upload
const UPLOAD_DEFAULT_ACK: &str = "Ready to answer questions about it.";

/// Events emitted while a session operation runs. Renderers subscribe to
/// repaint incrementally; every event is also reflected in the state
/// accessors, so a poll-only renderer works too.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A send turn started streaming
    TurnStart,
    /// Incremental assistant text arrived
    Delta { text: String },
    /// The turn committed its final message (answer or failure notice)
    TurnEnd { message: Message },
    /// An upload finished and committed its message
    UploadEnd { message: Message },
}

/// One conversation: durable identity, message log, and the two operations
/// exposed at the rendering boundary.
pub struct ChatSession {
    transport: Arc<dyn Transport>,
    identity: SessionIdentity,
    conversation: Conversation,
    event_tx: broadcast::Sender<ChatEvent>,
}

impl ChatSession {
    /// Create a session over a transport and identity
    pub fn new(transport: Arc<dyn Transport>, identity: SessionIdentity) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            transport,
            identity,
            conversation: Conversation::new(),
            event_tx,
        }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.event_tx.subscribe()
    }

    /// The durable token scoping this conversation
    pub fn session_id(&self) -> &str {
        self.identity.token()
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    pub fn is_loading(&self) -> bool {
        self.conversation.is_loading()
    }

    pub fn is_streaming(&self) -> bool {
        self.conversation.is_streaming()
    }

    /// Live partial text of the in-flight assistant turn
    pub fn streaming_content(&self) -> &str {
        self.conversation.streaming_content()
    }

    /// Send a user message and stream the assistant's reply.
    ///
    /// Blank input is a no-op, as is calling while another send or upload
    /// is outstanding: the loading flag is a shared gate so at most one
    /// request is in flight per session. All failures are committed to the
    /// log as assistant messages; the turn always ends back at idle.
    pub async fn send_message(&mut self, text: &str) {
        let prompt = text.trim();
        if prompt.is_empty() {
            return;
        }
        if self.conversation.is_loading() {
            tracing::debug!("send rejected: another request is outstanding");
            return;
        }

        tracing::debug!(session_id = %self.identity.token(), "send turn starting");
        self.conversation.push(Message::user(prompt));
        self.conversation.begin_turn();
        let _ = self.event_tx.send(ChatEvent::TurnStart);

        let message = match self.run_turn(prompt).await {
            Ok(accumulated) => Message::assistant(strip_prompt_echo(prompt, &accumulated)),
            Err(e) => {
                tracing::error!(error = %e, "send turn failed");
                Message::assistant(SEND_FAILURE_NOTICE)
            }
        };

        self.conversation.push(message.clone());
        // Turn-state reset happens on every exit path, success or failure
        self.conversation.end_turn();
        let _ = self.event_tx.send(ChatEvent::TurnEnd { message });
    }

    /// Stream one turn to completion, returning the accumulated text.
    async fn run_turn(&mut self, prompt: &str) -> crate::Result<String> {
        let request = ChatRequest {
            message: prompt.to_owned(),
            session_id: self.identity.token().to_owned(),
        };

        let mut stream = self.transport.open_chat_stream(&request).await?;
        let mut decoder = FrameDecoder::new();
        let mut accumulated = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for delta in decoder.push(&chunk) {
                self.apply_delta(delta, &mut accumulated);
            }
        }
        for delta in decoder.finish() {
            self.apply_delta(delta, &mut accumulated);
        }

        Ok(accumulated)
    }

    /// Apply one decoded delta to the accumulator and the live view.
    fn apply_delta(&mut self, delta: StreamDelta, accumulated: &mut String) {
        match delta {
            StreamDelta::Text(text) => {
                accumulated.push_str(&text);
                self.conversation.append_delta(&text);
                let _ = self.event_tx.send(ChatEvent::Delta { text });
            }
            // The service declared the authoritative full text. Only the
            // accumulator is rewritten; the streaming buffer stays the
            // live view and both converge when the turn commits.
            StreamDelta::FullReplace(full) => {
                *accumulated = full;
            }
            StreamDelta::End => {}
        }
    }

    /// Upload one document over the side channel.
    ///
    /// Shares the loading gate with [`send_message`](Self::send_message).
    /// Success and failure both commit an assistant message; the loading
    /// flag is always cleared.
    pub async fn upload_document(&mut self, filename: &str, bytes: Vec<u8>) {
        if self.conversation.is_loading() {
            tracing::debug!("upload rejected: another request is outstanding");
            return;
        }

        self.conversation.set_loading(true);

        let message = match self.transport.upload(filename, bytes).await {
            Ok(receipt) => {
                let accepted = receipt.filename.as_deref().unwrap_or(filename);
                let ack = receipt.message.as_deref().unwrap_or(UPLOAD_DEFAULT_ACK);
                Message::assistant(format!("Document uploaded: {}\n{}", accepted, ack))
            }
            Err(e) => {
                tracing::error!(filename, error = %e, "upload failed");
                Message::assistant(format!(
                    "Failed to upload {}. Please try again.",
                    filename
                ))
            }
        };

        self.conversation.push(message.clone());
        self.conversation.set_loading(false);
        let _ = self.event_tx.send(ChatEvent::UploadEnd { message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::transport::{ByteStream, UploadReceipt};
    use crate::types::Role;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;

    /// One scripted body chunk: bytes, or a mid-read fault
    enum ScriptedChunk {
        Bytes(Vec<u8>),
        Fault,
    }

    /// Scripted transport: replays canned chunks and records the request.
    /// `upload_receipt == None` means the upload is rejected.
    struct ScriptedTransport {
        chunks: Vec<ScriptedChunk>,
        fail_open: Option<u16>,
        upload_receipt: Option<UploadReceipt>,
        seen_request: Mutex<Option<ChatRequest>>,
    }

    impl ScriptedTransport {
        fn streaming(chunks: &[&[u8]]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| ScriptedChunk::Bytes(c.to_vec())).collect(),
                fail_open: None,
                upload_receipt: Some(UploadReceipt::default()),
                seen_request: Mutex::new(None),
            }
        }

        fn failing_open(status: u16) -> Self {
            let mut t = Self::streaming(&[]);
            t.fail_open = Some(status);
            t
        }

        fn with_upload(upload_receipt: Option<UploadReceipt>) -> Self {
            let mut t = Self::streaming(&[]);
            t.upload_receipt = upload_receipt;
            t
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn open_chat_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
            *self.seen_request.lock().unwrap() = Some(request.clone());
            if let Some(status) = self.fail_open {
                return Err(Error::api(status, "scripted failure"));
            }
            let chunks: Vec<Result<Bytes>> = self
                .chunks
                .iter()
                .map(|c| match c {
                    ScriptedChunk::Bytes(bytes) => Ok(Bytes::from(bytes.clone())),
                    ScriptedChunk::Fault => {
                        Err(Error::StreamRead("scripted mid-read fault".to_owned()))
                    }
                })
                .collect();
            Ok(Box::pin(futures::stream::iter(chunks)))
        }

        async fn upload(&self, filename: &str, _bytes: Vec<u8>) -> Result<UploadReceipt> {
            match &self.upload_receipt {
                Some(receipt) => Ok(receipt.clone()),
                None => Err(Error::UploadRejected {
                    filename: filename.to_owned(),
                    status: 422,
                    message: "scripted rejection".to_owned(),
                }),
            }
        }
    }

    fn session_over(transport: ScriptedTransport) -> (ChatSession, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let dir = tempfile::tempdir().unwrap();
        let identity = SessionIdentity::load_or_create_at(dir.path().join("chat_session_id"));
        (
            ChatSession::new(transport.clone(), identity),
            transport,
        )
    }

    #[tokio::test]
    async fn test_sse_json_chunks_accumulate() {
        let (mut session, transport) = session_over(ScriptedTransport::streaming(&[
            b"data: {\"chunk\":\"Hel\"}\n\n",
            b"data: {\"chunk\":\"lo\"}\n\n",
        ]));

        session.send_message("What's the greeting?").await;

        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "Hello");
        assert!(!session.is_loading());
        assert!(!session.is_streaming());
        assert_eq!(session.streaming_content(), "");

        let request = transport.seen_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.message, "What's the greeting?");
        assert_eq!(request.session_id, session.session_id());
    }

    #[tokio::test]
    async fn test_raw_stream_with_prompt_echo_is_reconciled() {
        let (mut session, _) =
            session_over(ScriptedTransport::streaming(&[b"Hi there!"]));

        session.send_message("Hi").await;

        assert_eq!(session.messages()[1].content, " there!");
    }

    #[tokio::test]
    async fn test_full_response_overrides_partial_chunks() {
        let (mut session, _) = session_over(ScriptedTransport::streaming(&[
            b"data: {\"chunk\":\"partial\"}\n\n",
            b"data: {\"full_response\":\"complete answer\"}\n\n",
        ]));

        session.send_message("question").await;

        assert_eq!(session.messages()[1].content, "complete answer");
    }

    #[tokio::test]
    async fn test_text_after_full_replace_appends() {
        let (mut session, _) = session_over(ScriptedTransport::streaming(&[
            b"data: {\"full_response\":\"base\"}\n\n",
            b"data: {\"chunk\":\" and more\"}\n\n",
        ]));

        session.send_message("question").await;

        assert_eq!(session.messages()[1].content, "base and more");
    }

    #[tokio::test]
    async fn test_failed_request_commits_one_failure_notice() {
        let (mut session, _) = session_over(ScriptedTransport::failing_open(500));

        session.send_message("hello").await;

        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, SEND_FAILURE_NOTICE);
        assert!(!session.is_loading());
        assert!(!session.is_streaming());
        assert_eq!(session.streaming_content(), "");
    }

    #[tokio::test]
    async fn test_mid_read_fault_resets_to_idle() {
        let mut transport = ScriptedTransport::streaming(&[b"data: {\"chunk\":\"par\"}\n\n"]);
        transport.chunks.push(ScriptedChunk::Fault);
        let (mut session, _) = session_over(transport);

        session.send_message("hello").await;

        assert_eq!(session.messages()[1].content, SEND_FAILURE_NOTICE);
        assert!(!session.is_streaming());
        assert_eq!(session.streaming_content(), "");
    }

    #[tokio::test]
    async fn test_blank_input_is_a_noop() {
        let (mut session, _) = session_over(ScriptedTransport::streaming(&[]));

        session.send_message("   ").await;
        session.send_message("").await;

        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn test_loading_gate_rejects_overlapping_send() {
        let (mut session, _) = session_over(ScriptedTransport::streaming(&[b"x"]));

        session.conversation.set_loading(true);
        session.send_message("hello").await;
        assert!(session.messages().is_empty());

        session.conversation.set_loading(false);
        session.send_message("hello").await;
        assert_eq!(session.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_session_is_reusable_across_turns() {
        let (mut session, _) =
            session_over(ScriptedTransport::streaming(&[b"data: {\"chunk\":\"ok\"}\n\n"]));

        session.send_message("first").await;
        session.send_message("second").await;

        assert_eq!(session.messages().len(), 4);
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_deltas_are_broadcast_in_order() {
        let (mut session, _) = session_over(ScriptedTransport::streaming(&[
            b"data: {\"chunk\":\"Hel\"}\n\n",
            b"data: {\"chunk\":\"lo\"}\n\n",
        ]));
        let mut rx = session.subscribe();

        session.send_message("greeting").await;

        assert!(matches!(rx.try_recv().unwrap(), ChatEvent::TurnStart));
        match rx.try_recv().unwrap() {
            ChatEvent::Delta { text } => assert_eq!(text, "Hel"),
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.try_recv().unwrap() {
            ChatEvent::Delta { text } => assert_eq!(text, "lo"),
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.try_recv().unwrap() {
            ChatEvent::TurnEnd { message } => assert_eq!(message.content, "Hello"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upload_success_reports_filename_and_ack() {
        let (mut session, _) = session_over(ScriptedTransport::with_upload(Some(UploadReceipt {
            filename: Some("report.pdf".to_owned()),
            message: Some("Indexed.".to_owned()),
        })));

        session.upload_document("report.pdf", b"%PDF-".to_vec()).await;

        let messages = session.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::Assistant);
        assert!(messages[0].content.contains("report.pdf"));
        assert!(messages[0].content.contains("Indexed."));
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_upload_without_server_ack_uses_default() {
        let (mut session, _) =
            session_over(ScriptedTransport::with_upload(Some(UploadReceipt::default())));

        session.upload_document("notes.txt", b"hi".to_vec()).await;

        let content = &session.messages()[0].content;
        assert!(content.contains("notes.txt"));
        assert!(content.contains(UPLOAD_DEFAULT_ACK));
    }

    #[tokio::test]
    async fn test_upload_failure_names_the_file() {
        let (mut session, _) = session_over(ScriptedTransport::with_upload(None));

        session.upload_document("report.pdf", b"%PDF-".to_vec()).await;

        let messages = session.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].content.contains("Failed to upload report.pdf"));
        assert!(!session.is_loading());
    }
}
