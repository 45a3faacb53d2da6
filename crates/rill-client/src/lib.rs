//! rill-client: streaming chat client engine
//!
//! This crate handles the conversation side of a chat front end: a durable
//! session identity, a frame decoder for the loosely-specified streaming
//! wire format, echo reconciliation, and the conversation state machine
//! exposed to whatever renders it.

pub mod conversation;
pub mod decoder;
pub mod error;
pub mod identity;
pub mod reconcile;
pub mod session;
pub mod transport;
pub mod types;

pub use conversation::Conversation;
pub use decoder::{FrameDecoder, StreamDelta};
pub use error::{Error, Result};
pub use identity::SessionIdentity;
pub use session::{ChatEvent, ChatSession};
pub use transport::{ChatRequest, HttpTransport, Transport, UploadReceipt};
pub use types::{Message, Role};
