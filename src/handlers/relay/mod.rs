//! Voice relay WebSocket handlers
//!
//! One WebSocket connection carries one conversation. The client streams
//! recognized speech; the server keeps a bounded history, asks the completion
//! model for a reply to each finished utterance and sends the reply back for
//! speech synthesis.
//!
//! # Protocol
//!
//! Every event is a JSON text frame tagged by `type`.
//!
//! ## Client → Server
//!
//! - **speech-text** `{text, isFinal}`: recognized speech. Partial results are
//!   echoed for captioning; final results become user turns.
//! - **reset-conversation**: clear the conversation.
//!
//! ## Server → Client
//!
//! - **ai-response** `{text, timestamp}`: reply to one user turn
//! - **partial-transcript** `{text}`: echo of a partial result
//! - **conversation-reset**: reset acknowledged
//! - **error** `{message}`: non-fatal failure
//!
//! Final transcripts and resets are handled strictly in arrival order. A final
//! transcript that arrives while a reply is being generated waits for it; a
//! session with too many events waiting answers further ones with `error`.

mod channel;
mod dispatcher;
mod handler;
pub mod messages;
mod session;

pub use channel::SessionChannel;
pub use dispatcher::ResponseDispatcher;
pub use handler::{IDLE_TIMEOUT_MESSAGE, INVALID_FORMAT_MESSAGE, MAX_WS_MESSAGE_SIZE, relay_handler};
pub use session::{MAX_QUEUED_COMMANDS, Session};
