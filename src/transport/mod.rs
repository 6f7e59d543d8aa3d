//! Delivery of formatted command strings to the consumer.
//!
//! Two adapters implement [`Transport`]:
//!
//! - [`InterpreterTransport`] evaluates the command inside the host's embedded
//!   interpreter. It is only reachable from the host's own poll context.
//! - [`PeerTransport`] opens a short conversation with a separate process per
//!   line and may be driven straight from the timer task.

pub mod interpreter;
pub mod peer;
pub mod tcp;

pub use interpreter::{EvalHook, InterpreterTransport};
pub use peer::{Conversation, PeerDialect, PeerLink, PeerTransport};
pub use tcp::TcpPeerLink;

use crate::error::TransportError;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Interpreter,
    Peer,
}

#[async_trait]
pub trait Transport: Send {
    fn kind(&self) -> TransportKind;

    /// Deliver one command string. A failure is final for this line; the
    /// engine never retries it.
    async fn send(&mut self, command: &[u8]) -> Result<(), TransportError>;

    /// Release any resources held for the consumer.
    async fn shutdown(&mut self);
}
