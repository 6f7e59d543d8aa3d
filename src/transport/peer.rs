use super::{Transport, TransportKind};
use crate::error::TransportError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Command vocabulary spoken by the peer process, picked from its service name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerDialect {
    /// `/play`, `/echo -s`, topic `COMMAND`.
    Standard,
    /// `/playfile`, `/display`, topic `IRC_COMMAND`. Used by services named
    /// `pirch` or `vortec`.
    PlayFile,
}

impl PeerDialect {
    pub fn for_service(service: &str) -> Self {
        if service.eq_ignore_ascii_case("pirch") || service.eq_ignore_ascii_case("vortec") {
            PeerDialect::PlayFile
        } else {
            PeerDialect::Standard
        }
    }

    pub fn topic(self) -> &'static str {
        match self {
            PeerDialect::Standard => "COMMAND",
            PeerDialect::PlayFile => "IRC_COMMAND",
        }
    }
}

/// Opens conversations with peer processes by service and topic name.
#[async_trait]
pub trait PeerLink: Send + Sync {
    async fn connect(
        &self,
        service: &str,
        topic: &str,
    ) -> Result<Box<dyn Conversation>, TransportError>;

    /// Drop whatever the link keeps for `service` between conversations.
    async fn release(&self, _service: &str) {}
}

/// One established conversation. Torn down after a single transaction.
#[async_trait]
pub trait Conversation: Send {
    /// Write `data` to `item` and wait for the peer's acknowledgement.
    async fn poke(&mut self, item: &str, data: &[u8]) -> Result<(), TransportError>;

    async fn disconnect(&mut self);
}

/// Delivers each command in its own short-lived conversation.
///
/// The write transaction is bounded by `timeout`; the conversation is
/// disconnected whether or not it succeeded.
pub struct PeerTransport {
    link: Arc<dyn PeerLink>,
    service: String,
    item: String,
    dialect: PeerDialect,
    timeout: Duration,
}

impl PeerTransport {
    pub fn new(
        link: Arc<dyn PeerLink>,
        service: impl Into<String>,
        item: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let service = service.into();
        let dialect = PeerDialect::for_service(&service);
        Self {
            link,
            service,
            item: item.into(),
            dialect,
            timeout,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn dialect(&self) -> PeerDialect {
        self.dialect
    }
}

#[async_trait]
impl Transport for PeerTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Peer
    }

    async fn send(&mut self, command: &[u8]) -> Result<(), TransportError> {
        let mut conversation = self
            .link
            .connect(&self.service, self.dialect.topic())
            .await?;

        let result = match tokio::time::timeout(self.timeout, conversation.poke(&self.item, command))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.timeout)),
        };
        conversation.disconnect().await;

        match &result {
            Ok(()) => debug!(service = %self.service, bytes = command.len(), "peer accepted line"),
            Err(err) => warn!(service = %self.service, error = %err, "peer transaction failed"),
        }
        result
    }

    async fn shutdown(&mut self) {
        self.link.release(&self.service).await;
    }
}
