//! [`PeerLink`] over TCP.
//!
//! Each conversation is one connection carrying a line-framed exchange:
//!
//! ```text
//! > CONNECT <topic>
//! < OK                      | NO <reason>
//! > POKE <item> <len>
//! > <len bytes of data>
//! < ACK                     | BUSY | NAK <reason>
//! > BYE
//! ```

use super::peer::{Conversation, PeerLink};
use crate::config::PeerConfig;
use crate::error::TransportError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::debug;

/// Resolves service names through a name → address table; a service that is
/// not in the table is used as an address when it contains a port.
pub struct TcpPeerLink {
    services: BTreeMap<String, String>,
    connect_timeout: Duration,
}

impl TcpPeerLink {
    pub fn new(services: BTreeMap<String, String>, connect_timeout: Duration) -> Self {
        let services = services
            .into_iter()
            .map(|(name, addr)| (name.to_ascii_lowercase(), addr))
            .collect();
        Self {
            services,
            connect_timeout,
        }
    }

    pub fn from_config(config: &PeerConfig) -> Self {
        Self::new(config.services.clone(), config.connect_timeout())
    }

    fn resolve(&self, service: &str) -> Option<String> {
        if let Some(addr) = self.services.get(&service.to_ascii_lowercase()) {
            return Some(addr.clone());
        }
        service.contains(':').then(|| service.to_string())
    }
}

impl Default for TcpPeerLink {
    fn default() -> Self {
        Self::from_config(&PeerConfig::default())
    }
}

#[async_trait]
impl PeerLink for TcpPeerLink {
    async fn connect(
        &self,
        service: &str,
        topic: &str,
    ) -> Result<Box<dyn Conversation>, TransportError> {
        let addr = self
            .resolve(service)
            .ok_or_else(|| TransportError::PeerNotFound(service.to_string()))?;

        let stream = match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&addr)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) if err.kind() == io::ErrorKind::ConnectionRefused => {
                return Err(TransportError::PeerNotFound(service.to_string()));
            }
            Ok(Err(err)) => return Err(no_conversation(service, err.to_string())),
            Err(_) => return Err(no_conversation(service, "connect timed out".to_string())),
        };

        let (reader, writer) = stream.into_split();
        let mut conversation = TcpConversation {
            service: service.to_string(),
            reader: BufReader::new(reader),
            writer,
        };

        conversation
            .writer
            .write_all(format!("CONNECT {topic}\n").as_bytes())
            .await
            .map_err(|err| no_conversation(service, err.to_string()))?;
        let reply = conversation.read_reply().await?;
        if reply != "OK" {
            let reason = reply.strip_prefix("NO ").unwrap_or(&reply).to_string();
            return Err(no_conversation(service, reason));
        }

        debug!(service, %addr, topic, "conversation established");
        Ok(Box::new(conversation))
    }
}

struct TcpConversation {
    service: String,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TcpConversation {
    async fn read_reply(&mut self) -> Result<String, TransportError> {
        let mut reply = String::new();
        let read = self
            .reader
            .read_line(&mut reply)
            .await
            .map_err(|err| no_conversation(&self.service, err.to_string()))?;
        if read == 0 {
            return Err(no_conversation(
                &self.service,
                "peer closed the conversation".to_string(),
            ));
        }
        Ok(reply.trim_end().to_string())
    }
}

#[async_trait]
impl Conversation for TcpConversation {
    async fn poke(&mut self, item: &str, data: &[u8]) -> Result<(), TransportError> {
        let mut frame = format!("POKE {item} {}\n", data.len()).into_bytes();
        frame.extend_from_slice(data);
        self.writer
            .write_all(&frame)
            .await
            .map_err(|err| no_conversation(&self.service, err.to_string()))?;

        let reply = self.read_reply().await?;
        match reply.as_str() {
            "ACK" => Ok(()),
            "BUSY" => Err(TransportError::Busy),
            other => Err(TransportError::Rejected(
                other.strip_prefix("NAK ").unwrap_or(other).to_string(),
            )),
        }
    }

    async fn disconnect(&mut self) {
        let _ = self.writer.write_all(b"BYE\n").await;
        let _ = self.writer.shutdown().await;
    }
}

fn no_conversation(service: &str, reason: String) -> TransportError {
    TransportError::NoConversation {
        service: service.to_string(),
        reason,
    }
}
