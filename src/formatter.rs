//! Escaping and command envelopes for each transport.
//!
//! The interpreter transport receives the text inline, with `"` and `\`
//! backslash-escaped. The peer transport never gets the text inline: the line
//! is staged in one of a small ring of temp files and the peer is told to play
//! that file, which keeps its trailing-space trimming away from the text.
//! Quote/backslash escaping is deliberately interpreter-only; peer lines get
//! `$<digit>` scrubbing instead.

use crate::config::EngineConfig;
use crate::control::Notice;
use crate::error::ResourceError;
use crate::splitter::PROTECT_MARKER;
use crate::transport::PeerDialect;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Where a formatted line is headed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatTarget {
    Interpreter,
    Peer(PeerDialect),
}

/// Round-robin set of temp files used to stage peer lines.
///
/// Clones share the rotation, so every formatter staging through the same
/// set keeps cycling through the slots in order.
#[derive(Debug, Clone)]
pub struct TempSlots {
    dir: PathBuf,
    prefix: String,
    count: usize,
    next: Arc<AtomicUsize>,
}

impl TempSlots {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, count: usize) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            count: count.max(1),
            next: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.temp.dir(), config.temp.prefix.clone(), config.temp.slots)
    }

    pub fn path(&self, slot: usize) -> PathBuf {
        self.dir.join(format!("{}{}.tmp", self.prefix, slot % self.count))
    }

    /// Write `contents` to the next slot, replacing whatever it held.
    pub async fn write(&self, contents: &[u8]) -> Result<PathBuf, ResourceError> {
        let slot = self.next.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let path = self.path(slot);
        tokio::fs::write(&path, contents)
            .await
            .map_err(|source| ResourceError::TempFile {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}

#[derive(Debug)]
enum Envelope {
    Interpreter,
    Peer {
        dialect: PeerDialect,
        slots: TempSlots,
    },
}

/// Formats lines for one channel and one transport.
#[derive(Debug)]
pub struct LineFormatter {
    envelope: Envelope,
    channel: String,
    to_status: bool,
    pacing_ms: u64,
}

impl LineFormatter {
    pub fn interpreter(channel: impl Into<String>, status_channel: &str) -> Self {
        let channel = channel.into();
        Self {
            envelope: Envelope::Interpreter,
            to_status: channel.eq_ignore_ascii_case(status_channel),
            channel,
            pacing_ms: 0,
        }
    }

    pub fn peer(
        dialect: PeerDialect,
        channel: impl Into<String>,
        status_channel: &str,
        pacing_ms: u64,
        slots: TempSlots,
    ) -> Self {
        let channel = channel.into();
        Self {
            envelope: Envelope::Peer { dialect, slots },
            to_status: channel.eq_ignore_ascii_case(status_channel),
            channel,
            pacing_ms,
        }
    }

    pub fn target(&self) -> FormatTarget {
        match &self.envelope {
            Envelope::Interpreter => FormatTarget::Interpreter,
            Envelope::Peer { dialect, .. } => FormatTarget::Peer(*dialect),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Build the command string that delivers `line`.
    ///
    /// A zero-length line is sent as `\r\n` so the consumer still shows it.
    pub async fn format(&mut self, line: &[u8]) -> Result<Vec<u8>, ResourceError> {
        let line: &[u8] = if line.is_empty() { b"\r\n" } else { line };
        let destination = self.destination();
        match &mut self.envelope {
            Envelope::Interpreter => {
                let escaped = escape_for_interpreter(line);
                let mut command = Vec::with_capacity(escaped.len() + destination.len() + 16);
                if self.to_status {
                    command.extend_from_slice(b"echo \"");
                    command.extend_from_slice(&escaped);
                    command.extend_from_slice(b"\" status");
                } else {
                    command.extend_from_slice(format!("/msg {destination} \"").as_bytes());
                    command.extend_from_slice(&escaped);
                    command.push(b'"');
                }
                Ok(command)
            }
            Envelope::Peer { dialect, slots } => {
                let mut staged = Vec::with_capacity(line.len() + 1);
                if *dialect == PeerDialect::PlayFile && self.to_status {
                    // this client skips the first colour code unless the
                    // line starts with a marker
                    staged.push(PROTECT_MARKER);
                }
                staged.extend_from_slice(&scrub_parameters(line));
                let path = slots.write(&staged).await?;
                let file = path.display();
                let command = match dialect {
                    PeerDialect::Standard => {
                        format!("/play {destination} {file} {}", self.pacing_ms)
                    }
                    PeerDialect::PlayFile => format!("/playfile {destination} {file}"),
                };
                Ok(command.into_bytes())
            }
        }
    }

    /// Build the command that shows `notice` in the consumer's status window.
    pub fn notice(&self, notice: Notice) -> Vec<u8> {
        let text = notice.text();
        match self.target() {
            FormatTarget::Interpreter => format!("echo \"{text}\" status"),
            FormatTarget::Peer(PeerDialect::Standard) => format!("/echo -s \"{text}\""),
            FormatTarget::Peer(PeerDialect::PlayFile) => format!("/display \"{text}\""),
        }
        .into_bytes()
    }

    /// `-s` for the status window on the peer side, otherwise the channel.
    fn destination(&self) -> String {
        match (&self.envelope, self.to_status) {
            (Envelope::Peer { .. }, true) => "-s".to_string(),
            _ => self.channel.clone(),
        }
    }
}

/// Prefix every `"` and `\` with a backslash.
pub fn escape_for_interpreter(line: &[u8]) -> Vec<u8> {
    // worst case: every byte needs an escape
    let mut escaped = Vec::with_capacity(2 * line.len() + 1);
    for &byte in line {
        if byte == b'"' || byte == b'\\' {
            escaped.push(b'\\');
        }
        escaped.push(byte);
    }
    escaped
}

/// Replace `$` with a space wherever a digit follows it, so the peer does not
/// read `$1` as a positional parameter.
pub fn scrub_parameters(line: &[u8]) -> Vec<u8> {
    line.iter()
        .enumerate()
        .map(|(i, &byte)| {
            let next_is_digit = line.get(i + 1).is_some_and(u8::is_ascii_digit);
            if byte == b'$' && next_is_digit { b' ' } else { byte }
        })
        .collect()
}
