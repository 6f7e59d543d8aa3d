//! Error taxonomy for the playback engine.
//!
//! Every failure falls in one of four classes: resources (the source file,
//! temp files, memory), transports (host interpreter or peer process), state
//! (an operation that makes no sense right now) and configuration.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PacerError {
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// The source or a temp file could not be opened, sized, read or written.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("could not open file: {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("play file is empty: {0}")]
    Empty(PathBuf),
    #[error("file is too big: {path} ({size} bytes, limit {limit})")]
    TooBig { path: PathBuf, size: u64, limit: u64 },
    #[error("could not read entire file: {path} ({read} of {expected} bytes)")]
    ShortRead {
        path: PathBuf,
        read: usize,
        expected: u64,
    },
    #[error("could not read file: {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("insufficient memory for {0} bytes")]
    OutOfMemory(u64),
    #[error("error writing temp file: {path}")]
    TempFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Delivery to the consumer failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("host interpreter is not available")]
    HostUnavailable,
    #[error("host interpreter failed to evaluate command: {0}")]
    Evaluation(String),
    #[error("peer service `{0}` not found")]
    PeerNotFound(String),
    #[error("no conversation established with `{service}`: {reason}")]
    NoConversation { service: String, reason: String },
    #[error("peer is busy")]
    Busy,
    #[error("peer transaction timed out after {0:?}")]
    Timeout(Duration),
    #[error("peer rejected the transaction: {0}")]
    Rejected(String),
    #[error("line handoff closed")]
    HandoffClosed,
}

/// The operation is not valid for the current session state. Callers of the
/// control surface only ever see these as a `false` return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("a playback session is already running")]
    AlreadyRunning,
    #[error("no playback session")]
    NoSession,
    #[error("playback is already paused")]
    AlreadyPaused,
    #[error("playback is not paused")]
    NotPaused,
    #[error("single-line queue is full")]
    FifoFull,
    #[error("no source given")]
    MissingSource,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not parse config")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

pub type Result<T, E = PacerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_error_message_names_path() {
        let err = PacerError::from(ResourceError::Empty(PathBuf::from("song.txt")));
        assert_eq!(err.to_string(), "play file is empty: song.txt");
    }

    #[test]
    fn test_transport_error_is_cloneable() {
        let err = TransportError::Timeout(Duration::from_millis(5000));
        assert_eq!(err.clone(), err);
        assert!(err.to_string().contains("5s"));
    }
}
