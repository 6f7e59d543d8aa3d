//! # Linepacer
//!
//! Paced, line-by-line playback of text into a consumer process.
//!
//! Linepacer loads a text file (or takes a single line), splits it into
//! display lines and delivers one line per interval to either a host
//! interpreter or a separate peer process such as a chat client, under
//! start/pause/resume/stop control.
//!
//! ## Quick start
//!
//! ```no_run
//! use linepacer::{Engine, EngineConfig, PollStatus, StartRequest};
//! use linepacer::transport::EvalHook;
//! use linepacer::error::TransportError;
//!
//! struct Stdout;
//!
//! impl EvalHook for Stdout {
//!     fn eval(&mut self, script: &[u8]) -> Result<(), TransportError> {
//!         println!("{}", String::from_utf8_lossy(script));
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = Engine::new(EngineConfig::default());
//!     engine
//!         .try_start(StartRequest::file("song.txt", 500).channel("#art"))
//!         .await?;
//!
//!     let mut host = Stdout;
//!     while engine.has_session().await {
//!         if let PollStatus::Aborted(reason) = engine.poll(&mut host).await {
//!             anyhow::bail!(reason);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Transports
//!
//! Without a service name, lines go to the host interpreter through an
//! [`EvalHook`](transport::EvalHook). The engine never calls the hook from
//! its timer: the host calls [`Engine::poll`] from its own loop and each poll
//! delivers at most one paced line. With a service name, lines go to a peer
//! process through a [`PeerLink`](transport::PeerLink), straight from the
//! timer, one short conversation per line.
//!
//! | Interpreter command | Peer command |
//! |---------|-------------|
//! | `echo "<line>" status` | `/play -s <tempfile> <pacing>` |
//! | `/msg <channel> "<line>"` | `/play <channel> <tempfile> <pacing>` |
//!
//! ## Single lines
//!
//! A negative interval makes the source the line itself. Interpreter-bound
//! single lines wait in a small queue until the next poll drains them in
//! order; peer-bound ones are delivered by the start call.
//!
//! ## Host commands
//!
//! [`dispatch`] runs the host-facing commands `play`, `poll`, `version`,
//! `ex` and `chan`; [`registered_commands`] lists them with their usage lines.

pub mod command;
pub mod commands;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod formatter;
pub mod parser;
pub(crate) mod pty;
pub(crate) mod pty_reader;
pub(crate) mod scheduler;
pub(crate) mod session;
pub mod splitter;
pub mod transport;

pub use command::{Companion, CompanionMessage, HostCommand, HostContext, NoCompanion};
pub use config::EngineConfig;
pub use control::{Notice, PlaybackEvent, PlaybackState};
pub use engine::{Engine, PollStatus, StartRequest, VERSION};
pub use error::PacerError;
pub use parser::{dispatch, parse_line, registered_commands};
pub use pty::PtyHost;
pub use pty_reader::spawn_reader;
pub use splitter::LineSplitter;
