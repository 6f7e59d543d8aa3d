//! The [`HostCommand`] trait and the [`HostContext`] commands receive when executed.

use crate::engine::{Engine, PollStatus};
use crate::formatter::escape_for_interpreter;
use crate::transport::EvalHook;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// A request handed to the companion application that prepares playback
/// material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompanionMessage {
    /// Switch the companion's target channel.
    Channel(String),
    /// Raw text for the companion to process.
    Data(String),
    /// A play-control word (`start`, `stop`, `pause`, `resume`, ...).
    Play(String),
}

/// Somewhere to send [`CompanionMessage`]s.
pub trait Companion {
    fn forward(&self, message: CompanionMessage) -> Result<()>;
}

impl Companion for mpsc::UnboundedSender<CompanionMessage> {
    fn forward(&self, message: CompanionMessage) -> Result<()> {
        self.send(message)
            .map_err(|_| anyhow!("companion application is not running"))
    }
}

/// A companion that is never there.
pub struct NoCompanion;

impl Companion for NoCompanion {
    fn forward(&self, _message: CompanionMessage) -> Result<()> {
        Err(anyhow!("companion application is not running"))
    }
}

/// Execution context passed to [`HostCommand::execute`].
///
/// Gives commands the engine, the host's evaluation hook and the companion
/// sink.
pub struct HostContext<'a> {
    pub(crate) engine: &'a Engine,
    pub(crate) host: &'a mut dyn EvalHook,
    pub(crate) companion: &'a dyn Companion,
}

impl<'a> HostContext<'a> {
    pub fn new(engine: &'a Engine, host: &'a mut dyn EvalHook, companion: &'a dyn Companion) -> Self {
        Self {
            engine,
            host,
            companion,
        }
    }

    pub fn engine(&self) -> &Engine {
        self.engine
    }

    /// Show `text` in the host's window.
    pub fn echo(&mut self, text: &str) -> Result<()> {
        let mut script = b"echo \"".to_vec();
        script.extend_from_slice(&escape_for_interpreter(text.as_bytes()));
        script.push(b'"');
        self.host.eval(&script)?;
        Ok(())
    }

    pub fn forward(&self, message: CompanionMessage) -> Result<()> {
        self.companion.forward(message)
    }

    /// Run one engine poll against this context's host.
    pub async fn poll(&mut self) -> PollStatus {
        self.engine.poll(&mut *self.host).await
    }
}

/// A command the host's scripting surface can call.
///
/// To add one:
///
/// 1. Define `pub const NAME` (the word the host types) and `pub const USAGE`
///    (echoed when the arguments do not parse) on your struct.
/// 2. Re-export the struct from `src/commands/mod.rs`.
/// 3. Add one entry to the `REGISTRY` in [`crate::parser`]:
///    `(MyCmd::NAME, MyCmd::USAGE, MyCmd::parse_boxed)`.
#[async_trait(?Send)]
pub trait HostCommand: 'static {
    /// Implementations return their `NAME` constant.
    fn name(&self) -> &'static str;

    /// Parse the words that followed the command name.
    fn parse(args: &[String]) -> Result<Self>
    where
        Self: Sized;

    fn parse_boxed(args: &[String]) -> Result<Box<dyn HostCommand>>
    where
        Self: Sized,
    {
        Ok(Box::new(Self::parse(args)?))
    }

    /// Run the command. `Some` carries the command's result string.
    async fn execute(&self, ctx: &mut HostContext<'_>) -> Result<Option<String>>;
}
