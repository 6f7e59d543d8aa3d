//! [`Play`] command: local file playback and play control from the host.
//!
//! Host syntax:
//! - `play #channel song.txt`: play with the default delay
//! - `play #channel song.txt 250`: one line every 250 ms
//! - `play stop` / `play pause` / `play resume`: control a running playback;
//!   with no local playback the word goes to the companion application

use crate::command::{CompanionMessage, HostCommand, HostContext};
use crate::engine::StartRequest;
use anyhow::{Context as _, Result, anyhow};
use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayAction {
    /// A control word such as `stop`, `pause` or `resume`.
    Control(String),
    Start {
        channel: String,
        file: String,
        delay_ms: Option<i64>,
    },
}

pub struct Play {
    pub action: PlayAction,
}

impl Play {
    pub const NAME: &'static str = "play";
    pub const USAGE: &'static str = "Usage: /play <channel> <filename> <delay in ms>";

    /// The delay to play at: anything at or below the configured minimum
    /// falls back to the default.
    fn interval(delay_ms: Option<i64>, default_ms: i64, min_ms: i64) -> i64 {
        match delay_ms {
            Some(delay) if delay > min_ms => delay,
            _ => default_ms,
        }
    }
}

/// Leading decimal digits of `s`, or 0.
fn leading_number(s: &str) -> i64 {
    let s = s.trim_start();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().map_or(0, |value| sign * value)
}

#[async_trait(?Send)]
impl HostCommand for Play {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn parse(args: &[String]) -> Result<Self> {
        let action = match args {
            [word] => PlayAction::Control(word.clone()),
            [channel, file] => PlayAction::Start {
                channel: channel.clone(),
                file: file.clone(),
                delay_ms: None,
            },
            [channel, file, delay] => PlayAction::Start {
                channel: channel.clone(),
                file: file.clone(),
                delay_ms: Some(leading_number(delay)),
            },
            _ => return Err(anyhow!("'play' takes one to three arguments")),
        };
        Ok(Self { action })
    }

    async fn execute(&self, ctx: &mut HostContext<'_>) -> Result<Option<String>> {
        match &self.action {
            PlayAction::Control(word) => {
                let engine = ctx.engine().clone();
                if !engine.has_session().await {
                    if let Err(err) = ctx.forward(CompanionMessage::Play(word.clone())) {
                        debug!(error = %err, "play request not forwarded");
                    }
                    return Ok(None);
                }
                let accepted = match word.to_ascii_lowercase().as_str() {
                    "stop" => engine.stop().await,
                    "pause" => engine.pause().await,
                    "resume" => engine.resume().await,
                    other => {
                        debug!(word = other, "unknown play control word");
                        false
                    }
                };
                Ok(Some(u8::from(accepted).to_string()))
            }
            PlayAction::Start {
                channel,
                file,
                delay_ms,
            } => {
                let engine = ctx.engine().clone();
                let host = &engine.config().host;
                let interval =
                    Self::interval(*delay_ms, host.play_interval_ms, host.min_play_interval_ms);
                engine
                    .try_start(StartRequest::file(file.as_str(), interval).channel(channel.as_str()))
                    .await
                    .with_context(|| format!("Failed to play {file}"))?;
                Ok(Some("1".to_string()))
            }
        }
    }
}
