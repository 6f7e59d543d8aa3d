//! [`Channel`] command: tells the companion application which channel to
//! target.
//!
//! Host syntax: `chan #channel`

use crate::command::{CompanionMessage, HostCommand, HostContext};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::debug;

pub struct Channel {
    pub channel: String,
}

impl Channel {
    pub const NAME: &'static str = "chan";
    pub const USAGE: &'static str = "Usage: /chan <channel>";
}

#[async_trait(?Send)]
impl HostCommand for Channel {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn parse(args: &[String]) -> Result<Self> {
        match args {
            [channel] => Ok(Self {
                channel: channel.clone(),
            }),
            _ => Err(anyhow!("'chan' takes exactly one argument")),
        }
    }

    async fn execute(&self, ctx: &mut HostContext<'_>) -> Result<Option<String>> {
        if let Err(err) = ctx.forward(CompanionMessage::Channel(self.channel.clone())) {
            debug!(error = %err, "channel change not forwarded");
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(Channel::parse(&["#art".to_string()]).unwrap().channel, "#art");
        assert!(Channel::parse(&[]).is_err());
    }
}
