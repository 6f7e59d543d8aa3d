//! [`Submit`] command: hands raw text to the companion application.
//!
//! Host syntax: `ex "some text"`

use crate::command::{CompanionMessage, HostCommand, HostContext};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::debug;

pub struct Submit {
    pub text: String,
}

impl Submit {
    pub const NAME: &'static str = "ex";
    pub const USAGE: &'static str = "Usage: /cx <text>";
}

#[async_trait(?Send)]
impl HostCommand for Submit {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn parse(args: &[String]) -> Result<Self> {
        match args {
            [text] => Ok(Self { text: text.clone() }),
            _ => Err(anyhow!("'ex' takes exactly one argument")),
        }
    }

    async fn execute(&self, ctx: &mut HostContext<'_>) -> Result<Option<String>> {
        if let Err(err) = ctx.forward(CompanionMessage::Data(self.text.clone())) {
            debug!(error = %err, "text not forwarded");
        }
        Ok(None)
    }
}
