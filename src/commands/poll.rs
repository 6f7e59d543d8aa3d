//! [`Poll`] command: runs one engine tick from the host's own loop.
//!
//! The host calls this periodically; it is the only path by which paced
//! lines reach the host interpreter.

use crate::command::{HostCommand, HostContext};
use anyhow::Result;
use async_trait::async_trait;

pub struct Poll;

impl Poll {
    pub const NAME: &'static str = "poll";
    pub const USAGE: &'static str = "Usage: /poll";
}

#[async_trait(?Send)]
impl HostCommand for Poll {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn parse(_args: &[String]) -> Result<Self> {
        Ok(Self)
    }

    async fn execute(&self, ctx: &mut HostContext<'_>) -> Result<Option<String>> {
        Ok(Some(ctx.poll().await.to_string()))
    }
}
