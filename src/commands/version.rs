//! [`Version`] command: returns the engine's build identifier.

use crate::command::{HostCommand, HostContext};
use anyhow::Result;
use async_trait::async_trait;

pub struct Version;

impl Version {
    pub const NAME: &'static str = "version";
    pub const USAGE: &'static str = "Usage: /version";
}

#[async_trait(?Send)]
impl HostCommand for Version {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    // extra words are ignored
    fn parse(_args: &[String]) -> Result<Self> {
        Ok(Self)
    }

    async fn execute(&self, ctx: &mut HostContext<'_>) -> Result<Option<String>> {
        Ok(Some(ctx.engine().version().to_string()))
    }
}
