//! Skill Server
//!
//! Wires a [`SkillDefinition`] to a pair of byte streams: one correlation
//! table and one serialized writer shared by the reverse-call client and the
//! transport loop, plus the dispatcher that owns the live tool registry.

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

use crate::client::ReverseClient;
use crate::config::Config;
use crate::correlation::CorrelationTable;
use crate::dispatch::Dispatcher;
use crate::skill::SkillDefinition;
use crate::transport::{self, FrameWriter, ServeOutcome};

/// Bridge for one skill
pub struct SkillServer {
    skill: SkillDefinition,
    config: Config,
}

impl SkillServer {
    /// Create a server, rejecting invalid skill definitions up front
    pub fn new(skill: SkillDefinition, config: Config) -> anyhow::Result<Self> {
        skill.validate()?;
        Ok(Self { skill, config })
    }

    pub fn skill(&self) -> &SkillDefinition {
        &self.skill
    }

    /// Serve over arbitrary streams until EOF or `skill/shutdown`
    pub async fn serve<R, W>(self, reader: R, writer: W) -> anyhow::Result<ServeOutcome>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        info!(
            skill = %self.skill.name,
            version = %self.skill.version,
            tools = self.skill.tools.len(),
            hooks = ?self.skill.hooks.installed(),
            "Starting skill bridge"
        );

        let table = Arc::new(CorrelationTable::new());
        let writer = Arc::new(FrameWriter::new(writer));
        let client = ReverseClient::new(
            table.clone(),
            writer.clone(),
            self.config.reverse_call_timeout,
        );
        let dispatcher = Arc::new(Dispatcher::new(self.skill, client, self.config.data_dir));

        let outcome = transport::serve(reader, writer, table, dispatcher).await?;
        info!(?outcome, "Skill bridge stopped");
        Ok(outcome)
    }

    /// Serve over the process's stdin/stdout
    pub async fn run_stdio(self) -> anyhow::Result<ServeOutcome> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }
}
