//! Skill Definition
//!
//! What a skill declares at startup: metadata, its initial tool set, an
//! optional tick interval, and the lifecycle hook bundle. The server reads it
//! once; afterwards only the live registry changes.

use std::collections::HashSet;
use std::time::Duration;

use crate::lifecycle::LifecycleHooks;
use crate::tools::ToolHandler;

/// Shortest tick interval a host will schedule
pub const MIN_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Complete skill definition
#[derive(Debug)]
pub struct SkillDefinition {
    pub name: String,
    pub description: String,
    pub version: String,
    pub tools: Vec<ToolHandler>,
    /// How often the host should send `skill/tick`
    pub tick_interval: Option<Duration>,
    /// Whether the host should offer the setup wizard
    pub has_setup: bool,
    pub hooks: LifecycleHooks,
}

impl SkillDefinition {
    /// Create a minimal skill definition
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            version: "1.0.0".to_string(),
            tools: Vec::new(),
            tick_interval: None,
            has_setup: false,
            hooks: LifecycleHooks::default(),
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Add a tool
    pub fn with_tool(mut self, tool: ToolHandler) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = Some(interval);
        self
    }

    pub fn with_setup(mut self) -> Self {
        self.has_setup = true;
        self
    }

    pub fn with_hooks(mut self, hooks: LifecycleHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Validate the skill definition
    pub fn validate(&self) -> Result<(), SkillValidationError> {
        if self.name.is_empty() {
            return Err(SkillValidationError::MissingField("name".to_string()));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(SkillValidationError::InvalidName(self.name.clone()));
        }
        if self.description.is_empty() {
            return Err(SkillValidationError::MissingField("description".to_string()));
        }

        let mut seen = HashSet::new();
        for tool in &self.tools {
            if tool.name().is_empty() {
                return Err(SkillValidationError::InvalidTool("empty tool name".to_string()));
            }
            if !seen.insert(tool.name()) {
                return Err(SkillValidationError::DuplicateTool(tool.name().to_string()));
            }
        }

        if self.has_setup
            && (self.hooks.on_setup_start.is_none() || self.hooks.on_setup_submit.is_none())
        {
            return Err(SkillValidationError::MissingField(
                "setup hooks (has_setup requires setup-start and setup-submit)".to_string(),
            ));
        }

        if self.tick_interval.is_some_and(|d| d < MIN_TICK_INTERVAL) {
            return Err(SkillValidationError::InvalidTickInterval);
        }

        Ok(())
    }
}

/// Skill validation errors
#[derive(Debug, thiserror::Error)]
pub enum SkillValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("Invalid skill name: {0}")]
    InvalidName(String),
    #[error("Invalid tool: {0}")]
    InvalidTool(String),
    #[error("Duplicate tool name: {0}")]
    DuplicateTool(String),
    #[error("Tick interval must be at least 1000ms")]
    InvalidTickInterval,
}
