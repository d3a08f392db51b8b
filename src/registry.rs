//! Handler Registry
//!
//! Live set of tools keyed by name. Handlers may mutate it while a dispatch
//! is in flight; the lock is never held across a tool invocation, so a tool
//! registered from inside a handler is visible to the very next
//! `tools/list` or `tools/call`.

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::tools::{ToolDefinition, ToolHandler};

/// Registration-ordered tool table
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    tools: RwLock<Vec<ToolHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a skill's declared tool set
    pub fn with_tools(tools: impl IntoIterator<Item = ToolHandler>) -> Self {
        let registry = Self::new();
        for tool in tools {
            registry.register_tool(tool);
        }
        registry
    }

    /// Add a tool. An existing tool of the same name is replaced in place,
    /// keeping its position in the listing.
    pub fn register_tool(&self, tool: ToolHandler) {
        let mut tools = self.tools.write();
        match tools.iter_mut().find(|t| t.name() == tool.name()) {
            Some(existing) => {
                debug!(tool = %tool.name(), "Replacing tool");
                *existing = tool;
            }
            None => {
                debug!(tool = %tool.name(), "Registering tool");
                tools.push(tool);
            }
        }
    }

    /// Remove a tool; returns whether it was present
    pub fn unregister_tool(&self, name: &str) -> bool {
        let mut tools = self.tools.write();
        let before = tools.len();
        tools.retain(|t| t.name() != name);
        let removed = tools.len() != before;
        if removed {
            debug!(tool = %name, "Unregistered tool");
        }
        removed
    }

    /// Snapshot of a tool, cloned out so the lock is released before it runs
    pub fn get_tool(&self, name: &str) -> Option<ToolHandler> {
        self.tools.read().iter().find(|t| t.name() == name).cloned()
    }

    /// Definitions in registration order
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.tools
            .read()
            .iter()
            .map(|t| t.definition.clone())
            .collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools
            .read()
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    /// `tools/list` advertisement entries
    pub fn advertise(&self) -> Vec<Value> {
        self.tools
            .read()
            .iter()
            .map(|t| t.definition.advertisement())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SkillContext;
    use crate::tools::ToolResult;
    use serde_json::{Map, Value};

    fn tool(name: &str, reply: &'static str) -> ToolHandler {
        ToolHandler::new(
            ToolDefinition::new(name, &format!("{name} tool")),
            move |_ctx: SkillContext, _args: Map<String, Value>| async move {
                Ok(ToolResult::text(reply))
            },
        )
    }

    #[test]
    fn test_listing_is_registration_ordered() {
        let registry = HandlerRegistry::with_tools(vec![
            tool("zeta", "z"),
            tool("alpha", "a"),
            tool("mid", "m"),
        ]);
        assert_eq!(registry.tool_names(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_register_overwrites_in_place() {
        let registry = HandlerRegistry::with_tools(vec![tool("a", "1"), tool("b", "2")]);
        let mut replacement = tool("a", "3");
        replacement.definition.description = "hot swapped".to_string();
        registry.register_tool(replacement);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.tool_names(), vec!["a", "b"]);
        assert_eq!(registry.list_tools()[0].description, "hot swapped");
    }

    #[test]
    fn test_unregister() {
        let registry = HandlerRegistry::with_tools(vec![tool("a", "1")]);
        assert!(registry.unregister_tool("a"));
        assert!(!registry.unregister_tool("a"));
        assert!(registry.get_tool("a").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_advertise_entries() {
        let registry = HandlerRegistry::with_tools(vec![tool("a", "1")]);
        let adv = registry.advertise();
        assert_eq!(adv.len(), 1);
        assert_eq!(adv[0]["name"], "a");
        assert_eq!(adv[0]["description"], "a tool");
    }
}
