//! Skill Context
//!
//! Per-invocation capability bundle handed to every tool and hook. It is a
//! thin façade over the [`ReverseClient`]: host state, data files, events,
//! entities, plus the live tool registry and in-process session scratch
//! values. Cheap to clone; a fresh one is built for each dispatch.

use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::client::{EntitySearch, EntityUpsert, ReverseClient};
use crate::error::ReverseCallError;
use crate::registry::HandlerRegistry;
use crate::tools::ToolHandler;

/// Session id used when the host does not name one
pub const DEFAULT_SESSION_ID: &str = "runtime";

/// Scratch values per conversation session. Lives for the bridge's lifetime
/// and is never persisted.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Map<String, Value>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str, key: &str) -> Option<Value> {
        self.sessions
            .lock()
            .get(session_id)
            .and_then(|values| values.get(key).cloned())
    }

    pub fn set(&self, session_id: &str, key: &str, value: Value) {
        self.sessions
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    pub fn remove(&self, session_id: &str, key: &str) -> Option<Value> {
        self.sessions
            .lock()
            .get_mut(session_id)
            .and_then(|values| values.remove(key))
    }

    /// Forget everything stored for a session
    pub fn end(&self, session_id: &str) -> bool {
        self.sessions.lock().remove(session_id).is_some()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.lock().len()
    }
}

/// Capability bundle passed to tools and hooks
#[derive(Clone)]
pub struct SkillContext {
    client: ReverseClient,
    registry: Arc<HandlerRegistry>,
    sessions: Arc<SessionStore>,
    skill_name: Arc<str>,
    data_dir: String,
    session_id: String,
}

impl SkillContext {
    pub fn new(
        client: ReverseClient,
        registry: Arc<HandlerRegistry>,
        sessions: Arc<SessionStore>,
        skill_name: Arc<str>,
        data_dir: String,
        session_id: Option<String>,
    ) -> Self {
        Self {
            client,
            registry,
            sessions,
            skill_name,
            data_dir,
            session_id: session_id.unwrap_or_else(|| DEFAULT_SESSION_ID.to_string()),
        }
    }

    /// Skill data directory, as announced by `skill/load`
    pub fn data_dir(&self) -> &str {
        &self.data_dir
    }

    pub fn skill_name(&self) -> &str {
        &self.skill_name
    }

    /// Host-persisted state object
    pub async fn get_state(&self) -> Result<Value, ReverseCallError> {
        self.client.get_state().await
    }

    /// Shallow-merge `partial` into host-persisted state
    pub async fn set_state(&self, partial: Value) -> Result<(), ReverseCallError> {
        self.client.set_state(partial).await
    }

    pub async fn read_data(&self, filename: &str) -> Result<String, ReverseCallError> {
        self.client.read_data(filename).await
    }

    pub async fn write_data(&self, filename: &str, content: &str) -> Result<(), ReverseCallError> {
        self.client.write_data(filename, content).await
    }

    /// Append an event to the host's intelligence stream
    pub async fn emit_event(&self, event_type: &str, data: Value) -> Result<(), ReverseCallError> {
        self.client.emit_event(event_type, data).await
    }

    pub fn log(&self, message: &str) {
        info!(skill = %self.skill_name, "{}", message);
    }

    pub fn session(&self) -> SessionHandle<'_> {
        SessionHandle { ctx: self }
    }

    pub fn tools(&self) -> ToolsHandle<'_> {
        ToolsHandle { ctx: self }
    }

    pub fn entities(&self) -> EntitiesHandle<'_> {
        EntitiesHandle { ctx: self }
    }
}

/// Scratch values scoped to the current conversation
pub struct SessionHandle<'a> {
    ctx: &'a SkillContext,
}

impl SessionHandle<'_> {
    pub fn id(&self) -> &str {
        &self.ctx.session_id
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.ctx.sessions.get(&self.ctx.session_id, key)
    }

    pub fn set(&self, key: &str, value: Value) {
        self.ctx.sessions.set(&self.ctx.session_id, key, value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.ctx.sessions.remove(&self.ctx.session_id, key)
    }
}

/// Runtime (un)registration of tools
pub struct ToolsHandle<'a> {
    ctx: &'a SkillContext,
}

impl ToolsHandle<'_> {
    /// Add or hot-swap a tool; visible to the next `tools/list`
    pub fn register(&self, tool: ToolHandler) {
        self.ctx.log(&format!("registering tool {}", tool.name()));
        self.ctx.registry.register_tool(tool);
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.ctx.registry.unregister_tool(name)
    }

    pub fn list(&self) -> Vec<String> {
        self.ctx.registry.tool_names()
    }
}

/// Host entity store
pub struct EntitiesHandle<'a> {
    ctx: &'a SkillContext,
}

impl EntitiesHandle<'_> {
    pub async fn search(&self, query: &str) -> Result<Vec<Value>, ReverseCallError> {
        self.ctx.client.search_entities(&EntitySearch::new(query)).await
    }

    pub async fn search_with(&self, search: &EntitySearch) -> Result<Vec<Value>, ReverseCallError> {
        self.ctx.client.search_entities(search).await
    }

    pub async fn upsert(&self, entity: &EntityUpsert) -> Result<(), ReverseCallError> {
        self.ctx.client.upsert_entity(entity).await
    }
}
