//! Dispatch Engine
//!
//! Turns one inbound request or notification into a result value by routing
//! on its method: tool listing and invocation against the live registry, or
//! the matching lifecycle hook. Failures, including panics inside tool and
//! hook bodies, become JSON-RPC errors for requests and log lines for
//! notifications.

use futures_util::FutureExt;
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::client::ReverseClient;
use crate::context::{SessionStore, SkillContext};
use crate::error::{BridgeError, BridgeResult};
use crate::lifecycle::{ContextHook, LifecycleEvent, LifecycleHooks, SessionHook, TransformHook};
use crate::protocol::{Notification, Request, Response};
use crate::registry::HandlerRegistry;
use crate::skill::SkillDefinition;

/// Inbound methods the bridge understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMethod {
    Initialize,
    Ping,
    ToolsList,
    ToolsCall,
    Load,
    Unload,
    Activate,
    Deactivate,
    SessionStart,
    SessionEnd,
    BeforeMessage,
    AfterResponse,
    MemoryFlush,
    Tick,
    SetupStart,
    SetupSubmit,
    SetupCancel,
    Shutdown,
    Unknown(String),
}

impl InboundMethod {
    pub fn parse(method: &str) -> Self {
        match method {
            "initialize" => Self::Initialize,
            "ping" => Self::Ping,
            "tools/list" => Self::ToolsList,
            "tools/call" => Self::ToolsCall,
            "skill/load" => Self::Load,
            "skill/unload" => Self::Unload,
            "skill/activate" => Self::Activate,
            "skill/deactivate" => Self::Deactivate,
            "skill/sessionStart" => Self::SessionStart,
            "skill/sessionEnd" => Self::SessionEnd,
            "skill/beforeMessage" => Self::BeforeMessage,
            "skill/afterResponse" => Self::AfterResponse,
            "skill/memoryFlush" => Self::MemoryFlush,
            "skill/tick" => Self::Tick,
            "skill/setupStart" => Self::SetupStart,
            "skill/setupSubmit" => Self::SetupSubmit,
            "skill/setupCancel" => Self::SetupCancel,
            "skill/shutdown" => Self::Shutdown,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Initialize => "initialize",
            Self::Ping => "ping",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
            Self::Load => "skill/load",
            Self::Unload => "skill/unload",
            Self::Activate => "skill/activate",
            Self::Deactivate => "skill/deactivate",
            Self::SessionStart => "skill/sessionStart",
            Self::SessionEnd => "skill/sessionEnd",
            Self::BeforeMessage => "skill/beforeMessage",
            Self::AfterResponse => "skill/afterResponse",
            Self::MemoryFlush => "skill/memoryFlush",
            Self::Tick => "skill/tick",
            Self::SetupStart => "skill/setupStart",
            Self::SetupSubmit => "skill/setupSubmit",
            Self::SetupCancel => "skill/setupCancel",
            Self::Shutdown => "skill/shutdown",
            Self::Unknown(method) => method.as_str(),
        }
    }
}

impl fmt::Display for InboundMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Skill metadata reported by `initialize`
#[derive(Debug, Clone)]
struct SkillInfo {
    name: Arc<str>,
    description: String,
    version: String,
    tick_interval: Option<Duration>,
    has_setup: bool,
}

/// Routes inbound methods to tools and hooks
pub struct Dispatcher {
    info: SkillInfo,
    hooks: LifecycleHooks,
    registry: Arc<HandlerRegistry>,
    client: ReverseClient,
    sessions: Arc<SessionStore>,
    /// Set by `skill/load`'s `dataDir`, or the configured directory
    data_dir: RwLock<Option<String>>,
    manifest_id: RwLock<Option<String>>,
}

fn ok() -> Value {
    json!({ "ok": true })
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn param_str(params: &Map<String, Value>, key: &str) -> Option<String> {
    params.get(key).and_then(Value::as_str).map(str::to_string)
}

impl Dispatcher {
    /// Build from a skill definition. The definition's tools seed the live
    /// registry; `data_dir` is the configured directory, if any.
    pub fn new(skill: SkillDefinition, client: ReverseClient, data_dir: Option<String>) -> Self {
        let info = SkillInfo {
            name: Arc::from(skill.name.as_str()),
            description: skill.description,
            version: skill.version,
            tick_interval: skill.tick_interval,
            has_setup: skill.has_setup,
        };
        Self {
            info,
            hooks: skill.hooks,
            registry: Arc::new(HandlerRegistry::with_tools(skill.tools)),
            client,
            sessions: Arc::new(SessionStore::new()),
            data_dir: RwLock::new(data_dir),
            manifest_id: RwLock::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Effective data directory: the announced one, else derived from the
    /// manifest id (falling back to the skill name)
    pub fn data_dir(&self) -> String {
        if let Some(dir) = self.data_dir.read().as_ref() {
            return dir.clone();
        }
        let manifest_id = self.manifest_id.read();
        let id = manifest_id.as_deref().unwrap_or(&self.info.name);
        format!("skills/{}/data", id)
    }

    /// Fresh context for one invocation
    pub fn context(&self, session_id: Option<String>) -> SkillContext {
        SkillContext::new(
            self.client.clone(),
            self.registry.clone(),
            self.sessions.clone(),
            self.info.name.clone(),
            self.data_dir(),
            session_id,
        )
    }

    /// Answer a request. Always yields exactly one response.
    pub async fn handle_request(&self, request: Request) -> Response {
        let method = InboundMethod::parse(&request.method);
        let outcome = AssertUnwindSafe(self.dispatch(&method, request.params))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(BridgeError::Panic(panic_message(payload))));

        match outcome {
            Ok(result) => Response::success(request.id, result),
            Err(e) => {
                match &e {
                    BridgeError::MethodNotFound(_) => warn!("Unknown method: {}", method),
                    _ => error!(id = %request.id, %method, "Request failed: {}", e),
                }
                Response::error(request.id, e.code(), e.to_string())
            }
        }
    }

    /// Run a notification. Nothing is sent back.
    pub async fn handle_notification(&self, notification: Notification) {
        let method = InboundMethod::parse(&notification.method);
        let outcome = AssertUnwindSafe(self.dispatch(&method, notification.params))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(BridgeError::Panic(panic_message(payload))));

        match outcome {
            Ok(_) => debug!(%method, "Notification handled"),
            Err(BridgeError::MethodNotFound(_)) => warn!("Ignoring notification for unknown method: {}", method),
            Err(e) => error!(%method, "Notification handler error: {}", e),
        }
    }

    /// Route one method to its handler
    pub async fn dispatch(&self, method: &InboundMethod, params: Option<Value>) -> BridgeResult<Value> {
        let params = match params {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };

        match method {
            InboundMethod::Initialize => Ok(self.initialize()),
            InboundMethod::Ping => Ok(json!({})),
            InboundMethod::ToolsList => Ok(json!({ "tools": self.registry.advertise() })),
            InboundMethod::ToolsCall => self.call_tool(params).await,
            InboundMethod::Load => self.load(params).await,
            InboundMethod::Unload => {
                self.run_context_hook(LifecycleEvent::Unload, self.hooks.on_unload.as_ref())
                    .await?;
                Ok(ok())
            }
            InboundMethod::Activate | InboundMethod::Deactivate => Ok(ok()),
            InboundMethod::SessionStart => {
                let session_id = param_str(&params, "sessionId").unwrap_or_default();
                self.run_session_hook(
                    LifecycleEvent::SessionStart,
                    self.hooks.on_session_start.as_ref(),
                    session_id,
                )
                .await?;
                Ok(ok())
            }
            InboundMethod::SessionEnd => {
                let session_id = param_str(&params, "sessionId").unwrap_or_default();
                let result = self
                    .run_session_hook(
                        LifecycleEvent::SessionEnd,
                        self.hooks.on_session_end.as_ref(),
                        session_id.clone(),
                    )
                    .await;
                self.sessions.end(&session_id);
                result?;
                Ok(ok())
            }
            InboundMethod::BeforeMessage => {
                let message = param_str(&params, "message").unwrap_or_default();
                let replaced = self
                    .run_transform_hook(
                        LifecycleEvent::BeforeMessage,
                        self.hooks.on_before_message.as_ref(),
                        param_str(&params, "sessionId"),
                        message,
                    )
                    .await?;
                Ok(json!({ "message": replaced }))
            }
            InboundMethod::AfterResponse => {
                let response = param_str(&params, "response").unwrap_or_default();
                let replaced = self
                    .run_transform_hook(
                        LifecycleEvent::AfterResponse,
                        self.hooks.on_after_response.as_ref(),
                        param_str(&params, "sessionId"),
                        response,
                    )
                    .await?;
                Ok(json!({ "response": replaced }))
            }
            InboundMethod::MemoryFlush => {
                self.run_context_hook(LifecycleEvent::MemoryFlush, self.hooks.on_memory_flush.as_ref())
                    .await?;
                Ok(ok())
            }
            InboundMethod::Tick => {
                self.run_context_hook(LifecycleEvent::Tick, self.hooks.on_tick.as_ref())
                    .await?;
                Ok(ok())
            }
            InboundMethod::SetupStart => self.setup_start().await,
            InboundMethod::SetupSubmit => self.setup_submit(params).await,
            InboundMethod::SetupCancel => {
                self.run_context_hook(LifecycleEvent::SetupCancel, self.hooks.on_setup_cancel.as_ref())
                    .await?;
                Ok(ok())
            }
            InboundMethod::Shutdown => Ok(ok()),
            InboundMethod::Unknown(name) => Err(BridgeError::MethodNotFound(name.clone())),
        }
    }

    fn initialize(&self) -> Value {
        json!({
            "name": &*self.info.name,
            "description": self.info.description,
            "version": self.info.version,
            "tools": self.registry.advertise(),
            "tickInterval": self.info.tick_interval.map(|d| d.as_millis() as u64),
            "hasSetup": self.info.has_setup,
        })
    }

    async fn call_tool(&self, params: Map<String, Value>) -> BridgeResult<Value> {
        let name = param_str(&params, "name")
            .ok_or_else(|| BridgeError::InvalidParams("Missing 'name' parameter".to_string()))?;

        let args = match params.get("arguments") {
            Some(Value::Object(args)) => args.clone(),
            None | Some(Value::Null) => Map::new(),
            Some(_) => {
                return Err(BridgeError::InvalidParams(
                    "'arguments' must be an object".to_string(),
                ))
            }
        };

        // clone out of the registry so a tool may (un)register tools itself
        let tool = self
            .registry
            .get_tool(&name)
            .ok_or_else(|| BridgeError::UnknownTool(name.clone()))?;

        debug!(tool = %name, "Calling tool");
        let result = tool.execute(self.context(None), args).await?;
        Ok(result.to_payload())
    }

    async fn load(&self, params: Map<String, Value>) -> BridgeResult<Value> {
        if let Some(id) = params
            .get("manifest")
            .and_then(|m| m.get("id"))
            .and_then(Value::as_str)
        {
            *self.manifest_id.write() = Some(id.to_string());
        }
        if let Some(dir) = param_str(&params, "dataDir") {
            *self.data_dir.write() = Some(dir);
        }
        info!(skill = %self.info.name, data_dir = %self.data_dir(), "Skill loaded");

        self.run_context_hook(LifecycleEvent::Load, self.hooks.on_load.as_ref())
            .await?;
        Ok(ok())
    }

    async fn setup_start(&self) -> BridgeResult<Value> {
        let Some(hook) = self.hooks.on_setup_start.as_ref() else {
            return Ok(json!({ "step": null }));
        };
        debug!(event = %LifecycleEvent::SetupStart, "Running hook");
        let step = hook(self.context(None)).await?;
        Ok(json!({ "step": step }))
    }

    async fn setup_submit(&self, params: Map<String, Value>) -> BridgeResult<Value> {
        let Some(hook) = self.hooks.on_setup_submit.as_ref() else {
            return Ok(json!({ "status": "complete" }));
        };
        let step_id = param_str(&params, "stepId")
            .ok_or_else(|| BridgeError::InvalidParams("Missing 'stepId' parameter".to_string()))?;
        let values = match params.get("values") {
            Some(Value::Object(values)) => values.clone(),
            _ => Map::new(),
        };

        debug!(event = %LifecycleEvent::SetupSubmit, step = %step_id, "Running hook");
        let result = hook(self.context(None), step_id, values).await?;
        Ok(serde_json::to_value(result)?)
    }

    async fn run_context_hook(&self, event: LifecycleEvent, hook: Option<&ContextHook>) -> BridgeResult<()> {
        let Some(hook) = hook else {
            return Ok(());
        };
        debug!(%event, "Running hook");
        hook(self.context(None)).await?;
        Ok(())
    }

    async fn run_session_hook(
        &self,
        event: LifecycleEvent,
        hook: Option<&SessionHook>,
        session_id: String,
    ) -> BridgeResult<()> {
        let Some(hook) = hook else {
            return Ok(());
        };
        debug!(%event, session = %session_id, "Running hook");
        let ctx = self.context(Some(session_id.clone()).filter(|s| !s.is_empty()));
        hook(ctx, session_id).await?;
        Ok(())
    }

    /// `None` means the hook is absent or left the text unchanged
    async fn run_transform_hook(
        &self,
        event: LifecycleEvent,
        hook: Option<&TransformHook>,
        session_id: Option<String>,
        text: String,
    ) -> BridgeResult<Option<String>> {
        let Some(hook) = hook else {
            return Ok(None);
        };
        debug!(%event, "Running hook");
        Ok(hook(self.context(session_id), text).await?)
    }
}
