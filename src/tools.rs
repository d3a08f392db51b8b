//! Tool Contracts
//!
//! A tool is a named capability the host may invoke through `tools/call`.
//! Its parameter description is advertised through `tools/list` as a JSON
//! Schema object; arguments are not validated against it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::context::SkillContext;

/// Tool definition as advertised to the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterSpec>,
}

impl ToolDefinition {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: BTreeMap::new(),
        }
    }

    /// Add a parameter
    pub fn with_parameter(mut self, name: &str, param: ParameterSpec) -> Self {
        self.parameters.insert(name.to_string(), param);
        self
    }

    /// Convert to JSON Schema for `tools/list`
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for (name, param) in &self.parameters {
            properties.insert(name.clone(), param.to_json_schema());
            if param.required {
                required.push(Value::String(name.clone()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// `{name, description, inputSchema}` advertisement entry
    pub fn advertisement(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema(),
        })
    }
}

/// Declared parameter of a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    pub description: String,
    #[serde(default)]
    pub required: bool,
    pub default: Option<Value>,
    #[serde(rename = "enum")]
    pub enum_values: Option<Vec<String>>,
}

impl ParameterSpec {
    fn of(param_type: ParameterType, description: &str, required: bool) -> Self {
        Self {
            param_type,
            description: description.to_string(),
            required,
            default: None,
            enum_values: None,
        }
    }

    pub fn string(description: &str, required: bool) -> Self {
        Self::of(ParameterType::String, description, required)
    }

    pub fn number(description: &str, required: bool) -> Self {
        Self::of(ParameterType::Number, description, required)
    }

    pub fn integer(description: &str, required: bool) -> Self {
        Self::of(ParameterType::Integer, description, required)
    }

    pub fn boolean(description: &str, required: bool) -> Self {
        Self::of(ParameterType::Boolean, description, required)
    }

    pub fn array(description: &str, required: bool) -> Self {
        Self::of(ParameterType::Array, description, required)
    }

    pub fn object(description: &str, required: bool) -> Self {
        Self::of(ParameterType::Object, description, required)
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_enum(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    /// Convert to JSON Schema
    pub fn to_json_schema(&self) -> Value {
        let mut schema = json!({
            "type": self.param_type.as_str(),
            "description": self.description,
        });

        if let Some(ref default) = self.default {
            schema["default"] = default.clone();
        }
        if let Some(ref enum_values) = self.enum_values {
            schema["enum"] = json!(enum_values);
        }

        schema
    }
}

/// Parameter types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// What a tool hands back to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    /// A result the tool itself flags as failed. Unlike returning `Err`, this
    /// still produces a success response with `isError: true`.
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }

    /// `tools/call` response payload
    pub fn to_payload(&self) -> Value {
        json!({
            "content": [{"type": "text", "text": self.content}],
            "isError": self.is_error,
        })
    }
}

/// Executable side of a tool
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, ctx: SkillContext, args: Map<String, Value>) -> anyhow::Result<ToolResult>;
}

#[async_trait]
impl<F, Fut> ToolExecutor for F
where
    F: Fn(SkillContext, Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<ToolResult>> + Send + 'static,
{
    async fn execute(&self, ctx: SkillContext, args: Map<String, Value>) -> anyhow::Result<ToolResult> {
        (self)(ctx, args).await
    }
}

/// A registered tool: its advertisement plus its executor
#[derive(Clone)]
pub struct ToolHandler {
    pub definition: ToolDefinition,
    executor: Arc<dyn ToolExecutor>,
}

impl ToolHandler {
    pub fn new(definition: ToolDefinition, executor: impl ToolExecutor + 'static) -> Self {
        Self {
            definition,
            executor: Arc::new(executor),
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub async fn execute(&self, ctx: SkillContext, args: Map<String, Value>) -> anyhow::Result<ToolResult> {
        self.executor.execute(ctx, args).await
    }
}

impl fmt::Debug for ToolHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolHandler")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

/// Read a string argument
pub fn arg_str<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}
