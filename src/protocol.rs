//! JSON-RPC 2.0 Message Codec
//!
//! One JSON object per line over a pair of byte streams. A parsed object is a
//! response iff it carries `result` or `error`; otherwise it is a request
//! (has `id`) or a notification (no `id`).

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

use crate::error::DecodeError;

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC error codes
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// Request identifier, echoed back on the matching response
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl RequestId {
    /// Numeric value, if this id could have been issued by the bridge
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => u64::try_from(*n).ok(),
            Self::String(_) => None,
        }
    }

    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(Self::Number)
                .ok_or_else(|| DecodeError::InvalidId(value.clone())),
            Value::String(s) => Ok(Self::String(s.clone())),
            other => Err(DecodeError::InvalidId(other.clone())),
        }
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self::Number(i64::try_from(id).unwrap_or(i64::MAX))
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::String(id.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// Error object of a failed response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Request: expects exactly one matching response
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    pub params: Option<Value>,
}

/// Notification: fire-and-forget, never answered
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Option<Value>,
}

/// Response to a request, success or error
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: RequestId,
    pub outcome: Result<Value, RpcError>,
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id,
            outcome: Ok(result),
        }
    }

    pub fn error(id: RequestId, code: i64, message: impl Into<String>) -> Self {
        Self {
            id,
            outcome: Err(RpcError::new(code, message)),
        }
    }
}

/// A unit on the wire
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Notification(Notification),
    Response(Response),
}

impl Message {
    /// Build the JSON object for this message
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("jsonrpc".to_string(), json!(JSONRPC_VERSION));
        match self {
            Self::Request(req) => {
                obj.insert("id".to_string(), json!(req.id));
                obj.insert("method".to_string(), json!(req.method));
                if let Some(params) = &req.params {
                    obj.insert("params".to_string(), params.clone());
                }
            }
            Self::Notification(note) => {
                obj.insert("method".to_string(), json!(note.method));
                if let Some(params) = &note.params {
                    obj.insert("params".to_string(), params.clone());
                }
            }
            Self::Response(resp) => {
                obj.insert("id".to_string(), json!(resp.id));
                match &resp.outcome {
                    Ok(result) => {
                        obj.insert("result".to_string(), result.clone());
                    }
                    Err(err) => {
                        obj.insert("error".to_string(), json!(err));
                    }
                }
            }
        }
        Value::Object(obj)
    }
}

impl From<Request> for Message {
    fn from(req: Request) -> Self {
        Self::Request(req)
    }
}

impl From<Notification> for Message {
    fn from(note: Notification) -> Self {
        Self::Notification(note)
    }
}

impl From<Response> for Message {
    fn from(resp: Response) -> Self {
        Self::Response(resp)
    }
}

/// Serialize a message to a single line, terminator included.
///
/// `serde_json` escapes control characters inside strings, so the output
/// never contains a raw newline before the terminator.
pub fn encode(message: &Message) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(&message.to_value())?;
    line.push('\n');
    Ok(line)
}

/// Error object of a response, tolerating a missing code or message so the
/// pending call is still rejected
fn lenient_error(err: Value) -> RpcError {
    let code = err
        .get("code")
        .and_then(Value::as_i64)
        .unwrap_or(error_codes::INTERNAL_ERROR);
    let message = match &err {
        Value::String(message) => message.clone(),
        other => other
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Reverse RPC error")
            .to_string(),
    };
    let data = err.get("data").cloned();
    RpcError { code, message, data }
}

/// Parse one raw frame. Bytes that are not UTF-8 are a decode error.
pub fn decode_bytes(frame: &[u8]) -> Result<Option<Message>, DecodeError> {
    decode(std::str::from_utf8(frame)?)
}

/// Parse one line. Blank lines yield `Ok(None)`.
pub fn decode(line: &str) -> Result<Option<Message>, DecodeError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(trimmed)?;
    let Value::Object(mut obj) = value else {
        return Err(DecodeError::NotAnObject);
    };

    if obj.contains_key("result") || obj.contains_key("error") {
        let id = obj
            .get("id")
            .map(RequestId::from_value)
            .transpose()?
            .ok_or(DecodeError::InvalidId(Value::Null))?;
        let outcome = match obj.remove("error") {
            Some(err) => Err(lenient_error(err)),
            None => Ok(obj.remove("result").unwrap_or(Value::Null)),
        };
        return Ok(Some(Message::Response(Response { id, outcome })));
    }

    let method = match obj.remove("method") {
        Some(Value::String(method)) => method,
        _ => return Err(DecodeError::MissingMethod),
    };
    let params = obj.remove("params");

    let message = match obj.get("id") {
        None | Some(Value::Null) => Message::Notification(Notification { method, params }),
        Some(id) => Message::Request(Request {
            id: RequestId::from_value(id)?,
            method,
            params,
        }),
    };
    Ok(Some(message))
}
