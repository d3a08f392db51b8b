//! Reverse-Call Client
//!
//! The bridge's own outbound API into the host: state, data files, events
//! and entities. Each call takes a fresh correlation id, writes one request
//! frame, and waits for the matching response up to the configured timeout.
//! Calls may run concurrently; their ids interleave on the shared transport.

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::correlation::CorrelationTable;
use crate::error::ReverseCallError;
use crate::protocol::{Request, RequestId};
use crate::transport::FrameWriter;

/// Reverse methods issued to the host
pub mod methods {
    pub const STATE_GET: &str = "state/get";
    pub const STATE_SET: &str = "state/set";
    pub const DATA_READ: &str = "data/read";
    pub const DATA_WRITE: &str = "data/write";
    pub const EMIT_EVENT: &str = "intelligence/emitEvent";
    pub const ENTITIES_UPSERT: &str = "entities/upsert";
    pub const ENTITIES_SEARCH: &str = "entities/search";
}

/// Default wait for a reverse-call response
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Entity to create or update in the host's entity store
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityUpsert {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl EntityUpsert {
    pub fn new(entity_type: &str, source: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            source: source.to_string(),
            ..Default::default()
        }
    }
}

/// Entity search query
#[derive(Debug, Clone, Default, Serialize)]
pub struct EntitySearch {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl EntitySearch {
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            ..Default::default()
        }
    }
}

/// Drops the pending entry when a caller stops waiting before the call
/// settles. A no-op once the call has settled.
struct CancelOnDrop<'a> {
    table: &'a CorrelationTable,
    id: u64,
}

impl Drop for CancelOnDrop<'_> {
    fn drop(&mut self) {
        self.table.cancel(self.id);
    }
}

/// Outbound call API. Clone is cheap; clones share the table and writer.
#[derive(Clone)]
pub struct ReverseClient {
    table: Arc<CorrelationTable>,
    writer: Arc<FrameWriter>,
    timeout: Duration,
}

impl ReverseClient {
    pub fn new(table: Arc<CorrelationTable>, writer: Arc<FrameWriter>, timeout: Duration) -> Self {
        Self {
            table,
            writer,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Issue a request to the host and wait for its response
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, ReverseCallError> {
        let (id, mut rx) = self.table.register(method);

        // already settled only when the table is closed
        if let Ok(outcome) = rx.try_recv() {
            return outcome;
        }
        let _guard = CancelOnDrop {
            table: &self.table,
            id,
        };

        let request = Request {
            id: RequestId::from(id),
            method: method.to_string(),
            params,
        };
        if let Err(e) = self.writer.send(&request.into()).await {
            let err = ReverseCallError::Send {
                method: method.to_string(),
                reason: e.to_string(),
            };
            self.table.reject(id, err.clone());
            return Err(err);
        }
        debug!(id, method, "Reverse call sent");

        match tokio::time::timeout(self.timeout, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ReverseCallError::TransportClosed),
            Err(_) => {
                // a response may have landed between the deadline and here
                self.table.expire(id);
                rx.try_recv().unwrap_or_else(|_| {
                    Err(ReverseCallError::Timeout {
                        method: method.to_string(),
                    })
                })
            }
        }
    }

    /// `state/get`: the skill's persisted state object
    pub async fn get_state(&self) -> Result<Value, ReverseCallError> {
        let result = self.call(methods::STATE_GET, None).await?;
        Ok(match result {
            Value::Object(mut obj) => obj.remove("state").unwrap_or(Value::Null),
            other => other,
        })
    }

    /// `state/set`: shallow-merge `partial` into the persisted state
    pub async fn set_state(&self, partial: Value) -> Result<(), ReverseCallError> {
        self.call(methods::STATE_SET, Some(json!({ "partial": partial })))
            .await
            .map(|_| ())
    }

    /// `data/read`: contents of a file in the skill's data directory
    pub async fn read_data(&self, filename: &str) -> Result<String, ReverseCallError> {
        let result = self
            .call(methods::DATA_READ, Some(json!({ "filename": filename })))
            .await?;
        match result {
            Value::Object(obj) => match obj.get("content") {
                Some(Value::String(content)) => Ok(content.clone()),
                _ => Err(ReverseCallError::UnexpectedResult {
                    method: methods::DATA_READ.to_string(),
                    reason: "missing string content".to_string(),
                }),
            },
            Value::String(content) => Ok(content),
            other => Ok(other.to_string()),
        }
    }

    /// `data/write`: replace a file in the skill's data directory
    pub async fn write_data(&self, filename: &str, content: &str) -> Result<(), ReverseCallError> {
        self.call(
            methods::DATA_WRITE,
            Some(json!({ "filename": filename, "content": content })),
        )
        .await
        .map(|_| ())
    }

    /// `intelligence/emitEvent`
    pub async fn emit_event(&self, event_type: &str, data: Value) -> Result<(), ReverseCallError> {
        self.call(
            methods::EMIT_EVENT,
            Some(json!({ "eventType": event_type, "data": data })),
        )
        .await
        .map(|_| ())
    }

    /// `entities/upsert`
    pub async fn upsert_entity(&self, entity: &EntityUpsert) -> Result<(), ReverseCallError> {
        self.call(methods::ENTITIES_UPSERT, Some(json!(entity)))
            .await
            .map(|_| ())
    }

    /// `entities/search`: matching entities, empty when the host returns none
    pub async fn search_entities(&self, search: &EntitySearch) -> Result<Vec<Value>, ReverseCallError> {
        let result = self
            .call(methods::ENTITIES_SEARCH, Some(json!(search)))
            .await?;
        Ok(match result {
            Value::Object(mut obj) => match obj.remove("results") {
                Some(Value::Array(results)) => results,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode, Message, Response};
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, Lines};

    fn client(timeout: Duration) -> (ReverseClient, Arc<CorrelationTable>, Lines<BufReader<DuplexStream>>) {
        let (bridge_out, host_in) = tokio::io::duplex(64 * 1024);
        let table = Arc::new(CorrelationTable::new());
        let writer = Arc::new(FrameWriter::new(bridge_out));
        let client = ReverseClient::new(table.clone(), writer, timeout);
        (client, table, BufReader::new(host_in).lines())
    }

    async fn next_request(lines: &mut Lines<BufReader<DuplexStream>>) -> Request {
        let line = lines.next_line().await.unwrap().unwrap();
        match decode(&line).unwrap().unwrap() {
            Message::Request(req) => req,
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_data_round_trip() {
        let (client, table, mut host) = client(DEFAULT_TIMEOUT);

        let host_task = tokio::spawn(async move {
            let req = next_request(&mut host).await;
            assert_eq!(req.method, "data/read");
            assert_eq!(req.params.unwrap()["filename"], "config.json");
            table.settle(Response::success(req.id, json!({"content": "{}"})));
        });

        let content = tokio_test::assert_ok!(client.read_data("config.json").await);
        assert_eq!(content, "{}");
        host_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_error_message_propagates() {
        let (client, table, mut host) = client(DEFAULT_TIMEOUT);

        tokio::spawn(async move {
            let req = next_request(&mut host).await;
            table.settle(Response::error(req.id, -32000, "no such file"));
        });

        let err = tokio_test::assert_err!(client.read_data("missing.json").await);
        assert_eq!(err.to_string(), "no such file");
    }

    #[tokio::test]
    async fn test_timeout_removes_pending_entry() {
        let (client, table, mut host) = client(Duration::from_millis(50));

        let err = client.get_state().await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(table.pending_count(), 0);

        // the request did go out, and a late answer is discarded
        let req = next_request(&mut host).await;
        assert!(!table.settle(Response::success(req.id, json!({"state": {}}))));
    }

    #[tokio::test]
    async fn test_abandoned_call_leaves_no_entry() {
        let (client, table, mut host) = client(DEFAULT_TIMEOUT);

        let waited = tokio::time::timeout(Duration::from_millis(50), client.get_state()).await;
        assert!(waited.is_err());
        assert_eq!(table.pending_count(), 0);

        let req = next_request(&mut host).await;
        assert!(!table.settle(Response::success(req.id, json!({"state": {}}))));
    }

    #[tokio::test]
    async fn test_closed_table_fails_fast() {
        let (client, table, _host) = client(DEFAULT_TIMEOUT);
        table.close();
        let err = client.set_state(json!({"a": 1})).await.unwrap_err();
        assert!(matches!(err, ReverseCallError::TransportClosed));
    }

    #[tokio::test]
    async fn test_state_and_search_unwrapping() {
        let (client, table, mut host) = client(DEFAULT_TIMEOUT);

        tokio::spawn(async move {
            let req = next_request(&mut host).await;
            table.settle(Response::success(req.id, json!({"state": {"tick_count": 3}})));
            let req = next_request(&mut host).await;
            let params = req.params.clone().unwrap();
            assert_eq!(params["query"], "btc");
            assert_eq!(params["limit"], 5);
            assert!(params.get("types").is_none());
            table.settle(Response::success(req.id, json!({"results": [{"id": "e1"}]})));
        });

        assert_eq!(client.get_state().await.unwrap()["tick_count"], 3);
        let search = EntitySearch {
            limit: Some(5),
            ..EntitySearch::new("btc")
        };
        let results = client.search_entities(&search).await.unwrap();
        assert_eq!(results, vec![json!({"id": "e1"})]);
    }

    #[test]
    fn test_entity_upsert_params() {
        let entity = EntityUpsert {
            source_id: Some("gh-1".to_string()),
            title: Some("Issue".to_string()),
            ..EntityUpsert::new("issue", "github")
        };
        let value = serde_json::to_value(&entity).unwrap();
        assert_eq!(value["type"], "issue");
        assert_eq!(value["sourceId"], "gh-1");
        assert!(value.get("summary").is_none());
    }
}
