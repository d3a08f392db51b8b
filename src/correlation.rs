//! Correlation Table
//!
//! Tracks reverse calls the bridge has sent to the host and is still waiting
//! on. Each call is settled exactly once: by a response, by its timeout, or by
//! transport shutdown, whichever comes first. Later settlements for the same
//! id are no-ops.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::ReverseCallError;
use crate::protocol::Response;

/// Outcome delivered to the waiter of a reverse call
pub type CallOutcome = Result<Value, ReverseCallError>;

/// Receiving half handed to the caller by [`CorrelationTable::register`]
pub type PendingReceiver = oneshot::Receiver<CallOutcome>;

struct PendingCall {
    method: String,
    created_at: Instant,
    slot: oneshot::Sender<CallOutcome>,
}

struct TableState {
    next_id: u64,
    closed: bool,
    pending: HashMap<u64, PendingCall>,
}

/// Map from request id to outstanding reverse call
pub struct CorrelationTable {
    state: Mutex<TableState>,
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TableState {
                next_id: 1,
                closed: false,
                pending: HashMap::new(),
            }),
        }
    }

    /// Allocate a fresh id and its completion slot.
    ///
    /// Ids increase monotonically from 1 and are never reused. Once the table
    /// is closed the returned receiver is already settled with
    /// [`ReverseCallError::TransportClosed`].
    pub fn register(&self, method: &str) -> (u64, PendingReceiver) {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;

        if state.closed {
            let _ = tx.send(Err(ReverseCallError::TransportClosed));
            return (id, rx);
        }

        state.pending.insert(
            id,
            PendingCall {
                method: method.to_string(),
                created_at: Instant::now(),
                slot: tx,
            },
        );
        (id, rx)
    }

    /// Settle a call with a success value. Returns false for unknown or
    /// already-settled ids.
    pub fn resolve(&self, id: u64, result: Value) -> bool {
        self.finish(id, Ok(result))
    }

    /// Settle a call with a failure. Returns false for unknown or
    /// already-settled ids.
    pub fn reject(&self, id: u64, error: ReverseCallError) -> bool {
        self.finish(id, Err(error))
    }

    /// Route an inbound response to its pending call
    pub fn settle(&self, response: Response) -> bool {
        let Some(id) = response.id.as_u64() else {
            warn!(id = %response.id, "Response id was not issued by this bridge, dropping");
            return false;
        };
        let outcome = response.outcome.map_err(|err| ReverseCallError::Remote {
            code: err.code,
            message: err.message,
        });
        let settled = self.finish(id, outcome);
        if !settled {
            warn!(id, "Late or unknown response, dropping");
        }
        settled
    }

    /// Timeout path: settle with [`ReverseCallError::Timeout`] unless a
    /// response got there first.
    pub fn expire(&self, id: u64) -> bool {
        let Some(call) = self.state.lock().pending.remove(&id) else {
            return false;
        };
        warn!(
            id,
            method = %call.method,
            waited_ms = call.created_at.elapsed().as_millis() as u64,
            "Reverse call timed out"
        );
        let _ = call.slot.send(Err(ReverseCallError::Timeout {
            method: call.method,
        }));
        true
    }

    /// Forget a call whose waiter went away. No outcome is delivered and a
    /// later response for the id is dropped as unknown.
    pub fn cancel(&self, id: u64) -> bool {
        let Some(call) = self.state.lock().pending.remove(&id) else {
            return false;
        };
        debug!(id, method = %call.method, "Reverse call abandoned by its caller");
        true
    }

    /// Reject every outstanding call and refuse new ones.
    ///
    /// Returns the number of calls that were rejected.
    pub fn close(&self) -> usize {
        let drained: Vec<PendingCall> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.pending.drain().map(|(_, call)| call).collect()
        };
        let count = drained.len();
        for call in drained {
            debug!(method = %call.method, "Rejecting pending call, transport closed");
            let _ = call.slot.send(Err(ReverseCallError::TransportClosed));
        }
        count
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn finish(&self, id: u64, outcome: CallOutcome) -> bool {
        let Some(call) = self.state.lock().pending.remove(&id) else {
            return false;
        };
        debug!(
            id,
            method = %call.method,
            elapsed_ms = call.created_at.elapsed().as_millis() as u64,
            ok = outcome.is_ok(),
            "Reverse call settled"
        );
        // receiver may have been dropped by an abandoned caller
        let _ = call.slot.send(outcome);
        true
    }
}
