//! Skill Bridge
//!
//! Bidirectional JSON-RPC 2.0 bridge between a skill process and its host,
//! over newline-delimited JSON on stdin/stdout.
//!
//! # Features
//!
//! - **Inbound dispatch**: `tools/list`, `tools/call` and the `skill/*`
//!   lifecycle methods, routed to the skill's tools and hooks
//! - **Reverse calls**: state, data files, events and entities, correlated
//!   by id with a per-call timeout
//! - **Concurrent handlers**: a handler awaiting the host never blocks the
//!   reader; outbound frames are written one at a time
//! - **Dynamic tools**: handlers may (un)register tools at runtime
//!
//! # Architecture
//!
//! ```text
//! Host ──stdin──► Transport ──► Dispatcher ──► Tools / Hooks
//!  ▲                 │                            │
//!  │                 └── Correlation ◄── ReverseClient (SkillContext)
//!  └────stdout──── FrameWriter ◄──────────────────┘
//! ```

pub mod client;
pub mod config;
pub mod context;
pub mod correlation;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod notes;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod setup;
pub mod skill;
pub mod tools;
pub mod transport;

pub use client::{EntitySearch, EntityUpsert, ReverseClient};
pub use config::Config;
pub use context::{SessionStore, SkillContext};
pub use correlation::CorrelationTable;
pub use dispatch::{Dispatcher, InboundMethod};
pub use error::{BridgeError, BridgeResult, DecodeError, ReverseCallError};
pub use lifecycle::{LifecycleEvent, LifecycleHooks};
pub use protocol::{Message, Notification, Request, RequestId, Response, RpcError};
pub use registry::HandlerRegistry;
pub use server::SkillServer;
pub use setup::{SetupField, SetupFieldType, SetupResult, SetupStep};
pub use skill::SkillDefinition;
pub use tools::{ParameterSpec, ToolDefinition, ToolExecutor, ToolHandler, ToolResult};
pub use transport::{FrameWriter, ServeOutcome};
