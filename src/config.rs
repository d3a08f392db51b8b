//! Configuration management

use anyhow::Result;
use std::time::Duration;

use crate::client::DEFAULT_TIMEOUT;

/// Log output format for the binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

/// Bridge configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// How long a reverse call waits for the host's response
    pub reverse_call_timeout: Duration,

    /// Data directory used until `skill/load` announces one
    pub data_dir: Option<String>,

    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reverse_call_timeout: DEFAULT_TIMEOUT,
            data_dir: None,
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let reverse_call_timeout = lookup("SKILL_RPC_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);

        let data_dir = lookup("SKILL_DATA_DIR").filter(|v| !v.trim().is_empty());

        let log_format = match lookup("SKILL_LOG_FORMAT").as_deref() {
            Some("text") | Some("pretty") => LogFormat::Text,
            _ => LogFormat::Json,
        };

        Ok(Self {
            reverse_call_timeout,
            data_dir,
            log_format,
        })
    }
}
