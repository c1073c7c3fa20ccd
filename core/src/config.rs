//! Engine configuration.
//!
//! # Design
//! One `EngineConfig` is shared (behind an `Arc`) by every worker spawned
//! from an `HttpCall`, and is never mutated once a request is in flight.
//! Timeouts are stored in milliseconds so the struct round-trips through
//! JSON unchanged; `Duration` accessors are provided for the transport.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HttpCallError, HttpCallResult};

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_SUCCESS_CODE: u16 = 200;

/// Scheduling priority for worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPriority {
    /// Same priority as the spawning thread.
    #[default]
    Foreground,
    /// Lowered priority, for transfers that must not compete with the host.
    Background,
}

impl WorkerPriority {
    /// Niceness applied to the worker thread on platforms that support it.
    pub fn niceness(self) -> i32 {
        match self {
            WorkerPriority::Foreground => 0,
            WorkerPriority::Background => 10,
        }
    }
}

/// Configuration shared by every request issued through one `HttpCall`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Relative request URLs are joined onto this when set.
    pub base_url: Option<String>,
    pub connect_timeout_ms: u64,
    /// Time allowed between sending the request and the first response bytes.
    pub read_timeout_ms: u64,
    /// The only status code treated as success.
    pub successful_response_code: u16,
    pub priority: WorkerPriority,
    /// Charset announced on multipart text fields.
    pub charset: String,
    /// Sent unless the request header registry provides its own.
    pub user_agent: String,
    /// Prefix of generated download file names.
    pub download_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            successful_response_code: DEFAULT_SUCCESS_CODE,
            priority: WorkerPriority::Foreground,
            charset: "UTF-8".to_string(),
            user_agent: format!("httpcall/{}", env!("CARGO_PKG_VERSION")),
            download_prefix: "download".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document; missing keys keep their defaults.
    pub fn from_json(json: &str) -> HttpCallResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> HttpCallResult<()> {
        if self.connect_timeout_ms == 0 {
            return Err(HttpCallError::Config("connect_timeout_ms must be positive".into()));
        }
        if self.read_timeout_ms == 0 {
            return Err(HttpCallError::Config("read_timeout_ms must be positive".into()));
        }
        if !(100..=599).contains(&self.successful_response_code) {
            return Err(HttpCallError::Config(format!(
                "successful_response_code {} is not an HTTP status",
                self.successful_response_code
            )));
        }
        if self.charset.trim().is_empty() {
            return Err(HttpCallError::Config("charset must not be empty".into()));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_successful_response_code(mut self, code: u16) -> Self {
        self.successful_response_code = code;
        self
    }

    pub fn with_priority(mut self, priority: WorkerPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_download_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.download_prefix = prefix.into();
        self
    }
}
