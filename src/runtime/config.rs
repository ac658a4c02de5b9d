//! Framework configuration.

use crate::error::FrameworkError;
use crate::function::SignatureKind;
use crate::invoke::DispatchMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// How requests are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerBackend {
    /// Multi-threaded runtime; blocking functions run on the serving thread.
    #[default]
    Threaded,
    /// Single-threaded cooperative runtime; blocking functions are offloaded.
    Async,
}

impl ServerBackend {
    pub fn dispatch_mode(&self) -> DispatchMode {
        match self {
            ServerBackend::Threaded => DispatchMode::InPlace,
            ServerBackend::Async => DispatchMode::Offload,
        }
    }
}

impl FromStr for ServerBackend {
    type Err = FrameworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "threaded" | "wsgi" => Ok(ServerBackend::Threaded),
            "async" | "asgi" => Ok(ServerBackend::Async),
            other => Err(FrameworkError::InvalidConfig(format!(
                "unknown server backend '{}'",
                other
            ))),
        }
    }
}

/// Configuration for the function server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkConfig {
    /// Name of the function to serve.
    pub target: String,
    /// File expected to define the function; checked for existence at startup.
    pub source: Option<PathBuf>,
    /// Explicit signature kind, overriding everything else.
    pub signature_type: Option<SignatureKind>,
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Defer startup errors to request time and log at debug level.
    pub debug: bool,
    pub backend: ServerBackend,
    /// Maximum blocking functions running at once on the async backend.
    pub workers: usize,
    /// Runtime worker threads on the threaded backend.
    pub threads: usize,
    /// Request timeout in seconds; 0 disables it.
    pub request_timeout: u64,
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
    /// Wrap log lines with execution id and span id.
    pub log_execution_id: bool,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            target: String::new(),
            source: None,
            signature_type: None,
            host: "0.0.0.0".to_string(),
            port: 8080,
            debug: false,
            backend: ServerBackend::default(),
            workers: (cpus + 1).min(4),
            threads: cpus * 4,
            request_timeout: 0,
            max_body_size: 10 * 1024 * 1024, // 10MB
            log_execution_id: false,
        }
    }
}

impl FrameworkConfig {
    /// Create a config serving `target` with default values.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    pub fn source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn signature_type(mut self, kind: SignatureKind) -> Self {
        self.signature_type = Some(kind);
        self
    }

    /// Set the host address.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn backend(mut self, backend: ServerBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn request_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout = seconds;
        self
    }

    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    pub fn log_execution_id(mut self, enabled: bool) -> Self {
        self.log_execution_id = enabled;
        self
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check values that would make the server unusable.
    pub fn validate(&self) -> Result<(), FrameworkError> {
        if self.target.is_empty() {
            return Err(FrameworkError::InvalidConfig(
                "a target function name is required".to_string(),
            ));
        }
        if self.workers == 0 || self.threads == 0 {
            return Err(FrameworkError::InvalidConfig(
                "workers and threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Whether an environment value switches a flag on.
///
/// Only the exact values `y`, `yes`, `t`, `true`, `on` and `1` count.
pub fn parse_truthy(value: &str) -> bool {
    matches!(value, "y" | "yes" | "t" | "true" | "on" | "1")
}
