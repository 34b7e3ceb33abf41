use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Server tuning knobs, loaded from YAML with defaults for every field.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the connector binds to, e.g. "127.0.0.1:8080".
    pub listen_addr: String,
    /// How long an idle keep-alive connection is kept open, in milliseconds.
    pub keep_alive_timeout_ms: u64,
    /// Size of the scratch buffer used for each socket read.
    pub read_buffer_size: usize,
    /// Initial capacity of a response's output buffer.
    pub write_buffer_size: usize,
    /// Number of worker threads processing requests.
    pub worker_threads: usize,
    /// Depth of the queue feeding the worker threads; submissions beyond
    /// this are rejected and answered with 503.
    pub worker_queue_depth: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            keep_alive_timeout_ms: 30_000,
            read_buffer_size: 8192,
            write_buffer_size: 4096,
            worker_threads: 4,
            worker_queue_depth: 64,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from the file named by `RAMPART_CONFIG`, falling
    /// back to defaults. `LISTEN` overrides the listen address either way.
    pub fn load() -> Self {
        let mut cfg = match std::env::var("RAMPART_CONFIG") {
            Ok(path) => Self::from_file(&path).unwrap_or_else(|e| {
                tracing::warn!(path = %path, error = %e, "could not load config file, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        };
        if let Ok(addr) = std::env::var("LISTEN") {
            cfg.listen_addr = addr;
        }
        cfg
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    pub fn keep_alive_timeout(&self) -> Duration {
        Duration::from_millis(self.keep_alive_timeout_ms)
    }
}
