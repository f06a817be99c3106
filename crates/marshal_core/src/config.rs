//! # Proxy Configuration
//!
//! Loaded once at startup from TOML. `pool_max_size` is the one knob that
//! matters for throughput; the rest are lifecycle details.
//!
//! ```toml
//! threaded = true
//! pool_max_size = 60
//! worker_name = "physics-server"
//! queue_capacity = 1024
//! startup_timeout_ms = 5000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{MarshalError, MarshalResult};

/// Default number of handles pre-created per pool category.
pub const DEFAULT_POOL_MAX_SIZE: usize = 60;

/// Largest accepted `pool_max_size`; each refill creates this many plus one.
pub const MAX_POOL_MAX_SIZE: usize = 65_536;

/// Default initial reservation of the command ring buffer.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Configuration for a server proxy.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarshalConfig {
    /// Run the wrapped server on its own worker thread.
    ///
    /// When false the proxy runs inline on the calling thread.
    pub threaded: bool,
    /// Maximum handles pre-created per resource category.
    ///
    /// Zero disables pooling: every allocation is one round trip.
    pub pool_max_size: usize,
    /// Name given to the worker thread.
    pub worker_name: String,
    /// Initial slot reservation of the command queue.
    pub queue_capacity: usize,
    /// Upper bound on the `init()` readiness wait, in milliseconds.
    ///
    /// `None` waits unconditionally.
    pub startup_timeout_ms: Option<u64>,
}

impl Default for MarshalConfig {
    fn default() -> Self {
        Self {
            threaded: true,
            pool_max_size: DEFAULT_POOL_MAX_SIZE,
            worker_name: "physics-server".to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            startup_timeout_ms: None,
        }
    }
}

impl MarshalConfig {
    /// Default configuration with a worker thread.
    #[must_use]
    pub fn threaded() -> Self {
        Self::default()
    }

    /// Default configuration running on the caller's thread.
    #[must_use]
    pub fn inline() -> Self {
        Self {
            threaded: false,
            ..Self::default()
        }
    }

    /// Sets the per-category pool size.
    #[must_use]
    pub fn with_pool_max_size(mut self, pool_max_size: usize) -> Self {
        self.pool_max_size = pool_max_size;
        self
    }

    /// Sets the worker thread name.
    #[must_use]
    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }

    /// Sets the readiness bound used by `init()`.
    #[must_use]
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Returns the readiness bound as a duration.
    #[must_use]
    pub fn startup_timeout(&self) -> Option<Duration> {
        self.startup_timeout_ms.map(Duration::from_millis)
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the document does not parse or fails
    /// validation.
    pub fn from_toml_str(source: &str) -> MarshalResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| MarshalError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read, `InvalidConfig` otherwise.
    pub fn from_file(path: impl AsRef<Path>) -> MarshalResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Checks invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` describing the first violation.
    pub fn validate(&self) -> MarshalResult<()> {
        if self.worker_name.trim().is_empty() {
            return Err(MarshalError::InvalidConfig("worker_name must not be empty".into()));
        }
        if self.pool_max_size > MAX_POOL_MAX_SIZE {
            return Err(MarshalError::InvalidConfig(format!(
                "pool_max_size {} exceeds {MAX_POOL_MAX_SIZE}",
                self.pool_max_size
            )));
        }
        if self.startup_timeout_ms == Some(0) {
            return Err(MarshalError::InvalidConfig(
                "startup_timeout_ms must be positive when set".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MarshalConfig::default();
        assert!(config.threaded);
        assert_eq!(config.pool_max_size, DEFAULT_POOL_MAX_SIZE);
        assert_eq!(config.startup_timeout(), None);
        assert!(!MarshalConfig::inline().threaded);
    }

    #[test]
    fn test_parse_partial_document() {
        let config = MarshalConfig::from_toml_str("pool_max_size = 8\nthreaded = false\n").unwrap();
        assert_eq!(config.pool_max_size, 8);
        assert!(!config.threaded);
        assert_eq!(config.worker_name, "physics-server");
    }

    #[test]
    fn test_parse_timeout() {
        let config = MarshalConfig::from_toml_str("startup_timeout_ms = 250").unwrap();
        assert_eq!(config.startup_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let err = MarshalConfig::from_toml_str("pool_size = 8").unwrap_err();
        assert!(matches!(err, MarshalError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_empty_worker_name() {
        let err = MarshalConfig::from_toml_str("worker_name = \"  \"").unwrap_err();
        assert!(matches!(err, MarshalError::InvalidConfig(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = MarshalConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, MarshalError::Io(_)));
    }

    #[test]
    fn test_rejects_oversized_pool() {
        let err = MarshalConfig::from_toml_str("pool_max_size = 1000000").unwrap_err();
        assert!(matches!(err, MarshalError::InvalidConfig(_)));

        let at_limit = MarshalConfig::default().with_pool_max_size(MAX_POOL_MAX_SIZE);
        assert!(at_limit.validate().is_ok());
        assert!(at_limit.with_pool_max_size(MAX_POOL_MAX_SIZE + 1).validate().is_err());
    }
}
