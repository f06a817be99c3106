//! # Error Types
//!
//! Every failure in this crate is structural misuse or resource exhaustion.
//! Nothing here is retried.

use thiserror::Error;

/// Errors that can occur while dispatching to a wrapped server.
#[derive(Error, Debug)]
pub enum MarshalError {
    /// The operating system refused to create the worker thread.
    #[error("failed to spawn worker thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    /// The worker thread died before reporting that it was up.
    #[error("worker thread exited before reporting ready")]
    WorkerStartup,

    /// The worker thread did not report ready within the configured bound.
    #[error("worker thread not ready after {timeout_ms} ms")]
    StartupTimeout {
        /// The configured bound.
        timeout_ms: u64,
    },

    /// The worker thread panicked; its server state is lost.
    #[error("worker thread panicked")]
    WorkerPanicked,

    /// A synchronous call was issued while the proxy is not running.
    #[error("server proxy is not running")]
    NotRunning,

    /// The queue no longer has a consumer.
    #[error("command queue is closed")]
    QueueClosed,

    /// A synchronous command was discarded without being executed.
    #[error("command was dropped before it executed")]
    CommandDropped,

    /// A synchronous command was pushed from the consumer thread itself.
    #[error("synchronous push from the consumer thread would deadlock")]
    WouldDeadlock,

    /// The queue could not grow its storage.
    #[error("command queue storage exhausted")]
    QueueExhausted,

    /// The server returned no handles for a pool refill.
    #[error("handle pool refill for {category} produced no handles")]
    HandleExhausted {
        /// Debug name of the pool category.
        category: String,
    },

    /// Configuration could not be parsed or failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Reading a configuration file failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for dispatch operations.
pub type MarshalResult<T> = Result<T, MarshalError>;

/// Logs an engine-fatal error and aborts the current call.
///
/// Used where a drop-in trait surface has no error channel.
///
/// # Panics
///
/// Always.
#[cold]
#[track_caller]
pub fn fatal(error: &MarshalError) -> ! {
    tracing::error!(%error, "fatal dispatch error");
    panic!("fatal dispatch error: {error}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MarshalError::StartupTimeout { timeout_ms: 250 };
        assert_eq!(err.to_string(), "worker thread not ready after 250 ms");

        let err = MarshalError::HandleExhausted { category: "Body".into() };
        assert!(err.to_string().contains("Body"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: MarshalError = io.into();
        assert!(matches!(err, MarshalError::Io(_)));
    }
}
