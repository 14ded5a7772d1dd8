//! Runtime error types for the supervisor.
//!
//! Configuration problems have their own type ([`crate::manifest::ConfigError`])
//! because they are the only fatal class. Everything here is raised after
//! startup and is contained by the caller: logged, then retried on the next
//! tick or dropped.

use std::path::PathBuf;

use crate::manifest::ConfigError;

/// Result type for supervisor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Supervisor errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Manifest could not be loaded. Fatal at startup.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A worker process failed to start.
    #[error("failed to launch worker '{instance}': {reason}")]
    Launch { instance: String, reason: String },

    /// The proxy configuration could not be rendered or persisted.
    #[error("failed to write proxy config {}: {source}", path.display())]
    ProxyWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The proxy reload command failed, timed out, or exited non-zero.
    #[error("proxy reload failed: {0}")]
    ProxyReload(String),

    /// A terminate request could not be delivered.
    #[error("failed to terminate worker '{instance}': {reason}")]
    Terminate { instance: String, reason: String },

    /// IO error with context.
    #[error("IO error in {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a launch error.
    pub fn launch(instance: impl Into<String>, reason: impl ToString) -> Self {
        Self::Launch {
            instance: instance.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a terminate error.
    pub fn terminate(instance: impl Into<String>, reason: impl ToString) -> Self {
        Self::Terminate {
            instance: instance.into(),
            reason: reason.to_string(),
        }
    }
}
