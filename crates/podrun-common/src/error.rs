//! Unified error types for the podrun workspace.
//!
//! Lost races and busy locks are not errors: they are tagged outcomes
//! returned by the operations that can observe them. Everything here is
//! something the caller cannot make progress past.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum PodrunError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A pod directory already exists where a new one was to be created.
    #[error("pod {id} already exists")]
    AlreadyExists {
        /// Identifier of the colliding pod.
        id: String,
    },

    /// The pod is not in the phase the operation requires.
    #[error("pod {id} is {phase}, expected {expected}")]
    InvalidPhase {
        /// Identifier of the pod.
        id: String,
        /// Last observed phase.
        phase: String,
        /// Phase the operation needed.
        expected: &'static str,
    },

    /// The pod directory set violates a lifecycle invariant.
    ///
    /// Never repaired automatically.
    #[error("corrupt pod state at {path}: {message}")]
    CorruptState {
        /// Offending path.
        path: PathBuf,
        /// Description of the violated invariant.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl PodrunError {
    /// Wraps an I/O error together with the path it happened on.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Builds a [`PodrunError::CorruptState`] for the given path.
    #[must_use]
    pub fn corrupt(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CorruptState {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, PodrunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_phase_names_last_known_phase() {
        let err = PodrunError::InvalidPhase {
            id: "abc".into(),
            phase: "running".into(),
            expected: "prepared",
        };
        assert_eq!(err.to_string(), "pod abc is running, expected prepared");
    }

    #[test]
    fn io_error_carries_path() {
        let err = PodrunError::io(
            "/var/lib/podrun/pods/run",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(err.to_string().contains("/var/lib/podrun/pods/run"));
    }
}
