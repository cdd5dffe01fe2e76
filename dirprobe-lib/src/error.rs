//! Error handling for probe runs.
//!
//! `ProbeError` covers only run-level failures: things that stop a whole run
//! before it can produce one outcome per candidate. Failures of a single
//! probe (refused connections, TLS errors, timeouts) are never errors here;
//! they are reported as an [`Outcome`](crate::Outcome) with an unknown status.

use std::fmt;

/// Main error type for run-level failures.
#[derive(Debug, Clone)]
pub enum ProbeError {
    /// The base URL could not be used to build target URIs
    InvalidBaseUrl { url: String, reason: String },

    /// The shared HTTP client could not be constructed
    ClientBuild { message: String },

    /// The worker pool no longer accepts submissions
    PoolClosed { message: String },

    /// Configuration errors (invalid settings, unparsable files, etc.)
    ConfigError { message: String },

    /// File I/O errors when reading wordlists or config files
    FileError { path: String, message: String },

    /// Generic internal errors that don't fit other categories
    Internal { message: String },
}

impl ProbeError {
    /// Create a new invalid base URL error.
    pub fn invalid_base_url<U: Into<String>, R: Into<String>>(url: U, reason: R) -> Self {
        Self::InvalidBaseUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a new client construction error.
    pub fn client_build<M: Into<String>>(message: M) -> Self {
        Self::ClientBuild {
            message: message.into(),
        }
    }

    /// Create a new pool closed error.
    pub fn pool_closed<M: Into<String>>(message: M) -> Self {
        Self::PoolClosed {
            message: message.into(),
        }
    }

    /// Create a new configuration error.
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new file error.
    pub fn file_error<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::FileError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error.
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the error comes from the execution environment rather than
    /// from user input (bad URL, bad config, missing file).
    pub fn is_resource_failure(&self) -> bool {
        matches!(
            self,
            Self::ClientBuild { .. } | Self::PoolClosed { .. } | Self::Internal { .. }
        )
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBaseUrl { url, reason } => {
                write!(f, "Invalid base URL '{}': {}", url, reason)
            }
            Self::ClientBuild { message } => {
                write!(f, "Failed to build HTTP client: {}", message)
            }
            Self::PoolClosed { message } => {
                write!(f, "Worker pool closed: {}", message)
            }
            Self::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            Self::FileError { path, message } => {
                write!(f, "File error at '{}': {}", path, message)
            }
            Self::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for ProbeError {}

impl From<toml::de::Error> for ProbeError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigError {
            message: format!("Failed to parse TOML configuration: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = ProbeError::invalid_base_url("ftp://x", "unsupported scheme 'ftp'");
        assert_eq!(
            err.to_string(),
            "Invalid base URL 'ftp://x': unsupported scheme 'ftp'"
        );

        let err = ProbeError::file_error("words.txt", "not found");
        assert_eq!(err.to_string(), "File error at 'words.txt': not found");
    }

    #[test]
    fn test_resource_failures_are_distinguished() {
        assert!(ProbeError::pool_closed("shutdown").is_resource_failure());
        assert!(ProbeError::client_build("tls backend").is_resource_failure());
        assert!(!ProbeError::config("pool_size must be > 0").is_resource_failure());
        assert!(!ProbeError::invalid_base_url("x", "y").is_resource_failure());
    }
}
