//! Census error types
//!
//! Error definitions with a startup-fatal vs per-tick classification.

use std::path::PathBuf;

use thiserror::Error;

/// Error that can occur while collecting population counts.
#[derive(Debug, Error)]
pub enum CensusError {
    /// The connection configuration file could not be read.
    #[error("cannot read connection config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A required connection configuration key is absent.
    #[error("connection config key missing: {key}")]
    ConfigKeyMissing { key: String },

    /// The configured directory endpoint is unusable.
    #[error("invalid directory endpoint '{uri}': {message}")]
    InvalidEndpoint { uri: String, message: String },

    /// Failed to establish the transport connection to the directory server.
    #[error("directory connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The SASL/GSSAPI bind was rejected by the directory server.
    #[error("directory bind failed: {message}")]
    AuthenticationFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A search failed at the protocol or transport level.
    #[error("directory search failed: {message}")]
    SearchFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl CensusError {
    /// Check if this error is fatal to startup.
    ///
    /// Fatal errors mean no metrics can ever be produced and the process
    /// should fail visibly. A search failure only loses the current tick;
    /// the host scheduler's next invocation is the de facto retry.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CensusError::SearchFailed { .. })
    }

    // Convenience constructors

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        CensusError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an authentication failed error.
    pub fn authentication_failed(message: impl Into<String>) -> Self {
        CensusError::AuthenticationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create an authentication failed error with source.
    pub fn authentication_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        CensusError::AuthenticationFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a search failed error.
    pub fn search_failed(message: impl Into<String>) -> Self {
        CensusError::SearchFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a search failed error with source.
    pub fn search_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        CensusError::SearchFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for census operations.
pub type CensusResult<T> = Result<T, CensusError>;
