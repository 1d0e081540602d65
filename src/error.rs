//! Error types surfaced by the provisioner.
//!
//! Every variant is fatal to the calling test: the provisioner reports the
//! first failure and never retries.

use std::{error::Error as StdError, time::Duration};

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::request::DatabaseNameError;

/// Boxed error carried by backend and connection failures.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Failure raised while provisioning, probing, or releasing an instance.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The configured schema directory does not exist.
    #[error("schema directory does not exist: {path}")]
    SchemaDirectoryMissing {
        /// Directory that was searched.
        path: Utf8PathBuf,
    },
    /// The schema directory exists but holds no `*.sql` files.
    #[error("no SQL files found in schema directory: {path}")]
    NoInitScriptsFound {
        /// Directory that was searched.
        path: Utf8PathBuf,
    },
    /// An init script was found but could not be read.
    #[error("failed to read init script {path}")]
    InitScriptRead {
        /// Script that failed to load.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The request could not be turned into a valid configuration.
    #[error("invalid provisioning request: {0}")]
    InvalidRequest(String),
    /// Container or stack control failed (image pull, port allocation, exec).
    #[error("backend failure while {context}")]
    Backend {
        /// Step that was being performed.
        context: &'static str,
        /// Error reported by the backend.
        #[source]
        source: BoxError,
    },
    /// The container runtime or the image could not be reached.
    ///
    /// Raised while preparing a backend, before any container or stack
    /// exists: the Docker CLI or daemon is missing, or the image cannot be
    /// pulled.
    #[error("container runtime unavailable while {context}")]
    Unavailable {
        /// Step that was being performed.
        context: &'static str,
        /// Error reported by the runtime.
        #[source]
        source: BoxError,
    },
    /// Readiness was not reached before the startup timeout.
    #[error("database not ready after {timeout:?}")]
    ProvisioningTimeout {
        /// Timeout that elapsed.
        timeout: Duration,
    },
    /// The connection string or pool could not be built.
    #[error("connection error: {0}")]
    Connection(#[source] BoxError),
}

impl ProvisionError {
    /// Wrap a backend error with the step that produced it.
    pub fn backend(context: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Backend {
            context,
            source: source.into(),
        }
    }

    /// Wrap a runtime error raised before any backend resource exists.
    pub fn unavailable(context: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Unavailable {
            context,
            source: source.into(),
        }
    }

    /// Returns `true` when the failure came from the container backend.
    #[must_use]
    pub const fn is_backend(&self) -> bool {
        matches!(self, Self::Backend { .. } | Self::Unavailable { .. })
    }

    /// Returns `true` when no container runtime or image was reachable.
    ///
    /// Test helpers skip on this and only this.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool { matches!(self, Self::Unavailable { .. }) }
}

impl From<DatabaseNameError> for ProvisionError {
    fn from(err: DatabaseNameError) -> Self { Self::InvalidRequest(err.to_string()) }
}

impl From<url::ParseError> for ProvisionError {
    fn from(err: url::ParseError) -> Self { Self::Connection(Box::new(err)) }
}
