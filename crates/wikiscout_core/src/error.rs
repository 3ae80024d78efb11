use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single HTTP exchange.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("invalid request target {url}: {message}")]
    InvalidTarget { url: String, message: String },
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },
    #[error("failed to read response body from {url}: {message}")]
    Body { url: String, message: String },
}

/// Errors that prevent catalog discovery from producing any usable data.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("source unavailable: {url}: {reason}")]
    SourceUnavailable { url: String, reason: String },

    #[error("project \"{0}\" is not listed in the catalog")]
    ProjectNotFound(String),

    #[error("catalog front page has no listing link for project \"{0}\"")]
    ListingNotFound(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl DiscoveryError {
    pub(crate) fn unavailable(url: &str, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Errors raised by the endpoint registry file.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("registry path has no parent directory: {0}")]
    NoParent(PathBuf),

    #[error("registry {path} is missing required column `{column}`")]
    MissingColumn { path: PathBuf, column: &'static str },
}
