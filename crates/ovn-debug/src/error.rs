//! Error types shared by the reconciliation core.

use thiserror::Error;

use crate::cluster::ClusterError;

/// Errors that abort an operation.
///
/// Expected outcomes (a missing override document, a partially failed
/// restart) are not represented here; they are returned as typed results.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or contradictory user input, caught before planning.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// No node set could be resolved for an operation that needs one.
    #[error("No target nodes: {0}")]
    Selection(String),

    /// The target namespace does not exist.
    #[error("Namespace '{0}' does not exist")]
    NamespaceNotFound(String),

    /// The override document kept changing underneath us.
    #[error("ConfigMap {namespace}/{name} was modified concurrently; gave up after {attempts} attempts")]
    Conflict {
        namespace: String,
        name: String,
        attempts: u32,
    },

    /// Cluster API failure, surfaced verbatim.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// Failure preparing or running the remote collection tooling.
    #[error("Collection error: {0}")]
    Collection(String),

    /// Failed to fetch the collection helper script.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Local I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a configuration error from anything printable.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Result alias for the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;
