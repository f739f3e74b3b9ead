//! Read, write and delete access to the override ConfigMap.
//!
//! The store never caches: every call goes to the cluster so each operation
//! merges into the latest state it can observe.

use serde::Serialize;
use tracing::{debug, info};

use crate::cluster::{ClusterClient, ClusterError};
use crate::config::DocumentLocation;
use crate::document::OverrideDocument;

/// Result of a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteAck {
    Created,
    Replaced,
}

/// Result of a successful delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteAck {
    Deleted,
    NotFound,
}

/// Handle on the override document at one location.
pub struct OverrideStore<'a> {
    cluster: &'a dyn ClusterClient,
    location: DocumentLocation,
}

impl<'a> OverrideStore<'a> {
    #[must_use]
    pub fn new(cluster: &'a dyn ClusterClient, location: DocumentLocation) -> Self {
        Self { cluster, location }
    }

    #[must_use]
    pub fn location(&self) -> &DocumentLocation {
        &self.location
    }

    /// Fetch the current document. `None` means debug logging is not configured.
    ///
    /// # Errors
    ///
    /// Returns cluster errors other than "not found".
    pub async fn read(&self) -> Result<Option<OverrideDocument>, ClusterError> {
        let DocumentLocation { namespace, name } = &self.location;
        let stored = self.cluster.get_config_map(namespace, name).await?;
        match stored {
            Some(cm) => {
                debug!(
                    location = %self.location,
                    entries = cm.data.len(),
                    resource_version = ?cm.resource_version,
                    "Read override document"
                );
                Ok(Some(OverrideDocument {
                    namespace: namespace.clone(),
                    name: name.clone(),
                    entries: cm.data,
                    resource_version: cm.resource_version,
                }))
            }
            None => {
                debug!(location = %self.location, "Override document not found");
                Ok(None)
            }
        }
    }

    /// Create or replace the document.
    ///
    /// A document without a resource version is created; one with a version
    /// replaces the stored copy only if that version is still current.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Conflict`] when another writer got there first.
    pub async fn write(&self, document: &OverrideDocument) -> Result<WriteAck, ClusterError> {
        let DocumentLocation { namespace, name } = &self.location;
        if let Some(version) = &document.resource_version {
            self.cluster
                .replace_config_map(namespace, name, &document.entries, version)
                .await?;
            info!(location = %self.location, entries = document.entries.len(), "Replaced ConfigMap");
            Ok(WriteAck::Replaced)
        } else {
            self.cluster
                .create_config_map(namespace, name, &document.entries)
                .await?;
            info!(location = %self.location, entries = document.entries.len(), "Created ConfigMap");
            Ok(WriteAck::Created)
        }
    }

    /// Delete the whole document, conditioned on `expected_version` if given.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Conflict`] if the precondition fails.
    pub async fn delete(&self, expected_version: Option<&str>) -> Result<DeleteAck, ClusterError> {
        let DocumentLocation { namespace, name } = &self.location;
        if self
            .cluster
            .delete_config_map(namespace, name, expected_version)
            .await?
        {
            info!(location = %self.location, "Deleted ConfigMap");
            Ok(DeleteAck::Deleted)
        } else {
            info!(location = %self.location, "ConfigMap already absent");
            Ok(DeleteAck::NotFound)
        }
    }
}
