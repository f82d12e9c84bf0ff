//! Structured errors for the curator-facing record operations.
//!
//! Import-side failures are absorbed into logs and counts by the sync
//! pipeline; these errors exist for the operations that must report a
//! conflict or missing record back to the caller without mutating state.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    /// The requested record does not exist.
    #[error("{resource} '{id}' not found")]
    NotFound { resource: String, id: String },

    /// The operation conflicts with the current state of a record.
    #[error("{0}")]
    Conflict(String),
}

impl CatalogError {
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        CatalogError::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        CatalogError::Conflict(message.into())
    }
}
