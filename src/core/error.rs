use std::io;

use thiserror::Error;

use crate::core::AccessLevel;

/// Library-wide error type for document store operations.
///
/// Absence of a document is never reported through this type: it surfaces as
/// `DocumentStat::exists == false`, a default value or `false`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Rejected by the access guard before any native call.
    #[error("access denied: '{uri}' ({level})")]
    AccessDenied { uri: String, level: AccessLevel },

    /// Native write, append or mkdir failed.
    #[error("unable to write '{uri}': {source}")]
    Write {
        uri: String,
        #[source]
        source: io::Error,
    },

    /// Directory not empty, or unlink failed for a reason other than absence.
    #[error("unable to delete '{uri}': {reason}")]
    Delete { uri: String, reason: String },

    /// Content does not match the format expected for the extension.
    #[error("unable to parse '{uri}': {source}")]
    Parse {
        uri: String,
        #[source]
        source: anyhow::Error,
    },

    /// Invalid store configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StoreError {
    pub(crate) fn write(uri: &str, source: io::Error) -> Self {
        StoreError::Write {
            uri: uri.to_string(),
            source,
        }
    }

    pub(crate) fn delete(uri: &str, reason: impl Into<String>) -> Self {
        StoreError::Delete {
            uri: uri.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, StoreError::AccessDenied { .. })
    }
}
