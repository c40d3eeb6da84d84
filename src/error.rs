use thiserror::Error;

use crate::credentials::CredentialError;
use crate::pipeline::RunStage;
use crate::store::StoreError;
use crate::warehouse::WarehouseError;

/// Convenience result type for landing operations.
pub type LandingResult<T> = Result<T, LandingError>;

/// Error type returned by the landing pipeline and its stages.
///
/// Every variant is fatal for the run it occurs in. Soft outcomes (unsupported format or
/// operation) are not errors; see [`crate::pipeline::LandingOutcome`].
#[derive(Debug, Error)]
pub enum LandingError {
    /// The control document is missing, unreadable, or cannot qualify a table.
    #[error("config error: {message}")]
    Config { message: String },

    /// Reading the source object failed.
    #[error("object store error: {0}")]
    Store(#[from] StoreError),

    /// CSV payload could not be decoded.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON payload could not be decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// XML payload could not be decoded.
    #[error("xml error: {message}")]
    Xml { message: String },

    /// The payload decoded but does not have a tabular shape.
    #[error("malformed input: {message}")]
    MalformedInput { message: String },

    /// The warehouse rejected or did not confirm the append.
    #[error("load error: {0}")]
    Load(#[from] WarehouseError),

    /// Rows are loaded but the source object could not be moved to the landed namespace.
    #[error("archive of '{source_key}' to '{dest_key}' failed after a successful load: {source}")]
    Archive {
        source_key: String,
        dest_key: String,
        source: StoreError,
    },

    /// Warehouse credentials could not be resolved.
    #[error("credential error: {0}")]
    Credentials(#[from] CredentialError),
}

impl LandingError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn xml(err: impl std::fmt::Display) -> Self {
        Self::Xml {
            message: err.to_string(),
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput {
            message: message.into(),
        }
    }

    /// Pipeline stage this error aborts.
    pub fn stage(&self) -> RunStage {
        match self {
            Self::Config { .. } | Self::Credentials(_) => RunStage::ConfigLoaded,
            Self::Store(_)
            | Self::Csv(_)
            | Self::Json(_)
            | Self::Xml { .. }
            | Self::MalformedInput { .. } => RunStage::Decoded,
            Self::Load(_) => RunStage::Loaded,
            Self::Archive { .. } => RunStage::Archived,
        }
    }
}
