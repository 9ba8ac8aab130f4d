//! ---
//! bl_section: "04-lease-reconciler"
//! bl_subsection: "module"
//! bl_type: "source"
//! bl_scope: "code"
//! bl_description: "Reconciler error type."
//! bl_version: "v0.1.0"
//! bl_owner: "tbd"
//! ---
use blobleas_store::{ErrorKind, IdentityError, StoreError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReconcileError>;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{operation} failed for {identity}: {source}")]
    Store {
        operation: &'static str,
        identity: String,
        source: StoreError,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("{identity} does not exist")]
    NotFound { identity: String },
    #[error("{operation} left {identity} partially applied ({stage} failed): {source}")]
    PartialFailure {
        operation: &'static str,
        identity: String,
        stage: &'static str,
        source: StoreError,
    },
    #[error("release of {identity} refused, blob left in place: {source}")]
    ReleaseRefused { identity: String, source: StoreError },
    #[error("renewal task for {identity} ended abnormally: {message}")]
    RenewalTask { identity: String, message: String },
}

impl ReconcileError {
    pub(crate) fn store(operation: &'static str, identity: impl ToString, source: StoreError) -> Self {
        ReconcileError::Store {
            operation,
            identity: identity.to_string(),
            source,
        }
    }

    /// Classification shared with the store client.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::Store { source, .. } | ReconcileError::ReleaseRefused { source, .. } => {
                source.kind()
            }
            ReconcileError::InvalidInput(_) | ReconcileError::Identity(_) => ErrorKind::InvalidInput,
            ReconcileError::NotFound { .. } => ErrorKind::NotFound,
            ReconcileError::PartialFailure { .. } => ErrorKind::PartialFailure,
            ReconcileError::RenewalTask { .. } => ErrorKind::Fatal,
        }
    }
}
