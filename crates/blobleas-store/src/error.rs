//! ---
//! bl_section: "03-object-lease-client"
//! bl_subsection: "module"
//! bl_type: "source"
//! bl_scope: "code"
//! bl_description: "Store error type and the shared failure taxonomy."
//! bl_version: "v0.1.0"
//! bl_owner: "tbd"
//! ---
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::types::ResourceIdentity;

/// Service error codes the client reacts to.
pub mod codes {
    #![allow(missing_docs)]
    pub const BLOB_NOT_FOUND: &str = "BlobNotFound";
    pub const CONTAINER_NOT_FOUND: &str = "ContainerNotFound";
    pub const CONTAINER_ALREADY_EXISTS: &str = "ContainerAlreadyExists";
    pub const LEASE_ALREADY_PRESENT: &str = "LeaseAlreadyPresent";
    pub const LEASE_ID_MISSING: &str = "LeaseIdMissing";
    pub const LEASE_ID_MISMATCH_WITH_LEASE_OPERATION: &str = "LeaseIdMismatchWithLeaseOperation";
    pub const LEASE_ID_MISMATCH_WITH_BLOB_OPERATION: &str = "LeaseIdMismatchWithBlobOperation";
    pub const LEASE_NOT_PRESENT_WITH_LEASE_OPERATION: &str = "LeaseNotPresentWithLeaseOperation";
    pub const LEASE_NOT_PRESENT_WITH_BLOB_OPERATION: &str = "LeaseNotPresentWithBlobOperation";
    pub const LEASE_IS_BREAKING_AND_CANNOT_BE_ACQUIRED: &str = "LeaseIsBreakingAndCannotBeAcquired";
    pub const LEASE_IS_BREAKING_AND_CANNOT_BE_CHANGED: &str = "LeaseIsBreakingAndCannotBeChanged";
    pub const LEASE_IS_BROKEN_AND_CANNOT_BE_RENEWED: &str = "LeaseIsBrokenAndCannotBeRenewed";
    pub const SERVER_BUSY: &str = "ServerBusy";
    pub const OPERATION_TIMED_OUT: &str = "OperationTimedOut";
    pub const INTERNAL_ERROR: &str = "InternalError";
}

/// Failure taxonomy shared by the store client and the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network, timeout or throttling; retrying may succeed.
    TransientIo,
    /// The lease is held by someone else or the token does not match.
    Conflict,
    /// The blob, container or lease is absent.
    NotFound,
    /// Malformed identifiers, tokens or durations.
    InvalidInput,
    /// A multi-step operation stopped halfway.
    PartialFailure,
    /// Authentication, authorization or anything unclassified.
    Fatal,
}

impl ErrorKind {
    /// Stable label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TransientIo => "transient_io",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::PartialFailure => "partial_failure",
            ErrorKind::Fatal => "fatal",
        }
    }

    /// Whether a caller may reasonably retry.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ErrorKind::TransientIo)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primitive store operations, used to label errors and inject faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// Ensure the container exists.
    CreateContainer,
    /// Upload the payload.
    Write,
    /// Acquire a lease.
    AcquireLease,
    /// Renew a lease.
    RenewLease,
    /// Release a lease.
    ReleaseLease,
    /// Existence probe.
    Exists,
    /// Read lease metadata.
    LeaseState,
    /// Delete the blob.
    Delete,
}

impl StoreOperation {
    /// Stable label used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOperation::CreateContainer => "create_container",
            StoreOperation::Write => "write",
            StoreOperation::AcquireLease => "acquire_lease",
            StoreOperation::RenewLease => "renew_lease",
            StoreOperation::ReleaseLease => "release_lease",
            StoreOperation::Exists => "exists",
            StoreOperation::LeaseState => "lease_state",
            StoreOperation::Delete => "delete",
        }
    }
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by a [`crate::LeaseStore`] implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The request never produced a service response.
    #[error("{operation} on {identity} failed in transit: {message}")]
    Transport {
        /// Operation that failed.
        operation: StoreOperation,
        /// Blob the request addressed.
        identity: String,
        /// Transport error text.
        message: String,
    },
    /// The service answered with a non-success status.
    #[error("{operation} on {identity} rejected with http {status} ({code})")]
    Rejected {
        /// Operation that failed.
        operation: StoreOperation,
        /// Blob the request addressed.
        identity: String,
        /// HTTP status code.
        status: u16,
        /// Service error code, or the canonical reason when absent.
        code: String,
    },
    /// The request could not be built from the given arguments.
    #[error("invalid {operation} request for {identity}: {message}")]
    InvalidRequest {
        /// Operation that failed.
        operation: StoreOperation,
        /// Blob the request addressed.
        identity: String,
        /// Reason.
        message: String,
    },
    /// No bearer token could be obtained.
    #[error("credential error: {0}")]
    Credential(String),
    /// The HTTP client could not be constructed.
    #[error("unable to build http client: {0}")]
    ClientSetup(String),
}

/// Convenience result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Construct a rejection as reported by the service.
    pub fn rejected(
        operation: StoreOperation,
        identity: &ResourceIdentity,
        status: u16,
        code: impl Into<String>,
    ) -> Self {
        StoreError::Rejected {
            operation,
            identity: identity.to_string(),
            status,
            code: code.into(),
        }
    }

    /// Construct a transport failure.
    pub fn transport(
        operation: StoreOperation,
        identity: &ResourceIdentity,
        message: impl fmt::Display,
    ) -> Self {
        StoreError::Transport {
            operation,
            identity: identity.to_string(),
            message: message.to_string(),
        }
    }

    /// Construct an invalid request error.
    pub fn invalid(
        operation: StoreOperation,
        identity: &ResourceIdentity,
        message: impl fmt::Display,
    ) -> Self {
        StoreError::InvalidRequest {
            operation,
            identity: identity.to_string(),
            message: message.to_string(),
        }
    }

    /// Service error code, when the service answered.
    pub fn code(&self) -> Option<&str> {
        match self {
            StoreError::Rejected { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Classify into the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Transport { .. } => ErrorKind::TransientIo,
            StoreError::InvalidRequest { .. } => ErrorKind::InvalidInput,
            StoreError::Credential(_) | StoreError::ClientSetup(_) => ErrorKind::Fatal,
            StoreError::Rejected { status, code, .. } => classify(*status, code),
        }
    }

    /// Release failures meaning the lease is already gone or held by a
    /// different token; the release is treated as done.
    pub fn is_already_released(&self) -> bool {
        match self {
            StoreError::Rejected { status, code, .. } => {
                classify(*status, code) == ErrorKind::NotFound
                    || code == codes::LEASE_ID_MISMATCH_WITH_LEASE_OPERATION
                    || code == codes::LEASE_ID_MISMATCH_WITH_BLOB_OPERATION
            }
            _ => false,
        }
    }

    /// A create-container call against a container that already exists.
    pub fn is_container_exists(&self) -> bool {
        self.code() == Some(codes::CONTAINER_ALREADY_EXISTS)
    }
}

fn classify(status: u16, code: &str) -> ErrorKind {
    match code {
        codes::BLOB_NOT_FOUND
        | codes::CONTAINER_NOT_FOUND
        | codes::LEASE_NOT_PRESENT_WITH_LEASE_OPERATION
        | codes::LEASE_NOT_PRESENT_WITH_BLOB_OPERATION => return ErrorKind::NotFound,
        codes::LEASE_ALREADY_PRESENT
        | codes::LEASE_ID_MISSING
        | codes::LEASE_ID_MISMATCH_WITH_LEASE_OPERATION
        | codes::LEASE_ID_MISMATCH_WITH_BLOB_OPERATION
        | codes::LEASE_IS_BREAKING_AND_CANNOT_BE_ACQUIRED
        | codes::LEASE_IS_BREAKING_AND_CANNOT_BE_CHANGED
        | codes::LEASE_IS_BROKEN_AND_CANNOT_BE_RENEWED => return ErrorKind::Conflict,
        codes::SERVER_BUSY | codes::OPERATION_TIMED_OUT | codes::INTERNAL_ERROR => {
            return ErrorKind::TransientIo
        }
        _ => {}
    }
    match status {
        404 => ErrorKind::NotFound,
        409 | 412 => ErrorKind::Conflict,
        400 => ErrorKind::InvalidInput,
        408 | 429 | 500..=599 => ErrorKind::TransientIo,
        _ => ErrorKind::Fatal,
    }
}

/// Apply release tolerance to a raw release result.
pub fn tolerate_release(result: StoreResult<()>) -> StoreResult<()> {
    match result {
        Err(err) if err.is_already_released() => {
            tracing::debug!(error = %err, "lease already released");
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> ResourceIdentity {
        "acct/locks/lock.txt".parse().unwrap()
    }

    #[test]
    fn classifies_service_codes() {
        let id = identity();
        let cases = [
            (409, codes::LEASE_ALREADY_PRESENT, ErrorKind::Conflict),
            (412, codes::LEASE_ID_MISSING, ErrorKind::Conflict),
            (409, codes::LEASE_NOT_PRESENT_WITH_LEASE_OPERATION, ErrorKind::NotFound),
            (404, codes::BLOB_NOT_FOUND, ErrorKind::NotFound),
            (503, codes::SERVER_BUSY, ErrorKind::TransientIo),
            (429, "", ErrorKind::TransientIo),
            (400, "InvalidHeaderValue", ErrorKind::InvalidInput),
            (403, "AuthorizationFailure", ErrorKind::Fatal),
        ];
        for (status, code, kind) in cases {
            let err = StoreError::rejected(StoreOperation::AcquireLease, &id, status, code);
            assert_eq!(err.kind(), kind, "status {status} code {code}");
        }
    }

    #[test]
    fn transport_is_transient() {
        let err = StoreError::transport(StoreOperation::Write, &identity(), "connection reset");
        assert_eq!(err.kind(), ErrorKind::TransientIo);
        assert!(err.kind().is_retriable());
        assert!(err.to_string().contains("acct/locks/lock.txt"));
    }

    #[test]
    fn client_setup_is_fatal_and_not_a_credential_error() {
        let err = StoreError::ClientSetup("tls backend unavailable".into());
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert!(!err.kind().is_retriable());
        assert!(!matches!(err, StoreError::Credential(_)));
        assert_eq!(err.to_string(), "unable to build http client: tls backend unavailable");
    }

    #[test]
    fn release_tolerance() {
        let id = identity();
        let gone = StoreError::rejected(
            StoreOperation::ReleaseLease,
            &id,
            412,
            codes::LEASE_NOT_PRESENT_WITH_BLOB_OPERATION,
        );
        let mismatch = StoreError::rejected(
            StoreOperation::ReleaseLease,
            &id,
            409,
            codes::LEASE_ID_MISMATCH_WITH_LEASE_OPERATION,
        );
        let denied = StoreError::rejected(StoreOperation::ReleaseLease, &id, 403, "AuthorizationFailure");
        assert!(tolerate_release(Err(gone)).is_ok());
        assert!(tolerate_release(Err(mismatch)).is_ok());
        assert!(tolerate_release(Err(denied)).is_err());
    }
}
