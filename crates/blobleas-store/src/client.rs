//! ---
//! bl_section: "03-object-lease-client"
//! bl_subsection: "module"
//! bl_type: "source"
//! bl_scope: "code"
//! bl_description: "Capability set every lease store backend provides."
//! bl_version: "v0.1.0"
//! bl_owner: "tbd"
//! ---
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::{LeaseDuration, LeaseGrant, LeaseSnapshot, LeaseToken, ResourceIdentity, WriteReceipt};

/// Primitive operations against a remote blob and its lease.
///
/// Implementations hold no lifecycle state; every call is independent.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Ensure the container exists, then upload `payload` as the whole blob.
    ///
    /// Fails with a conflict while another party holds an active lease.
    async fn write(&self, identity: &ResourceIdentity, payload: &[u8]) -> StoreResult<WriteReceipt>;

    /// Acquire a lease, proposing `token`.
    async fn acquire_lease(
        &self,
        identity: &ResourceIdentity,
        token: &LeaseToken,
        duration: LeaseDuration,
    ) -> StoreResult<LeaseGrant>;

    /// Renew a lease held by `token`. Fails when the lease is held by another
    /// token, is no longer held, or the blob is gone.
    async fn renew_lease(&self, identity: &ResourceIdentity, token: &LeaseToken) -> StoreResult<LeaseGrant>;

    /// Release a lease. Already-released and foreign-token outcomes count as success.
    async fn release_lease(&self, identity: &ResourceIdentity, token: &LeaseToken) -> StoreResult<()>;

    /// Whether the blob exists. Absence is `Ok(false)`, never an error.
    async fn exists(&self, identity: &ResourceIdentity) -> StoreResult<bool>;

    /// Read lease metadata. A missing state header reads as `available`.
    async fn lease_state(&self, identity: &ResourceIdentity) -> StoreResult<LeaseSnapshot>;

    /// Delete the blob. Fails while an active lease is held.
    async fn delete(&self, identity: &ResourceIdentity) -> StoreResult<()>;
}

/// Shared handle used by the reconciler and binaries.
pub type SharedLeaseStore = Arc<dyn LeaseStore>;
