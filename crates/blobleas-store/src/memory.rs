//! ---
//! bl_section: "03-object-lease-client"
//! bl_subsection: "module"
//! bl_type: "source"
//! bl_scope: "code"
//! bl_description: "In-process lease store with expiry, drift helpers and fault injection."
//! bl_version: "v0.1.0"
//! bl_owner: "tbd"
//! ---
//! The in-memory store mirrors the service's lease rules closely enough to
//! drive the reconciler in tests and in `--in-memory` CLI runs. Rejections
//! carry the same HTTP status and error codes the service would send, so
//! error classification is shared with the HTTP backend.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

use async_trait::async_trait;
use blobleas_common::StoreConfig;
use parking_lot::Mutex;
use tracing::debug;

use crate::client::LeaseStore;
use crate::error::{codes, tolerate_release, StoreError, StoreOperation, StoreResult};
use crate::types::{
    LeaseDuration, LeaseGrant, LeaseSnapshot, LeaseState, LeaseToken, ResourceIdentity,
    WriteReceipt,
};

#[derive(Debug, Clone)]
enum LeaseSlot {
    Available,
    Held {
        token: LeaseToken,
        duration: LeaseDuration,
        expires_at: Option<Instant>,
    },
    Expired,
    Breaking {
        token: LeaseToken,
    },
    Broken,
}

impl LeaseSlot {
    fn settle(&mut self, now: Instant) {
        if let LeaseSlot::Held {
            expires_at: Some(deadline),
            ..
        } = self
        {
            if *deadline <= now {
                *self = LeaseSlot::Expired;
            }
        }
    }

    fn state(&self) -> LeaseState {
        match self {
            LeaseSlot::Available => LeaseState::Unleased,
            LeaseSlot::Held { .. } => LeaseState::Leased,
            LeaseSlot::Expired => LeaseState::Expired,
            LeaseSlot::Breaking { .. } => LeaseState::Breaking,
            LeaseSlot::Broken => LeaseState::Broken,
        }
    }

    fn blocks_writes(&self) -> bool {
        matches!(self, LeaseSlot::Held { .. } | LeaseSlot::Breaking { .. })
    }
}

#[derive(Debug)]
struct MemoryBlob {
    payload: Vec<u8>,
    etag: String,
    lease: LeaseSlot,
}

#[derive(Debug, Default)]
struct MemoryInner {
    containers: HashSet<(String, String)>,
    blobs: HashMap<ResourceIdentity, MemoryBlob>,
    etag_counter: u64,
    failures: HashMap<StoreOperation, VecDeque<StoreError>>,
}

impl MemoryInner {
    fn next_etag(&mut self) -> String {
        self.etag_counter += 1;
        format!("\"0x{:016X}\"", self.etag_counter)
    }

    fn take_failure(&mut self, operation: StoreOperation) -> StoreResult<()> {
        match self
            .failures
            .get_mut(&operation)
            .and_then(|queue| queue.pop_front())
        {
            Some(err) => {
                debug!(operation = %operation, error = %err, "injected store failure");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn blob_mut(
        &mut self,
        operation: StoreOperation,
        identity: &ResourceIdentity,
    ) -> StoreResult<&mut MemoryBlob> {
        let blob = self.blobs.get_mut(identity).ok_or_else(|| {
            StoreError::rejected(operation, identity, 404, codes::BLOB_NOT_FOUND)
        })?;
        blob.lease.settle(Instant::now());
        Ok(blob)
    }
}

/// Lease store kept entirely in process memory.
#[derive(Debug)]
pub struct InMemoryLeaseStore {
    settings: StoreConfig,
    inner: Mutex<MemoryInner>,
}

impl Default for InMemoryLeaseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLeaseStore {
    /// Empty store rendering URLs with the default endpoint template.
    pub fn new() -> Self {
        Self::with_settings(StoreConfig::default())
    }

    /// Empty store rendering URLs with the given settings.
    pub fn with_settings(settings: StoreConfig) -> Self {
        Self {
            settings,
            inner: Mutex::new(MemoryInner::default()),
        }
    }

    fn url(&self, identity: &ResourceIdentity) -> String {
        format!(
            "{}/{}/{}",
            self.settings.service_url(identity.account()),
            identity.container(),
            identity.name()
        )
    }

    /// Queue a one-shot failure for the next call of `operation`.
    pub fn inject_failure(&self, operation: StoreOperation, error: StoreError) {
        self.inner
            .lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Current payload, if the blob exists.
    pub fn payload(&self, identity: &ResourceIdentity) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .blobs
            .get(identity)
            .map(|blob| blob.payload.clone())
    }

    /// Token holding an active lease, if any.
    pub fn lease_holder(&self, identity: &ResourceIdentity) -> Option<LeaseToken> {
        let mut inner = self.inner.lock();
        let blob = inner.blobs.get_mut(identity)?;
        blob.lease.settle(Instant::now());
        match blob.lease {
            LeaseSlot::Held { token, .. } => Some(token),
            _ => None,
        }
    }

    /// Force an active lease into the expired state.
    pub fn expire_lease(&self, identity: &ResourceIdentity) -> bool {
        self.replace_lease(identity, |slot| match slot {
            LeaseSlot::Held { .. } => Some(LeaseSlot::Expired),
            _ => None,
        })
    }

    /// Move an active lease into the breaking state.
    pub fn begin_break(&self, identity: &ResourceIdentity) -> bool {
        self.replace_lease(identity, |slot| match slot {
            LeaseSlot::Held { token, .. } => Some(LeaseSlot::Breaking { token: *token }),
            _ => None,
        })
    }

    /// Break the lease immediately, as another party would.
    pub fn break_lease(&self, identity: &ResourceIdentity) -> bool {
        self.replace_lease(identity, |slot| match slot {
            LeaseSlot::Held { .. } | LeaseSlot::Breaking { .. } => Some(LeaseSlot::Broken),
            _ => None,
        })
    }

    /// Remove the blob regardless of its lease, as an out-of-band deletion would.
    pub fn remove_blob(&self, identity: &ResourceIdentity) -> bool {
        self.inner.lock().blobs.remove(identity).is_some()
    }

    fn replace_lease<F>(&self, identity: &ResourceIdentity, transition: F) -> bool
    where
        F: FnOnce(&LeaseSlot) -> Option<LeaseSlot>,
    {
        let mut inner = self.inner.lock();
        let Some(blob) = inner.blobs.get_mut(identity) else {
            return false;
        };
        blob.lease.settle(Instant::now());
        match transition(&blob.lease) {
            Some(next) => {
                blob.lease = next;
                true
            }
            None => false,
        }
    }

    pub(crate) fn release_raw(&self, identity: &ResourceIdentity, token: &LeaseToken) -> StoreResult<()> {
        let operation = StoreOperation::ReleaseLease;
        let mut inner = self.inner.lock();
        inner.take_failure(operation)?;
        let blob = inner.blob_mut(operation, identity)?;
        let rejection = match &blob.lease {
            LeaseSlot::Held { token: holder, .. } | LeaseSlot::Breaking { token: holder }
                if holder == token =>
            {
                None
            }
            LeaseSlot::Held { .. } | LeaseSlot::Breaking { .. } => {
                Some(codes::LEASE_ID_MISMATCH_WITH_LEASE_OPERATION)
            }
            LeaseSlot::Available | LeaseSlot::Expired | LeaseSlot::Broken => {
                Some(codes::LEASE_NOT_PRESENT_WITH_LEASE_OPERATION)
            }
        };
        match rejection {
            Some(code) => Err(StoreError::rejected(operation, identity, 409, code)),
            None => {
                blob.lease = LeaseSlot::Available;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn write(&self, identity: &ResourceIdentity, payload: &[u8]) -> StoreResult<WriteReceipt> {
        let url = self.url(identity);
        let mut inner = self.inner.lock();
        inner.take_failure(StoreOperation::CreateContainer)?;
        inner.containers.insert((
            identity.account().to_owned(),
            identity.container().to_owned(),
        ));
        inner.take_failure(StoreOperation::Write)?;
        if let Some(blob) = inner.blobs.get_mut(identity) {
            blob.lease.settle(Instant::now());
            if blob.lease.blocks_writes() {
                return Err(StoreError::rejected(
                    StoreOperation::Write,
                    identity,
                    412,
                    codes::LEASE_ID_MISSING,
                ));
            }
        }
        let etag = inner.next_etag();
        let blob = inner
            .blobs
            .entry(identity.clone())
            .or_insert_with(|| MemoryBlob {
                payload: Vec::new(),
                etag: String::new(),
                lease: LeaseSlot::Available,
            });
        blob.payload = payload.to_vec();
        blob.etag = etag.clone();
        Ok(WriteReceipt { etag, url })
    }

    async fn acquire_lease(
        &self,
        identity: &ResourceIdentity,
        token: &LeaseToken,
        duration: LeaseDuration,
    ) -> StoreResult<LeaseGrant> {
        let operation = StoreOperation::AcquireLease;
        let url = self.url(identity);
        let mut inner = self.inner.lock();
        inner.take_failure(operation)?;
        let blob = inner.blob_mut(operation, identity)?;
        match &blob.lease {
            LeaseSlot::Held { token: holder, .. } if holder != token => {
                return Err(StoreError::rejected(
                    operation,
                    identity,
                    409,
                    codes::LEASE_ALREADY_PRESENT,
                ));
            }
            LeaseSlot::Breaking { .. } => {
                return Err(StoreError::rejected(
                    operation,
                    identity,
                    409,
                    codes::LEASE_IS_BREAKING_AND_CANNOT_BE_ACQUIRED,
                ));
            }
            _ => {}
        }
        blob.lease = LeaseSlot::Held {
            token: *token,
            duration,
            expires_at: duration.as_duration().map(|ttl| Instant::now() + ttl),
        };
        Ok(LeaseGrant {
            token: *token,
            etag: blob.etag.clone(),
            url,
        })
    }

    async fn renew_lease(&self, identity: &ResourceIdentity, token: &LeaseToken) -> StoreResult<LeaseGrant> {
        let operation = StoreOperation::RenewLease;
        let url = self.url(identity);
        let mut inner = self.inner.lock();
        inner.take_failure(operation)?;
        let blob = inner.blob_mut(operation, identity)?;
        let code = match &mut blob.lease {
            LeaseSlot::Held {
                token: holder,
                duration,
                expires_at,
            } if *holder == *token => {
                *expires_at = duration.as_duration().map(|ttl| Instant::now() + ttl);
                return Ok(LeaseGrant {
                    token: *token,
                    etag: blob.etag.clone(),
                    url,
                });
            }
            LeaseSlot::Held { .. } | LeaseSlot::Breaking { .. } => {
                codes::LEASE_ID_MISMATCH_WITH_LEASE_OPERATION
            }
            LeaseSlot::Broken => codes::LEASE_IS_BROKEN_AND_CANNOT_BE_RENEWED,
            LeaseSlot::Available | LeaseSlot::Expired => codes::LEASE_NOT_PRESENT_WITH_LEASE_OPERATION,
        };
        Err(StoreError::rejected(operation, identity, 409, code))
    }

    async fn release_lease(&self, identity: &ResourceIdentity, token: &LeaseToken) -> StoreResult<()> {
        tolerate_release(self.release_raw(identity, token))
    }

    async fn exists(&self, identity: &ResourceIdentity) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        inner.take_failure(StoreOperation::Exists)?;
        Ok(inner.blobs.contains_key(identity))
    }

    async fn lease_state(&self, identity: &ResourceIdentity) -> StoreResult<LeaseSnapshot> {
        let operation = StoreOperation::LeaseState;
        let url = self.url(identity);
        let mut inner = self.inner.lock();
        inner.take_failure(operation)?;
        let blob = inner.blob_mut(operation, identity)?;
        Ok(LeaseSnapshot {
            state: blob.lease.state(),
            etag: blob.etag.clone(),
            url,
        })
    }

    async fn delete(&self, identity: &ResourceIdentity) -> StoreResult<()> {
        let operation = StoreOperation::Delete;
        let mut inner = self.inner.lock();
        inner.take_failure(operation)?;
        let blob = inner.blob_mut(operation, identity)?;
        if blob.lease.blocks_writes() {
            return Err(StoreError::rejected(
                operation,
                identity,
                412,
                codes::LEASE_ID_MISSING,
            ));
        }
        inner.blobs.remove(identity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn identity() -> ResourceIdentity {
        "acct/locks/lock.txt".parse().unwrap()
    }

    #[tokio::test]
    async fn write_acquire_release_cycle() {
        let store = InMemoryLeaseStore::new();
        let id = identity();
        let receipt = store.write(&id, b"x").await.unwrap();
        assert_eq!(receipt.url, "https://acct.blob.core.windows.net/locks/lock.txt");

        let token = LeaseToken::generate();
        let grant = store
            .acquire_lease(&id, &token, LeaseDuration::Infinite)
            .await
            .unwrap();
        assert_eq!(grant.token, token);
        assert_eq!(grant.etag, receipt.etag);
        assert_eq!(store.lease_state(&id).await.unwrap().state, LeaseState::Leased);

        store.release_lease(&id, &token).await.unwrap();
        assert_eq!(store.lease_state(&id).await.unwrap().state, LeaseState::Unleased);
        // Second release is tolerated.
        store.release_lease(&id, &token).await.unwrap();
    }

    #[tokio::test]
    async fn foreign_token_conflicts() {
        let store = InMemoryLeaseStore::new();
        let id = identity();
        store.write(&id, b"x").await.unwrap();
        let holder = LeaseToken::generate();
        store
            .acquire_lease(&id, &holder, LeaseDuration::Infinite)
            .await
            .unwrap();

        let other = LeaseToken::generate();
        let err = store
            .acquire_lease(&id, &other, LeaseDuration::Infinite)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(
            store.renew_lease(&id, &other).await.unwrap_err().kind(),
            ErrorKind::Conflict
        );
        assert_eq!(store.write(&id, b"y").await.unwrap_err().kind(), ErrorKind::Conflict);
        assert_eq!(store.delete(&id).await.unwrap_err().kind(), ErrorKind::Conflict);
        // Foreign release is tolerated and leaves the holder in place.
        store.release_lease(&id, &other).await.unwrap();
        assert_eq!(store.lease_holder(&id), Some(holder));
    }

    #[tokio::test]
    async fn missing_blob_reports_not_found() {
        let store = InMemoryLeaseStore::new();
        let id = identity();
        assert!(!store.exists(&id).await.unwrap());
        let token = LeaseToken::generate();
        assert_eq!(
            store
                .acquire_lease(&id, &token, LeaseDuration::Infinite)
                .await
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(store.lease_state(&id).await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(store.delete(&id).await.unwrap_err().kind(), ErrorKind::NotFound);
        store.release_lease(&id, &token).await.unwrap();
    }

    #[tokio::test]
    async fn renew_after_expiry_fails() {
        let store = InMemoryLeaseStore::new();
        let id = identity();
        store.write(&id, b"x").await.unwrap();
        let token = LeaseToken::generate();
        store
            .acquire_lease(&id, &token, LeaseDuration::from_seconds(15).unwrap())
            .await
            .unwrap();
        store.renew_lease(&id, &token).await.unwrap();

        assert!(store.expire_lease(&id));
        assert_eq!(store.lease_state(&id).await.unwrap().state, LeaseState::Expired);
        let err = store.renew_lease(&id, &token).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        // Expired leases no longer protect the blob.
        store.write(&id, b"y").await.unwrap();
        assert_eq!(store.payload(&id), Some(b"y".to_vec()));
    }

    #[tokio::test]
    async fn broken_and_breaking_states() {
        let store = InMemoryLeaseStore::new();
        let id = identity();
        store.write(&id, b"x").await.unwrap();
        let token = LeaseToken::generate();
        store
            .acquire_lease(&id, &token, LeaseDuration::Infinite)
            .await
            .unwrap();
        assert!(store.begin_break(&id));
        assert_eq!(store.lease_state(&id).await.unwrap().state, LeaseState::Breaking);
        let err = store
            .acquire_lease(&id, &LeaseToken::generate(), LeaseDuration::Infinite)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        assert!(store.break_lease(&id));
        assert_eq!(store.lease_state(&id).await.unwrap().state, LeaseState::Broken);
        assert_eq!(
            store.renew_lease(&id, &token).await.unwrap_err().kind(),
            ErrorKind::Conflict
        );
        store.delete(&id).await.unwrap();
        assert!(!store.exists(&id).await.unwrap());
    }

    #[tokio::test]
    async fn etag_changes_only_on_write() {
        let store = InMemoryLeaseStore::new();
        let id = identity();
        let first = store.write(&id, b"x").await.unwrap();
        let token = LeaseToken::generate();
        store
            .acquire_lease(&id, &token, LeaseDuration::Infinite)
            .await
            .unwrap();
        let renewed = store.renew_lease(&id, &token).await.unwrap();
        assert_eq!(renewed.etag, first.etag);
        store.release_lease(&id, &token).await.unwrap();
        let second = store.write(&id, b"x").await.unwrap();
        assert_ne!(second.etag, first.etag);
    }

    #[tokio::test]
    async fn injected_failures_fire_once() {
        let store = InMemoryLeaseStore::new();
        let id = identity();
        store.inject_failure(
            StoreOperation::Write,
            StoreError::transport(StoreOperation::Write, &id, "connection reset"),
        );
        let err = store.write(&id, b"x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransientIo);
        store.write(&id, b"x").await.unwrap();
    }
}
