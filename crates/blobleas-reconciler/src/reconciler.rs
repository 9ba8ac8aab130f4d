//! ---
//! bl_section: "04-lease-reconciler"
//! bl_subsection: "module"
//! bl_type: "source"
//! bl_scope: "code"
//! bl_description: "Create, observe, reconcile, delete and adopt on top of a lease store."
//! bl_version: "v0.1.0"
//! bl_owner: "tbd"
//! ---
use blobleas_logging::{lease_debug, lease_info, lease_warn, log_lease_event, LeaseEventOutcome, LeaseLogContext};
use blobleas_store::{
    ErrorKind, LeaseDuration, LeaseState, LeaseToken, ResourceIdentity, SharedLeaseStore, StoreError,
};

use crate::error::{ReconcileError, Result};
use crate::metrics::LeaseMetrics;
use crate::record::{LeaseRecord, LeaseSpec, Observation, PayloadContent, ReconcilePhase};

const OP_CREATE: &str = "create";
const OP_OBSERVE: &str = "observe";
const OP_RECONCILE: &str = "reconcile";
const OP_DELETE: &str = "delete";
const OP_ADOPT: &str = "adopt";

fn log_context<'a>(identity: &'a ResourceIdentity, operation: &'a str) -> LeaseLogContext<'a> {
    LeaseLogContext::new()
        .with_blob(identity.account(), identity.container(), identity.name())
        .with_operation(operation)
}

/// Drives one lease at a time through its lifecycle.
///
/// Holds no per-resource state: everything it needs comes in with each call
/// and everything it learns goes back out in the returned [`LeaseRecord`].
#[derive(Clone)]
pub struct LeaseReconciler {
    store: SharedLeaseStore,
    metrics: Option<LeaseMetrics>,
}

impl std::fmt::Debug for LeaseReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseReconciler")
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}

impl LeaseReconciler {
    pub fn new(store: SharedLeaseStore) -> Self {
        Self {
            store,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: LeaseMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> SharedLeaseStore {
        self.store.clone()
    }

    fn finish<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        if let Some(metrics) = &self.metrics {
            let outcome = match &result {
                Ok(_) => "success",
                Err(err) => err.kind().as_str(),
            };
            metrics.record_operation(operation, outcome);
        }
        result
    }

    /// Write the payload and take a fresh lease. Never falls back.
    pub async fn create(&self, spec: &LeaseSpec) -> Result<LeaseRecord> {
        let result = self.create_inner(spec).await;
        self.finish(OP_CREATE, result)
    }

    async fn create_inner(&self, spec: &LeaseSpec) -> Result<LeaseRecord> {
        let identity = &spec.identity;
        let token = LeaseToken::generate();
        let token_text = token.to_string();
        let ctx = log_context(identity, OP_CREATE).with_token(&token_text);
        lease_debug!(context = ctx, "phase {}: writing payload ({} bytes)", ReconcilePhase::Creating, spec.payload.len());

        self.store
            .write(identity, &spec.payload)
            .await
            .map_err(|source| ReconcileError::store(OP_CREATE, identity, source))?;

        let grant = self
            .store
            .acquire_lease(identity, &token, spec.duration)
            .await
            .map_err(|source| {
                log_lease_event(
                    Some(&ctx),
                    "lease.create",
                    "payload written but lease not acquired",
                    LeaseEventOutcome::Fault,
                );
                ReconcileError::PartialFailure {
                    operation: OP_CREATE,
                    identity: identity.to_string(),
                    stage: "acquire_lease",
                    source,
                }
            })?;

        log_lease_event(Some(&ctx), "lease.create", "lease acquired", LeaseEventOutcome::Success);
        Ok(LeaseRecord {
            identity: identity.clone(),
            token: Some(grant.token),
            state: LeaseState::Leased,
            etag: grant.etag,
            url: grant.url,
            duration: spec.duration,
            phase: ReconcilePhase::Leased,
            payload: PayloadContent::Known(spec.payload.clone()),
        })
    }

    /// Refresh a record from the store without mutating remote state.
    pub async fn observe(&self, record: &LeaseRecord) -> Result<Observation> {
        let result = self.observe_inner(record).await;
        self.finish(OP_OBSERVE, result)
    }

    async fn observe_inner(&self, record: &LeaseRecord) -> Result<Observation> {
        let identity = &record.identity;
        let ctx = log_context(identity, OP_OBSERVE);
        let exists = self
            .store
            .exists(identity)
            .await
            .map_err(|source| ReconcileError::store(OP_OBSERVE, identity, source))?;
        if !exists {
            log_lease_event(Some(&ctx), "lease.observe", "blob is gone", LeaseEventOutcome::Drift);
            return Ok(Observation::Gone);
        }

        let snapshot = match self.store.lease_state(identity).await {
            Ok(snapshot) => snapshot,
            // Deleted between the two calls.
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Observation::Gone),
            Err(source) => return Err(ReconcileError::store(OP_OBSERVE, identity, source)),
        };
        let phase = ReconcilePhase::from_state(&snapshot.state);
        if phase == ReconcilePhase::Drifted {
            log_lease_event(
                Some(&ctx),
                "lease.observe",
                &format!("lease drifted to {}", snapshot.state),
                LeaseEventOutcome::Drift,
            );
        }
        Ok(Observation::Current(LeaseRecord {
            state: snapshot.state,
            etag: snapshot.etag,
            url: snapshot.url,
            phase,
            ..record.clone()
        }))
    }

    /// Bring a record back to `Leased`: keep a live lease, renew a lapsed one,
    /// or re-acquire with a new token when renewal is impossible.
    pub async fn reconcile(&self, record: &LeaseRecord, spec: &LeaseSpec) -> Result<LeaseRecord> {
        let result = self.reconcile_inner(record, spec).await;
        self.finish(OP_RECONCILE, result)
    }

    async fn reconcile_inner(&self, record: &LeaseRecord, spec: &LeaseSpec) -> Result<LeaseRecord> {
        if record.identity != spec.identity {
            return Err(ReconcileError::InvalidInput(format!(
                "identity changed from {} to {}; destroy and recreate instead",
                record.identity, spec.identity
            )));
        }
        let identity = &spec.identity;
        let ctx = log_context(identity, OP_RECONCILE);

        match self.store.lease_state(identity).await {
            Ok(snapshot) if snapshot.state.is_leased() => {
                lease_debug!(context = ctx, "lease still held; refreshing metadata");
                return Ok(LeaseRecord {
                    state: snapshot.state,
                    etag: snapshot.etag,
                    url: snapshot.url,
                    phase: ReconcilePhase::Leased,
                    ..record.clone()
                });
            }
            Ok(snapshot) => {
                lease_info!(context = ctx, "lease state is {}; attempting renewal", snapshot.state);
            }
            // A missing blob is repaired by the fallback below.
            Err(err) if err.kind() == ErrorKind::NotFound => {
                lease_info!(context = ctx, "blob missing; will re-create");
            }
            Err(source) => return Err(ReconcileError::store(OP_RECONCILE, identity, source)),
        }

        if let Some(token) = &record.token {
            match self.store.renew_lease(identity, token).await {
                Ok(grant) => {
                    log_lease_event(Some(&ctx), "lease.reconcile", "lease renewed", LeaseEventOutcome::Success);
                    return Ok(LeaseRecord {
                        token: Some(grant.token),
                        state: LeaseState::Leased,
                        etag: grant.etag,
                        url: grant.url,
                        phase: ReconcilePhase::Leased,
                        ..record.clone()
                    });
                }
                Err(err) if is_fallback_trigger(&err) => {
                    lease_warn!(context = ctx, "renewal failed ({}); re-acquiring with a new token", err);
                }
                Err(source) => return Err(ReconcileError::store(OP_RECONCILE, identity, source)),
            }
        } else {
            lease_info!(context = ctx, "token unknown; re-acquiring with a new token");
        }

        self.reacquire(spec).await
    }

    async fn reacquire(&self, spec: &LeaseSpec) -> Result<LeaseRecord> {
        let identity = &spec.identity;
        let token = LeaseToken::generate();
        let token_text = token.to_string();
        let ctx = log_context(identity, OP_RECONCILE).with_token(&token_text);

        self.store
            .write(identity, &spec.payload)
            .await
            .map_err(|source| ReconcileError::store(OP_RECONCILE, identity, source))?;
        let grant = self
            .store
            .acquire_lease(identity, &token, spec.duration)
            .await
            .map_err(|source| ReconcileError::PartialFailure {
                operation: OP_RECONCILE,
                identity: identity.to_string(),
                stage: "acquire_lease",
                source,
            })?;

        if let Some(metrics) = &self.metrics {
            metrics.inc_reacquisition();
        }
        log_lease_event(
            Some(&ctx),
            "lease.reconcile",
            "lease re-acquired with a new token",
            LeaseEventOutcome::Success,
        );
        Ok(LeaseRecord {
            identity: identity.clone(),
            token: Some(grant.token),
            state: LeaseState::Leased,
            etag: grant.etag,
            url: grant.url,
            duration: spec.duration,
            phase: ReconcilePhase::Leased,
            payload: PayloadContent::Known(spec.payload.clone()),
        })
    }

    /// Release the lease (when the token is known) and delete the blob.
    ///
    /// A blob that is already gone counts as deleted.
    pub async fn delete(&self, identity: &ResourceIdentity, token: Option<&LeaseToken>) -> Result<()> {
        let result = self.delete_inner(identity, token).await;
        self.finish(OP_DELETE, result)
    }

    async fn delete_inner(&self, identity: &ResourceIdentity, token: Option<&LeaseToken>) -> Result<()> {
        let ctx = log_context(identity, OP_DELETE);
        match token {
            Some(token) => {
                lease_debug!(context = ctx, "phase {}: releasing lease", ReconcilePhase::Releasing);
                self.store.release_lease(identity, token).await.map_err(|source| {
                    log_lease_event(Some(&ctx), "lease.delete", "release refused", LeaseEventOutcome::Fault);
                    ReconcileError::ReleaseRefused {
                        identity: identity.to_string(),
                        source,
                    }
                })?;
            }
            None => lease_debug!(context = ctx, "token unknown; skipping release"),
        }

        match self.store.delete(identity).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                lease_debug!(context = ctx, "blob already deleted");
            }
            Err(source) => return Err(ReconcileError::store(OP_DELETE, identity, source)),
        }
        log_lease_event(Some(&ctx), "lease.delete", "blob deleted", LeaseEventOutcome::Success);
        Ok(())
    }

    /// Bind a record to a blob created elsewhere. Token and payload stay unknown.
    pub async fn adopt(&self, identity: &ResourceIdentity) -> Result<LeaseRecord> {
        let result = self.adopt_inner(identity).await;
        self.finish(OP_ADOPT, result)
    }

    /// [`Self::adopt`] from the `account/container/name` form.
    pub async fn adopt_str(&self, raw: &str) -> Result<LeaseRecord> {
        let identity = match raw.parse::<ResourceIdentity>() {
            Ok(identity) => identity,
            Err(err) => return self.finish(OP_ADOPT, Err(err.into())),
        };
        self.adopt(&identity).await
    }

    async fn adopt_inner(&self, identity: &ResourceIdentity) -> Result<LeaseRecord> {
        let ctx = log_context(identity, OP_ADOPT);
        let exists = self
            .store
            .exists(identity)
            .await
            .map_err(|source| ReconcileError::store(OP_ADOPT, identity, source))?;
        if !exists {
            return Err(ReconcileError::NotFound {
                identity: identity.to_string(),
            });
        }
        let snapshot = self
            .store
            .lease_state(identity)
            .await
            .map_err(|source| ReconcileError::store(OP_ADOPT, identity, source))?;
        log_lease_event(Some(&ctx), "lease.adopt", "blob adopted", LeaseEventOutcome::Success);
        Ok(LeaseRecord {
            identity: identity.clone(),
            token: None,
            phase: ReconcilePhase::from_state(&snapshot.state),
            state: snapshot.state,
            etag: snapshot.etag,
            url: snapshot.url,
            duration: LeaseDuration::Infinite,
            payload: PayloadContent::Unknown,
        })
    }
}

fn is_fallback_trigger(err: &StoreError) -> bool {
    matches!(err.kind(), ErrorKind::Conflict | ErrorKind::NotFound)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use blobleas_store::{
        InMemoryLeaseStore, LeaseGrant, LeaseSnapshot, LeaseStore, StoreOperation, StoreResult, WriteReceipt,
    };

    use super::*;
    use crate::metrics::{new_registry, LeaseMetrics};

    fn setup() -> (Arc<InMemoryLeaseStore>, LeaseReconciler) {
        let store = Arc::new(InMemoryLeaseStore::new());
        let reconciler = LeaseReconciler::new(store.clone());
        (store, reconciler)
    }

    fn spec() -> LeaseSpec {
        LeaseSpec::new("a/c/lock.txt".parse().unwrap()).with_payload(b"x".to_vec())
    }

    #[tokio::test]
    async fn create_acquires_with_fresh_token() {
        let (store, reconciler) = setup();
        let record = reconciler.create(&spec()).await.unwrap();
        assert!(record.is_leased());
        assert_eq!(record.state, LeaseState::Leased);
        assert_eq!(store.lease_holder(&record.identity), record.token);
        assert_eq!(store.payload(&record.identity), Some(b"x".to_vec()));
        assert_eq!(record.payload, PayloadContent::Known(b"x".to_vec()));
    }

    #[tokio::test]
    async fn create_reports_partial_failure_and_never_falls_back() {
        let (store, reconciler) = setup();
        let spec = spec();
        let id = spec.identity.clone();
        store.inject_failure(
            StoreOperation::AcquireLease,
            StoreError::rejected(StoreOperation::AcquireLease, &id, 409, "LeaseAlreadyPresent"),
        );
        let err = reconciler.create(&spec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PartialFailure);
        assert_eq!(store.payload(&id), Some(b"x".to_vec()));
        assert_eq!(store.lease_holder(&id), None);
    }

    #[tokio::test]
    async fn create_fails_while_someone_else_holds_the_lease() {
        let (store, reconciler) = setup();
        let spec = spec();
        store.write(&spec.identity, b"theirs").await.unwrap();
        let other = LeaseToken::generate();
        store
            .acquire_lease(&spec.identity, &other, LeaseDuration::Infinite)
            .await
            .unwrap();
        let err = reconciler.create(&spec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(store.lease_holder(&spec.identity), Some(other));
        assert_eq!(store.payload(&spec.identity), Some(b"theirs".to_vec()));
    }

    #[tokio::test]
    async fn observe_reports_drift_and_gone() {
        let (store, reconciler) = setup();
        let record = reconciler.create(&spec()).await.unwrap();

        let observed = reconciler.observe(&record).await.unwrap();
        assert_eq!(observed.record().unwrap().phase, ReconcilePhase::Leased);
        assert_eq!(observed.record().unwrap().etag, record.etag);

        store.expire_lease(&record.identity);
        let observed = reconciler.observe(&record).await.unwrap();
        let drifted = observed.record().unwrap();
        assert_eq!(drifted.phase, ReconcilePhase::Drifted);
        assert_eq!(drifted.state, LeaseState::Expired);
        assert_eq!(drifted.token, record.token);

        store.remove_blob(&record.identity);
        assert_eq!(reconciler.observe(&record).await.unwrap(), Observation::Gone);
    }

    #[tokio::test]
    async fn observe_treats_blob_vanishing_between_probes_as_gone() {
        let (store, reconciler) = setup();
        let record = reconciler.create(&spec()).await.unwrap();
        store.inject_failure(
            StoreOperation::LeaseState,
            StoreError::rejected(StoreOperation::LeaseState, &record.identity, 404, "BlobNotFound"),
        );
        assert_eq!(reconciler.observe(&record).await.unwrap(), Observation::Gone);
        assert_eq!(store.lease_holder(&record.identity), record.token);
    }

    #[tokio::test]
    async fn created_bounded_record_reloads_from_json() {
        let (_store, reconciler) = setup();
        let spec = spec().with_duration_seconds(30).unwrap();
        let record = reconciler.create(&spec).await.unwrap();
        let json = serde_json::to_string(&record).unwrap();
        let reloaded: LeaseRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(reloaded, record);
        assert_eq!(reloaded.duration.as_seconds(), 30);
        assert_eq!(
            spec.clone().with_duration_seconds(5).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
    }

    #[tokio::test]
    async fn reconcile_fallback_reports_partial_failure_when_acquire_fails() {
        let (store, reconciler) = setup();
        let record = reconciler.create(&spec()).await.unwrap();
        let spec = spec().with_payload(b"rewritten".to_vec());
        store.break_lease(&spec.identity);
        store.inject_failure(
            StoreOperation::AcquireLease,
            StoreError::transport(StoreOperation::AcquireLease, &spec.identity, "connection reset"),
        );

        let err = reconciler.reconcile(&record, &spec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PartialFailure);
        assert_eq!(store.payload(&spec.identity), Some(b"rewritten".to_vec()));
        assert_eq!(store.lease_holder(&spec.identity), None);
    }

    #[tokio::test]
    async fn reconcile_on_breaking_lease_attempts_renewal_then_surfaces_conflict() {
        let (store, reconciler) = setup();
        let spec = spec();
        let record = reconciler.create(&spec).await.unwrap();
        assert!(store.begin_break(&spec.identity));

        let observed = reconciler.observe(&record).await.unwrap();
        assert_eq!(observed.record().unwrap().state, LeaseState::Breaking);
        assert_eq!(observed.record().unwrap().phase, ReconcilePhase::Drifted);

        // The breaking lease blocks both renewal and the fallback rewrite.
        let err = reconciler.reconcile(&record, &spec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(store.payload(&spec.identity), Some(b"x".to_vec()));
    }

    /// Store that reports a lease state the service has not documented.
    struct UnrecognizedState {
        inner: Arc<InMemoryLeaseStore>,
    }

    #[async_trait::async_trait]
    impl LeaseStore for UnrecognizedState {
        async fn write(&self, identity: &ResourceIdentity, payload: &[u8]) -> StoreResult<WriteReceipt> {
            self.inner.write(identity, payload).await
        }

        async fn acquire_lease(
            &self,
            identity: &ResourceIdentity,
            token: &LeaseToken,
            duration: LeaseDuration,
        ) -> StoreResult<LeaseGrant> {
            self.inner.acquire_lease(identity, token, duration).await
        }

        async fn renew_lease(&self, identity: &ResourceIdentity, token: &LeaseToken) -> StoreResult<LeaseGrant> {
            self.inner.renew_lease(identity, token).await
        }

        async fn release_lease(&self, identity: &ResourceIdentity, token: &LeaseToken) -> StoreResult<()> {
            self.inner.release_lease(identity, token).await
        }

        async fn exists(&self, identity: &ResourceIdentity) -> StoreResult<bool> {
            self.inner.exists(identity).await
        }

        async fn lease_state(&self, identity: &ResourceIdentity) -> StoreResult<LeaseSnapshot> {
            let snapshot = self.inner.lease_state(identity).await?;
            Ok(LeaseSnapshot {
                state: LeaseState::parse("Leased"),
                ..snapshot
            })
        }

        async fn delete(&self, identity: &ResourceIdentity) -> StoreResult<()> {
            self.inner.delete(identity).await
        }
    }

    #[tokio::test]
    async fn unrecognized_state_drives_renewal() {
        let (store, reconciler) = setup();
        let spec = spec();
        let record = reconciler.create(&spec).await.unwrap();
        let skewed = LeaseReconciler::new(Arc::new(UnrecognizedState { inner: store.clone() }));

        let observed = skewed.observe(&record).await.unwrap();
        assert_eq!(
            observed.record().unwrap().state,
            LeaseState::Unrecognized("Leased".into())
        );
        assert_eq!(observed.record().unwrap().phase, ReconcilePhase::Drifted);

        // Held under our token, so the renewal succeeds and the token survives.
        let reconciled = skewed.reconcile(&record, &spec).await.unwrap();
        assert_eq!(reconciled.token, record.token);
        assert_eq!(reconciled.state, LeaseState::Leased);
        assert_eq!(store.lease_holder(&spec.identity), record.token);
    }

    #[tokio::test]
    async fn reconcile_keeps_token_while_leased() {
        let (_store, reconciler) = setup();
        let spec = spec();
        let record = reconciler.create(&spec).await.unwrap();
        let reconciled = reconciler.reconcile(&record, &spec).await.unwrap();
        assert_eq!(reconciled.token, record.token);
        assert_eq!(reconciled.phase, ReconcilePhase::Leased);
    }

    #[tokio::test]
    async fn reconcile_falls_back_after_break() {
        let (store, reconciler) = setup();
        let spec = spec();
        let record = reconciler.create(&spec).await.unwrap();
        store.break_lease(&spec.identity);

        let reconciled = reconciler.reconcile(&record, &spec).await.unwrap();
        assert_ne!(reconciled.token, record.token);
        assert!(reconciled.token.is_some());
        assert_eq!(reconciled.state, LeaseState::Leased);
        assert_eq!(store.lease_holder(&spec.identity), reconciled.token);
        assert_ne!(reconciled.etag, record.etag);
    }

    #[tokio::test]
    async fn reconcile_recreates_a_removed_blob() {
        let (store, reconciler) = setup();
        let spec = spec();
        let record = reconciler.create(&spec).await.unwrap();
        store.remove_blob(&spec.identity);

        let reconciled = reconciler.reconcile(&record, &spec).await.unwrap();
        assert_ne!(reconciled.token, record.token);
        assert_eq!(store.payload(&spec.identity), Some(b"x".to_vec()));
    }

    #[tokio::test]
    async fn reconcile_propagates_transient_renewal_failure() {
        let (store, reconciler) = setup();
        let spec = spec();
        let record = reconciler.create(&spec).await.unwrap();
        store.expire_lease(&spec.identity);
        store.inject_failure(
            StoreOperation::RenewLease,
            StoreError::transport(StoreOperation::RenewLease, &spec.identity, "timed out"),
        );
        let err = reconciler.reconcile(&record, &spec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransientIo);
        assert_eq!(store.lease_holder(&spec.identity), None);
    }

    #[tokio::test]
    async fn reconcile_rejects_identity_change() {
        let (_store, reconciler) = setup();
        let record = reconciler.create(&spec()).await.unwrap();
        let moved = LeaseSpec::new("a/c/other.txt".parse().unwrap());
        let err = reconciler.reconcile(&record, &moved).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (store, reconciler) = setup();
        let record = reconciler.create(&spec()).await.unwrap();
        reconciler
            .delete(&record.identity, record.token.as_ref())
            .await
            .unwrap();
        assert!(!store.exists(&record.identity).await.unwrap());
        reconciler
            .delete(&record.identity, record.token.as_ref())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_aborts_when_release_is_refused() {
        let (store, reconciler) = setup();
        let record = reconciler.create(&spec()).await.unwrap();
        store.inject_failure(
            StoreOperation::ReleaseLease,
            StoreError::rejected(StoreOperation::ReleaseLease, &record.identity, 403, "AuthorizationFailure"),
        );
        let err = reconciler
            .delete(&record.identity, record.token.as_ref())
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::ReleaseRefused { .. }));
        assert!(store.exists(&record.identity).await.unwrap());
    }

    #[tokio::test]
    async fn adopt_matches_observe() {
        let (_store, reconciler) = setup();
        let record = reconciler.create(&spec()).await.unwrap();
        let adopted = reconciler.adopt_str("a/c/lock.txt").await.unwrap();
        let observed = reconciler.observe(&record).await.unwrap();
        let observed = observed.record().unwrap();
        assert_eq!(adopted.etag, observed.etag);
        assert_eq!(adopted.url, observed.url);
        assert_eq!(adopted.state, observed.state);
        assert_eq!(adopted.token, None);
        assert_eq!(adopted.payload, PayloadContent::Unknown);
    }

    #[tokio::test]
    async fn adopt_rejects_bad_identity_and_missing_blob() {
        let (_store, reconciler) = setup();
        assert_eq!(
            reconciler.adopt_str("a/c").await.unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            reconciler.adopt_str("a/c/missing").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn metrics_track_outcomes() {
        let store = Arc::new(InMemoryLeaseStore::new());
        let metrics = LeaseMetrics::new(new_registry()).unwrap();
        let reconciler = LeaseReconciler::new(store.clone()).with_metrics(metrics.clone());
        let spec = spec();
        let record = reconciler.create(&spec).await.unwrap();
        store.break_lease(&spec.identity);
        reconciler.reconcile(&record, &spec).await.unwrap();
        let _ = reconciler.adopt_str("a/c").await;

        let families = metrics.registry().gather();
        let reacquisitions = families
            .iter()
            .find(|family| family.get_name() == "blobleas_reacquisitions_total")
            .unwrap();
        assert_eq!(reacquisitions.get_metric()[0].get_counter().get_value(), 1.0);
        let operations = families
            .iter()
            .find(|family| family.get_name() == "blobleas_operations_total")
            .unwrap();
        assert_eq!(operations.get_metric().len(), 3);
    }
}
