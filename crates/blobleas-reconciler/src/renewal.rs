//! ---
//! bl_section: "04-lease-reconciler"
//! bl_subsection: "module"
//! bl_type: "source"
//! bl_scope: "code"
//! bl_description: "Cancellable background task renewing a held lease."
//! bl_version: "v0.1.0"
//! bl_owner: "tbd"
//! ---
use std::time::Duration;

use blobleas_store::{LeaseDuration, LeaseToken, ResourceIdentity, SharedLeaseStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{ReconcileError, Result};
use crate::metrics::LeaseMetrics;

const OP_RENEW: &str = "renew";

/// Renewal cadence for a lease: half its duration, or `None` when it never expires.
pub fn recommended_interval(duration: LeaseDuration) -> Option<Duration> {
    duration.as_duration().map(|lifetime| lifetime / 2)
}

/// Renews one lease on a fixed interval until cancelled or a renewal fails.
pub struct RenewalLoop {
    store: SharedLeaseStore,
    identity: ResourceIdentity,
    token: LeaseToken,
    interval: Duration,
    metrics: Option<LeaseMetrics>,
}

impl std::fmt::Debug for RenewalLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewalLoop")
            .field("identity", &self.identity)
            .field("token", &self.token)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl RenewalLoop {
    pub fn new(
        store: SharedLeaseStore,
        identity: ResourceIdentity,
        token: LeaseToken,
        interval: Duration,
    ) -> Result<Self> {
        if interval.is_zero() {
            return Err(ReconcileError::InvalidInput(
                "renewal interval must be greater than zero".into(),
            ));
        }
        Ok(Self {
            store,
            identity,
            token,
            interval,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: LeaseMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run until `cancel` flips to `true` (or its sender is dropped), returning
    /// the number of successful renewals. The first renewal happens one
    /// interval after start.
    pub async fn run(self, mut cancel: watch::Receiver<bool>) -> Result<u64> {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut renewals: u64 = 0;
        info!(identity = %self.identity, token = %self.token, interval = ?self.interval, "renewal loop started");

        loop {
            tokio::select! {
                changed = cancel.changed() => {
                    match changed {
                        Ok(()) => {
                            if *cancel.borrow() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
                _ = ticker.tick() => {
                    match self.store.renew_lease(&self.identity, &self.token).await {
                        Ok(_) => {
                            renewals += 1;
                            if let Some(metrics) = &self.metrics {
                                metrics.record_renewal("success");
                            }
                            debug!(identity = %self.identity, renewals, "lease renewed");
                        }
                        Err(source) => {
                            if let Some(metrics) = &self.metrics {
                                metrics.record_renewal("failure");
                            }
                            warn!(identity = %self.identity, token = %self.token, error = %source, "lease renewal failed; stopping");
                            return Err(ReconcileError::store(OP_RENEW, &self.identity, source));
                        }
                    }
                }
            }
        }

        info!(identity = %self.identity, renewals, "renewal loop cancelled");
        Ok(renewals)
    }

    /// Run on a dedicated tokio task.
    pub fn spawn(self) -> RenewalHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let identity = self.identity.clone();
        let task = tokio::spawn(self.run(cancel_rx));
        RenewalHandle {
            identity,
            cancel: cancel_tx,
            task,
        }
    }
}

/// Handle to a spawned [`RenewalLoop`].
#[derive(Debug)]
pub struct RenewalHandle {
    identity: ResourceIdentity,
    cancel: watch::Sender<bool>,
    task: JoinHandle<Result<u64>>,
}

impl RenewalHandle {
    /// Ask the loop to stop after any in-flight renewal.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop's terminal result.
    pub async fn join(self) -> Result<u64> {
        let identity = self.identity;
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(ReconcileError::RenewalTask {
                identity: identity.to_string(),
                message: err.to_string(),
            }),
        }
    }

    /// Cancel and wait.
    pub async fn stop(self) -> Result<u64> {
        self.cancel();
        self.join().await
    }
}
