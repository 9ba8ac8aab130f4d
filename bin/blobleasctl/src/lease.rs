//! ---
//! bl_section: "05-control-cli"
//! bl_subsection: "binary"
//! bl_type: "source"
//! bl_scope: "code"
//! bl_description: "Lease lifecycle subcommands."
//! bl_version: "v0.1.0"
//! bl_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use blobleas_reconciler::{
    plan, recommended_interval, LeaseRecord, LeaseSpec, Observation, PayloadContent, PlanAction,
    RenewalLoop,
};
use blobleas_store::{LeaseDuration, LeaseToken, ResourceIdentity};
use clap::Args;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::context::{emit, CliContext};

fn parse_identity(raw: &str) -> Result<ResourceIdentity> {
    raw.parse::<ResourceIdentity>()
        .with_context(|| format!("invalid identity `{raw}`"))
}

fn parse_token(raw: Option<&str>) -> Result<Option<LeaseToken>> {
    raw.map(|raw| raw.parse::<LeaseToken>())
        .transpose()
        .context("invalid --token")
}

/// Desired payload and duration, falling back to configured defaults.
#[derive(Debug, Args)]
pub struct DesiredArgs {
    /// Payload text written to the blob.
    #[arg(long = "payload", value_name = "TEXT", conflicts_with = "payload_file")]
    payload: Option<String>,

    /// Read the payload from a file.
    #[arg(long = "payload-file", value_name = "FILE")]
    payload_file: Option<PathBuf>,

    /// Lease duration in seconds: -1 for infinite, or 15..=60.
    #[arg(long = "duration", value_name = "SECS", allow_hyphen_values = true)]
    duration: Option<i64>,
}

impl DesiredArgs {
    async fn spec(&self, ctx: &CliContext, identity: ResourceIdentity) -> Result<LeaseSpec> {
        let mut spec = LeaseSpec::from_defaults(identity, &ctx.config.lease)?;
        if let Some(seconds) = self.duration {
            spec = spec.with_duration_seconds(seconds)?;
        }
        if let Some(text) = &self.payload {
            spec = spec.with_payload(text.as_bytes().to_vec());
        } else if let Some(path) = &self.payload_file {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("unable to read payload file {}", path.display()))?;
            spec = spec.with_payload(bytes);
        }
        Ok(spec)
    }
}

/// A previously emitted record, or an identity plus optional token.
#[derive(Debug, Args)]
pub struct RecordArgs {
    /// Blob identity as account/container/name.
    #[arg(value_name = "IDENTITY", required_unless_present = "record")]
    identity: Option<String>,

    /// Lease token held by this controller.
    #[arg(long = "token", value_name = "UUID")]
    token: Option<String>,

    /// JSON record printed by an earlier create, reconcile or adopt.
    #[arg(long = "record", value_name = "FILE", conflicts_with_all = ["identity", "token"])]
    record: Option<PathBuf>,
}

impl RecordArgs {
    async fn load(&self) -> Result<LeaseRecord> {
        if let Some(path) = &self.record {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("unable to read record {}", path.display()))?;
            return serde_json::from_str(&raw)
                .with_context(|| format!("malformed record {}", path.display()));
        }
        let raw = self
            .identity
            .as_deref()
            .ok_or_else(|| anyhow!("an identity or --record is required"))?;
        Ok(LeaseRecord::detached(
            parse_identity(raw)?,
            parse_token(self.token.as_deref())?,
            LeaseDuration::Infinite,
            PayloadContent::Unknown,
        ))
    }
}

#[derive(Debug, Args)]
pub struct CreateCommand {
    /// Blob identity as account/container/name.
    #[arg(value_name = "IDENTITY")]
    identity: String,

    #[command(flatten)]
    desired: DesiredArgs,

    /// Keep renewing a time-bounded lease until Ctrl-C.
    #[arg(long = "hold", action = clap::ArgAction::SetTrue)]
    hold: bool,
}

impl CreateCommand {
    pub async fn execute(self, ctx: &CliContext) -> Result<()> {
        let spec = self.desired.spec(ctx, parse_identity(&self.identity)?).await?;
        let record = ctx.bounded("create", ctx.reconciler.create(&spec)).await?;
        emit(&record)?;
        if !self.hold {
            return Ok(());
        }
        let Some(token) = record.token else {
            return Err(anyhow!("created record carries no token"));
        };
        let interval = ctx
            .config
            .lease
            .renew_interval
            .or_else(|| recommended_interval(record.duration));
        match interval {
            Some(interval) => hold(ctx, record.identity, token, interval).await,
            None => {
                info!("lease is infinite; nothing to renew");
                Ok(())
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct RenewalSummary {
    identity: String,
    renewals: u64,
}

async fn hold(ctx: &CliContext, identity: ResourceIdentity, token: LeaseToken, interval: Duration) -> Result<()> {
    let renewal = RenewalLoop::new(ctx.store.clone(), identity.clone(), token, interval)?
        .with_metrics(ctx.metrics.clone());
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let running = renewal.run(cancel_rx);
    tokio::pin!(running);
    info!(identity = %identity, interval = ?interval, "holding lease; press Ctrl-C to stop");

    let renewals = tokio::select! {
        result = &mut running => result?,
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                warn!(error = %err, "unable to listen for Ctrl-C; stopping renewal");
            }
            let _ = cancel_tx.send(true);
            running.await?
        }
    };
    emit(&RenewalSummary {
        identity: identity.to_string(),
        renewals,
    })
}

#[derive(Debug, Args)]
pub struct ObserveCommand {
    #[command(flatten)]
    target: RecordArgs,
}

impl ObserveCommand {
    pub async fn execute(self, ctx: &CliContext) -> Result<()> {
        let record = self.target.load().await?;
        let observation = ctx.bounded("observe", ctx.reconciler.observe(&record)).await?;
        emit(&observation)
    }
}

#[derive(Debug, Args)]
pub struct ReconcileCommand {
    #[command(flatten)]
    target: RecordArgs,

    #[command(flatten)]
    desired: DesiredArgs,
}

impl ReconcileCommand {
    pub async fn execute(self, ctx: &CliContext) -> Result<()> {
        let record = self.target.load().await?;
        let spec = self.desired.spec(ctx, record.identity.clone()).await?;
        let reconciled = ctx
            .bounded("reconcile", ctx.reconciler.reconcile(&record, &spec))
            .await?;
        emit(&reconciled)
    }
}

#[derive(Debug, Serialize)]
struct DeleteSummary {
    identity: String,
    deleted: bool,
}

#[derive(Debug, Args)]
pub struct DeleteCommand {
    #[command(flatten)]
    target: RecordArgs,
}

impl DeleteCommand {
    pub async fn execute(self, ctx: &CliContext) -> Result<()> {
        let record = self.target.load().await?;
        ctx.bounded(
            "delete",
            ctx.reconciler.delete(&record.identity, record.token.as_ref()),
        )
        .await?;
        emit(&DeleteSummary {
            identity: record.identity.to_string(),
            deleted: true,
        })
    }
}

#[derive(Debug, Args)]
pub struct AdoptCommand {
    /// Blob identity as account/container/name.
    #[arg(value_name = "IDENTITY")]
    identity: String,
}

impl AdoptCommand {
    pub async fn execute(self, ctx: &CliContext) -> Result<()> {
        let record = ctx
            .bounded("adopt", ctx.reconciler.adopt_str(&self.identity))
            .await?;
        emit(&record)
    }
}

#[derive(Debug, Serialize)]
struct PlanReport {
    #[serde(flatten)]
    action: PlanAction,
    observation: Option<Observation>,
}

#[derive(Debug, Args)]
pub struct PlanCommand {
    /// Desired blob identity as account/container/name.
    #[arg(value_name = "IDENTITY")]
    identity: String,

    /// Prior record; without one the plan is always `create`.
    #[arg(long = "record", value_name = "FILE")]
    record: Option<PathBuf>,

    /// Observe the store before planning.
    #[arg(long = "refresh", action = clap::ArgAction::SetTrue)]
    refresh: bool,

    #[command(flatten)]
    desired: DesiredArgs,
}

impl PlanCommand {
    pub async fn execute(self, ctx: &CliContext) -> Result<()> {
        let spec = self.desired.spec(ctx, parse_identity(&self.identity)?).await?;
        let prior = match &self.record {
            Some(path) => Some(
                RecordArgs {
                    identity: None,
                    token: None,
                    record: Some(path.clone()),
                }
                .load()
                .await?,
            ),
            None => None,
        };
        let observation = match (&prior, self.refresh) {
            (Some(prior), true) => Some(ctx.bounded("observe", ctx.reconciler.observe(prior)).await?),
            _ => None,
        };
        let action = plan(prior.as_ref(), observation.as_ref(), &spec);
        info!(action = %action, "plan computed");
        emit(&PlanReport {
            action,
            observation,
        })
    }
}

#[derive(Debug, Args)]
pub struct RenewCommand {
    /// Blob identity as account/container/name.
    #[arg(value_name = "IDENTITY")]
    identity: String,

    /// Lease token to renew.
    #[arg(long = "token", value_name = "UUID")]
    token: String,

    /// Seconds between renewals (defaults to the configured interval, else half the duration).
    #[arg(long = "interval", value_name = "SECS")]
    interval: Option<u64>,

    /// Lease duration used to derive the default interval.
    #[arg(long = "duration", value_name = "SECS", allow_hyphen_values = true)]
    duration: Option<i64>,
}

impl RenewCommand {
    pub async fn execute(self, ctx: &CliContext) -> Result<()> {
        let identity = parse_identity(&self.identity)?;
        let token = parse_token(Some(&self.token))?
            .ok_or_else(|| anyhow!("--token is required"))?;
        let duration = LeaseDuration::from_seconds(
            self.duration
                .unwrap_or(i64::from(ctx.config.lease.duration_seconds)),
        )?;
        let interval = self
            .interval
            .map(Duration::from_secs)
            .or(ctx.config.lease.renew_interval)
            .or_else(|| recommended_interval(duration))
            .ok_or_else(|| anyhow!("infinite leases need no renewal; pass --interval to renew anyway"))?;
        hold(ctx, identity, token, interval).await
    }
}
