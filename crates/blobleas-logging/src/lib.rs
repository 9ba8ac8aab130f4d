//! ---
//! bl_section: "02-logging"
//! bl_subsection: "module"
//! bl_type: "source"
//! bl_scope: "code"
//! bl_description: "Lease-scoped structured logging helpers."
//! bl_version: "v0.1.0"
//! bl_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Every lease lifecycle event carries the same set of fields so log
//! pipelines can group them per blob: `account`, `container`, `name`,
//! `token` and `operation`.

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

/// Initialize a baseline tracing subscriber suitable for tests and tooling.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LeaseLogContext<'a> {
    /// Storage account of the blob.
    pub account: Option<&'a str>,
    /// Container holding the blob.
    pub container: Option<&'a str>,
    /// Blob name.
    pub name: Option<&'a str>,
    /// Lease token, when known.
    pub token: Option<&'a str>,
    /// Reconciler operation (create, observe, reconcile, delete, adopt, renew).
    pub operation: Option<&'a str>,
}

impl<'a> LeaseLogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the three identity components.
    pub fn with_blob(mut self, account: &'a str, container: &'a str, name: &'a str) -> Self {
        self.account = Some(account);
        self.container = Some(container);
        self.name = Some(name);
        self
    }

    /// Attach a lease token.
    pub fn with_token(mut self, token: &'a str) -> Self {
        self.token = Some(token);
        self
    }

    /// Attach the operation name.
    pub fn with_operation(mut self, operation: &'a str) -> Self {
        self.operation = Some(operation);
        self
    }
}

/// High-level outcome used when emitting lifecycle log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseEventOutcome {
    /// The operation completed and the lease is in the desired state.
    Success,
    /// The operation completed but observed drift that needs a reconcile pass.
    Drift,
    /// The operation failed or was aborted.
    Fault,
}

impl LeaseEventOutcome {
    /// Label used in the `outcome` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseEventOutcome::Success => "success",
            LeaseEventOutcome::Drift => "drift",
            LeaseEventOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized lease lifecycle event.
pub fn log_lease_event(
    context: Option<&LeaseLogContext>,
    event: &str,
    message: &str,
    outcome: LeaseEventOutcome,
) {
    let default = LeaseLogContext::default();
    let ctx = context.unwrap_or(&default);
    // `tracing::event!` needs a constant level, hence one arm per level.
    let label = outcome.as_str();
    match outcome {
        LeaseEventOutcome::Success => {
            crate::__lease_event!(Level::INFO, ctx, event = event, outcome = label, "{}", message)
        }
        LeaseEventOutcome::Drift => {
            crate::__lease_event!(Level::WARN, ctx, event = event, outcome = label, "{}", message)
        }
        LeaseEventOutcome::Fault => {
            crate::__lease_event!(Level::ERROR, ctx, event = event, outcome = label, "{}", message)
        }
    }
}
