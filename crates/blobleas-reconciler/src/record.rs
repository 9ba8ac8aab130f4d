//! ---
//! bl_section: "04-lease-reconciler"
//! bl_subsection: "module"
//! bl_type: "source"
//! bl_scope: "code"
//! bl_description: "Desired lease shape and the controlled lease record."
//! bl_version: "v0.1.0"
//! bl_owner: "tbd"
//! ---
use std::fmt;

use blobleas_common::{LeaseDefaults, DEFAULT_PAYLOAD};
use blobleas_store::{LeaseDuration, LeaseState, LeaseToken, ResourceIdentity};
use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, Result};

/// Desired state supplied by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseSpec {
    pub identity: ResourceIdentity,
    /// Payload written on creation and on fallback re-acquisition.
    pub payload: Vec<u8>,
    pub duration: LeaseDuration,
}

impl LeaseSpec {
    /// Spec with the built-in sentinel payload and an infinite lease.
    pub fn new(identity: ResourceIdentity) -> Self {
        Self {
            identity,
            payload: DEFAULT_PAYLOAD.as_bytes().to_vec(),
            duration: LeaseDuration::Infinite,
        }
    }

    /// Spec using configured defaults for payload and duration.
    pub fn from_defaults(identity: ResourceIdentity, defaults: &LeaseDefaults) -> Result<Self> {
        let duration = LeaseDuration::from_seconds(i64::from(defaults.duration_seconds))
            .map_err(|err| ReconcileError::InvalidInput(err.to_string()))?;
        Ok(Self {
            identity,
            payload: defaults.default_payload.as_bytes().to_vec(),
            duration,
        })
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_duration(mut self, duration: LeaseDuration) -> Self {
        self.duration = duration;
        self
    }

    /// Apply a raw duration setting; zero and `-1` mean infinite.
    pub fn with_duration_seconds(self, seconds: i64) -> Result<Self> {
        let duration = LeaseDuration::from_seconds(seconds)
            .map_err(|err| ReconcileError::InvalidInput(err.to_string()))?;
        Ok(self.with_duration(duration))
    }
}

/// Reconciler phase of a lease record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilePhase {
    Absent,
    Creating,
    Leased,
    Drifted,
    Releasing,
    Gone,
}

impl ReconcilePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcilePhase::Absent => "absent",
            ReconcilePhase::Creating => "creating",
            ReconcilePhase::Leased => "leased",
            ReconcilePhase::Drifted => "drifted",
            ReconcilePhase::Releasing => "releasing",
            ReconcilePhase::Gone => "gone",
        }
    }

    /// Phase implied by an observed lease state.
    pub fn from_state(state: &LeaseState) -> Self {
        if state.is_leased() {
            ReconcilePhase::Leased
        } else {
            ReconcilePhase::Drifted
        }
    }
}

impl fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload last written by this controller, if known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadContent {
    Known(#[serde(with = "base64_bytes")] Vec<u8>),
    /// Adopted resources: the blob body is never read back.
    Unknown,
}

impl PayloadContent {
    pub fn as_known(&self) -> Option<&[u8]> {
        match self {
            PayloadContent::Known(bytes) => Some(bytes),
            PayloadContent::Unknown => None,
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// The entity under control: one blob and the lease this controller holds on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub identity: ResourceIdentity,
    /// `None` when the token is unknown (adopted resources).
    pub token: Option<LeaseToken>,
    pub state: LeaseState,
    pub etag: String,
    pub url: String,
    pub duration: LeaseDuration,
    pub phase: ReconcilePhase,
    pub payload: PayloadContent,
}

impl LeaseRecord {
    /// Record reconstructed from values held by the caller, before any store call.
    pub fn detached(
        identity: ResourceIdentity,
        token: Option<LeaseToken>,
        duration: LeaseDuration,
        payload: PayloadContent,
    ) -> Self {
        Self {
            identity,
            token,
            state: LeaseState::Unleased,
            etag: String::new(),
            url: String::new(),
            duration,
            phase: ReconcilePhase::Absent,
            payload,
        }
    }

    pub fn is_leased(&self) -> bool {
        self.phase == ReconcilePhase::Leased
    }
}

/// Outcome of an observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "record", rename_all = "snake_case")]
pub enum Observation {
    Current(LeaseRecord),
    /// The blob no longer exists; the caller should forget the record.
    Gone,
}

impl Observation {
    pub fn record(&self) -> Option<&LeaseRecord> {
        match self {
            Observation::Current(record) => Some(record),
            Observation::Gone => None,
        }
    }
}
