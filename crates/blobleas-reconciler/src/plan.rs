//! ---
//! bl_section: "04-lease-reconciler"
//! bl_subsection: "module"
//! bl_type: "source"
//! bl_scope: "code"
//! bl_description: "Pure plan-time decisions: what a reconcile pass should do."
//! bl_version: "v0.1.0"
//! bl_owner: "tbd"
//! ---
use std::fmt;

use blobleas_store::LeaseState;
use serde::Serialize;

use crate::record::{LeaseRecord, LeaseSpec, Observation};

/// Why a change cannot be applied in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplaceReason {
    IdentityChanged,
    PayloadChanged,
}

/// Action the orchestrator should take for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlanAction {
    /// Nothing recorded yet.
    Create,
    /// Destroy and recreate.
    Replace { reasons: Vec<ReplaceReason> },
    /// The lease is not held; run a reconcile pass.
    Reconcile,
    /// The blob vanished; drop the record.
    Forget,
    NoOp,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanAction::Create => f.write_str("create"),
            PlanAction::Replace { .. } => f.write_str("replace"),
            PlanAction::Reconcile => f.write_str("reconcile"),
            PlanAction::Forget => f.write_str("forget"),
            PlanAction::NoOp => f.write_str("no-op"),
        }
    }
}

/// Anything other than the exact `leased` state needs a reconcile pass.
pub fn needs_reconcile(state: &LeaseState) -> bool {
    !state.is_leased()
}

/// Decide what to do given the recorded state, a fresh observation (if one
/// was taken) and the desired spec.
///
/// Duration changes are applied on the next acquisition and never force a
/// replacement. An unknown payload (adopted resource) never forces one either.
pub fn plan(prior: Option<&LeaseRecord>, observation: Option<&Observation>, desired: &LeaseSpec) -> PlanAction {
    let Some(prior) = prior else {
        return PlanAction::Create;
    };
    let current = match observation {
        Some(Observation::Gone) => return PlanAction::Forget,
        Some(Observation::Current(record)) => record,
        None => prior,
    };

    let mut reasons = Vec::new();
    if prior.identity != desired.identity {
        reasons.push(ReplaceReason::IdentityChanged);
    }
    if let Some(written) = prior.payload.as_known() {
        if written != desired.payload.as_slice() {
            reasons.push(ReplaceReason::PayloadChanged);
        }
    }
    if !reasons.is_empty() {
        return PlanAction::Replace { reasons };
    }

    if needs_reconcile(&current.state) {
        PlanAction::Reconcile
    } else {
        PlanAction::NoOp
    }
}

#[cfg(test)]
mod tests {
    use blobleas_store::{LeaseDuration, LeaseToken};

    use super::*;
    use crate::record::{PayloadContent, ReconcilePhase};

    fn leased_record(payload: PayloadContent) -> LeaseRecord {
        LeaseRecord {
            identity: "a/c/lock.txt".parse().unwrap(),
            token: Some(LeaseToken::generate()),
            state: LeaseState::Leased,
            etag: "\"0x1\"".into(),
            url: "https://a.blob.core.windows.net/c/lock.txt".into(),
            duration: LeaseDuration::Infinite,
            phase: ReconcilePhase::Leased,
            payload,
        }
    }

    fn desired(payload: &[u8]) -> LeaseSpec {
        LeaseSpec::new("a/c/lock.txt".parse().unwrap()).with_payload(payload.to_vec())
    }

    #[test]
    fn only_exact_leased_is_settled() {
        assert!(!needs_reconcile(&LeaseState::Leased));
        for state in [
            LeaseState::Unleased,
            LeaseState::Expired,
            LeaseState::Breaking,
            LeaseState::Broken,
            LeaseState::parse("LEASED"),
        ] {
            assert!(needs_reconcile(&state), "{state}");
        }
    }

    #[test]
    fn missing_prior_creates() {
        assert_eq!(plan(None, None, &desired(b"x")), PlanAction::Create);
    }

    #[test]
    fn gone_is_forgotten() {
        let prior = leased_record(PayloadContent::Known(b"x".to_vec()));
        assert_eq!(
            plan(Some(&prior), Some(&Observation::Gone), &desired(b"x")),
            PlanAction::Forget
        );
    }

    #[test]
    fn drift_triggers_reconcile() {
        let prior = leased_record(PayloadContent::Known(b"x".to_vec()));
        let mut observed = prior.clone();
        observed.state = LeaseState::Expired;
        observed.phase = ReconcilePhase::Drifted;
        assert_eq!(
            plan(Some(&prior), Some(&Observation::Current(observed)), &desired(b"x")),
            PlanAction::Reconcile
        );
        assert_eq!(plan(Some(&prior), None, &desired(b"x")), PlanAction::NoOp);
    }

    #[test]
    fn payload_and_identity_changes_replace() {
        let prior = leased_record(PayloadContent::Known(b"x".to_vec()));
        assert_eq!(
            plan(Some(&prior), None, &desired(b"y")),
            PlanAction::Replace {
                reasons: vec![ReplaceReason::PayloadChanged]
            }
        );
        let moved = LeaseSpec::new("a/c/other.txt".parse().unwrap()).with_payload(b"x".to_vec());
        assert_eq!(
            plan(Some(&prior), None, &moved),
            PlanAction::Replace {
                reasons: vec![ReplaceReason::IdentityChanged]
            }
        );
    }

    #[test]
    fn unknown_payload_and_duration_do_not_replace() {
        let adopted = leased_record(PayloadContent::Unknown);
        assert_eq!(plan(Some(&adopted), None, &desired(b"anything")), PlanAction::NoOp);

        let prior = leased_record(PayloadContent::Known(b"x".to_vec()));
        let longer = desired(b"x").with_duration(LeaseDuration::from_seconds(60).unwrap());
        assert_eq!(plan(Some(&prior), None, &longer), PlanAction::NoOp);
    }
}
