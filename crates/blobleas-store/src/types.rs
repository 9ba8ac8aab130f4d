//! ---
//! bl_section: "03-object-lease-client"
//! bl_subsection: "module"
//! bl_type: "source"
//! bl_scope: "code"
//! bl_description: "Identity, token, duration and lease state primitives."
//! bl_version: "v0.1.0"
//! bl_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors produced while parsing or constructing a [`ResourceIdentity`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// The identifier did not split into exactly three `/`-separated segments.
    #[error("expected an identifier of the form account/container/name, got `{input}` ({found} segments)")]
    SegmentCount {
        /// Raw identifier as supplied.
        input: String,
        /// Number of segments found.
        found: usize,
    },
    /// One of the segments was empty.
    #[error("identifier `{input}` has an empty {segment} segment")]
    EmptySegment {
        /// Raw identifier as supplied.
        input: String,
        /// Which component was empty.
        segment: &'static str,
    },
    /// A component contained the `/` separator.
    #[error("{segment} `{value}` must not contain '/'")]
    SeparatorInSegment {
        /// Which component was rejected.
        segment: &'static str,
        /// Rejected value.
        value: String,
    },
}

/// Composite key addressing one remote blob: `(account, container, name)`.
///
/// Components are write-once; moving a lease to a different blob means
/// destroying and recreating it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "IdentityFields")]
pub struct ResourceIdentity {
    account: String,
    container: String,
    name: String,
}

#[derive(Deserialize)]
struct IdentityFields {
    account: String,
    container: String,
    name: String,
}

impl TryFrom<IdentityFields> for ResourceIdentity {
    type Error = IdentityError;

    fn try_from(fields: IdentityFields) -> Result<Self, Self::Error> {
        Self::new(fields.account, fields.container, fields.name)
    }
}

const SEGMENTS: [&str; 3] = ["account", "container", "name"];

impl ResourceIdentity {
    /// Build an identity from its three components.
    pub fn new(
        account: impl Into<String>,
        container: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, IdentityError> {
        let parts = [account.into(), container.into(), name.into()];
        for (segment, value) in SEGMENTS.into_iter().zip(parts.iter()) {
            if value.is_empty() {
                return Err(IdentityError::EmptySegment {
                    input: parts.join("/"),
                    segment,
                });
            }
            if value.contains('/') {
                return Err(IdentityError::SeparatorInSegment {
                    segment,
                    value: value.clone(),
                });
            }
        }
        let [account, container, name] = parts;
        Ok(Self {
            account,
            container,
            name,
        })
    }

    /// Storage account name.
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Container name.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Blob name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for ResourceIdentity {
    type Err = IdentityError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = input.split('/').collect();
        if parts.len() != SEGMENTS.len() {
            return Err(IdentityError::SegmentCount {
                input: input.to_owned(),
                found: parts.len(),
            });
        }
        if let Some(index) = parts.iter().position(|part| part.is_empty()) {
            return Err(IdentityError::EmptySegment {
                input: input.to_owned(),
                segment: SEGMENTS[index],
            });
        }
        Ok(Self {
            account: parts[0].to_owned(),
            container: parts[1].to_owned(),
            name: parts[2].to_owned(),
        })
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.account, self.container, self.name)
    }
}

/// Rejected lease token text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("lease token `{0}` is not a valid UUID")]
pub struct InvalidToken(pub String);

/// Opaque lease identifier. The store only accepts UUIDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseToken(Uuid);

impl LeaseToken {
    /// Generate a fresh random token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl FromStr for LeaseToken {
    type Err = InvalidToken;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| InvalidToken(raw.to_owned()))
    }
}

impl fmt::Display for LeaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Rejected lease duration.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("lease duration must be -1 (infinite) or within 15..=60 seconds, got {0}")]
pub struct InvalidDuration(pub i64);

/// Bounded lease length, always within `15..=60` seconds.
///
/// Only [`LeaseDuration::from_seconds`] builds one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseSeconds(u8);

impl LeaseSeconds {
    /// Number of seconds.
    pub fn get(self) -> u8 {
        self.0
    }
}

/// Lease duration: infinite or a bounded number of seconds in `15..=60`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum LeaseDuration {
    /// Never expires; no renewal needed.
    #[default]
    Infinite,
    /// Expires unless renewed within the given number of seconds.
    Seconds(LeaseSeconds),
}

impl LeaseDuration {
    /// Shortest bounded lease the store accepts.
    pub const MIN_SECONDS: i64 = 15;
    /// Longest bounded lease the store accepts.
    pub const MAX_SECONDS: i64 = 60;

    /// Interpret a configured value. Zero (unset) and `-1` both mean infinite.
    pub fn from_seconds(seconds: i64) -> Result<Self, InvalidDuration> {
        match seconds {
            -1 | 0 => Ok(Self::Infinite),
            Self::MIN_SECONDS..=Self::MAX_SECONDS => Ok(Self::Seconds(LeaseSeconds(seconds as u8))),
            other => Err(InvalidDuration(other)),
        }
    }

    /// Value sent in the `x-ms-lease-duration` header.
    pub fn as_seconds(&self) -> i64 {
        match self {
            Self::Infinite => -1,
            Self::Seconds(seconds) => i64::from(seconds.get()),
        }
    }

    /// Wall-clock lifetime of a bounded lease.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Infinite => None,
            Self::Seconds(seconds) => Some(Duration::from_secs(u64::from(seconds.get()))),
        }
    }

    /// Whether the lease needs periodic renewal to stay held.
    pub fn is_bounded(&self) -> bool {
        matches!(self, Self::Seconds(_))
    }
}

impl TryFrom<i64> for LeaseDuration {
    type Error = InvalidDuration;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_seconds(value)
    }
}

impl From<LeaseDuration> for i64 {
    fn from(value: LeaseDuration) -> Self {
        value.as_seconds()
    }
}

impl fmt::Display for LeaseDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infinite => f.write_str("infinite"),
            Self::Seconds(seconds) => write!(f, "{}s", seconds.get()),
        }
    }
}

/// Lease state as reported by the store.
///
/// Only the exact, case-sensitive wire value `leased` counts as held.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LeaseState {
    /// No lease (`available`).
    Unleased,
    /// Held by some token (`leased`).
    Leased,
    /// A bounded lease ran out without renewal (`expired`).
    Expired,
    /// A break was requested and the break period is running (`breaking`).
    Breaking,
    /// The lease was broken (`broken`).
    Broken,
    /// Any other value, preserved verbatim.
    Unrecognized(String),
}

impl LeaseState {
    /// Parse a wire value. Missing values are treated as `available` by callers.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "available" => Self::Unleased,
            "leased" => Self::Leased,
            "expired" => Self::Expired,
            "breaking" => Self::Breaking,
            "broken" => Self::Broken,
            other => Self::Unrecognized(other.to_owned()),
        }
    }

    /// Wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unleased => "available",
            Self::Leased => "leased",
            Self::Expired => "expired",
            Self::Breaking => "breaking",
            Self::Broken => "broken",
            Self::Unrecognized(raw) => raw,
        }
    }

    /// True only for an active lease.
    pub fn is_leased(&self) -> bool {
        matches!(self, Self::Leased)
    }
}

impl From<String> for LeaseState {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<LeaseState> for String {
    fn from(value: LeaseState) -> Self {
        value.as_str().to_owned()
    }
}

impl fmt::Display for LeaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of uploading a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    /// ETag of the freshly written blob.
    pub etag: String,
    /// Canonical blob URL.
    pub url: String,
}

/// Result of acquiring or renewing a lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseGrant {
    /// Token now holding the lease.
    pub token: LeaseToken,
    /// Current blob ETag.
    pub etag: String,
    /// Canonical blob URL.
    pub url: String,
}

/// Lease metadata read from the blob properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseSnapshot {
    /// Reported lease state.
    pub state: LeaseState,
    /// Current blob ETag.
    pub etag: String,
    /// Canonical blob URL.
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_segment_identity() {
        let identity: ResourceIdentity = "a/c/lock.txt".parse().unwrap();
        assert_eq!(identity.account(), "a");
        assert_eq!(identity.container(), "c");
        assert_eq!(identity.name(), "lock.txt");
        assert_eq!(identity.to_string(), "a/c/lock.txt");
    }

    #[test]
    fn rejects_two_segments() {
        let err = "a/c".parse::<ResourceIdentity>().unwrap_err();
        assert_eq!(
            err,
            IdentityError::SegmentCount {
                input: "a/c".into(),
                found: 2
            }
        );
    }

    #[test]
    fn rejects_extra_and_empty_segments() {
        assert!(matches!(
            "a/c/n/extra".parse::<ResourceIdentity>(),
            Err(IdentityError::SegmentCount { found: 4, .. })
        ));
        assert!(matches!(
            "a//n".parse::<ResourceIdentity>(),
            Err(IdentityError::EmptySegment {
                segment: "container",
                ..
            })
        ));
        assert!(matches!(
            "a/c/".parse::<ResourceIdentity>(),
            Err(IdentityError::EmptySegment { segment: "name", .. })
        ));
        assert!("".parse::<ResourceIdentity>().is_err());
    }

    #[test]
    fn constructor_rejects_separators() {
        assert!(matches!(
            ResourceIdentity::new("a", "c", "dir/blob"),
            Err(IdentityError::SeparatorInSegment { segment: "name", .. })
        ));
        assert!(ResourceIdentity::new("", "c", "n").is_err());
    }

    #[test]
    fn token_requires_uuid() {
        let token = LeaseToken::generate();
        let parsed: LeaseToken = token.to_string().parse().unwrap();
        assert_eq!(parsed, token);
        assert_eq!(
            "not-a-uuid".parse::<LeaseToken>().unwrap_err(),
            InvalidToken("not-a-uuid".into())
        );
    }

    #[test]
    fn duration_domain() {
        assert_eq!(LeaseDuration::from_seconds(0), Ok(LeaseDuration::Infinite));
        assert_eq!(LeaseDuration::from_seconds(-1), Ok(LeaseDuration::Infinite));
        assert_eq!(LeaseDuration::from_seconds(15).unwrap().as_seconds(), 15);
        assert_eq!(LeaseDuration::from_seconds(60).unwrap().as_seconds(), 60);
        assert_eq!(LeaseDuration::from_seconds(14), Err(InvalidDuration(14)));
        assert_eq!(LeaseDuration::from_seconds(61), Err(InvalidDuration(61)));
        assert_eq!(LeaseDuration::from_seconds(-2), Err(InvalidDuration(-2)));
        assert_eq!(LeaseDuration::Infinite.as_seconds(), -1);
        assert_eq!(
            LeaseDuration::from_seconds(30).unwrap().as_duration(),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn lease_state_is_case_sensitive() {
        assert!(LeaseState::parse("leased").is_leased());
        assert!(!LeaseState::parse("Leased").is_leased());
        assert_eq!(LeaseState::parse("available"), LeaseState::Unleased);
        assert_eq!(
            LeaseState::parse("mystery"),
            LeaseState::Unrecognized("mystery".into())
        );
        assert_eq!(LeaseState::Unrecognized("mystery".into()).as_str(), "mystery");
    }

    #[test]
    fn serde_uses_wire_values() {
        let json = serde_json::to_string(&LeaseState::Expired).unwrap();
        assert_eq!(json, "\"expired\"");
        let duration: LeaseDuration = serde_json::from_str("30").unwrap();
        assert_eq!(duration.as_seconds(), 30);
        assert!(serde_json::from_str::<LeaseDuration>("5").is_err());
    }

    #[test]
    fn deserialized_identity_is_validated() {
        let identity: ResourceIdentity =
            serde_json::from_str(r#"{"account":"a","container":"c","name":"lock.txt"}"#).unwrap();
        assert_eq!(identity.to_string(), "a/c/lock.txt");
        let json = serde_json::to_string(&identity).unwrap();
        assert_eq!(serde_json::from_str::<ResourceIdentity>(&json).unwrap(), identity);

        for raw in [
            r#"{"account":"","container":"c","name":"n"}"#,
            r#"{"account":"a","container":"a/b","name":"n"}"#,
            r#"{"account":"a","container":"c","name":""}"#,
        ] {
            let err = serde_json::from_str::<ResourceIdentity>(raw).unwrap_err();
            assert!(err.to_string().contains("segment") || err.to_string().contains("'/'"), "{raw}: {err}");
        }
    }

    #[test]
    fn bounded_seconds_only_come_from_the_checked_constructor() {
        for seconds in [15, 37, 60] {
            let duration = LeaseDuration::from_seconds(seconds).unwrap();
            let LeaseDuration::Seconds(bounded) = duration else {
                panic!("{seconds} should be bounded");
            };
            assert_eq!(i64::from(bounded.get()), seconds);
            let json = serde_json::to_string(&duration).unwrap();
            assert_eq!(serde_json::from_str::<LeaseDuration>(&json).unwrap(), duration);
        }
    }
}
