//! ---
//! bl_section: "06-testing"
//! bl_subsection: "integration-tests"
//! bl_type: "source"
//! bl_scope: "code"
//! bl_description: "Shipped configuration files parse into usable lease settings."
//! bl_version: "v0.1.0"
//! bl_owner: "tbd"
//! ---
use std::path::Path;
use std::time::Duration;

use blobleas_common::{AppConfig, CredentialMode, LogFormat};
use blobleas_reconciler::{recommended_interval, LeaseSpec};
use blobleas_store::LeaseDuration;

const EXAMPLE_CONFIG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../configs/blobleas.example.toml");

#[test]
fn example_config_loads() {
    let config = AppConfig::from_path(Path::new(EXAMPLE_CONFIG)).expect("example config parses");
    assert_eq!(config.credentials.mode, CredentialMode::Auto);
    assert_eq!(config.logging.format, LogFormat::StructuredJson);
    assert_eq!(config.store.request_timeout, Duration::from_secs(30));
    assert_eq!(
        config.store.service_url("acct"),
        "https://acct.blob.core.windows.net"
    );
    assert_eq!(config.lease.renew_interval, Some(Duration::from_secs(10)));
}

#[test]
fn example_lease_defaults_build_a_bounded_spec() {
    let config = AppConfig::from_path(Path::new(EXAMPLE_CONFIG)).expect("example config parses");
    let spec = LeaseSpec::from_defaults("a/c/lock.txt".parse().unwrap(), &config.lease)
        .expect("defaults are valid");
    assert_eq!(spec.duration, LeaseDuration::from_seconds(30).unwrap());
    assert_eq!(spec.payload, b"managed by blobleas".to_vec());
    assert_eq!(recommended_interval(spec.duration), Some(Duration::from_secs(15)));
}

#[test]
fn out_of_range_duration_is_rejected_at_load() {
    let err = AppConfig::from_toml_str("[lease]\nduration_seconds = 90\n").unwrap_err();
    assert!(err.to_string().contains("duration_seconds"), "unexpected error: {err}");
}
