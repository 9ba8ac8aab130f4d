//! ---
//! bl_section: "01-shared-runtime"
//! bl_subsection: "module"
//! bl_type: "source"
//! bl_scope: "code"
//! bl_description: "Shared configuration and tracing bootstrap."
//! bl_version: "v0.1.0"
//! bl_owner: "tbd"
//! ---
//! Shared primitives for the blobleas workspace.
//! This crate exposes configuration loading and tracing initialisation
//! consumed by the store client, the reconciler and the CLI.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, CredentialConfig, CredentialMode, LeaseDefaults, LoadedAppConfig, LoggingConfig,
    StoreConfig, DEFAULT_PAYLOAD,
};
pub use logging::{init_tracing, LogFormat};
