//! ---
//! bl_section: "03-object-lease-client"
//! bl_subsection: "module"
//! bl_type: "source"
//! bl_scope: "code"
//! bl_description: "Remote object and lease client."
//! bl_version: "v0.1.0"
//! bl_owner: "tbd"
//! ---
//! Stateless client for lease-protected blobs. [`LeaseStore`] is the seam the
//! reconciler talks to; [`AzureBlobStore`] speaks the blob REST API and
//! [`InMemoryLeaseStore`] keeps everything in process.

pub mod azure;
pub mod client;
pub mod credential;
pub mod error;
pub mod memory;
pub mod types;

pub use azure::AzureBlobStore;
pub use client::{LeaseStore, SharedLeaseStore};
pub use credential::{
    credential_from_config, credential_from_parts, ClientSecretCredential,
    ManagedIdentityCredential, StaticTokenProvider, TokenProvider,
};
pub use error::{ErrorKind, StoreError, StoreOperation, StoreResult};
pub use memory::InMemoryLeaseStore;
pub use types::{
    IdentityError, InvalidDuration, InvalidToken, LeaseDuration, LeaseGrant, LeaseSeconds,
    LeaseSnapshot, LeaseState, LeaseToken, ResourceIdentity, WriteReceipt,
};
