//! ---
//! bl_section: "03-object-lease-client"
//! bl_subsection: "module"
//! bl_type: "source"
//! bl_scope: "code"
//! bl_description: "Blob service REST adapter implementing the lease store."
//! bl_version: "v0.1.0"
//! bl_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use blobleas_common::{CredentialConfig, StoreConfig};
use chrono::Utc;
use reqwest::header::{HeaderMap, CONTENT_TYPE, ETAG};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use crate::client::LeaseStore;
use crate::credential::{credential_from_config, TokenProvider};
use crate::error::{tolerate_release, ErrorKind, StoreError, StoreOperation, StoreResult};
use crate::types::{
    LeaseDuration, LeaseGrant, LeaseSnapshot, LeaseState, LeaseToken, ResourceIdentity,
    WriteReceipt,
};

const HEADER_VERSION: &str = "x-ms-version";
const HEADER_DATE: &str = "x-ms-date";
const HEADER_ERROR_CODE: &str = "x-ms-error-code";
const HEADER_BLOB_TYPE: &str = "x-ms-blob-type";
const HEADER_LEASE_ACTION: &str = "x-ms-lease-action";
const HEADER_LEASE_DURATION: &str = "x-ms-lease-duration";
const HEADER_LEASE_ID: &str = "x-ms-lease-id";
const HEADER_PROPOSED_LEASE_ID: &str = "x-ms-proposed-lease-id";
const HEADER_LEASE_STATE: &str = "x-ms-lease-state";

/// Lease store backed by the blob service REST API.
pub struct AzureBlobStore {
    http: reqwest::Client,
    settings: StoreConfig,
    credential: Arc<dyn TokenProvider>,
}

impl fmt::Debug for AzureBlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureBlobStore")
            .field("endpoint_template", &self.settings.endpoint_template)
            .field("api_version", &self.settings.api_version)
            .field("credential", &self.credential.describe())
            .finish()
    }
}

fn build_http_client(settings: &StoreConfig) -> StoreResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(settings.request_timeout)
        .build()
        .map_err(|err| StoreError::ClientSetup(err.to_string()))
}

impl AzureBlobStore {
    /// Build a store with its own HTTP client honouring the configured timeout.
    pub fn new(settings: StoreConfig, credential: Arc<dyn TokenProvider>) -> StoreResult<Self> {
        let http = build_http_client(&settings)?;
        Ok(Self::with_client(http, settings, credential))
    }

    /// Build a store and its credential from application configuration.
    pub fn from_config(settings: StoreConfig, credentials: &CredentialConfig) -> StoreResult<Self> {
        let credential_http = build_http_client(&settings)?;
        let credential = credential_from_config(credentials, credential_http)?;
        Self::new(settings, credential)
    }

    /// Build a store around an existing HTTP client.
    pub fn with_client(
        http: reqwest::Client,
        settings: StoreConfig,
        credential: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            http,
            settings,
            credential,
        }
    }

    fn container_url(
        &self,
        operation: StoreOperation,
        identity: &ResourceIdentity,
    ) -> StoreResult<Url> {
        let raw = self.settings.service_url(identity.account());
        let mut url = Url::parse(&raw)
            .map_err(|err| StoreError::invalid(operation, identity, format!("{raw}: {err}")))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::invalid(operation, identity, format!("{raw} cannot be a base")))?
            .pop_if_empty()
            .push(identity.container());
        Ok(url)
    }

    /// Canonical URL of the blob addressed by `identity`.
    pub fn blob_url(&self, identity: &ResourceIdentity) -> StoreResult<Url> {
        self.blob_url_for(StoreOperation::LeaseState, identity)
    }

    fn blob_url_for(
        &self,
        operation: StoreOperation,
        identity: &ResourceIdentity,
    ) -> StoreResult<Url> {
        let mut url = self.container_url(operation, identity)?;
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(identity.name());
        }
        Ok(url)
    }

    async fn send(
        &self,
        operation: StoreOperation,
        identity: &ResourceIdentity,
        request: RequestBuilder,
    ) -> StoreResult<Response> {
        let token = self.credential.bearer_token().await?;
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let response = request
            .bearer_auth(token)
            .header(HEADER_VERSION, &self.settings.api_version)
            .header(HEADER_DATE, date)
            .send()
            .await
            .map_err(|err| StoreError::transport(operation, identity, err))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        // HEAD responses have no body, so the error code header is the only source.
        let code = header_value(response.headers(), HEADER_ERROR_CODE)
            .unwrap_or_else(|| canonical_reason(status));
        debug!(
            operation = %operation,
            identity = %identity,
            status = status.as_u16(),
            code = %code,
            "store request rejected"
        );
        Err(StoreError::rejected(operation, identity, status.as_u16(), code))
    }

    async fn ensure_container(&self, identity: &ResourceIdentity) -> StoreResult<()> {
        let operation = StoreOperation::CreateContainer;
        let mut url = self.container_url(operation, identity)?;
        url.set_query(Some("restype=container"));
        match self
            .send(operation, identity, self.http.request(Method::PUT, url))
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if err.is_container_exists() => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn lease_request(
        &self,
        operation: StoreOperation,
        identity: &ResourceIdentity,
        action: &str,
    ) -> StoreResult<RequestBuilder> {
        let mut url = self.blob_url_for(operation, identity)?;
        url.set_query(Some("comp=lease"));
        Ok(self
            .http
            .request(Method::PUT, url)
            .header(HEADER_LEASE_ACTION, action))
    }

    fn grant_from(
        &self,
        response: &Response,
        requested: &LeaseToken,
        identity: &ResourceIdentity,
    ) -> StoreResult<LeaseGrant> {
        let token = header_value(response.headers(), HEADER_LEASE_ID)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(*requested);
        Ok(LeaseGrant {
            token,
            etag: header_value(response.headers(), ETAG.as_str()).unwrap_or_default(),
            url: self.blob_url(identity)?.to_string(),
        })
    }

    async fn release_raw(&self, identity: &ResourceIdentity, token: &LeaseToken) -> StoreResult<()> {
        let operation = StoreOperation::ReleaseLease;
        let request = self
            .lease_request(operation, identity, "release")?
            .header(HEADER_LEASE_ID, token.to_string());
        self.send(operation, identity, request).await?;
        Ok(())
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

fn canonical_reason(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("Unknown").to_owned()
}

#[async_trait]
impl LeaseStore for AzureBlobStore {
    #[instrument(level = "debug", skip_all, fields(identity = %identity, bytes = payload.len()))]
    async fn write(&self, identity: &ResourceIdentity, payload: &[u8]) -> StoreResult<WriteReceipt> {
        self.ensure_container(identity).await?;
        let operation = StoreOperation::Write;
        let url = self.blob_url_for(operation, identity)?;
        let request = self
            .http
            .request(Method::PUT, url.clone())
            .header(HEADER_BLOB_TYPE, "BlockBlob")
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(payload.to_vec());
        let response = self.send(operation, identity, request).await?;
        Ok(WriteReceipt {
            etag: header_value(response.headers(), ETAG.as_str()).unwrap_or_default(),
            url: url.to_string(),
        })
    }

    #[instrument(level = "debug", skip_all, fields(identity = %identity, token = %token))]
    async fn acquire_lease(
        &self,
        identity: &ResourceIdentity,
        token: &LeaseToken,
        duration: LeaseDuration,
    ) -> StoreResult<LeaseGrant> {
        let operation = StoreOperation::AcquireLease;
        let request = self
            .lease_request(operation, identity, "acquire")?
            .header(HEADER_LEASE_DURATION, duration.as_seconds().to_string())
            .header(HEADER_PROPOSED_LEASE_ID, token.to_string());
        let response = self.send(operation, identity, request).await?;
        self.grant_from(&response, token, identity)
    }

    #[instrument(level = "debug", skip_all, fields(identity = %identity, token = %token))]
    async fn renew_lease(&self, identity: &ResourceIdentity, token: &LeaseToken) -> StoreResult<LeaseGrant> {
        let operation = StoreOperation::RenewLease;
        let request = self
            .lease_request(operation, identity, "renew")?
            .header(HEADER_LEASE_ID, token.to_string());
        let response = self.send(operation, identity, request).await?;
        self.grant_from(&response, token, identity)
    }

    #[instrument(level = "debug", skip_all, fields(identity = %identity, token = %token))]
    async fn release_lease(&self, identity: &ResourceIdentity, token: &LeaseToken) -> StoreResult<()> {
        tolerate_release(self.release_raw(identity, token).await)
    }

    async fn exists(&self, identity: &ResourceIdentity) -> StoreResult<bool> {
        let operation = StoreOperation::Exists;
        let url = self.blob_url_for(operation, identity)?;
        match self
            .send(operation, identity, self.http.request(Method::HEAD, url))
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn lease_state(&self, identity: &ResourceIdentity) -> StoreResult<LeaseSnapshot> {
        let operation = StoreOperation::LeaseState;
        let url = self.blob_url_for(operation, identity)?;
        let response = self
            .send(operation, identity, self.http.request(Method::HEAD, url.clone()))
            .await?;
        let state = header_value(response.headers(), HEADER_LEASE_STATE)
            .map(|raw| LeaseState::parse(&raw))
            .unwrap_or(LeaseState::Unleased);
        Ok(LeaseSnapshot {
            state,
            etag: header_value(response.headers(), ETAG.as_str()).unwrap_or_default(),
            url: url.to_string(),
        })
    }

    #[instrument(level = "debug", skip_all, fields(identity = %identity))]
    async fn delete(&self, identity: &ResourceIdentity) -> StoreResult<()> {
        let operation = StoreOperation::Delete;
        let url = self.blob_url_for(operation, identity)?;
        self.send(operation, identity, self.http.request(Method::DELETE, url))
            .await?;
        Ok(())
    }
}
