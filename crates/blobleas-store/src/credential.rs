//! ---
//! bl_section: "03-object-lease-client"
//! bl_subsection: "module"
//! bl_type: "source"
//! bl_scope: "code"
//! bl_description: "Bearer token providers for the blob service."
//! bl_version: "v0.1.0"
//! bl_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use blobleas_common::{CredentialConfig, CredentialMode};
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

/// OAuth scope for the blob service.
pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";
/// Resource identifier used by the instance metadata endpoint.
pub const STORAGE_RESOURCE: &str = "https://storage.azure.com/";

pub const ENV_CLIENT_ID: &str = "ARM_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "ARM_CLIENT_SECRET";
pub const ENV_TENANT_ID: &str = "ARM_TENANT_ID";

/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(300);
const FALLBACK_LIFETIME: Duration = Duration::from_secs(3600);

/// Source of bearer tokens for store requests.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a bearer token valid for at least the next request.
    async fn bearer_token(&self) -> StoreResult<String>;

    /// Short label for logs.
    fn describe(&self) -> &'static str;
}

/// Pre-issued token, e.g. from `az account get-access-token`.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenProvider").finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn bearer_token(&self) -> StoreResult<String> {
        Ok(self.token.clone())
    }

    fn describe(&self) -> &'static str {
        "static"
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
    Seconds(u64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<ExpiresIn>,
}

impl TokenResponse {
    fn lifetime(&self) -> Duration {
        let seconds = match &self.expires_in {
            Some(ExpiresIn::Seconds(seconds)) => Some(*seconds),
            Some(ExpiresIn::Text(text)) => text.trim().parse().ok(),
            None => None,
        };
        seconds
            .map(Duration::from_secs)
            .unwrap_or(FALLBACK_LIFETIME)
    }
}

#[derive(Debug, Default)]
struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    fn get(&self) -> Option<String> {
        let slot = self.slot.lock();
        slot.as_ref()
            .filter(|cached| Instant::now() < cached.refresh_at)
            .map(|cached| cached.value.clone())
    }

    fn store(&self, response: &TokenResponse) {
        let lifetime = response.lifetime();
        let refresh_at = Instant::now() + lifetime.saturating_sub(REFRESH_MARGIN);
        *self.slot.lock() = Some(CachedToken {
            value: response.access_token.clone(),
            refresh_at,
        });
    }
}

async fn read_token_response(
    response: reqwest::Response,
    source: &str,
) -> StoreResult<TokenResponse> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::Credential(format!(
            "{source} token request failed with http {}: {}",
            status.as_u16(),
            body.trim()
        )));
    }
    response
        .json::<TokenResponse>()
        .await
        .map_err(|err| StoreError::Credential(format!("{source} token response malformed: {err}")))
}

/// Service principal authenticated with a client secret.
pub struct ClientSecretCredential {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    cache: TokenCache,
}

impl ClientSecretCredential {
    pub fn new(
        http: reqwest::Client,
        authority_host: &str,
        tenant_id: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            authority_host.trim_end_matches('/'),
            tenant_id
        );
        Self {
            http,
            token_url,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            cache: TokenCache::default(),
        }
    }
}

impl fmt::Debug for ClientSecretCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecretCredential")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenProvider for ClientSecretCredential {
    async fn bearer_token(&self) -> StoreResult<String> {
        if let Some(token) = self.cache.get() {
            return Ok(token);
        }
        debug!(token_url = %self.token_url, "requesting client-secret token");
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", STORAGE_SCOPE),
        ];
        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|err| StoreError::Credential(format!("client-secret token request: {err}")))?;
        let token = read_token_response(response, "client-secret").await?;
        self.cache.store(&token);
        Ok(token.access_token)
    }

    fn describe(&self) -> &'static str {
        "client-secret"
    }
}

/// Token from the instance metadata service of the host.
pub struct ManagedIdentityCredential {
    http: reqwest::Client,
    endpoint: String,
    client_id: Option<String>,
    cache: TokenCache,
}

impl ManagedIdentityCredential {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>, client_id: Option<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            client_id,
            cache: TokenCache::default(),
        }
    }
}

impl fmt::Debug for ManagedIdentityCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedIdentityCredential")
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenProvider for ManagedIdentityCredential {
    async fn bearer_token(&self) -> StoreResult<String> {
        if let Some(token) = self.cache.get() {
            return Ok(token);
        }
        let mut query = vec![("api-version", "2018-02-01"), ("resource", STORAGE_RESOURCE)];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.as_str()));
        }
        let response = self
            .http
            .get(&self.endpoint)
            .header("Metadata", "true")
            .query(&query)
            .send()
            .await
            .map_err(|err| StoreError::Credential(format!("managed identity token request: {err}")))?;
        let token = read_token_response(response, "managed identity").await?;
        self.cache.store(&token);
        Ok(token.access_token)
    }

    fn describe(&self) -> &'static str {
        "managed-identity"
    }
}

/// Build the provider selected by configuration, reading the process environment.
pub fn credential_from_config(
    config: &CredentialConfig,
    http: reqwest::Client,
) -> StoreResult<Arc<dyn TokenProvider>> {
    credential_from_parts(config, http, |key| std::env::var(key).ok())
}

/// Build the provider selected by configuration with an explicit environment lookup.
///
/// Explicit configuration values win over `ARM_*` variables. In `auto` mode a
/// complete client-secret triple is preferred, then a static token, then the
/// managed identity endpoint.
pub fn credential_from_parts<F>(
    config: &CredentialConfig,
    http: reqwest::Client,
    env: F,
) -> StoreResult<Arc<dyn TokenProvider>>
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |configured: &Option<String>, key: &str| {
        configured
            .clone()
            .or_else(|| env(key))
            .filter(|value| !value.trim().is_empty())
    };
    let tenant_id = lookup(&config.tenant_id, ENV_TENANT_ID);
    let client_id = lookup(&config.client_id, ENV_CLIENT_ID);
    let client_secret = lookup(&config.client_secret, ENV_CLIENT_SECRET);
    let static_token = env(&config.token_env).filter(|value| !value.trim().is_empty());

    let client_secret_provider = || -> Option<Arc<dyn TokenProvider>> {
        match (&tenant_id, &client_id, &client_secret) {
            (Some(tenant), Some(client), Some(secret)) => Some(Arc::new(ClientSecretCredential::new(
                http.clone(),
                &config.authority_host,
                tenant,
                client.clone(),
                secret.clone(),
            ))),
            _ => None,
        }
    };
    let managed_identity = || -> Arc<dyn TokenProvider> {
        Arc::new(ManagedIdentityCredential::new(
            http.clone(),
            config.managed_identity_endpoint.clone(),
            client_id.clone(),
        ))
    };

    let provider: Arc<dyn TokenProvider> = match config.mode {
        CredentialMode::ClientSecret => client_secret_provider().ok_or_else(|| {
            StoreError::Credential(format!(
                "client-secret mode needs tenant, client id and secret ({ENV_TENANT_ID}, {ENV_CLIENT_ID}, {ENV_CLIENT_SECRET})"
            ))
        })?,
        CredentialMode::Static => match static_token {
            Some(token) => Arc::new(StaticTokenProvider::new(token)),
            None => {
                return Err(StoreError::Credential(format!(
                    "static mode needs a token in {}",
                    config.token_env
                )))
            }
        },
        CredentialMode::ManagedIdentity => managed_identity(),
        CredentialMode::Auto => match client_secret_provider() {
            Some(provider) => provider,
            None => match static_token {
                Some(token) => Arc::new(StaticTokenProvider::new(token)),
                None => managed_identity(),
            },
        },
    };
    info!(credential = provider.describe(), "credential selected");
    Ok(provider)
}
