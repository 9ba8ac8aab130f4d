//! ---
//! bl_section: "01-shared-runtime"
//! bl_subsection: "module"
//! bl_type: "source"
//! bl_scope: "code"
//! bl_description: "Shared configuration and tracing bootstrap."
//! bl_version: "v0.1.0"
//! bl_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};

use crate::logging::LogFormat;

/// Sentinel written to a blob when the caller supplies no payload.
pub const DEFAULT_PAYLOAD: &str = "managed by blobleas";

fn default_endpoint_template() -> String {
    "https://{account}.blob.core.windows.net".to_owned()
}

fn default_api_version() -> String {
    "2021-08-06".to_owned()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_authority_host() -> String {
    "https://login.microsoftonline.com".to_owned()
}

fn default_token_env() -> String {
    "BLOBLEAS_BEARER_TOKEN".to_owned()
}

fn default_managed_identity_endpoint() -> String {
    "http://169.254.169.254/metadata/identity/oauth2/token".to_owned()
}

fn default_lease_duration() -> i32 {
    -1
}

fn default_payload() -> String {
    DEFAULT_PAYLOAD.to_owned()
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

/// Primary configuration object for blobleas tooling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub credentials: CredentialConfig,
    #[serde(default)]
    pub lease: LeaseDefaults,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no file was found and built-in defaults are in effect.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "BLOBLEAS_CONFIG";

    /// Load configuration, respecting the `BLOBLEAS_CONFIG` override and
    /// falling back to defaults when none of the candidates exist.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        let config = Self::default();
        config.validate()?;
        Ok(LoadedAppConfig {
            config,
            source: None,
        })
    }

    /// Parse and validate a configuration file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = Self::from_toml_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Parse and validate configuration from an in-memory TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config = toml::from_str::<AppConfig>(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.store.validate()?;
        self.lease.validate()?;
        Ok(())
    }
}

/// Remote object store connection settings.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Service URL template; `{account}` is substituted with the storage account.
    #[serde(default = "default_endpoint_template")]
    pub endpoint_template: String,
    /// Value sent in the `x-ms-version` header.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_request_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub request_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint_template: default_endpoint_template(),
            api_version: default_api_version(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.endpoint_template.contains("{account}") {
            return Err(anyhow!(
                "store.endpoint_template must contain an {{account}} placeholder (got {})",
                self.endpoint_template
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(anyhow!("store.request_timeout must be greater than zero"));
        }
        Ok(())
    }

    /// Render the service base URL for a storage account, without a trailing slash.
    pub fn service_url(&self, account: &str) -> String {
        self.endpoint_template
            .replace("{account}", account)
            .trim_end_matches('/')
            .to_owned()
    }
}

/// Strategy used to obtain bearer tokens for the store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialMode {
    /// Client secret when `ARM_*` variables are present, then a static token, then managed identity.
    #[default]
    Auto,
    ClientSecret,
    ManagedIdentity,
    Static,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    #[serde(default)]
    pub mode: CredentialMode,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_authority_host")]
    pub authority_host: String,
    /// Environment variable holding a pre-issued bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_managed_identity_endpoint")]
    pub managed_identity_endpoint: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            mode: CredentialMode::default(),
            tenant_id: None,
            client_id: None,
            client_secret: None,
            authority_host: default_authority_host(),
            token_env: default_token_env(),
            managed_identity_endpoint: default_managed_identity_endpoint(),
        }
    }
}

/// Defaults applied when a desired lease omits optional fields.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseDefaults {
    /// `-1` for infinite, otherwise 15..=60. Zero is treated as infinite.
    #[serde(default = "default_lease_duration")]
    pub duration_seconds: i32,
    #[serde(default = "default_payload")]
    pub default_payload: String,
    /// Renewal cadence for time-bounded leases; half the duration when unset.
    #[serde(default)]
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub renew_interval: Option<Duration>,
}

impl Default for LeaseDefaults {
    fn default() -> Self {
        Self {
            duration_seconds: default_lease_duration(),
            default_payload: default_payload(),
            renew_interval: None,
        }
    }
}

impl LeaseDefaults {
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.duration_seconds, -1 | 0 | 15..=60) {
            return Err(anyhow!(
                "lease.duration_seconds must be -1 or within 15..=60 (got {})",
                self.duration_seconds
            ));
        }
        if matches!(self.renew_interval, Some(interval) if interval.is_zero()) {
            return Err(anyhow!("lease.renew_interval must be greater than zero"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for the rolling JSON log file. Console-only when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            format: default_log_format(),
            file_prefix: None,
        }
    }
}
