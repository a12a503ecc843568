//! Configuration of a single workload invocation.
//!
//! The catalog URL is the only per-run input. Warehouse and namespace are fixed by the fixture
//! layout; the remaining knobs come from `MIGRATION_TEST__*` environment variables so the CLI
//! keeps exactly two positional arguments.

use std::fmt;
use std::time::Duration;

use figment::providers::Env;
use figment::{Figment, Provider};
use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::error::{Error, Result};
use crate::fixtures::{NAMESPACE, WAREHOUSE};

/// Prefix of every environment variable [`WorkloadConfig::from_env`] reads.
pub const ENV_PREFIX: &str = "MIGRATION_TEST__";

const DEFAULT_SOFT_DELETE_WAIT: Duration = Duration::from_secs(3);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const REDACTED: &str = "********";

/// How the workload authenticates against the catalog.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum Credentials {
    #[default]
    None,
    /// A bearer token issued out of band.
    Token(String),
    /// OAuth2 client-credentials grant. Without a token endpoint the catalog's own
    /// `v1/oauth/tokens` is used.
    ClientCredentials {
        client_id: String,
        client_secret: String,
        token_endpoint: Option<Url>,
        scope: Option<String>,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::None => write!(f, "None"),
            Credentials::Token(_) => write!(f, "Token({REDACTED})"),
            Credentials::ClientCredentials {
                client_id,
                token_endpoint,
                scope,
                ..
            } => f
                .debug_struct("ClientCredentials")
                .field("client_id", client_id)
                .field("client_secret", &REDACTED)
                .field("token_endpoint", &token_endpoint.as_ref().map(Url::as_str))
                .field("scope", scope)
                .finish(),
        }
    }
}

/// Object-store settings handed to the session's file IO. Unset fields fall back to whatever
/// the catalog vends.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct StorageOverrides {
    pub s3_endpoint: Option<String>,
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
    pub s3_region: Option<String>,
    pub s3_path_style_access: Option<bool>,
}

impl StorageOverrides {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl fmt::Debug for StorageOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageOverrides")
            .field("s3_endpoint", &self.s3_endpoint)
            .field("s3_access_key", &self.s3_access_key)
            .field("s3_secret_key", &self.s3_secret_key.as_ref().map(|_| REDACTED))
            .field("s3_region", &self.s3_region)
            .field("s3_path_style_access", &self.s3_path_style_access)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    pub catalog_url: Url,
    pub warehouse: String,
    pub namespace: String,
    /// How long `write_pre_migration` blocks after its drops so soft-delete expiry can run.
    pub soft_delete_wait: Duration,
    /// Upper bound for a single session operation. `None` waits as long as the catalog takes.
    pub operation_timeout: Option<Duration>,
    pub connect_timeout: Duration,
    pub credentials: Credentials,
    pub storage: StorageOverrides,
}

impl WorkloadConfig {
    pub fn builder(catalog_url: impl Into<String>) -> WorkloadConfigBuilder {
        WorkloadConfigBuilder::new(catalog_url)
    }

    /// Build a config for `catalog_url` from the process environment.
    pub fn from_env(catalog_url: impl Into<String>) -> Result<Self> {
        let figment = Figment::from(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(catalog_url, &figment)
    }

    /// Build a config for `catalog_url` from the settings `figment` provides, keyed by the
    /// lower-cased variable names without [`ENV_PREFIX`].
    pub fn from_figment(catalog_url: impl Into<String>, figment: &Figment) -> Result<Self> {
        let settings: EnvSettings = figment.extract().map_err(|e| {
            let origin = if e.path.is_empty() {
                "environment".to_string()
            } else {
                env_name(&e.path.join("__"))
            };
            Error::config(origin, e.kind.to_string())
        })?;
        for key in figment
            .data()
            .into_iter()
            .flat_map(|profiles| profiles.into_values())
            .flat_map(|dict| dict.into_keys())
            .filter(|key| !EnvSettings::KEYS.contains(&key.as_str()))
        {
            warn!(variable = %env_name(&key), "ignoring unknown setting");
        }
        settings.into_builder(catalog_url)?.build()
    }
}

/// The `MIGRATION_TEST__*` variables, as figment hands them over.
#[derive(Deserialize, Default)]
#[serde(default)]
struct EnvSettings {
    soft_delete_wait_seconds: Option<f64>,
    operation_timeout_seconds: Option<f64>,
    connect_timeout_seconds: Option<f64>,
    token: Option<String>,
    openid_client_id: Option<String>,
    openid_client_secret: Option<String>,
    openid_token_endpoint: Option<Url>,
    openid_scope: Option<String>,
    s3_endpoint: Option<String>,
    s3_access_key: Option<String>,
    s3_secret_key: Option<String>,
    s3_region: Option<String>,
    s3_path_style_access: Option<bool>,
}

impl EnvSettings {
    const KEYS: [&'static str; 13] = [
        "soft_delete_wait_seconds",
        "operation_timeout_seconds",
        "connect_timeout_seconds",
        "token",
        "openid_client_id",
        "openid_client_secret",
        "openid_token_endpoint",
        "openid_scope",
        "s3_endpoint",
        "s3_access_key",
        "s3_secret_key",
        "s3_region",
        "s3_path_style_access",
    ];

    fn into_builder(self, catalog_url: impl Into<String>) -> Result<WorkloadConfigBuilder> {
        let mut builder = WorkloadConfig::builder(catalog_url);
        if let Some(secs) = self.soft_delete_wait_seconds {
            builder = builder.soft_delete_wait(seconds("soft_delete_wait_seconds", secs)?);
        }
        if let Some(secs) = self.operation_timeout_seconds {
            builder = builder.operation_timeout(seconds("operation_timeout_seconds", secs)?);
        }
        if let Some(secs) = self.connect_timeout_seconds {
            builder = builder.connect_timeout(seconds("connect_timeout_seconds", secs)?);
        }

        let credentials = match (self.token, self.openid_client_id, self.openid_client_secret) {
            (None, None, None) => Credentials::None,
            (Some(token), None, None) => Credentials::Token(token),
            (None, Some(client_id), Some(client_secret)) => Credentials::ClientCredentials {
                client_id,
                client_secret,
                token_endpoint: self.openid_token_endpoint,
                scope: self.openid_scope,
            },
            (Some(_), _, _) => {
                return Err(Error::config(
                    "environment",
                    format!(
                        "{} and {} are mutually exclusive",
                        env_name("token"),
                        env_name("openid_client_id")
                    ),
                ))
            }
            (None, _, _) => {
                return Err(Error::config(
                    "environment",
                    format!(
                        "{} and {} have to be set together",
                        env_name("openid_client_id"),
                        env_name("openid_client_secret")
                    ),
                ))
            }
        };

        let storage = StorageOverrides {
            s3_endpoint: self.s3_endpoint,
            s3_access_key: self.s3_access_key,
            s3_secret_key: self.s3_secret_key,
            s3_region: self.s3_region,
            s3_path_style_access: self.s3_path_style_access,
        };
        Ok(builder.credentials(credentials).storage(storage))
    }
}

/// `MIGRATION_TEST__` followed by the upper-cased setting key.
fn env_name(key: &str) -> String {
    format!("{ENV_PREFIX}{}", key.to_ascii_uppercase())
}

fn seconds(key: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::config(env_name(key), format!("{secs}: {e}")))
}

pub struct WorkloadConfigBuilder {
    catalog_url: String,
    soft_delete_wait: Duration,
    operation_timeout: Option<Duration>,
    connect_timeout: Duration,
    credentials: Credentials,
    storage: StorageOverrides,
}

impl WorkloadConfigBuilder {
    pub fn new(catalog_url: impl Into<String>) -> Self {
        Self {
            catalog_url: catalog_url.into(),
            soft_delete_wait: DEFAULT_SOFT_DELETE_WAIT,
            operation_timeout: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            credentials: Credentials::None,
            storage: StorageOverrides::default(),
        }
    }

    pub fn soft_delete_wait(mut self, wait: Duration) -> Self {
        self.soft_delete_wait = wait;
        self
    }

    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn storage(mut self, storage: StorageOverrides) -> Self {
        self.storage = storage;
        self
    }

    pub fn build(self) -> Result<WorkloadConfig> {
        let catalog_url = Url::parse(&self.catalog_url)
            .map_err(|e| Error::config("catalog url", format!("{:?}: {e}", self.catalog_url)))?;
        if catalog_url.cannot_be_a_base() {
            return Err(Error::config(
                "catalog url",
                format!("{catalog_url} cannot be used as a base URL"),
            ));
        }

        Ok(WorkloadConfig {
            catalog_url,
            warehouse: WAREHOUSE.to_string(),
            namespace: NAMESPACE.to_string(),
            soft_delete_wait: self.soft_delete_wait,
            operation_timeout: self.operation_timeout,
            connect_timeout: self.connect_timeout,
            credentials: self.credentials,
            storage: self.storage,
        })
    }
}
