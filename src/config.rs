//! Provider configuration.
//!
//! Every setting can be supplied in the provider block or through the usual
//! `ARM_*` environment variables; explicit configuration wins.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::client::auth::{ClientSecretCredential, StaticToken, TokenCredential};
use crate::client::ArmClient;
use crate::error::ProviderError;
use crate::schema::{Attribute, Diagnostic, Schema, Validator};

/// The Azure cloud to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudEnvironment {
    /// Azure public cloud.
    #[default]
    Public,
    /// Azure US Government.
    UsGovernment,
    /// Azure China (21Vianet).
    China,
}

impl CloudEnvironment {
    /// The Resource Manager endpoint for this cloud.
    pub fn resource_manager_endpoint(self) -> &'static str {
        match self {
            Self::Public => "https://management.azure.com/",
            Self::UsGovernment => "https://management.usgovcloudapi.net/",
            Self::China => "https://management.chinacloudapi.cn/",
        }
    }

    /// The Microsoft Entra ID authority for this cloud.
    pub fn active_directory_endpoint(self) -> &'static str {
        match self {
            Self::Public => "https://login.microsoftonline.com/",
            Self::UsGovernment => "https://login.microsoftonline.us/",
            Self::China => "https://login.chinacloudapi.cn/",
        }
    }
}

impl FromStr for CloudEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "usgovernment" => Ok(Self::UsGovernment),
            "china" => Ok(Self::China),
            other => Err(format!(
                "unknown environment {other:?}, expected one of public, usgovernment, china"
            )),
        }
    }
}

impl fmt::Display for CloudEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Public => "public",
            Self::UsGovernment => "usgovernment",
            Self::China => "china",
        })
    }
}

/// How the provider authenticates against Resource Manager.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// A pre-acquired bearer token.
    AccessToken(SecretString),
    /// OAuth2 client credentials for a service principal.
    ClientSecret {
        /// Directory (tenant) ID.
        tenant_id: String,
        /// Application (client) ID.
        client_id: String,
        /// Client secret.
        client_secret: SecretString,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawProviderConfig {
    subscription_id: Option<String>,
    tenant_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    access_token: Option<String>,
    environment: Option<String>,
    resource_manager_endpoint: Option<String>,
    poll_interval_seconds: Option<u64>,
}

/// Resolved provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Subscription every resource lives in.
    pub subscription_id: String,
    /// Credentials used for every request.
    pub credentials: Credentials,
    /// The selected cloud.
    pub environment: CloudEnvironment,
    /// Resource Manager endpoint, possibly overridden.
    pub resource_manager_endpoint: Url,
    /// Overrides the minimum interval of every wait.
    pub poll_interval: Option<Duration>,
}

impl ProviderConfig {
    /// Resolve configuration from the provider block and the process environment.
    pub fn from_value(config: &Value) -> Result<Self, Vec<Diagnostic>> {
        Self::resolve(config, |key| std::env::var(key).ok())
    }

    /// Resolve configuration, reading fallbacks through `env`.
    pub fn resolve(
        config: &Value,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, Vec<Diagnostic>> {
        let raw: RawProviderConfig = match config {
            Value::Null => RawProviderConfig::default(),
            other => serde_json::from_value(other.clone()).map_err(|e| {
                vec![Diagnostic::error("Invalid provider configuration").with_detail(e.to_string())]
            })?,
        };

        let pick = |value: Option<String>, key: &str| {
            value
                .filter(|v| !v.is_empty())
                .or_else(|| env(key).filter(|v| !v.is_empty()))
        };

        let mut diagnostics = Vec::new();

        let subscription_id = pick(raw.subscription_id, "ARM_SUBSCRIPTION_ID");
        if subscription_id.is_none() {
            diagnostics.push(
                Diagnostic::error("Missing subscription_id")
                    .with_detail("set subscription_id or the ARM_SUBSCRIPTION_ID environment variable")
                    .with_attribute("subscription_id"),
            );
        }

        let environment = match pick(raw.environment, "ARM_ENVIRONMENT") {
            None => CloudEnvironment::default(),
            Some(name) => match name.parse() {
                Ok(env) => env,
                Err(e) => {
                    diagnostics.push(
                        Diagnostic::error("Invalid environment")
                            .with_detail(e)
                            .with_attribute("environment"),
                    );
                    CloudEnvironment::default()
                },
            },
        };

        let endpoint = pick(raw.resource_manager_endpoint, "ARM_RESOURCE_MANAGER_ENDPOINT")
            .unwrap_or_else(|| environment.resource_manager_endpoint().to_string());
        let resource_manager_endpoint = match Url::parse(&endpoint) {
            Ok(url) => Some(url),
            Err(e) => {
                diagnostics.push(
                    Diagnostic::error("Invalid resource_manager_endpoint")
                        .with_detail(e.to_string())
                        .with_attribute("resource_manager_endpoint"),
                );
                None
            },
        };

        let access_token = pick(raw.access_token, "ARM_ACCESS_TOKEN");
        let tenant_id = pick(raw.tenant_id, "ARM_TENANT_ID");
        let client_id = pick(raw.client_id, "ARM_CLIENT_ID");
        let client_secret = pick(raw.client_secret, "ARM_CLIENT_SECRET");

        let credentials = match (access_token, tenant_id, client_id, client_secret) {
            (Some(token), _, _, _) => Some(Credentials::AccessToken(SecretString::from(token))),
            (None, Some(tenant_id), Some(client_id), Some(secret)) => Some(Credentials::ClientSecret {
                tenant_id,
                client_id,
                client_secret: SecretString::from(secret),
            }),
            _ => {
                diagnostics.push(
                    Diagnostic::error("Missing credentials").with_detail(
                        "set access_token (ARM_ACCESS_TOKEN) or all of tenant_id, client_id and \
                         client_secret (ARM_TENANT_ID, ARM_CLIENT_ID, ARM_CLIENT_SECRET)",
                    ),
                );
                None
            },
        };

        if raw.poll_interval_seconds == Some(0) {
            diagnostics.push(
                Diagnostic::error("Invalid poll_interval_seconds")
                    .with_detail("poll_interval_seconds must be at least 1")
                    .with_attribute("poll_interval_seconds"),
            );
        }

        match (subscription_id, credentials, resource_manager_endpoint) {
            (Some(subscription_id), Some(credentials), Some(resource_manager_endpoint))
                if diagnostics.is_empty() =>
            {
                Ok(Self {
                    subscription_id,
                    credentials,
                    environment,
                    resource_manager_endpoint,
                    poll_interval: raw.poll_interval_seconds.map(Duration::from_secs),
                })
            },
            _ => Err(diagnostics),
        }
    }

    /// Schema of the provider block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_attribute(
                "subscription_id",
                Attribute::optional_string()
                    .with_description("Subscription ID; falls back to ARM_SUBSCRIPTION_ID"),
            )
            .with_attribute("tenant_id", Attribute::optional_string())
            .with_attribute("client_id", Attribute::optional_string())
            .with_attribute("client_secret", Attribute::optional_string().sensitive())
            .with_attribute("access_token", Attribute::optional_string().sensitive())
            .with_attribute(
                "environment",
                Attribute::optional_string()
                    .with_validator(Validator::one_of(&["public", "usgovernment", "china"])),
            )
            .with_attribute("resource_manager_endpoint", Attribute::optional_string())
            .with_attribute(
                "poll_interval_seconds",
                Attribute::optional_int64().with_validator(Validator::IntAtLeast { min: 1 }),
            )
    }

    /// Build the credential described by this configuration.
    pub fn credential(&self) -> Result<Arc<dyn TokenCredential>, ProviderError> {
        Ok(match &self.credentials {
            Credentials::AccessToken(token) => Arc::new(StaticToken::new(token.clone())),
            Credentials::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            } => Arc::new(ClientSecretCredential::new(
                self.environment.active_directory_endpoint(),
                tenant_id,
                client_id,
                client_secret.clone(),
            )?),
        })
    }

    /// Build the Resource Manager client for this configuration.
    pub fn build_client(&self) -> Result<ArmClient, ProviderError> {
        let mut client = ArmClient::new(self.resource_manager_endpoint.clone(), self.credential()?)?;
        if let Some(interval) = self.poll_interval {
            client = client.with_poll_interval(interval);
        }
        Ok(client)
    }
}
