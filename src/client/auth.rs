//! Bearer-token credentials for Resource Manager.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use crate::error::ProviderError;

/// Refresh cached tokens this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(5 * 60);

/// A source of bearer tokens.
#[async_trait]
pub trait TokenCredential: Send + Sync + fmt::Debug {
    /// Return a token valid for `scope`, e.g. `https://management.azure.com/.default`.
    async fn token(&self, scope: &str) -> Result<SecretString, ProviderError>;
}

/// A fixed, pre-acquired token.
#[derive(Debug, Clone)]
pub struct StaticToken {
    token: SecretString,
}

impl StaticToken {
    /// Wrap an existing token.
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenCredential for StaticToken {
    async fn token(&self, _scope: &str) -> Result<SecretString, ProviderError> {
        Ok(self.token.clone())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

struct CachedToken {
    scope: String,
    token: SecretString,
    refresh_at: Instant,
}

/// OAuth2 client-credentials flow against Microsoft Entra ID.
///
/// Tokens are cached per scope until shortly before they expire.
pub struct ClientSecretCredential {
    http: reqwest::Client,
    token_url: Url,
    client_id: String,
    client_secret: SecretString,
    cache: Mutex<Option<CachedToken>>,
}

impl fmt::Debug for ClientSecretCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecretCredential")
            .field("token_url", &self.token_url.as_str())
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl ClientSecretCredential {
    /// Create a credential for `tenant_id` at `authority`.
    pub fn new(
        authority: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: SecretString,
    ) -> Result<Self, ProviderError> {
        let authority = Url::parse(authority).map_err(|e| {
            ProviderError::Configuration(format!("invalid authority {authority:?}: {e}"))
        })?;
        let token_url = authority
            .join(&format!("{tenant_id}/oauth2/v2.0/token"))
            .map_err(|e| ProviderError::Configuration(format!("invalid tenant {tenant_id:?}: {e}")))?;

        Ok(Self {
            http: reqwest::Client::new(),
            token_url,
            client_id: client_id.to_string(),
            client_secret,
            cache: Mutex::new(None),
        })
    }

    async fn request_token(&self, scope: &str) -> Result<(SecretString, Duration), ProviderError> {
        debug!(token_url = %self.token_url, scope, "requesting token");
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("scope", scope),
        ];
        let resp = self
            .http
            .post(self.token_url.clone())
            .form(&form)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            let detail = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| format!("{}: {}", e.error, e.error_description))
                .unwrap_or(body);
            return Err(ProviderError::PermissionDenied(format!(
                "acquiring token for client {:?}: status {}: {}",
                self.client_id,
                status.as_u16(),
                detail
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)?;
        let lifetime = match parsed.expires_in {
            Some(serde_json::Value::Number(n)) => n.as_u64(),
            Some(serde_json::Value::String(s)) => s.parse().ok(),
            _ => None,
        }
        .unwrap_or(3600);

        Ok((
            SecretString::from(parsed.access_token),
            Duration::from_secs(lifetime),
        ))
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn token(&self, scope: &str) -> Result<SecretString, ProviderError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.scope == scope && Instant::now() < cached.refresh_at {
                return Ok(cached.token.clone());
            }
        }

        let (token, lifetime) = self.request_token(scope).await?;
        *cache = Some(CachedToken {
            scope: scope.to_string(),
            token: token.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
        });
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_static_token() {
        let credential = StaticToken::new(SecretString::from("abc".to_string()));
        let token = credential.token("https://management.azure.com/.default").await.unwrap();
        assert_eq!(token.expose_secret(), "abc");
    }

    #[tokio::test]
    async fn test_client_secret_credential_caches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant1/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token_type": "Bearer",
                "expires_in": 3599,
                "access_token": "token-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let credential = ClientSecretCredential::new(
            &format!("{}/", server.uri()),
            "tenant1",
            "client1",
            SecretString::from("secret".to_string()),
        )
        .unwrap();

        let scope = "https://management.azure.com/.default";
        assert_eq!(credential.token(scope).await.unwrap().expose_secret(), "token-1");
        assert_eq!(credential.token(scope).await.unwrap().expose_secret(), "token-1");
    }

    #[tokio::test]
    async fn test_client_secret_credential_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant1/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_client",
                "error_description": "bad secret"
            })))
            .mount(&server)
            .await;

        let credential = ClientSecretCredential::new(
            &format!("{}/", server.uri()),
            "tenant1",
            "client1",
            SecretString::from("wrong".to_string()),
        )
        .unwrap();

        let err = credential.token("scope").await.unwrap_err();
        assert!(matches!(err, ProviderError::PermissionDenied(_)));
        assert!(err.message().contains("invalid_client"));
    }

    #[test]
    fn test_debug_hides_secret() {
        let credential = ClientSecretCredential::new(
            "https://login.microsoftonline.com/",
            "tenant1",
            "client1",
            SecretString::from("hunter2".to_string()),
        )
        .unwrap();
        let debug = format!("{credential:?}");
        assert!(debug.contains("client1"));
        assert!(!debug.contains("hunter2"));
    }
}
