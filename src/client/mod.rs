//! Azure Resource Manager client.
//!
//! [`ArmTransport`] is the seam between the resource modules and the remote
//! API: plain JSON verbs keyed by resource path and API version, with every
//! long-running operation awaited before the call returns. [`ArmClient`] is
//! the `reqwest` implementation; tests substitute
//! [`crate::testing::FakeArm`].

pub mod auth;
pub mod typed;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::ProviderError;
use crate::poller::{Refresh, StateChangeConf};

pub use auth::{ClientSecretCredential, StaticToken, TokenCredential};
pub use typed::TypedClient;

/// API version for the single server family.
pub const SINGLE_SERVER_API_VERSION: &str = "2017-12-01";

/// API version for the flexible server family.
pub const FLEXIBLE_SERVER_API_VERSION: &str = "2024-08-01";

const AZURE_ASYNC_OPERATION: &str = "azure-asyncoperation";

/// JSON verbs against Resource Manager.
///
/// Paths are resource IDs (`/subscriptions/...`). Mutating calls return once
/// any long-running operation they started has finished.
#[async_trait]
pub trait ArmTransport: Send + Sync + std::fmt::Debug {
    /// Fetch a resource; `None` when it does not exist.
    async fn get(&self, path: &str, api_version: &str) -> Result<Option<Value>, ProviderError>;

    /// List a collection, following `nextLink` until exhausted.
    async fn list(&self, path: &str, api_version: &str) -> Result<Vec<Value>, ProviderError>;

    /// Create or replace a resource.
    async fn put(
        &self,
        path: &str,
        api_version: &str,
        body: &Value,
    ) -> Result<Option<Value>, ProviderError>;

    /// Partially update a resource.
    async fn patch(
        &self,
        path: &str,
        api_version: &str,
        body: &Value,
    ) -> Result<Option<Value>, ProviderError>;

    /// Invoke an action such as `restart`.
    async fn post(
        &self,
        path: &str,
        api_version: &str,
        body: &Value,
    ) -> Result<Option<Value>, ProviderError>;

    /// Delete a resource. A resource that is already gone is not an error.
    async fn delete(&self, path: &str, api_version: &str) -> Result<(), ProviderError>;
}

#[derive(Debug, Default, Deserialize)]
struct ArmErrorResponse {
    #[serde(default)]
    error: Option<ArmErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
struct ArmErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<ArmErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    #[serde(default)]
    value: Vec<Value>,
    #[serde(default)]
    next_link: Option<String>,
}

enum PollTarget {
    AsyncOperation(Url),
    Location(Url),
}

/// `reqwest`-backed Resource Manager client.
#[derive(Debug, Clone)]
pub struct ArmClient {
    http: reqwest::Client,
    endpoint: Url,
    scope: String,
    credential: Arc<dyn TokenCredential>,
    poll_interval: Duration,
    operation_timeout: Duration,
}

impl ArmClient {
    /// Create a client for `endpoint` authenticating with `credential`.
    pub fn new(endpoint: Url, credential: Arc<dyn TokenCredential>) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("azurerm-postgresql/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_http(http, endpoint, credential))
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_http(
        http: reqwest::Client,
        endpoint: Url,
        credential: Arc<dyn TokenCredential>,
    ) -> Self {
        let scope = format!("{}/.default", endpoint.as_str().trim_end_matches('/'));
        Self {
            http,
            endpoint,
            scope,
            credential,
            poll_interval: Duration::from_secs(10),
            operation_timeout: Duration::from_secs(3 * 60 * 60),
        }
    }

    /// Poll long-running operations at this interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Give up on a long-running operation after this long.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    fn url(&self, path: &str, api_version: &str) -> Result<Url, ProviderError> {
        let mut url = self
            .endpoint
            .join(path.trim_start_matches('/'))
            .map_err(|e| ProviderError::InvalidRequest(format!("invalid path {path:?}: {e}")))?;
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, ProviderError> {
        debug!("{method} {url}");
        let token = self.credential.token(&self.scope).await?;
        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(token.expose_secret());
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    async fn error_from(resp: reqwest::Response) -> ProviderError {
        let status = resp.status().as_u16();
        let raw = resp.text().await.unwrap_or_default();
        match serde_json::from_str::<ArmErrorResponse>(&raw) {
            Ok(ArmErrorResponse {
                error: Some(detail),
            }) => ProviderError::from_status(status, &detail.code, &detail.message),
            _ => ProviderError::from_status(status, "", &raw),
        }
    }

    async fn body_of(resp: reqwest::Response) -> Result<Option<Value>, ProviderError> {
        let raw = resp.text().await?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn poll_target(headers: &HeaderMap) -> Option<PollTarget> {
        let header = |name| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| Url::parse(v).ok())
        };
        header(AZURE_ASYNC_OPERATION)
            .map(PollTarget::AsyncOperation)
            .or_else(|| header(LOCATION.as_str()).map(PollTarget::Location))
    }

    /// Send a mutating request and wait for any operation it started.
    async fn mutate(
        &self,
        method: Method,
        path: &str,
        api_version: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>, ProviderError> {
        let url = self.url(path, api_version)?;
        let resp = self.send(method.clone(), url, body).await?;
        let status = resp.status();

        if method == Method::DELETE && status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::error_from(resp).await);
        }

        let target = match status {
            StatusCode::CREATED | StatusCode::ACCEPTED => Self::poll_target(resp.headers()),
            _ => None,
        };
        let initial = Self::body_of(resp).await?;
        match target {
            None => Ok(initial),
            Some(target) => {
                let result = self.await_operation(target).await?;
                Ok(result.or(initial))
            },
        }
    }

    /// Poll an operation until it reports success.
    async fn await_operation(&self, target: PollTarget) -> Result<Option<Value>, ProviderError> {
        let result: Mutex<Option<Value>> = Mutex::new(None);
        let conf = StateChangeConf::new(&["InProgress"], &["Succeeded"])
            .with_delay(self.poll_interval)
            .with_min_interval(self.poll_interval)
            .with_timeout(self.operation_timeout);

        let (target, captured) = (&target, &result);
        conf.wait_for_state(move || async move {
            match target {
                PollTarget::AsyncOperation(url) => self.poll_async_operation(url.clone()).await,
                PollTarget::Location(url) => {
                    let (state, body) = self.poll_location(url.clone()).await?;
                    if body.is_some() {
                        *captured.lock().unwrap_or_else(|e| e.into_inner()) = body;
                    }
                    Ok(state)
                },
            }
        })
        .await?;

        Ok(result.into_inner().unwrap_or_else(|e| e.into_inner()))
    }

    async fn poll_async_operation(&self, url: Url) -> Result<Refresh, ProviderError> {
        let resp = self.send(Method::GET, url, None).await?;
        if !resp.status().is_success() {
            return Err(Self::error_from(resp).await);
        }
        let status: OperationStatus = serde_json::from_str(&resp.text().await?)?;
        match status.status.as_str() {
            "Succeeded" => Ok(Refresh::state("Succeeded")),
            "Failed" | "Canceled" | "Cancelled" => {
                let detail = status.error.unwrap_or_default();
                warn!(status = %status.status, code = %detail.code, "operation did not succeed");
                Err(ProviderError::Sdk(format!(
                    "operation {}: {}: {}",
                    status.status, detail.code, detail.message
                )))
            },
            _ => Ok(Refresh::state("InProgress")),
        }
    }

    async fn poll_location(&self, url: Url) -> Result<(Refresh, Option<Value>), ProviderError> {
        let resp = self.send(Method::GET, url, None).await?;
        match resp.status() {
            StatusCode::ACCEPTED => Ok((Refresh::state("InProgress"), None)),
            status if status.is_success() => {
                Ok((Refresh::state("Succeeded"), Self::body_of(resp).await?))
            },
            _ => Err(Self::error_from(resp).await),
        }
    }
}

#[async_trait]
impl ArmTransport for ArmClient {
    async fn get(&self, path: &str, api_version: &str) -> Result<Option<Value>, ProviderError> {
        let url = self.url(path, api_version)?;
        let resp = self.send(Method::GET, url, None).await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Self::body_of(resp).await,
            _ => Err(Self::error_from(resp).await),
        }
    }

    async fn list(&self, path: &str, api_version: &str) -> Result<Vec<Value>, ProviderError> {
        let mut items = Vec::new();
        let mut next = Some(self.url(path, api_version)?);

        while let Some(url) = next.take() {
            let resp = self.send(Method::GET, url, None).await?;
            if !resp.status().is_success() {
                return Err(Self::error_from(resp).await);
            }
            let page: ListPage = serde_json::from_str(&resp.text().await?)?;
            items.extend(page.value);
            next = match page.next_link.filter(|l| !l.is_empty()) {
                Some(link) => Some(Url::parse(&link).map_err(|e| {
                    ProviderError::Sdk(format!("invalid nextLink {link:?}: {e}"))
                })?),
                None => None,
            };
        }
        Ok(items)
    }

    async fn put(
        &self,
        path: &str,
        api_version: &str,
        body: &Value,
    ) -> Result<Option<Value>, ProviderError> {
        self.mutate(Method::PUT, path, api_version, Some(body)).await
    }

    async fn patch(
        &self,
        path: &str,
        api_version: &str,
        body: &Value,
    ) -> Result<Option<Value>, ProviderError> {
        self.mutate(Method::PATCH, path, api_version, Some(body)).await
    }

    async fn post(
        &self,
        path: &str,
        api_version: &str,
        body: &Value,
    ) -> Result<Option<Value>, ProviderError> {
        self.mutate(Method::POST, path, api_version, Some(body)).await
    }

    async fn delete(&self, path: &str, api_version: &str) -> Result<(), ProviderError> {
        self.mutate(Method::DELETE, path, api_version, None)
            .await
            .map(drop)
    }
}
