use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use flowpilot_core::{ConnectorClient, Error, Result};
use serde_json::Value;

/// Base URL and auth header name for a named connector provider (e.g.
/// `"github"`, `"jira"`, `"stripe"`). Actions are appended to `base_url` as
/// a path segment.
#[derive(Debug, Clone)]
pub struct ProviderEndpoint {
    pub base_url: String,
    pub auth_header: String,
}

impl ProviderEndpoint {
    pub fn new(base_url: impl Into<String>, auth_header: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), auth_header: auth_header.into() }
    }
}

/// Generic HTTP `ConnectorClient`. Providers and the credentials behind each
/// `credential_ref` are registered up front; `invoke` resolves both and
/// issues a single POST per call.
#[derive(Clone, Default)]
pub struct HttpConnectorClient {
    client: reqwest::Client,
    providers: Arc<DashMap<String, ProviderEndpoint>>,
    credentials: Arc<DashMap<String, String>>,
}

impl HttpConnectorClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            providers: Arc::new(DashMap::new()),
            credentials: Arc::new(DashMap::new()),
        }
    }

    pub fn register_provider(&self, name: impl Into<String>, endpoint: ProviderEndpoint) {
        self.providers.insert(name.into(), endpoint);
    }

    pub fn register_credential(&self, credential_ref: impl Into<String>, secret: impl Into<String>) {
        self.credentials.insert(credential_ref.into(), secret.into());
    }
}

#[async_trait]
impl ConnectorClient for HttpConnectorClient {
    async fn invoke(&self, provider: &str, action: &str, credential_ref: &str, payload: &Value) -> Result<Value> {
        let endpoint = self
            .providers
            .get(provider)
            .ok_or_else(|| Error::not_found(format!("connector provider {provider}")))?
            .clone();
        let secret = self
            .credentials
            .get(credential_ref)
            .ok_or_else(|| Error::not_found(format!("connector credential {credential_ref}")))?
            .clone();

        let url = format!("{}/{}", endpoint.base_url.trim_end_matches('/'), action);
        let response = self
            .client
            .post(&url)
            .header(endpoint.auth_header, secret)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::upstream(provider, format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upstream(provider, format!("status {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| Error::upstream(provider, format!("invalid response body: {e}")))
    }
}

/// Deterministic `ConnectorClient` that never leaves the process. Echoes the
/// payload back tagged with the resolved provider/action/credential.
#[derive(Debug, Clone, Default)]
pub struct FakeConnectorClient;

impl FakeConnectorClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConnectorClient for FakeConnectorClient {
    async fn invoke(&self, provider: &str, action: &str, credential_ref: &str, payload: &Value) -> Result<Value> {
        Ok(serde_json::json!({
            "provider": provider,
            "action": action,
            "credential_ref": credential_ref,
            "echo": payload,
        }))
    }
}
