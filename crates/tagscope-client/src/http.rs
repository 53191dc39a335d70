use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tagscope_models::config::TagscopeConfig;
use tagscope_models::remote::{RemoteOperation, RemoteRequest};
use tracing::debug;

use crate::credential::CredentialProvider;
use crate::error::ClientError;
use crate::transport::{Transport, TransportError};

/// JSON-over-HTTPS transport. reqwest keeps idle connections alive per host, so
/// permits handed out by the pool map onto reused connections.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    endpoints: BTreeMap<String, String>,
    credential: Arc<dyn CredentialProvider>,
}

impl HttpTransport {
    pub fn new(
        config: &TagscopeConfig,
        credential: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.client.pool_size)
            .connect_timeout(config.client.request_timeout())
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.historian.base_url.trim_end_matches('/').to_string(),
            endpoints: config.historian.endpoints.clone(),
            credential,
        })
    }

    fn url(&self, operation: RemoteOperation) -> String {
        let path = self
            .endpoints
            .get(operation.name())
            .map(String::as_str)
            .unwrap_or_else(|| operation.default_path());
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &RemoteRequest, timeout: Duration) -> Result<Value, TransportError> {
        let token = self.credential.token().map_err(TransportError::Credential)?;
        let url = self.url(request.operation);
        debug!(operation = %request.operation, url = %url, "Sending historian request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .timeout(timeout)
            .json(&request.body())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(timeout)
                } else {
                    TransportError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.credential.invalidate();
        }
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                code: status.as_u16(),
                body: body.chars().take(512).collect(),
                retry_after,
            });
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(timeout)
            } else {
                TransportError::Decode(e.to_string())
            }
        })
    }
}
