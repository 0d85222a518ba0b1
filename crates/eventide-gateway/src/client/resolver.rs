//! Gateway URL lookup
//!
//! The gateway URL is fetched once over REST and cached in the session store;
//! later dials reuse it.

use async_trait::async_trait;
use eventide_common::ClientConfig;
use serde::Deserialize;

use crate::error::{GatewayError, GatewayResult};

/// Query string selecting the protocol version and JSON encoding
pub const GATEWAY_QUERY: &str = "v=9&encoding=json";

/// Append the version/encoding query unless the URL already carries one
pub(crate) fn with_gateway_query(url: &str) -> String {
    if url.contains('?') {
        url.to_string()
    } else {
        format!("{}?{GATEWAY_QUERY}", url.trim_end_matches('/'))
    }
}

/// Source of the URL to dial when no cached one exists
#[async_trait]
pub trait GatewayUrlResolver: Send + Sync {
    /// Resolve the gateway URL, including its query string
    async fn resolve(&self) -> GatewayResult<String>;
}

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    url: String,
}

/// `GET {api_base}/gateway` with the bot token
#[derive(Debug, Clone)]
pub struct HttpGatewayResolver {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HttpGatewayResolver {
    pub fn new(config: &ClientConfig) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/gateway", config.api_base),
            token: config.token.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GatewayUrlResolver for HttpGatewayResolver {
    async fn resolve(&self) -> GatewayResult<String> {
        tracing::debug!(endpoint = %self.endpoint, "Looking up gateway URL");

        let response = self
            .http
            .get(&self.endpoint)
            .header("Authorization", &self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "Gateway lookup rejected");
            return Err(GatewayError::Rest {
                status: status.as_u16(),
                body,
            });
        }

        let GatewayResponse { url } = response.json().await?;
        let url = with_gateway_query(&url);
        tracing::info!(url = %url, "Resolved gateway URL");
        Ok(url)
    }
}

/// A fixed URL, used when the configuration names one
#[derive(Debug, Clone)]
pub struct StaticGatewayUrl(String);

impl StaticGatewayUrl {
    pub fn new(url: impl AsRef<str>) -> Self {
        Self(with_gateway_query(url.as_ref()))
    }
}

#[async_trait]
impl GatewayUrlResolver for StaticGatewayUrl {
    async fn resolve(&self) -> GatewayResult<String> {
        Ok(self.0.clone())
    }
}
