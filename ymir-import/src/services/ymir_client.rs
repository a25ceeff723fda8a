//! ymir server API client
//!
//! Only the two endpoints the importer needs: the liveness probe and the
//! per-model import.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use ymir_common::model::Model;

const USER_AGENT: &str = concat!("ymir-import/", env!("CARGO_PKG_VERSION"));
const PING_TIMEOUT_SECS: u64 = 5;
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server answered with a non-success status
    #[error("API error {0}: {1}")]
    ApiError(u16, String),
}

/// Shape of the import response; only the id is of interest
#[derive(Debug, Deserialize)]
struct ImportResponse {
    #[serde(rename = "_id", default)]
    id: Option<String>,
}

/// HTTP client for a ymir server
#[derive(Debug, Clone)]
pub struct YmirClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl YmirClient {
    /// Create a client for `host` (`hostname:port` or a full URL)
    pub fn new(host: &str) -> Result<Self, ClientError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ClientError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url(host),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /v1/ping`; true only for HTTP 200
    pub async fn ping(&self) -> bool {
        let url = format!("{}/v1/ping", self.base_url);
        tracing::debug!(url = %url, "Probing ymir server");

        match self
            .http_client
            .get(&url)
            .timeout(Duration::from_secs(PING_TIMEOUT_SECS))
            .send()
            .await
        {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(e) => {
                tracing::info!("Connection error: {}", e);
                false
            }
        }
    }

    /// `POST /v1/model/import`; returns the server-assigned id when echoed back
    pub async fn import_model(&self, model: &Model) -> Result<Option<String>, ClientError> {
        let url = format!("{}/v1/model/import", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .json(model)
            .send()
            .await
            .map_err(|e| ClientError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(ClientError::ApiError(status.as_u16(), body));
        }

        tracing::debug!(model = %model.display_name, response = %body, "Model imported");

        Ok(serde_json::from_str::<ImportResponse>(&body)
            .ok()
            .and_then(|r| r.id)
            .filter(|id| !id.is_empty()))
    }
}

/// Normalize a host into a base URL without trailing slash
///
/// A wildcard bind address (`0.0.0.0`) is contacted on loopback.
pub fn base_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    let (scheme, rest) = match host.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("http", host),
    };

    let rest = match rest.strip_prefix("0.0.0.0") {
        Some(port) => format!("127.0.0.1{}", port),
        None => rest.to_string(),
    };

    format!("{}://{}", scheme, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalization() {
        assert_eq!(base_url("localhost:8081"), "http://localhost:8081");
        assert_eq!(base_url("0.0.0.0:8081"), "http://127.0.0.1:8081");
        assert_eq!(base_url("https://ymir.lan/"), "https://ymir.lan");
        assert_eq!(base_url(" printhost:9000 "), "http://printhost:9000");
    }

    #[test]
    fn test_client_creation() {
        let client = YmirClient::new("localhost:8081").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8081");
    }

    #[tokio::test]
    async fn test_ping_unreachable_host_is_false() {
        // Port 9 (discard) is essentially never served on loopback
        let client = YmirClient::new("127.0.0.1:9").unwrap();
        assert!(!client.ping().await);
    }
}
