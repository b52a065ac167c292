//! HTTP client abstraction layer for the outbound integrations
//!
//! The redemption client and the Telegram client both talk JSON over HTTP.
//! Going through this trait instead of `reqwest` directly lets tests feed
//! canned replies (status + body) without any network, and keeps the
//! classification code independent of the transport.
//!
//! The default implementation wraps reqwest with a bounded per-request
//! timeout.
//!
//! # Example Usage:
//! ``
//! use crate::http::{HttpClient, DefaultHttpClient};
//!
//! let http: Arc<dyn HttpClient> = Arc::new(DefaultHttpClient::new(Duration::from_secs(30))?);
//! let reply = http.post_json(url, &headers, &body).await?;
//! if reply.is_success() { ... }
//! ``

use std::collections::BTreeMap;
use std::time::Duration;
use async_trait::async_trait;
use reqwest;
use crate::Error;

/// Status code and raw body of a completed request. A non-2xx status is
/// still a reply, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A generic trait for making HTTP requests.
///
/// `Err` is reserved for transport failures: DNS, connect, TLS, timeout.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &serde_json::Value,
    ) -> Result<HttpReply, Error>;
}

#[derive(Clone)]
pub struct DefaultHttpClient {
    client: reqwest::Client,
}

impl DefaultHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Platform(format!("Failed to build reqwest client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for DefaultHttpClient {
    async fn post_json(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &serde_json::Value,
    ) -> Result<HttpReply, Error> {
        let mut request = self.client.post(url).json(body);
        for (key, value) in headers {
            request = request.header(key.as_str(), value.as_str());
        }
        // The URL can carry a secret (Telegram puts the token in the path).
        let response = request.send().await.map_err(|e| Error::Http(e.without_url()))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| Error::Http(e.without_url()))?;
        Ok(HttpReply { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transport_errors_do_not_echo_the_url() {
        let http = DefaultHttpClient::new(Duration::from_secs(2)).unwrap();
        let err = http
            .post_json(
                "http://127.0.0.1:1/bot123456:SUPERSECRET/getUpdates",
                &BTreeMap::new(),
                &serde_json::json!({}),
            )
            .await
            .unwrap_err();
        let shown = format!("{err} {err:?}");
        assert!(!shown.contains("SUPERSECRET"), "leaked: {shown}");
        assert!(err.is_transient());
    }
}
