use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// A single JSON round trip. `Ok(None)` means the server answered 2xx with
/// an empty body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(
        &self,
        method: Method,
        url: &str,
        headers: &HeaderMap,
        payload: Option<&Value>,
    ) -> Result<Option<Value>, TransportError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network {
                url: String::new(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn request(
        &self,
        method: Method,
        url: &str,
        headers: &HeaderMap,
        payload: Option<&Value>,
    ) -> Result<Option<Value>, TransportError> {
        let mut headers = headers.clone();
        let mut request = self.client.request(method.clone(), url);

        if let Some(payload) = payload {
            // Serializing a Value cannot fail.
            let body = serde_json::to_vec(payload).unwrap_or_default();
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            request = request.body(body);
        }

        debug!(%method, url, "sending request");
        let response = request
            .headers(headers)
            .send()
            .await
            .map_err(|e| network_error(url, e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| network_error(url, e))?;
        let text = text.trim();
        debug!(status = status.as_u16(), bytes = text.len(), "received response");

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                body: error_body(text),
            });
        }

        parse_success_body(url, text)
    }
}

fn network_error(url: &str, err: reqwest::Error) -> TransportError {
    let reason = if err.is_timeout() {
        format!("request timed out ({})", err)
    } else {
        err.to_string()
    };
    TransportError::Network {
        url: url.to_string(),
        reason,
    }
}

/// Body of a non-2xx response: parsed JSON when possible, raw text otherwise.
pub(crate) fn error_body(text: &str) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

pub(crate) fn parse_success_body(url: &str, text: &str) -> Result<Option<Value>, TransportError> {
    if text.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(text)
        .map(Some)
        .map_err(|source| TransportError::Malformed {
            url: url.to_string(),
            source,
        })
}
