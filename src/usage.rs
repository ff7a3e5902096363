//! Usage lookups relayed through `/v0/management/api-call`.

use crate::error::UsageError;
use crate::models::{AuthEntry, UsageResult};
use crate::transport::Transport;
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const API_CALL_PATH: &str = "/v0/management/api-call";

const UPSTREAM_URL: &str = "https://api.anthropic.com/api/oauth/usage";
const UPSTREAM_USER_AGENT: &str = "claude-code/2 (CLIProxyAPI)";
/// Replaced by the proxy with the entry's real access token.
const TOKEN_PLACEHOLDER: &str = "Bearer $TOKEN$";

/// Request body understood by the proxy's generic relay endpoint.
#[derive(Debug, Serialize)]
pub struct RelayRequest<'a> {
    pub auth_index: &'a str,
    pub method: &'static str,
    pub url: &'static str,
    pub header: BTreeMap<&'static str, &'static str>,
}

impl<'a> RelayRequest<'a> {
    pub fn oauth_usage(auth_index: &'a str) -> Self {
        let header = BTreeMap::from([
            ("Authorization", TOKEN_PLACEHOLDER),
            ("anthropic-beta", "oauth-2025-04-20"),
            ("Content-Type", "application/json"),
            ("Accept", "application/json, text/plain, */*"),
            ("User-Agent", UPSTREAM_USER_AGENT),
        ]);
        Self {
            auth_index,
            method: "GET",
            url: UPSTREAM_URL,
            header,
        }
    }
}

/// Relay the upstream usage request for one entry.
pub async fn fetch_usage(
    transport: &dyn Transport,
    base_url: &str,
    headers: &HeaderMap,
    entry: &AuthEntry,
) -> Result<UsageResult, UsageError> {
    let url = format!("{}{}", base_url, API_CALL_PATH);
    let payload = serde_json::to_value(RelayRequest::oauth_usage(&entry.index))
        .map_err(|e| UsageError::InvalidConfig(format!("cannot encode relay request: {}", e)))?;

    debug!(auth_index = %entry.index, "relaying usage request");
    let wrapped = transport
        .request(Method::POST, &url, headers, Some(&payload))
        .await?
        .unwrap_or(Value::Null);
    let body = unwrap_body(&wrapped);

    Ok(UsageResult {
        auth_index: entry.index.clone(),
        display: entry.display_name.clone(),
        wrapped,
        body,
    })
}

/// Fetch usage for every selected entry, in order. The first failure aborts
/// the batch.
pub async fn fetch_all(
    transport: &dyn Transport,
    base_url: &str,
    headers: &HeaderMap,
    entries: &[AuthEntry],
) -> Result<Vec<UsageResult>, UsageError> {
    let mut results = Vec::with_capacity(entries.len());
    for entry in entries {
        results.push(fetch_usage(transport, base_url, headers, entry).await?);
    }
    info!(count = results.len(), "fetched usage");
    Ok(results)
}

/// Extract the upstream payload from a relay envelope.
///
/// The envelope's `body` field is preferred over the envelope itself.
/// String bodies are trimmed and JSON-decoded when possible; an empty
/// string becomes `null`.
pub fn unwrap_body(envelope: &Value) -> Value {
    let candidate = match envelope {
        Value::Object(map) => map.get("body").unwrap_or(envelope),
        other => other,
    };

    match candidate {
        Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                Value::Null
            } else {
                serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
            }
        }
        other => other.clone(),
    }
}
