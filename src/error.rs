use crate::models::plain_value;
use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;

/// Failures raised while talking to the proxy management API.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP {status} for {url}: {}", plain_value(.body))]
    Status { status: u16, url: String, body: Value },

    #[error("Network error for {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("Non-JSON response from {url}: {source}")]
    Malformed {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("Missing env var: {var}")]
    MissingCredential { var: &'static str },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Unexpected /auth-files response type: {found}")]
    Shape { found: &'static str },

    #[error("No auth entries found for provider \"{provider}\"")]
    NoProviderMatch { provider: String },

    #[error(
        "No auth entries found for provider \"{provider}\" with auth_index in {}",
        format_index_set(.indices)
    )]
    NoIndexMatch {
        provider: String,
        indices: BTreeSet<String>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl UsageError {
    pub fn exit_code(&self) -> u8 {
        match self {
            UsageError::MissingCredential { .. } => 2,
            UsageError::Shape { .. } => 3,
            UsageError::NoProviderMatch { .. } | UsageError::NoIndexMatch { .. } => 4,
            UsageError::Transport(_) | UsageError::InvalidConfig(_) | UsageError::Output(_) => 1,
        }
    }
}

fn format_index_set(indices: &BTreeSet<String>) -> String {
    let quoted: Vec<String> = indices.iter().map(|i| format!("\"{}\"", i)).collect();
    format!("[{}]", quoted.join(", "))
}

/// Name of a JSON value's type, as reported in shape errors.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
