//! End-to-end runs against an in-process stub of the proxy management API.

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap as AxumHeaders, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use oauth_usage::config::MANAGEMENT_KEY_ENV;
use oauth_usage::{
    CliOverrides, Config, FileConfig, ReqwestTransport, Transport, TransportError, UsageError,
};
use pretty_assertions::assert_eq;
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct StubProxy {
    auth_files: (u16, String),
    /// Relay responses keyed by `auth_index`; unknown indices get a 500.
    relay: HashMap<String, (u16, String)>,
    relay_calls: Mutex<Vec<Value>>,
    auth_headers: Mutex<Vec<String>>,
}

impl StubProxy {
    fn new(auth_files: Value) -> Self {
        Self::with_raw_auth_files(200, auth_files.to_string())
    }

    fn with_raw_auth_files(status: u16, body: String) -> Self {
        Self {
            auth_files: (status, body),
            relay: HashMap::new(),
            relay_calls: Mutex::new(Vec::new()),
            auth_headers: Mutex::new(Vec::new()),
        }
    }

    fn relay(mut self, auth_index: &str, status: u16, envelope: Value) -> Self {
        self.relay
            .insert(auth_index.to_string(), (status, envelope.to_string()));
        self
    }

    fn relay_indices(&self) -> Vec<String> {
        self.relay_calls
            .lock()
            .unwrap()
            .iter()
            .map(|p| p["auth_index"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

fn reply(status: u16, body: &str) -> (StatusCode, String) {
    (StatusCode::from_u16(status).unwrap(), body.to_string())
}

fn record_auth(stub: &StubProxy, headers: &AxumHeaders) {
    let value = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    stub.auth_headers.lock().unwrap().push(value);
}

async fn auth_files(State(stub): State<Arc<StubProxy>>, headers: AxumHeaders) -> (StatusCode, String) {
    record_auth(&stub, &headers);
    reply(stub.auth_files.0, &stub.auth_files.1)
}

async fn api_call(
    State(stub): State<Arc<StubProxy>>,
    headers: AxumHeaders,
    Json(payload): Json<Value>,
) -> (StatusCode, String) {
    record_auth(&stub, &headers);
    let index = payload["auth_index"].as_str().unwrap_or_default().to_string();
    stub.relay_calls.lock().unwrap().push(payload);
    match stub.relay.get(&index) {
        Some((status, body)) => reply(*status, body),
        None => reply(500, r#"{"error":"unknown auth_index"}"#),
    }
}

async fn serve(stub: StubProxy) -> (String, Arc<StubProxy>) {
    let stub = Arc::new(stub);
    let app = Router::new()
        .route("/v0/management/auth-files", get(auth_files))
        .route("/v0/management/api-call", post(api_call))
        .with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/", addr), stub)
}

fn config(base_url: &str, cli: CliOverrides) -> Config {
    let cli = CliOverrides {
        base_url: Some(base_url.to_string()),
        ..cli
    };
    Config::resolve(
        cli,
        |key| (key == MANAGEMENT_KEY_ENV).then(|| "test-key".to_string()),
        FileConfig::default(),
    )
    .unwrap()
}

async fn run_against(config: &Config) -> (Result<(), UsageError>, String) {
    let transport = ReqwestTransport::new(config.timeout).unwrap();
    let mut out = Vec::new();
    let result = oauth_usage::run(config, &transport, &mut out).await;
    (result, String::from_utf8(out).unwrap())
}

fn usage_envelope(five_hour: u32, seven_day: u32) -> Value {
    let body = json!({
        "five_hour": {"utilization": five_hour, "resets_at": "A"},
        "seven_day": {"utilization": seven_day, "resets_at": "B"},
        "extra_usage": {"is_enabled": false}
    });
    json!({"status_code": 200, "header": {}, "body": body.to_string()})
}

fn two_claude_accounts() -> Value {
    json!({"files": [
        {"provider": "claude", "auth_index": "a1", "email": "first@example.com"},
        {"provider": "codex", "auth_index": "c1", "email": "codex@example.com"},
        {"provider": "Claude", "email": "second@example.com"}
    ]})
}

#[tokio::test]
async fn summary_for_every_claude_account() {
    let stub = StubProxy::new(two_claude_accounts())
        .relay("a1", 200, usage_envelope(12, 40))
        .relay("2", 200, json!({"status_code": 200, "body": ""}));
    let (base_url, stub) = serve(stub).await;

    let (result, out) = run_against(&config(&base_url, CliOverrides::default())).await;
    result.unwrap();

    assert_eq!(
        out,
        "[claude] auth_index=a1 display=first@example.com\n\
         \x20 five_hour: utilization=12 resets_at=A\n\
         \x20 seven_day: utilization=40 resets_at=B\n\
         [claude] auth_index=2 display=second@example.com\n\
         \x20 body=null\n"
    );
    assert_eq!(stub.relay_indices(), vec!["a1", "2"]);
    assert!(stub.auth_headers.lock().unwrap().iter().all(|h| h == "Bearer test-key"));

    let calls = stub.relay_calls.lock().unwrap();
    assert_eq!(calls[0]["method"], json!("GET"));
    assert_eq!(calls[0]["url"], json!("https://api.anthropic.com/api/oauth/usage"));
    assert_eq!(calls[0]["header"]["Authorization"], json!("Bearer $TOKEN$"));
}

#[tokio::test]
async fn json_output_with_index_filter() {
    let stub = StubProxy::new(two_claude_accounts()).relay("a1", 200, usage_envelope(5, 6));
    let (base_url, stub) = serve(stub).await;

    let cli = CliOverrides {
        auth_indices: vec!["a1, 9".into()],
        json: true,
        ..Default::default()
    };
    let (result, out) = run_against(&config(&base_url, cli)).await;
    result.unwrap();

    let parsed: Value = serde_json::from_str(&out).unwrap();
    let records = parsed.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["auth_index"], json!("a1"));
    assert_eq!(records[0]["display"], json!("first@example.com"));
    assert_eq!(records[0]["wrapped"], usage_envelope(5, 6));
    assert_eq!(records[0]["body"]["five_hour"]["utilization"], json!(5));
    assert_eq!(stub.relay_indices(), vec!["a1"]);
}

#[tokio::test]
async fn no_entries_for_provider() {
    let (base_url, stub) = serve(StubProxy::new(json!([{"provider": "x", "auth_index": 1}]))).await;

    let (result, out) = run_against(&config(&base_url, CliOverrides::default())).await;
    let err = result.unwrap_err();

    assert_eq!(err.exit_code(), 4);
    assert_eq!(err.to_string(), r#"No auth entries found for provider "claude""#);
    assert!(out.is_empty());
    assert!(stub.relay_indices().is_empty());
}

#[tokio::test]
async fn no_entries_for_requested_index() {
    let (base_url, stub) =
        serve(StubProxy::new(json!({"data": [{"provider": "claude", "auth_index": 3}]}))).await;

    let cli = CliOverrides {
        auth_indices: vec!["7".into()],
        ..Default::default()
    };
    let (result, _) = run_against(&config(&base_url, cli)).await;
    let err = result.unwrap_err();

    assert_eq!(err.exit_code(), 4);
    assert_eq!(
        err.to_string(),
        r#"No auth entries found for provider "claude" with auth_index in ["7"]"#
    );
    assert!(stub.relay_indices().is_empty());
}

#[tokio::test]
async fn unexpected_discovery_shape() {
    let (base_url, _stub) = serve(StubProxy::new(json!({"status": "ok"}))).await;

    let (result, _) = run_against(&config(&base_url, CliOverrides::default())).await;
    let err = result.unwrap_err();

    assert_eq!(err.exit_code(), 3);
    assert_eq!(err.to_string(), "Unexpected /auth-files response type: object");
}

#[tokio::test]
async fn http_error_carries_status_and_body() {
    let stub = StubProxy::with_raw_auth_files(401, r#"{"error":"invalid management key"}"#.into());
    let (base_url, _stub) = serve(stub).await;

    let (result, _) = run_against(&config(&base_url, CliOverrides::default())).await;
    match result.unwrap_err() {
        UsageError::Transport(TransportError::Status { status, url, body }) => {
            assert_eq!(status, 401);
            assert!(url.ends_with("/v0/management/auth-files"));
            assert!(!url.contains("//v0"));
            assert_eq!(body, json!({"error": "invalid management key"}));
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn non_json_success_is_malformed() {
    let (base_url, _stub) = serve(StubProxy::with_raw_auth_files(200, "<html>ok</html>".into())).await;

    let (result, _) = run_against(&config(&base_url, CliOverrides::default())).await;
    let err = result.unwrap_err();
    assert!(matches!(err, UsageError::Transport(TransportError::Malformed { .. })));
    assert_eq!(err.exit_code(), 1);
}

#[tokio::test]
async fn relay_failure_aborts_the_batch() {
    // Only the first account has a relay response; the second gets a 500.
    let stub = StubProxy::new(two_claude_accounts()).relay("a1", 200, usage_envelope(1, 2));
    let (base_url, stub) = serve(stub).await;

    let (result, out) = run_against(&config(&base_url, CliOverrides::default())).await;
    let err = result.unwrap_err();

    assert!(matches!(
        err,
        UsageError::Transport(TransportError::Status { status: 500, .. })
    ));
    assert!(out.is_empty());
    assert_eq!(stub.relay_indices(), vec!["a1", "2"]);
}

#[tokio::test]
async fn connection_refused_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let cli = CliOverrides {
        timeout_secs: Some(2),
        ..Default::default()
    };
    let (result, _) = run_against(&config(&base_url, cli)).await;
    assert!(matches!(
        result.unwrap_err(),
        UsageError::Transport(TransportError::Network { .. })
    ));
}

async fn slow_auth_files() -> (StatusCode, String) {
    tokio::time::sleep(Duration::from_secs(3)).await;
    reply(200, "[]")
}

#[tokio::test]
async fn slow_proxy_times_out_as_network_error() {
    let app = Router::new().route("/v0/management/auth-files", get(slow_auth_files));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let cli = CliOverrides {
        timeout_secs: Some(1),
        ..Default::default()
    };
    let (result, out) = run_against(&config(&base_url, cli)).await;
    let err = result.unwrap_err();

    match &err {
        UsageError::Transport(TransportError::Network { url, reason }) => {
            assert!(url.ends_with("/v0/management/auth-files"));
            assert!(reason.starts_with("request timed out"), "got: {}", reason);
        }
        other => panic!("expected network error, got {:?}", other),
    }
    assert_eq!(err.exit_code(), 1);
    assert!(out.is_empty());
}

/// Counts calls and always fails.
#[derive(Default)]
struct CountingTransport {
    calls: AtomicUsize,
}

#[async_trait]
impl Transport for CountingTransport {
    async fn request(
        &self,
        _method: Method,
        url: &str,
        _headers: &HeaderMap,
        _payload: Option<&Value>,
    ) -> Result<Option<Value>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Network {
            url: url.to_string(),
            reason: "unexpected call".into(),
        })
    }
}

#[test]
fn missing_credential_fails_resolution() {
    let err = Config::resolve(CliOverrides::default(), |_| None, FileConfig::default())
        .unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert_eq!(err.to_string(), "Missing env var: CLAUDE_MANAGEMENT_KEY");
}

#[tokio::test]
async fn empty_credential_makes_no_requests() {
    let transport = CountingTransport::default();
    let config = Config {
        management_key: String::new(),
        ..config("http://127.0.0.1:9", CliOverrides::default())
    };

    let mut out = Vec::new();
    let err = oauth_usage::run(&config, &transport, &mut out)
        .await
        .unwrap_err();

    assert!(matches!(err, UsageError::MissingCredential { .. }));
    assert_eq!(err.exit_code(), 2);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    assert!(out.is_empty());
}

#[tokio::test]
async fn counting_transport_sees_requests_with_a_credential() {
    let transport = CountingTransport::default();
    let config = config("http://127.0.0.1:9", CliOverrides::default());

    let mut out = Vec::new();
    let err = oauth_usage::run(&config, &transport, &mut out)
        .await
        .unwrap_err();

    assert!(matches!(err, UsageError::Transport(TransportError::Network { .. })));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
}
