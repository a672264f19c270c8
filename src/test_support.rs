//! 测试用的本地模拟服务端：同时扮演身份服务、应用API、对话服务和出口IP查询接口。

use crate::config::Config;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_STREAM: &str = "event: metadata\n\
data: {\"run_id\":\"run-1\"}\n\
\n\
: heartbeat\n\
\n\
event: values\n\
data: {\"messages\":[{\"type\":\"human\",\"content\":\"q\"},{\"type\":\"ai\",\"content\":\"Hel\"}]}\n\
\n\
event: values\n\
data: {\"messages\":[{\"type\":\"ai\",\"content\":\"lo\"}]}\n\
\n";

#[derive(Debug, Clone)]
pub struct MockScript {
    pub flaky_failures: usize,
    pub nonce_failures: usize,
    pub authenticate_failures: usize,
    pub probe_fails: bool,
    pub stream_body: String,
}

impl Default for MockScript {
    fn default() -> Self {
        Self {
            flaky_failures: 0,
            nonce_failures: 0,
            authenticate_failures: 0,
            probe_fails: false,
            stream_body: DEFAULT_STREAM.to_string(),
        }
    }
}

#[derive(Default)]
struct MockState {
    script: Mutex<Option<MockScript>>,
    hits: Mutex<HashMap<&'static str, usize>>,
    activity_responses: Mutex<HashMap<String, Value>>,
    activities_seen: Mutex<Vec<String>>,
    bearer_seen: Mutex<Vec<String>>,
}

impl MockState {
    fn script(&self) -> MockScript {
        self.script.lock().clone().unwrap_or_default()
    }

    /// 记录一次命中，返回本次命中序号（从1开始）
    fn hit(&self, route: &'static str) -> usize {
        let mut hits = self.hits.lock();
        let count = hits.entry(route).or_insert(0);
        *count += 1;
        *count
    }
}

pub struct MockBackend {
    pub base_url: String,
    state: Arc<MockState>,
}

impl MockBackend {
    pub async fn start(script: MockScript) -> Self {
        let state = Arc::new(MockState::default());
        *state.script.lock() = Some(script);

        let app = Router::new()
            .route("/ip", get(ip))
            .route("/flaky", get(flaky))
            .route("/api/v1/siwe/init", post(siwe_init))
            .route("/api/v1/siwe/authenticate", post(siwe_authenticate))
            .route("/tokens/user/me", get(user_me))
            .route("/tokens/activity", post(activity))
            .route("/threads", post(create_thread))
            .route("/threads/:id/runs/stream", post(run_stream))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn hits(&self, route: &str) -> usize {
        self.state.hits.lock().get(route).copied().unwrap_or(0)
    }

    pub fn set_activity_response(&self, activity_type: &str, body: Value) {
        self.state
            .activity_responses
            .lock()
            .insert(activity_type.to_string(), body);
    }

    pub fn activities_seen(&self) -> Vec<String> {
        self.state.activities_seen.lock().clone()
    }

    pub fn bearer_seen(&self) -> Vec<String> {
        self.state.bearer_seen.lock().clone()
    }
}

/// 所有服务地址都指向模拟服务端，所有等待时间置零
pub fn test_config(base_url: &str) -> Config {
    let mut config = Config::default();
    config.endpoints.auth_base_url = base_url.to_string();
    config.endpoints.api_base_url = base_url.to_string();
    config.endpoints.chat_base_url = base_url.to_string();
    config.endpoints.ip_check_url = format!("{}/ip", base_url);
    config.retry.warmup_secs = 0.0;
    config.retry.backoff_secs = 0.0;
    config.retry.request_timeout_secs = 5;
    config.retry.probe_timeout_secs = 5;
    config.run.account_delay_secs = 0.0;
    config.run.rng_seed = Some(42);
    config
}

fn failure() -> Response {
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

async fn ip(State(state): State<Arc<MockState>>) -> Response {
    state.hit("ip");
    if state.script().probe_fails {
        return failure();
    }
    Json(json!({"ip": "127.0.0.1"})).into_response()
}

async fn flaky(State(state): State<Arc<MockState>>) -> Response {
    let n = state.hit("flaky");
    if n <= state.script().flaky_failures {
        return failure();
    }
    Json(json!({"ok": true})).into_response()
}

async fn siwe_init(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    let n = state.hit("nonce");
    if n <= state.script().nonce_failures || body.get("address").is_none() {
        return failure();
    }
    Json(json!({"nonce": "nonce-123"})).into_response()
}

async fn siwe_authenticate(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    let n = state.hit("authenticate");
    if n <= state.script().authenticate_failures {
        return failure();
    }

    let message = body.get("message").and_then(Value::as_str).unwrap_or_default();
    let signed = body
        .get("signature")
        .and_then(Value::as_str)
        .map(|s| s.starts_with("0x"))
        .unwrap_or(false);
    if !message.contains("Nonce: nonce-123") || !signed {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    Json(json!({"token": format!("token-{}", n)})).into_response()
}

fn record_bearer(state: &MockState, headers: &axum::http::HeaderMap) -> bool {
    match headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        Some(token) => {
            state.bearer_seen.lock().push(token.to_string());
            true
        }
        None => false,
    }
}

async fn user_me(State(state): State<Arc<MockState>>, headers: axum::http::HeaderMap) -> Response {
    state.hit("me");
    if !record_bearer(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({"token": {"pointsTotal": 150}})).into_response()
}

async fn activity(
    State(state): State<Arc<MockState>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.hit("activity");
    record_bearer(&state, &headers);

    let activity_type = body
        .get("activityType")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    state.activities_seen.lock().push(activity_type.clone());

    let response = state
        .activity_responses
        .lock()
        .get(&activity_type)
        .cloned()
        .unwrap_or_else(|| json!({"activityId": format!("act-{}", activity_type.to_lowercase())}));
    Json(response).into_response()
}

async fn create_thread(State(state): State<Arc<MockState>>) -> Response {
    let n = state.hit("threads");
    Json(json!({"thread_id": format!("thread-{}", n)})).into_response()
}

async fn run_stream(State(state): State<Arc<MockState>>, Path(_id): Path<String>) -> Response {
    state.hit("stream");
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        state.script().stream_body,
    )
        .into_response()
}
