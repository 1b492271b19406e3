//! Mock upstream and helpers shared by the async tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::{Value, json};

use crate::config::LlmConfig;
use crate::llm::CompletionClient;
use crate::server::{AppState, build_router};
use pantry_core::generation::GenerationSettings;
use pantry_core::service::PantryService;

#[derive(Clone)]
pub struct MockReply {
    status: StatusCode,
    body: String,
}

impl MockReply {
    pub fn content(text: &str) -> Self {
        let body = json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": text },
                "finish_reason": "stop"
            }]
        });
        Self::raw_json(&body.to_string())
    }

    pub fn failure(status: StatusCode, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    pub fn raw_json(body: &str) -> Self {
        Self::failure(StatusCode::OK, body)
    }
}

pub struct SeenRequest {
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct MockState {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    calls: Arc<AtomicUsize>,
    last: Arc<Mutex<Option<SeenRequest>>>,
}

pub struct MockUpstream {
    pub url: String,
    state: MockState,
}

impl MockUpstream {
    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<SeenRequest> {
        self.state.last.lock().unwrap().take()
    }
}

async fn chat_completions(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.calls.fetch_add(1, Ordering::SeqCst);
    *state.last.lock().unwrap() = Some(SeenRequest {
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });

    // The final reply repeats once the queue is drained.
    let reply = {
        let mut replies = state.replies.lock().unwrap();
        if replies.len() > 1 {
            replies.pop_front().unwrap()
        } else {
            replies.front().cloned().unwrap()
        }
    };
    (
        reply.status,
        [(header::CONTENT_TYPE, "application/json")],
        reply.body,
    )
        .into_response()
}

/// Serve `replies` in order from a chat-completion endpoint on an ephemeral port.
pub async fn spawn_mock_upstream(replies: Vec<MockReply>) -> MockUpstream {
    assert!(!replies.is_empty(), "mock upstream needs at least one reply");
    let state = MockState {
        replies: Arc::new(Mutex::new(replies.into())),
        calls: Arc::new(AtomicUsize::new(0)),
        last: Arc::new(Mutex::new(None)),
    };
    let app = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(state.clone());
    let addr = spawn_app(app).await;
    MockUpstream {
        url: format!("http://{addr}/v1/chat/completions"),
        state,
    }
}

/// Serve `app` on an ephemeral localhost port, returning its address.
pub async fn spawn_app(app: Router) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A localhost URL nothing is listening on.
pub async fn unused_local_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/v1/chat/completions")
}

pub fn llm_config(url: &str, token: Option<&str>) -> LlmConfig {
    LlmConfig {
        url: url.to_string(),
        token: token.map(str::to_string),
        timeout: Duration::from_secs(5),
        settings: GenerationSettings::default(),
    }
}

/// `METHOD /path` for every request a pantry server has received, in order.
#[derive(Clone, Default)]
pub struct RequestLog(Arc<Mutex<Vec<String>>>);

impl RequestLog {
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

async fn record_request(State(log): State<RequestLog>, request: Request, next: Next) -> Response {
    log.0
        .lock()
        .unwrap()
        .push(format!("{} {}", request.method(), request.uri().path()));
    next.run(request).await
}

/// Serve a pantry API backed by an in-memory database, returning its base URL.
pub async fn spawn_pantry(llm_url: &str, api_key: Option<&str>) -> String {
    spawn_recorded_pantry(llm_url, api_key).await.0
}

/// Like [`spawn_pantry`], also returning the log of requests it receives.
pub async fn spawn_recorded_pantry(
    llm_url: &str,
    api_key: Option<&str>,
) -> (String, RequestLog) {
    let state = AppState::new(
        PantryService::new_in_memory().unwrap(),
        CompletionClient::new(&llm_config(llm_url, None)).unwrap(),
        api_key.map(str::to_string),
    );
    let log = RequestLog::default();
    let app = build_router(state).layer(middleware::from_fn_with_state(
        log.clone(),
        record_request,
    ));
    let addr = spawn_app(app).await;
    (format!("http://{addr}"), log)
}
