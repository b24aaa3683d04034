#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::{Json, Router, routing::post};
use serde_json::{Value, json};

use coach_proxy::config::CredentialSource;
use coach_proxy::routes::create_router;
use coach_proxy::services::completion::{CompletionClient, CompletionSettings};
use coach_proxy::services::content_filter::ContentFilter;
use coach_proxy::services::rate_limiter::{ManualClock, RateLimiter};
use coach_proxy::state::AppState;

#[derive(Clone)]
pub enum UpstreamBehavior {
    /// 200 with a completion whose content is `"<text> #<call number>"`.
    Reply(String),
    Fail(StatusCode, String),
    Raw(Value),
    Hang(Duration),
}

pub struct FakeUpstream {
    pub url: String,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl FakeUpstream {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<Value> {
        self.requests.lock().unwrap().last().cloned()
    }
}

pub async fn spawn_upstream(behavior: UpstreamBehavior) -> FakeUpstream {
    let calls = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));

    let handler_calls = calls.clone();
    let handler_requests = requests.clone();
    let handler = move |Json(req): Json<Value>| {
        let calls = handler_calls.clone();
        let requests = handler_requests.clone();
        let behavior = behavior.clone();
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            requests.lock().unwrap().push(req);
            match behavior {
                UpstreamBehavior::Reply(text) => (
                    StatusCode::OK,
                    Json(json!({
                        "choices": [
                            {"message": {"role": "assistant", "content": format!("{text} #{n}")}}
                        ]
                    })),
                ),
                UpstreamBehavior::Fail(status, body) => (status, Json(json!({ "error": body }))),
                UpstreamBehavior::Raw(body) => (StatusCode::OK, Json(body)),
                UpstreamBehavior::Hang(delay) => {
                    tokio::time::sleep(delay).await;
                    (StatusCode::OK, Json(json!({})))
                }
            }
        }
    };

    let app = Router::new().route("/v1/chat/completions", post(handler));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeUpstream {
        url: format!("http://{addr}/v1/chat/completions"),
        calls,
        requests,
    }
}

pub fn settings_for(upstream_url: &str) -> CompletionSettings {
    CompletionSettings {
        url: upstream_url.to_string(),
        timeout: Duration::from_secs(5),
        ..CompletionSettings::default()
    }
}

pub struct TestApp {
    pub router: Router,
    pub clock: ManualClock,
}

pub fn build_app(settings: CompletionSettings, credentials: CredentialSource) -> TestApp {
    let clock = ManualClock::new();
    let limiter = RateLimiter::default().with_clock(Arc::new(clock.clone()));
    let state = AppState::new(
        limiter,
        ContentFilter::default(),
        credentials,
        CompletionClient::new(settings).unwrap(),
    );

    TestApp {
        router: create_router().with_state(Arc::new(state)),
        clock,
    }
}

pub fn app_for(upstream: &FakeUpstream) -> TestApp {
    build_app(settings_for(&upstream.url), CredentialSource::fixed("test-key"))
}

pub fn chat_request(client_ip: &str, body: impl Into<String>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .header("x-forwarded-for", client_ip)
        .body(Body::from(body.into()))
        .unwrap()
}

pub fn message_body(message: &str) -> String {
    json!({ "message": message }).to_string()
}

pub async fn read_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
