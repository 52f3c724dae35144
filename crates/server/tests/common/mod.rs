//! Common test utilities for API tests with mocks.
//!
//! The fixture builds the router in-process with the mock renderer and
//! encoder injected, so renders run without a browser bridge or ffmpeg.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use framecast_core::{
    testing::{MockEncoder, MockLauncher},
    Config, OrchestratorSettings, RenderConfig, RenderOrchestrator,
};

/// Base of the download links handed out by the fixture.
pub const DOWNLOADS_URL: &str = "http://localhost:8080/api/v1/renders";

/// In-process server with controllable mocks.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_render() {
///     let fixture = TestFixture::new();
///
///     let response = fixture.post_ndjson("/api/v1/render", json!({
///         "compositionId": "intro",
///         "durationInFrames": 10
///     })).await;
///
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    pub router: Router,
    pub launcher: MockLauncher,
    pub encoder: MockEncoder,
    /// Scratch space and outputs
    pub temp_dir: TempDir,
    pub output_dir: PathBuf,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Response whose body is an NDJSON stream
#[derive(Debug)]
pub struct StreamResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub events: Vec<Value>,
}

impl StreamResponse {
    pub fn kinds(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| event["type"].as_str())
            .collect()
    }

    pub fn last(&self) -> &Value {
        self.events.last().expect("stream has no events")
    }
}

impl TestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let output_dir = temp_dir.path().join("out");
        std::fs::create_dir_all(&output_dir).expect("Failed to create output dir");

        let launcher = MockLauncher::new();
        let encoder = MockEncoder::new();

        let config = Config {
            render: RenderConfig {
                temp_dir: temp_dir.path().join("scratch"),
                output_dir: output_dir.clone(),
                width: 64,
                height: 36,
                ..RenderConfig::default()
            },
            ..Config::default()
        };

        let settings = OrchestratorSettings::new(temp_dir.path().join("scratch"))
            .with_download_base_url(DOWNLOADS_URL);
        let orchestrator = Arc::new(RenderOrchestrator::new(
            Arc::new(launcher.clone()),
            Arc::new(encoder.clone()),
            settings,
        ));

        let state = Arc::new(framecast_server::state::AppState::new(config, orchestrator));
        let router = framecast_server::api::create_router(state);

        Self {
            router,
            launcher,
            encoder,
            temp_dir,
            output_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        let (status, _, bytes) = self.send("GET", path, Body::empty(), None).await;
        TestResponse {
            status,
            body: parse_json(&bytes),
        }
    }

    /// Send a GET request and return the raw body.
    pub async fn get_bytes(&self, path: &str) -> (StatusCode, Vec<u8>) {
        let (status, _, bytes) = self.send("GET", path, Body::empty(), None).await;
        (status, bytes)
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        let (status, _, bytes) = self
            .send(
                "POST",
                path,
                Body::from(serde_json::to_vec(&body).unwrap()),
                Some("application/json"),
            )
            .await;
        TestResponse {
            status,
            body: parse_json(&bytes),
        }
    }

    /// Send a POST request with a raw body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let (status, _, bytes) = self
            .send("POST", path, Body::from(body.to_string()), Some("application/json"))
            .await;
        TestResponse {
            status,
            body: parse_json(&bytes),
        }
    }

    /// POST a JSON body and read the NDJSON stream until it ends.
    pub async fn post_ndjson(&self, path: &str, body: Value) -> StreamResponse {
        let (status, content_type, bytes) = self
            .send(
                "POST",
                path,
                Body::from(serde_json::to_vec(&body).unwrap()),
                Some("application/json"),
            )
            .await;

        let text = String::from_utf8(bytes).expect("stream is not UTF-8");
        let events = text
            .lines()
            .map(|line| serde_json::from_str(line).expect("line is not JSON"))
            .collect();

        StreamResponse {
            status,
            content_type,
            events,
        }
    }

    async fn send(
        &self,
        method: &str,
        path: &str,
        body: Body,
        content_type: Option<&str>,
    ) -> (StatusCode, Option<String>, Vec<u8>) {
        let mut request_builder = Request::builder().method(method).uri(path);
        if let Some(content_type) = content_type {
            request_builder = request_builder.header("Content-Type", content_type);
        }
        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        (status, content_type, bytes.to_vec())
    }
}

fn parse_json(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(bytes).unwrap_or(Value::Null)
    }
}
