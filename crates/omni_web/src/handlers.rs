use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use omni_core::{ParseOutput, ParseRequest};
use crate::SidecarState;

#[derive(Debug, Serialize)]
pub struct ParseResponse {
    pub ok: bool,
    pub latency: f64,
    pub latency_ms: u64,
    pub parsed_content_list: Vec<Value>,
    pub som_image_base64: String,
}

impl ParseResponse {
    pub fn new(output: ParseOutput, latency: Duration) -> Self {
        Self {
            ok: true,
            latency: latency.as_secs_f64(),
            latency_ms: latency.as_millis() as u64,
            parsed_content_list: output.parsed_content_list,
            som_image_base64: output.som_image_base64,
        }
    }
}

pub fn error_response(status: StatusCode, error: &str, details: Option<String>) -> Response {
    let mut body = json!({"ok": false, "error": error});
    if let Some(details) = details {
        body["details"] = Value::String(details);
    }
    (status, Json(body)).into_response()
}

pub async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "not found", None)
}

pub async fn probe(State(state): State<Arc<SidecarState>>) -> impl IntoResponse {
    Json(state.probe_status())
}

pub async fn parse(State(state): State<Arc<SidecarState>>, body: Bytes) -> Response {
    let readiness = &state.readiness;
    if !readiness.ready {
        debug!(reason = ?readiness.reason, "parse rejected, sidecar not ready");
        let body = json!({
            "ok": false,
            "error": "preflight_only",
            "preflight_ok": readiness.preflight_ok,
            "reason": readiness.reason,
            "missing_imports": readiness.missing_imports,
            "missing_files": readiness.missing_files,
            "missing_weights": readiness.missing_weights,
        });
        return (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
    }

    let request = match ParseRequest::from_body(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("rejecting parse request: {}", e);
            return error_response(StatusCode::BAD_REQUEST, "invalid_json", Some(e.to_string()));
        }
    };
    let Some(image) = request.image() else {
        return error_response(StatusCode::BAD_REQUEST, "missing_base64_image", None);
    };

    let parser = match state.parser().await {
        Ok(parser) => parser,
        Err(e) => {
            state.error_log.record(&e).await;
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "init_failed", Some(e.summary()));
        }
    };

    let started = Instant::now();
    match parser.parse(image).await {
        Ok(output) => {
            let latency = started.elapsed();
            debug!(elements = output.parsed_content_list.len(), ?latency, "parse finished");
            (StatusCode::OK, Json(ParseResponse::new(output, latency))).into_response()
        }
        Err(e) => {
            state.error_log.record(&e).await;
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "parse_failed", Some(e.summary()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_app, ErrorLog};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use futures_util::future::join_all;
    use omni_core::{Error, ParserLoader, Result, ScreenParser};
    use omni_parser::models::MockParser;
    use omni_parser::preflight::{ImportReport, MissingPrerequisite, WeightCheck};
    use omni_parser::{Readiness, SidecarMode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    struct CountingLoader {
        loads: AtomicUsize,
    }

    #[async_trait]
    impl ParserLoader for CountingLoader {
        async fn load(&self) -> Result<Arc<dyn ScreenParser>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Arc::new(MockParser))
        }
    }

    struct FailingLoader {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl ParserLoader for FailingLoader {
        async fn load(&self) -> Result<Arc<dyn ScreenParser>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::ModelInit("CUDA out of memory".to_string()))
        }
    }

    struct BrokenParser;

    #[async_trait]
    impl ScreenParser for BrokenParser {
        fn name(&self) -> &str {
            "broken"
        }

        async fn parse(&self, _image_base64: &str) -> Result<ParseOutput> {
            Err(Error::Parse("cannot identify image file".to_string()))
        }
    }

    struct BrokenLoader;

    #[async_trait]
    impl ParserLoader for BrokenLoader {
        async fn load(&self) -> Result<Arc<dyn ScreenParser>> {
            Ok(Arc::new(BrokenParser))
        }
    }

    fn ready() -> Readiness {
        Readiness::evaluate(ImportReport::default(), vec![], WeightCheck::default())
    }

    fn weights_missing() -> Readiness {
        Readiness::evaluate(
            ImportReport::default(),
            vec![],
            WeightCheck {
                missing: vec!["weight_missing:icon_detect/model.pt".to_string()],
                required: Default::default(),
            },
        )
    }

    fn state(dir: &TempDir, readiness: Readiness, loader: Arc<dyn ParserLoader>) -> SidecarState {
        SidecarState::new(
            SidecarMode::RealLocalUntitled,
            readiness,
            loader,
            ErrorLog::new(dir.path().join("parse_error.log")),
        )
    }

    fn counting() -> Arc<CountingLoader> {
        Arc::new(CountingLoader { loads: AtomicUsize::new(0) })
    }

    async fn send(app: axum::Router, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_probe_reports_cached_readiness() {
        let dir = tempdir().unwrap();
        let app = create_app(state(&dir, weights_missing(), counting()));

        for uri in ["/probe", "/probe/"] {
            let (status, body) = send(app.clone(), Method::GET, uri, "").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["ok"], false);
            assert_eq!(body["ready"], false);
            assert_eq!(body["preflight_ok"], true);
            assert_eq!(body["reason"], "weights_missing");
            assert_eq!(body["mode"], "real_local_untitled");
            assert_eq!(body["missing_weights"][0], "weight_missing:icon_detect/model.pt");
        }
    }

    #[tokio::test]
    async fn test_parse_unavailable_when_not_ready() {
        let dir = tempdir().unwrap();
        let loader = counting();
        let app = create_app(state(&dir, weights_missing(), loader.clone()));

        let (status, body) = send(app, Method::POST, "/parse", r#"{"base64_image": "QUJD"}"#).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "preflight_only");
        assert_eq!(body["reason"], "weights_missing");
        assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_parse_unavailable_reports_missing_files() {
        let dir = tempdir().unwrap();
        let readiness = Readiness::evaluate(
            ImportReport::default(),
            vec![MissingPrerequisite::RealRepo(String::new())],
            WeightCheck::default(),
        );
        let app = create_app(state(&dir, readiness, counting()));

        let (status, body) = send(app, Method::POST, "/parse/", "{}").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["reason"], "repo_missing");
        assert_eq!(body["missing_files"][0], "real_repo_missing:");
    }

    #[tokio::test]
    async fn test_parse_rejects_bad_bodies() {
        let dir = tempdir().unwrap();
        let loader = counting();
        let app = create_app(state(&dir, ready(), loader.clone()));

        let (status, body) = send(app.clone(), Method::POST, "/parse", "{broken").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_json");

        let (status, body) = send(app.clone(), Method::POST, "/parse", r#"{"base64_image": ""}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing_base64_image");

        let (status, body) = send(app.clone(), Method::POST, "/parse", "  \n").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_json");

        let (status, body) = send(app, Method::POST, "/parse", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing_base64_image");

        assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_parse_success() {
        let dir = tempdir().unwrap();
        let app = create_app(state(&dir, ready(), counting()));

        let (status, body) = send(app, Method::POST, "/parse", r#"{"image_base64": "QUJD"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["parsed_content_list"].as_array().unwrap().len(), 2);
        assert!(body["latency"].is_f64());
        assert!(body["latency_ms"].is_u64());
        assert_eq!(body["som_image_base64"], "");
    }

    #[tokio::test]
    async fn test_parse_accepts_full_size_screenshot() {
        let dir = tempdir().unwrap();
        let app = create_app(state(&dir, ready(), counting()));

        let payload = format!(r#"{{"base64_image": "{}"}}"#, "A".repeat(3 * 1024 * 1024));
        let (status, body) = send(app, Method::POST, "/parse", &payload).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_parser_loaded_once_under_concurrency() {
        let dir = tempdir().unwrap();
        let loader = counting();
        let app = create_app(state(&dir, ready(), loader.clone()));

        let requests = (0..8).map(|_| send(app.clone(), Method::POST, "/parse", r#"{"base64_image": "QUJD"}"#));
        for (status, _) in join_all(requests).await {
            assert_eq!(status, StatusCode::OK);
        }
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_init_failure_is_logged_and_retried() {
        let dir = tempdir().unwrap();
        let loader = Arc::new(FailingLoader { attempts: AtomicUsize::new(0) });
        let app = create_app(state(&dir, ready(), loader.clone()));

        for _ in 0..2 {
            let (status, body) = send(app.clone(), Method::POST, "/parse", r#"{"base64_image": "QUJD"}"#).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body["error"], "init_failed");
            assert_eq!(body["details"], "ModelInitError: model init failed: CUDA out of memory");
        }
        assert_eq!(loader.attempts.load(Ordering::SeqCst), 2);

        let log = std::fs::read_to_string(dir.path().join("parse_error.log")).unwrap();
        assert_eq!(log.matches("error=ModelInitError").count(), 2);
    }

    #[tokio::test]
    async fn test_parse_failure() {
        let dir = tempdir().unwrap();
        let app = create_app(state(&dir, ready(), Arc::new(BrokenLoader)));

        let (status, body) = send(app, Method::POST, "/parse", r#"{"base64_image": "QUJD"}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "parse_failed");
        assert_eq!(body["details"], "ParseError: model invocation failed: cannot identify image file");
        let log = std::fs::read_to_string(dir.path().join("parse_error.log")).unwrap();
        assert!(log.contains("cannot identify image file"));
    }

    #[tokio::test]
    async fn test_unknown_routes() {
        let dir = tempdir().unwrap();
        let app = create_app(state(&dir, ready(), counting()));

        let (status, body) = send(app.clone(), Method::GET, "/nope", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"ok": false, "error": "not found"}));

        let (status, _) = send(app.clone(), Method::GET, "/parse", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(app, Method::POST, "/probe", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
