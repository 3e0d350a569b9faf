use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use omni_core::ScreenParser;
use omni_parser::models::mock::MOCK_MODEL_NAME;
use crate::handlers::{error_response, ParseResponse};

pub async fn probe() -> Json<Value> {
    Json(json!({
        "ok": true,
        "model": MOCK_MODEL_NAME,
        "gpu": "unknown",
        "message": "Omniparser API ready (mock)",
    }))
}

/// The body is read and thrown away; the answer never depends on it.
pub async fn parse(State(parser): State<Arc<dyn ScreenParser>>, _body: Bytes) -> Response {
    let started = Instant::now();
    match parser.parse("").await {
        Ok(output) => (StatusCode::OK, Json(ParseResponse::new(output, started.elapsed()))).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "parse_failed", Some(e.summary())),
    }
}
