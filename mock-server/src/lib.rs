use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};

/// Size of the `/large` body; spans several transport reads.
pub const LARGE_BODY_LEN: usize = 64 * 1024;

/// What `/echo` saw.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub content_type: Option<String>,
    pub body: String,
}

/// `/echo` calls per method.
pub type Hits = Arc<RwLock<HashMap<String, u64>>>;

pub fn app() -> Router {
    let hits: Hits = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route("/json", get(json_ok))
        .route("/text", get(text_ok))
        .route("/large", get(large))
        .route("/missing", get(missing))
        .route("/broken", get(broken))
        .route("/empty-error", get(empty_error))
        .route("/echo", any(echo))
        .route("/hits", get(hit_counts))
        .with_state(hits)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn json_ok() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn text_ok() -> &'static str {
    "hello world"
}

async fn large() -> String {
    "x".repeat(LARGE_BODY_LEN)
}

async fn missing() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "not found")
}

async fn broken() -> &'static str {
    "not-json"
}

async fn empty_error() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn echo(State(hits): State<Hits>, method: Method, headers: HeaderMap, body: String) -> Json<Echo> {
    *hits.write().await.entry(method.to_string()).or_default() += 1;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    Json(Echo {
        method: method.to_string(),
        content_type,
        body,
    })
}

async fn hit_counts(State(hits): State<Hits>) -> Json<HashMap<String, u64>> {
    Json(hits.read().await.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_serializes_to_json() {
        let echo = Echo {
            method: "POST".to_string(),
            content_type: Some("application/json".to_string()),
            body: "{}".to_string(),
        };
        let json = serde_json::to_value(&echo).unwrap();
        assert_eq!(json["method"], "POST");
        assert_eq!(json["content_type"], "application/json");
        assert_eq!(json["body"], "{}");
    }

    #[test]
    fn echo_accepts_missing_content_type() {
        let echo: Echo = serde_json::from_str(r#"{"method":"GET","content_type":null,"body":""}"#).unwrap();
        assert!(echo.content_type.is_none());
        assert!(echo.body.is_empty());
    }
}
