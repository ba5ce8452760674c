pub mod index_metrics;
pub mod prompts;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::config::Settings;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
}

pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/prompts/astock", post(prompts::astock_handler))
        .route("/api/prompts/forex", post(prompts::forex_handler))
        .route("/api/index/metrics", post(index_metrics::handler))
        .route("/health", get(health_check))
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app(settings: Settings) -> Router {
        create_router().with_state(Arc::new(AppState {
            settings: Arc::new(settings),
        }))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let response = app(Settings::default())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn forex_prompt_is_served_from_merged_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let forex_dir = dir.path().join("forex");
        std::fs::create_dir_all(&forex_dir).unwrap();
        std::fs::write(
            forex_dir.join("forex_merged.jsonl"),
            r#"{"Meta Data":{"2. Symbol":"EURUSD"},"Time Series (Daily)":{"2025-10-30":{"1. buy price":"1.16","4. sell price":"1.155"},"2025-10-31":{"1. buy price":"1.154","4. sell price":"1.153"}}}"#,
        )
        .unwrap();

        let settings = Settings {
            data_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };
        let response = app(settings)
            .oneshot(post_json(
                "/api/prompts/forex",
                r#"{"today_date":"2025-10-31","signature":"fx-agent"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["prompt"].as_str().unwrap().contains(r#"{"EURUSD_price":1.154}"#));
    }

    #[tokio::test]
    async fn blank_signature_is_a_bad_request() {
        let response = app(Settings::default())
            .oneshot(post_json(
                "/api/prompts/astock",
                r#"{"today_date":"2025-10-31","signature":" "}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_index_file_is_not_found() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings = Settings {
            data_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };
        let response = app(settings)
            .oneshot(post_json("/api/index/metrics", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
