//! HTTP surface for the analysis service.
//!
//! One POST endpoint runs an analysis; a health endpoint reports which
//! pipeline stages are enabled. The caller is responsible for persisting or
//! displaying results and for authorization.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::analysis::Analyzer;
use crate::config::{Capabilities, Settings};

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<Analyzer>,
    pub capabilities: Capabilities,
}

impl AppState {
    pub fn new(settings: &Settings) -> Self {
        Self {
            analyzer: Arc::new(Analyzer::from_settings(settings)),
            capabilities: settings.capabilities(),
        }
    }
}

/// Start the web server.
pub async fn serve(settings: &Settings, host: &str, port: u16) -> anyhow::Result<()> {
    let state = AppState::new(settings);
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use crate::storage::MemoryStore;

    fn test_state(store: MemoryStore) -> AppState {
        AppState {
            analyzer: Arc::new(
                Analyzer::new("us-east-1").with_store(Arc::new(store)),
            ),
            capabilities: Capabilities {
                storage: true,
                ocr: false,
                vision: false,
            },
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn healthz_reports_capabilities() {
        let app = create_router(test_state(MemoryStore::new()));
        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["capabilities"]["storage"], true);
        assert_eq!(json["capabilities"]["ocr"], false);
    }

    #[tokio::test]
    async fn analyze_returns_masked_result() {
        let mut store = MemoryStore::new();
        store.insert("docs/note.txt", "text/plain", b"hello".to_vec());
        let app = create_router(test_state(store));

        let request = Request::post("/api/analyze")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"key":"docs/note.txt"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["documentKey"], "docs/note.txt");
        assert_eq!(json["metadata"]["textractSuccess"], false);
        assert!(json["queries"].get("ssn").is_none());
    }

    #[tokio::test]
    async fn analyze_missing_document_is_404() {
        let app = create_router(test_state(MemoryStore::new()));
        let request = Request::post("/api/analyze")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"key":"nope.pdf"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("nope.pdf"));
    }

    #[tokio::test]
    async fn analyze_rejects_empty_key() {
        let app = create_router(test_state(MemoryStore::new()));
        let request = Request::post("/api/analyze")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"key":""}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn analyze_honors_preview_flag() {
        let mut store = MemoryStore::new();
        store.insert("doc.txt", "text/plain", b"x".to_vec());
        let app = create_router(test_state(store));

        let request = Request::post("/api/analyze")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"key":"doc.txt","previewOnly":true}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        let json = body_json(response).await;
        assert_eq!(json["metadata"]["previewMode"], true);
        assert_eq!(json["metadata"]["visionFusionUsed"], false);
    }
}
