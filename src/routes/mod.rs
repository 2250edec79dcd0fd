//! Route modules for the Redraft server

pub mod export;
pub mod health;
pub mod session;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Exported HTML carries inline data URLs
const JSON_BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Full application router: API routes, then static files
pub fn build_router(state: AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.config().upload.max_bytes);
    let public_dir = state.config().server.public_dir.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let uploads = Router::new()
        .route("/api/upload", post(upload::upload_pdf))
        .route("/api/session", post(session::create_session).get(session::get_session))
        .route("/api/session/images", post(session::insert_image))
        .layer(upload_limit);

    let api = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/export", post(export::export_html))
        .route("/api/session/status", get(session::get_status))
        .route("/api/session/pages/:number", get(session::get_page))
        .route("/api/session/content", put(session::update_content))
        .route("/api/session/navigate", post(session::navigate))
        .route("/api/session/spacing", post(session::set_spacing))
        .route("/api/session/export", post(export::export_session))
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT));

    Router::new()
        .merge(uploads)
        .merge(api)
        .fallback_service(ServeDir::new(public_dir))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use image::RgbImage;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::export::{ExportError, PageRasterizer};
    use crate::ocr::provider::{MockProvider, OcrProviderTrait};
    use crate::ocr::{OcrEngine, OcrOptions};
    use crate::test_support::pages_pdf;

    /// White bitmaps of the requested size
    struct BlankRasterizer;

    impl PageRasterizer for BlankRasterizer {
        fn rasterize(
            &self,
            _html: &str,
            width: f32,
            height: f32,
            scale: f32,
        ) -> std::result::Result<Vec<RgbImage>, ExportError> {
            Ok(vec![RgbImage::from_pixel(
                (width * scale).max(1.0) as u32,
                (height * scale).max(1.0) as u32,
                image::Rgb([255, 255, 255]),
            )])
        }
    }

    fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.upload.temp_dir = dir.path().join("uploads");
        config.server.public_dir = dir.path().join("public");
        config.layout.image_resolve_delay_ms = 5;

        let provider: Arc<dyn OcrProviderTrait> = Arc::new(MockProvider::new("recognized"));
        let engine = Arc::new(OcrEngine::new(vec![provider], OcrOptions::default()));
        (AppState::with_parts(config, engine, Arc::new(BlankRasterizer)), dir)
    }

    const BOUNDARY: &str = "redraft-test-boundary";

    fn multipart(field: &str, file_name: &str, content_type: &str, data: &[u8]) -> Body {
        let mut body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{f}\"; filename=\"{n}\"\r\nContent-Type: {c}\r\n\r\n",
            b = BOUNDARY,
            f = field,
            n = file_name,
            c = content_type
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        Body::from(body)
    }

    fn multipart_request(uri: &str, body: Body) -> Request<Body> {
        Request::post(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(body)
            .unwrap()
    }

    fn json_request(method: &str, uri: &str, json: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _dir) = test_state();
        let response = build_router(state)
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
        assert!(body["uptime"].as_f64().unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn test_upload_enriches_pages() {
        let (state, _dir) = test_state();
        let response = build_router(state)
            .oneshot(multipart_request(
                "/api/upload",
                multipart("pdf", "two.pdf", "application/pdf", &pages_pdf(2)),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["pageCount"], 2);
        assert_eq!(body["pages"][1]["pageNumber"], 2);
        assert_eq!(body["pages"][0]["ocrContent"], "recognized");
        assert!(body["pages"][0]["textContent"].as_str().unwrap().contains("Page 1 body"));
    }

    #[tokio::test]
    async fn test_upload_rejects_non_pdf_type() {
        let (state, dir) = test_state();
        let response = build_router(state)
            .oneshot(multipart_request(
                "/api/upload",
                multipart("pdf", "notes.txt", "text/plain", b"hello"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!dir.path().join("uploads").exists());
    }

    #[tokio::test]
    async fn test_upload_without_file() {
        let (state, _dir) = test_state();
        let response = build_router(state)
            .oneshot(multipart_request(
                "/api/upload",
                multipart("other", "x.pdf", "application/pdf", b"%PDF"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "No PDF file uploaded");
    }

    #[tokio::test]
    async fn test_upload_of_corrupt_pdf() {
        let (state, _dir) = test_state();
        let response = build_router(state)
            .oneshot(multipart_request(
                "/api/upload",
                multipart("pdf", "bad.pdf", "application/pdf", b"definitely not a pdf"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Failed to process PDF");
        assert!(body["details"].is_string());
    }

    #[tokio::test]
    async fn test_export_requires_content() {
        let (state, _dir) = test_state();
        let response = build_router(state)
            .oneshot(json_request("POST", "/api/export", serde_json::json!({})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "No HTML content provided");
    }

    #[tokio::test]
    async fn test_export_returns_pdf_attachment() {
        let (state, _dir) = test_state();
        let response = build_router(state)
            .oneshot(json_request(
                "POST",
                "/api/export",
                serde_json::json!({"htmlContent": "<div class=\"pdf-page\"><p>Hello</p></div>"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"exported.pdf\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_session_requires_upload() {
        let (state, _dir) = test_state();
        let response = build_router(state)
            .oneshot(Request::get("/api/session").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_session_edit_navigate_export() {
        let (state, _dir) = test_state();
        let app = build_router(state);

        let response = app
            .clone()
            .oneshot(multipart_request(
                "/api/session",
                multipart("pdf", "three.pdf", "application/pdf", &pages_pdf(3)),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["session"]["totalPages"], 3);
        assert_eq!(body["session"]["currentPage"], 1);
        assert!(body["html"].as_str().unwrap().contains("pdf-page"));

        let edited = "<div class=\"pdf-page\"><p>Edited first page</p></div>";
        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/session/content",
                serde_json::json!({"html": edited, "event": "keyUp"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["pages"][0]["edited"], true);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/session/navigate",
                serde_json::json!({"key": "ArrowRight"}),
            ))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["moved"], true);
        assert_eq!(body["session"]["currentPage"], 2);

        let response = app
            .clone()
            .oneshot(Request::get("/api/session/pages/1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(response).await["html"], edited);

        let response = app
            .clone()
            .oneshot(Request::get("/api/session/pages/9").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(Request::post("/api/session/export").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"edited-document.pdf\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[tokio::test]
    async fn test_spacing_toggles() {
        let (state, _dir) = test_state();
        let app = build_router(state);
        app.clone()
            .oneshot(multipart_request(
                "/api/session",
                multipart("pdf", "one.pdf", "application/pdf", &pages_pdf(1)),
            ))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/session/spacing", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["spacing"], "relaxed");

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/session/spacing",
                serde_json::json!({"spacing": "compact"}),
            ))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["spacing"], "compact");
    }

    #[tokio::test]
    async fn test_inserted_image_location() {
        let (state, _dir) = test_state();
        let mut png = Vec::new();
        RgbImage::from_pixel(900, 10, image::Rgb([1, 2, 3]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let response = build_router(state)
            .oneshot(multipart_request(
                "/api/session/images",
                multipart("image", "wide.png", "image/png", &png),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let location = json_body(response).await["location"].as_str().unwrap().to_string();
        assert!(location.starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn test_status_before_upload() {
        let (state, _dir) = test_state();
        let response = build_router(state)
            .oneshot(Request::get("/api/session/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["isLoading"], false);
        assert_eq!(body["progress"], 0);
    }
}
