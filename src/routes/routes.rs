//! Defines routes for the upload gateway.
//!
//! ## Structure
//! - **Files**
//!   - `POST   /files` — upload, kind taken from the content type
//!   - `POST   /files/kind/{kind}` — upload that must match `{kind}`
//!   - `GET    /files/{file_id}` — metadata document
//!   - `DELETE /files/{file_id}` — delete upload, variants and metadata
//!   - `POST   /files/{file_id}/crop` — derive a crop (`?dimensions=WxH&offset=X,Y`)
//!
//! - **Staling**
//!   - `POST   /stale` — upload that is deleted after a delay
//!   - `POST   /stale/persist/{file_id}`, `/stale/keep/{file_id}` — cancel that deletion
//!
//! - **Objects**
//!   - `GET    /objects/{*key}` — raw blob; the wildcard allows nested keys
//!
//! Every route answers CORS preflights and allows any origin, so browser
//! front-ends can call the gateway directly.

use crate::{
    handlers::{
        file_handlers::{
            crop_file, delete_file, get_file, get_object, upload_file, upload_file_of_kind,
        },
        health_handlers::{healthz, readyz},
        stale_handlers::{persist_file, stale_file},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

/// Room for multipart boundaries and the `fileName` field on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build and return the router for all gateway routes.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/files", post(upload_file))
        .route("/files/kind/{kind}", post(upload_file_of_kind))
        .route("/files/{file_id}", get(get_file).delete(delete_file))
        .route("/files/{file_id}/crop", post(crop_file))
        .route("/stale", post(stale_file))
        .route("/stale/persist/{file_id}", post(persist_file))
        .route("/stale/keep/{file_id}", post(persist_file))
        .route("/objects/{*key}", get(get_object))
}

/// The complete application: routes, body limit, CORS and state.
pub fn app(state: AppState) -> Router {
    let body_limit = state.max_file_size.saturating_add(MULTIPART_OVERHEAD);
    routes()
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        allocator::{DEFAULT_MAX_ATTEMPTS, IdAllocator},
        backend::MemoryBlobStore,
        file_service::FileService,
        transform::tests::test_image,
    };
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode, header},
        response::Response,
    };
    use image::ImageFormat;
    use serde_json::Value;
    use std::{sync::Arc, time::Duration};
    use tower::util::ServiceExt;

    const BOUNDARY: &str = "gateway-test-boundary";

    fn test_app(max_file_size: usize) -> (Router, AppState) {
        let store = Arc::new(MemoryBlobStore::new());
        let files = FileService::new(
            store.clone(),
            IdAllocator::new(store, DEFAULT_MAX_ATTEMPTS),
            "http://localhost:3000/objects",
        );
        let state = AppState::new(files, max_file_size, Duration::from_secs(3600));
        (app(state.clone()), state)
    }

    fn multipart(
        uri: &str,
        filename: &str,
        content_type: &str,
        data: &[u8],
        custom_name: Option<&str>,
    ) -> Request<Body> {
        let mut body = Vec::new();
        if let Some(name) = custom_name {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"fileName\"\r\n\r\n{name}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn upload_png(app: &Router) -> Value {
        let png = test_image(40, 30, ImageFormat::Png);
        let response = app
            .clone()
            .oneshot(multipart("/files", "photo.png", "image/png", &png, Some("avatar")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        json_body(response).await
    }

    #[tokio::test]
    async fn health_endpoints() {
        let (app, _) = test_app(1024);
        let response = app.clone().oneshot(request(Method::GET, "/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(request(Method::GET, "/readyz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["checks"]["backend"]["ok"], true);
        assert_eq!(body["pending_staling_jobs"], 0);
    }

    #[tokio::test]
    async fn answers_cors_preflight_from_any_origin() {
        let (app, _) = test_app(1024);
        let preflight = Request::builder()
            .method(Method::OPTIONS)
            .uri("/files")
            .header(header::ORIGIN, "https://app.example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(preflight).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));

        let cross_origin = Request::builder()
            .uri("/healthz")
            .header(header::ORIGIN, "https://app.example.com")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(cross_origin).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn extractor_rejections_use_the_json_error_body() {
        let (app, _) = test_app(1024);

        let response = app
            .clone()
            .oneshot(multipart("/files/kind/bogus", "a.txt", "text/plain", b"x", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["status"], 400);
        assert!(body["error"].as_str().unwrap().contains("bogus"));

        let response = app
            .oneshot(request(Method::POST, "/files/some-id/crop"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["status"], 400);
        assert!(body["error"].as_str().unwrap().contains("dimensions"));
    }

    #[tokio::test]
    async fn upload_crop_describe_delete() {
        let (app, _) = test_app(1 << 20);
        let doc = upload_png(&app).await;
        let file_id = doc["file_id"].as_str().unwrap().to_string();
        assert_eq!(doc["filename"], "avatar.png");
        assert!(doc["url"].as_str().unwrap().contains(&file_id));
        assert_eq!(doc["variants"], serde_json::json!({}));

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                &format!("/files/{file_id}/crop?dimensions=10x10&offset=5,5"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let created = json_body(response).await;
        assert_eq!(created["variant_key"], "10x10_offset5x5");

        let response = app
            .clone()
            .oneshot(request(Method::GET, &format!("/files/{file_id}")))
            .await
            .unwrap();
        let described = json_body(response).await;
        assert_eq!(
            described["variants"]["crop"]["10x10_offset5x5"]["url"],
            created["url"]
        );

        let response = app
            .clone()
            .oneshot(request(Method::DELETE, &format!("/files/{file_id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(request(Method::GET, &format!("/files/{file_id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn serves_raw_objects_under_their_url() {
        let (app, _) = test_app(1024);
        let response = app
            .clone()
            .oneshot(multipart("/files", "notes.txt", "text/plain", b"hello", None))
            .await
            .unwrap();
        let doc = json_body(response).await;
        let path = doc["url"]
            .as_str()
            .unwrap()
            .trim_start_matches("http://localhost:3000")
            .to_string();

        let response = app.oneshot(request(Method::GET, &path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(
            response.headers()[header::ETAG],
            "\"5d41402abc4b2a76b9719d911017c592\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"hello");
    }

    #[tokio::test]
    async fn rejects_bad_uploads() {
        let (app, _) = test_app(16);

        let response = app
            .clone()
            .oneshot(multipart("/files", "a.exe", "application/x-msdownload", b"MZ", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(multipart("/files/kind/videos", "a.txt", "text/plain", b"x", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(multipart("/files", "big.txt", "text/plain", &[b'x'; 64], None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn crop_errors_map_to_client_statuses() {
        let (app, _) = test_app(1 << 20);
        let doc = upload_png(&app).await;
        let file_id = doc["file_id"].as_str().unwrap();

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                &format!("/files/{file_id}/crop?dimensions=100x100"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(request(Method::POST, &format!("/files/{file_id}/crop?dimensions=ax1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(request(Method::POST, "/files/nope/crop?dimensions=1x1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(multipart("/files", "doc.pdf", "application/pdf", b"%PDF", None))
            .await
            .unwrap();
        let pdf = json_body(response).await;
        let response = app
            .oneshot(request(
                Method::POST,
                &format!("/files/{}/crop?dimensions=1x1", pdf["file_id"].as_str().unwrap()),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn staled_upload_can_be_kept_once() {
        let (app, state) = test_app(1024);
        let response = app
            .clone()
            .oneshot(multipart("/stale", "clip.mp4", "video/mp4", b"\x00\x00", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let doc = json_body(response).await;
        let file_id = doc["file_id"].as_str().unwrap();
        assert!(state.scheduler.is_pending(file_id));

        let response = app
            .clone()
            .oneshot(request(Method::POST, &format!("/stale/keep/{file_id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!state.scheduler.is_pending(file_id));

        let response = app
            .clone()
            .oneshot(request(Method::POST, &format!("/stale/persist/{file_id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(request(Method::GET, &format!("/files/{file_id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
