//! HTTP router.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    upload::upload_handler,
    websocket::{AppState, ws_handler},
};

/// Room for multipart boundaries and the text fields around the file.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Build the HTTP surface: `/ws`, `/upload` and the download directory.
#[must_use]
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.uploads.max_size.saturating_add(MULTIPART_OVERHEAD);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);
    let config = state.manager.config();
    let downloads = ServeDir::new(&config.download_dir);
    let download_route = config.download_route.clone();

    Router::new()
        .route("/ws", get(ws_handler))
        .route(
            "/upload",
            post(upload_handler).layer(DefaultBodyLimit::max(body_limit)),
        )
        .nest_service(&download_route, downloads)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use tower::ServiceExt;
    use webssh_core::{ConnectParams, RemoteConnector, RemoteError, RemoteHandle};
    use webssh_session::{SessionConfig, SessionManager};

    use super::*;
    use crate::upload::UploadPolicy;

    struct Offline;

    #[async_trait]
    impl RemoteConnector for Offline {
        async fn connect(
            &self,
            _params: &ConnectParams,
        ) -> Result<Box<dyn RemoteHandle>, RemoteError> {
            Err(RemoteError::Connect("offline".into()))
        }
    }

    fn app(dir: &std::path::Path) -> Router {
        let config = SessionConfig {
            download_dir: dir.join("downloads"),
            ..SessionConfig::default()
        };
        let manager = Arc::new(SessionManager::new(Arc::new(Offline), config));
        let policy = UploadPolicy {
            max_size: 16,
            upload_dir: dir.join("uploads"),
            ..UploadPolicy::default()
        };
        create_router(AppState::new(manager, policy))
    }

    fn multipart(content_type: &str, content: &str) -> Request<Body> {
        let body = format!(
            "--XBOUNDARY\r\n\
             Content-Disposition: form-data; name=\"sessionId\"\r\n\r\n\
             no-such-session\r\n\
             --XBOUNDARY\r\n\
             Content-Disposition: form-data; name=\"remotePath\"\r\n\r\n\
             /tmp\r\n\
             --XBOUNDARY\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"notes.txt\"\r\n\
             Content-Type: {content_type}\r\n\r\n\
             {content}\r\n\
             --XBOUNDARY--\r\n"
        );
        Request::post("/upload")
            .header(
                header::CONTENT_TYPE,
                "multipart/form-data; boundary=XBOUNDARY",
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn error_of(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        json["error"].as_str().unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn test_upload_rejects_disallowed_type() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(multipart("application/x-sharedlib", "ELF"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_upload_rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(multipart("text/plain", &"x".repeat(64)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_upload_without_session_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(multipart("text/plain", "hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_of(response).await, "Not connected to an SSH server");

        // The staged copy is removed even when the relay fails.
        let mut staged = tokio::fs::read_dir(dir.path().join("uploads")).await.unwrap();
        assert!(staged.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_downloads_are_served() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("downloads")).await.unwrap();
        tokio::fs::write(dir.path().join("downloads/report.txt"), "42")
            .await
            .unwrap();

        let response = app(dir.path())
            .oneshot(
                Request::get("/downloads/report.txt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"42");
    }
}
