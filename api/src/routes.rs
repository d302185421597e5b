use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Create the main application router with all routes and middleware
#[tracing::instrument(skip(state))]
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/api/creators", get(handlers::creators::list_creators))
        .route("/api/download", get(handlers::download::download_file))
        .route(
            "/api/config",
            get(handlers::recorder::get_config).post(handlers::recorder::add_url),
        );

    // Operational endpoints
    let ops_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::metrics_handler));

    Router::new()
        .merge(api_routes)
        .merge(ops_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use common::config::Settings;
    use common::errors::TransferError;
    use common::models::{RemoteEntry, RemoteStat, TransportConfig};
    use common::sftp::{Connector, RemoteFile, RemoteSession};
    use common::transfer::{TransferLimits, TransferService};
    use mockall::mock;
    use std::sync::Arc;
    use tower::ServiceExt;

    mock! {
        pub Transport {}

        #[async_trait]
        impl Connector for Transport {
            async fn connect(
                &self,
                config: &TransportConfig,
            ) -> Result<Box<dyn RemoteSession>, TransferError>;
        }
    }

    mock! {
        pub Session {}

        #[async_trait]
        impl RemoteSession for Session {
            async fn read_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, TransferError>;
            async fn stat(&mut self, path: &str) -> Result<RemoteStat, TransferError>;
            async fn open(&mut self, path: &str) -> Result<Box<dyn RemoteFile>, TransferError>;
            async fn append(&mut self, path: &str, data: &[u8]) -> Result<(), TransferError>;
            async fn close(&mut self) -> Result<(), TransferError>;
        }
    }

    fn settings(password: &str) -> Settings {
        let mut settings = Settings::default();
        settings.sftp.password = password.to_string();
        settings
    }

    fn app(connector: MockTransport, settings: Settings) -> Router {
        let transfer = TransferService::new(
            Arc::new(connector),
            settings.transport(),
            TransferLimits::default(),
        );
        create_router(AppState::new(settings, transfer, None))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn download_rejects_traversal_before_connecting() {
        let mut connector = MockTransport::new();
        connector.expect_connect().times(0);

        let (status, json) = send(
            app(connector, settings("secret")),
            get("/api/download?path=/data/../etc/passwd"),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid file path");
    }

    #[tokio::test]
    async fn download_rejects_home_reference() {
        let mut connector = MockTransport::new();
        connector.expect_connect().times(0);

        let (status, _) = send(
            app(connector, settings("secret")),
            get("/api/download?path=~/secrets.ts"),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn download_requires_path() {
        let mut connector = MockTransport::new();
        connector.expect_connect().times(0);

        let (status, json) = send(app(connector, settings("secret")), get("/api/download")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "File path is required");
    }

    #[tokio::test]
    async fn download_without_password_is_server_error() {
        let mut connector = MockTransport::new();
        connector.expect_connect().times(0);

        let (status, json) = send(
            app(connector, settings("")),
            get("/api/download?path=/data/alice-1/show.ts"),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["error"]
            .as_str()
            .unwrap()
            .contains("SSH_PASSWORD not configured"));
    }

    #[tokio::test]
    async fn download_connection_failure_is_service_unavailable() {
        let mut connector = MockTransport::new();
        connector
            .expect_connect()
            .times(1)
            .returning(|_| Err(TransferError::Connection("refused".to_string())));

        let (status, json) = send(
            app(connector, settings("secret")),
            get("/api/download?path=/data/alice-1/show.ts"),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"], "Server connection error - please try again");
        assert!(json.get("details").is_none());
    }

    #[tokio::test]
    async fn download_missing_file_is_not_found_with_details_in_development() {
        let mut connector = MockTransport::new();
        connector.expect_connect().times(1).returning(|_| {
            let mut session = MockSession::new();
            session
                .expect_stat()
                .returning(|path| Err(TransferError::NotFound(path.to_string())));
            session.expect_close().times(1).returning(|| Ok(()));
            Ok(Box::new(session) as Box<dyn RemoteSession>)
        });

        let mut settings = settings("secret");
        settings.environment = common::config::RuntimeEnvironment::Development;

        let (status, json) = send(
            app(connector, settings),
            get("/api/download?path=/data/alice-1/missing.ts"),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "File not found on server");
        assert!(json["details"].as_str().unwrap().contains("missing.ts"));
    }

    #[tokio::test]
    async fn creators_failure_returns_error_message() {
        let mut connector = MockTransport::new();
        connector.expect_connect().times(0);

        let (status, json) = send(app(connector, settings("")), get("/api/creators")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["error"].as_str().unwrap().contains("SSH_PASSWORD"));
    }

    #[tokio::test]
    async fn add_url_rejects_invalid_url_without_connecting() {
        let mut connector = MockTransport::new();
        connector.expect_connect().times(0);

        let request = Request::builder()
            .method("POST")
            .uri("/api/config")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"url":"https://example.com/live"}"#))
            .unwrap();

        let (status, json) = send(app(connector, settings("secret")), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid TikTok live URL format");
    }

    #[tokio::test]
    async fn add_url_appends_recorder_line() {
        let mut connector = MockTransport::new();
        connector.expect_connect().times(1).returning(|_| {
            let mut session = MockSession::new();
            session
                .expect_append()
                .withf(|path, data| {
                    path.to_string() == "/home/DouyinLiveRecorder/config/URL_config.ini"
                        && data.to_vec()
                            == b"\nhttps://www.tiktok.com/@some.user/live,Animateur: some_user-some.user"
                                .to_vec()
                })
                .times(1)
                .returning(|_, _| Ok(()));
            session.expect_close().times(1).returning(|| Ok(()));
            Ok(Box::new(session) as Box<dyn RemoteSession>)
        });

        let request = Request::builder()
            .method("POST")
            .uri("/api/config")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"url":"https://www.tiktok.com/@some.user/live"}"#,
            ))
            .unwrap();

        let (status, json) = send(app(connector, settings("secret")), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["displayName"], "some_user");
        assert_eq!(json["identifier"], "some.user");
        assert_eq!(json["url"], "https://www.tiktok.com/@some.user/live");
    }

    #[tokio::test]
    async fn health_is_ok() {
        let connector = MockTransport::new();
        let response = app(connector, settings("secret"))
            .oneshot(get("/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
