//! Web服务器

use axum::{
    routing::{get, post},
    Router,
};
use ifr_core::Result;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::handlers::{
    api_root, get_confirm_page, get_export_queue, get_repair_queue, get_reporting_queue, health,
    post_confirm_scan_types, post_register, post_repair, post_report, post_trigger_sync, ApiState,
};

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: ApiState) -> Self {
        let app = Self::create_app(state);
        Self { addr, app }
    }

    fn create_app(state: ApiState) -> Router {
        Router::new()
            // 根路径
            .route("/", get(api_root))
            // 健康检查
            .route("/health", get(health))
            // API路由
            .nest("/api/v1", api_routes())
            .with_state(state)
            // 全局中间件
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(
                        CorsLayer::new()
                            .allow_origin(Any)
                            .allow_methods(Any)
                            .allow_headers(Any),
                    ),
            )
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .await
            .map_err(|e| ifr_core::IfrError::Internal(format!("Web server failed: {}", e)))?;

        Ok(())
    }
}

/// API v1 路由
fn api_routes() -> Router<ApiState> {
    Router::new()
        .route("/queues/reporting", get(get_reporting_queue))
        .route("/queues/export", get(get_export_queue))
        .route("/queues/repair", get(get_repair_queue))
        .route("/reports", post(post_report))
        .route("/repairs", post(post_repair))
        .route("/scan-types/unconfirmed", get(get_confirm_page))
        .route("/scan-types/confirm", post(post_confirm_scan_types))
        .route("/sync", post(post_trigger_sync))
        .route("/register", post(post_register))
}
