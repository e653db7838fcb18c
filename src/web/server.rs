//! Web 服务器
//!
//! 组装 axum 路由并在停止信号到来时优雅关闭

use super::{handlers, WebAppState};
use crate::config::WebConfig;
use crate::error::Result;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// 创建全部路由
pub fn create_router(state: WebAppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/apis", post(handlers::create_target))
        .route("/apis/data", get(handlers::list_targets))
        .route("/apis/{id}", post(handlers::update_target))
        .route("/apis/{id}/delete", post(handlers::delete_target))
        .route("/apis/{id}/check", post(handlers::check_target))
        .route("/logs", get(handlers::list_logs))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Web 服务器
pub struct WebServer {
    config: WebConfig,
    state: WebAppState,
}

impl WebServer {
    /// 创建新的 Web 服务器
    pub fn new(config: WebConfig, state: WebAppState) -> Self {
        Self { config, state }
    }

    /// 监听地址
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.bind_address, self.config.port)
    }

    /// 启动服务器，收到停止信号后关闭
    pub async fn start(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let address = self.address();
        let listener = TcpListener::bind(&address).await?;
        info!("Web API 已启动: http://{}", address);

        axum::serve(listener, create_router(self.state))
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Web API 正在关闭");
            })
            .await?;

        Ok(())
    }
}
