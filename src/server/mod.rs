// Web服务器模块

pub mod error;
pub mod handlers;
pub mod state;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use state::AppState;
pub use websocket::WebSocketManager;

use axum::{
    http::HeaderValue,
    routing::{get, patch, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

/// 构建完整的 HTTP 路由
pub fn build_router(app_state: AppState) -> Router {
    let cors = cors_layer(&app_state.config.server.cors_origins);

    // 配置中间件层
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http()) // HTTP 请求日志
        .layer(cors);

    // API 路由
    let api_routes = Router::new()
        // 宿主上报 / 查询
        .route(
            "/downloads",
            post(handlers::report_created).get(handlers::list_downloads),
        )
        .route(
            "/downloads/:id",
            patch(handlers::report_changed).delete(handlers::report_erased),
        )
        .route(
            "/downloads/registry/:id",
            get(handlers::get_registry_download),
        )
        // 命令
        .route("/downloads/commands", post(handlers::run_command))
        // 选项
        .route(
            "/options",
            get(handlers::get_options).put(handlers::put_options),
        )
        // WebSocket
        .route("/ws", get(websocket::handle_websocket));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(handlers::health_check))
        .with_state(app_state)
        .layer(middleware)
}

/// 根据配置构建 CORS 层，`*` 表示允许任意源
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() || origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("忽略无效的 CORS 源: {}", origin);
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}
