//! API 路由模块。
//!
//! 提供前端文件管理器所需的文件系统 API。

pub mod error;
pub mod filesystem;
pub mod state;

use std::sync::Arc;

use axum::{
    Json, Router,
    http::{HeaderValue, Method, header},
    routing::get,
};
use filedeck_api_types::HealthCheckResponse;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use filesystem::create_filesystem_router;
pub use state::AppState;

/// 组装全部路由。跨域请求只对 `allowed_origins` 开放，列表为空时仅允许同源访问。
pub fn create_router(state: Arc<AppState>, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .merge(create_filesystem_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| {
            if origin.trim() == "*" {
                warn!("wildcard CORS origin is not supported, ignoring");
                return None;
            }
            match HeaderValue::from_str(origin.trim()) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(origin = %origin, error = %err, "ignoring invalid CORS origin");
                    None
                }
            }
        })
        .collect();
    info!(count = origins.len(), "cross-origin access configured");

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

async fn health() -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse::ok())
}
