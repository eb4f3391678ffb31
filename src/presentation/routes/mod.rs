// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::usecases::enqueue_sync::SyncEnqueuer;
use crate::application::usecases::operations::AdminService;
use crate::presentation::handlers::{admin_handler, sync_handler};
use axum::{
    routing::{delete, get, post},
    Extension, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// 创建应用路由
///
/// # 参数
///
/// * `enqueuer` - 事件入队用例
/// * `admin` - 运维用例
///
/// # 返回值
///
/// 返回配置好的路由
pub fn routes(enqueuer: Arc<SyncEnqueuer>, admin: Arc<AdminService>) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/v1/version", get(version));

    let api_routes = Router::new()
        .route("/v1/events", post(sync_handler::submit_event))
        .route("/v1/status", get(admin_handler::get_status))
        .route("/v1/queue", delete(admin_handler::clear_queue))
        .route("/v1/queue/drain", post(admin_handler::drain_queue))
        .route(
            "/v1/dlq",
            get(admin_handler::list_dlq).delete(admin_handler::clear_dlq),
        )
        .route("/v1/dlq/purge", post(admin_handler::purge_dlq))
        .route("/v1/dlq/recover", post(admin_handler::recover_dlq))
        .layer(Extension(enqueuer))
        .layer(Extension(admin));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
}

/// 健康检查端点
///
/// # 返回值
///
/// 返回"OK"字符串
pub async fn health_check() -> &'static str {
    "OK"
}

/// 版本信息端点
pub async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
