// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::dto::dlq_request::{
    ListDlqQueryDto, PurgeDlqRequestDto, RecoverDlqRequestDto,
};
use crate::application::usecases::operations::{AdminService, StatusReport};
use crate::application::usecases::recover_outage_jobs::{
    parse_error_types, OutageWindow, RecoveryReport,
};
use crate::domain::models::dead_letter::DeadLetterEntry;
use crate::presentation::errors::AppError;
use crate::workers::sync_worker::DrainReport;
use axum::{extract::Query, Extension, Json};
use serde_json::{json, Value};
use std::sync::Arc;
use validator::Validate;

/// 引擎状态
pub async fn get_status(
    Extension(admin): Extension<Arc<AdminService>>,
) -> Result<Json<StatusReport>, AppError> {
    Ok(Json(admin.status().await?))
}

/// 清空队列
pub async fn clear_queue(
    Extension(admin): Extension<Arc<AdminService>>,
) -> Result<Json<Value>, AppError> {
    let removed = admin.clear_queue().await?;
    Ok(Json(json!({ "removed": removed })))
}

/// 清空死信队列
pub async fn list_dlq(
    Extension(admin): Extension<Arc<AdminService>>,
    Query(query): Query<ListDlqQueryDto>,
) -> Result<Json<Vec<DeadLetterEntry>>, AppError> {
    query.validate()?;
    let entries = admin
        .list_dlq(query.limit.unwrap_or(50), query.offset.unwrap_or(0))
        .await?;
    Ok(Json(entries))
}

pub async fn clear_dlq(
    Extension(admin): Extension<Arc<AdminService>>,
) -> Result<Json<Value>, AppError> {
    let removed = admin.clear_dlq().await?;
    Ok(Json(json!({ "removed": removed })))
}

/// 按天数清理死信
pub async fn purge_dlq(
    Extension(admin): Extension<Arc<AdminService>>,
    Json(request): Json<PurgeDlqRequestDto>,
) -> Result<Json<Value>, AppError> {
    request.validate()?;
    let removed = admin.purge_dlq(request.older_than_days).await?;
    Ok(Json(json!({ "removed": removed })))
}

/// 处理队列直到为空
pub async fn drain_queue(
    Extension(admin): Extension<Arc<AdminService>>,
) -> Result<Json<DrainReport>, AppError> {
    Ok(Json(admin.drain().await?))
}

/// 恢复故障期间的死信
pub async fn recover_dlq(
    Extension(admin): Extension<Arc<AdminService>>,
    Json(request): Json<RecoverDlqRequestDto>,
) -> Result<Json<RecoveryReport>, AppError> {
    request.validate()?;

    let error_types = request
        .error_types
        .as_deref()
        .map(parse_error_types)
        .transpose()?;
    let window = match (request.started_at, request.ended_at) {
        (Some(started_at), Some(ended_at)) => Some(OutageWindow {
            started_at,
            ended_at,
        }),
        _ => None,
    };

    Ok(Json(admin.recover(error_types, window).await?))
}
