// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use validator::ValidationErrors;

use crate::application::usecases::enqueue_sync::EnqueueError;
use crate::application::usecases::operations::OperationError;
use crate::application::usecases::recover_outage_jobs::RecoveryError;

/// 应用错误类型
///
/// 封装所有可能的应用层错误，提供统一的错误处理接口
#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        if self.0.downcast_ref::<ValidationErrors>().is_some() {
            return StatusCode::BAD_REQUEST;
        }
        if let Some(err) = self.0.downcast_ref::<RecoveryError>() {
            return recovery_status(err);
        }
        match self.0.downcast_ref::<OperationError>() {
            Some(OperationError::Recovery(err)) => return recovery_status(err),
            Some(OperationError::InvalidRetention) => return StatusCode::BAD_REQUEST,
            Some(_) => return StatusCode::INTERNAL_SERVER_ERROR,
            None => {}
        }
        match self.0.downcast_ref::<EnqueueError>() {
            Some(EnqueueError::Source(_)) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn recovery_status(err: &RecoveryError) -> StatusCode {
    match err {
        RecoveryError::PermanentErrorType(_)
        | RecoveryError::InvalidErrorType(_)
        | RecoveryError::InvalidWindow => StatusCode::BAD_REQUEST,
        RecoveryError::NoCompletedOutage => StatusCode::NOT_FOUND,
        RecoveryError::Unhealthy(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {:#}", self.0);
        }
        let body = Json(json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
