// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::dto::event_request::SubjectEventDto;
use crate::application::usecases::enqueue_sync::{SubmitOutcome, SyncEnqueuer};
use crate::presentation::errors::AppError;
use axum::{http::StatusCode, Extension, Json};
use std::sync::Arc;
use validator::Validate;

/// 宿主应用的变更事件入口
pub async fn submit_event(
    Extension(enqueuer): Extension<Arc<SyncEnqueuer>>,
    Json(request): Json<SubjectEventDto>,
) -> Result<(StatusCode, Json<SubmitOutcome>), AppError> {
    request.validate()?;

    let outcome = enqueuer.handle_event(&request.into()).await?;
    let status = match outcome {
        SubmitOutcome::Ignored => StatusCode::OK,
        _ => StatusCode::ACCEPTED,
    };
    Ok((status, Json(outcome)))
}
