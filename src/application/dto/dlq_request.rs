// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// 死信清理请求DTO
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct PurgeDlqRequestDto {
    /// 清理多少天以前的死信
    #[validate(range(min = 0, max = 36500))]
    pub older_than_days: i64,
}

/// 故障恢复请求DTO
///
/// 未给出窗口时使用最近一次已结束的故障；窗口的两端必须同时给出。
/// 死信分页查询参数
#[derive(Debug, Default, Deserialize, Serialize, Validate)]
pub struct ListDlqQueryDto {
    #[validate(range(min = 1, max = 500))]
    pub limit: Option<u64>,

    pub offset: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize, Validate)]
#[validate(schema(function = "validate_window"))]
pub struct RecoverDlqRequestDto {
    /// 允许恢复的错误类型名称
    pub error_types: Option<Vec<String>>,

    pub started_at: Option<DateTime<Utc>>,

    pub ended_at: Option<DateTime<Utc>>,
}

fn validate_window(dto: &RecoverDlqRequestDto) -> Result<(), ValidationError> {
    match (dto.started_at, dto.ended_at) {
        (None, None) => Ok(()),
        (Some(start), Some(end)) if start <= end => Ok(()),
        (Some(_), Some(_)) => Err(ValidationError::new("window_order")),
        _ => Err(ValidationError::new("window_incomplete")),
    }
}
