// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::usecases::enqueue_sync::{ChangeKind, SubjectEvent};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 变更事件请求DTO
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct SubjectEventDto {
    /// 源对象标识
    #[validate(length(min = 1, max = 512))]
    pub subject_id: String,

    pub change: ChangeKind,
}

impl From<SubjectEventDto> for SubjectEvent {
    fn from(dto: SubjectEventDto) -> Self {
        Self {
            subject_id: dto.subject_id,
            change: dto.change,
        }
    }
}
