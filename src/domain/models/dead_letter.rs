// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error_type::ErrorType;
use super::job::Job;

/// 死信条目
///
/// 创建后不再修改，只能被显式清理或按保留期清理删除。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: Uuid,
    /// 原任务ID
    pub job_id: Uuid,
    pub subject_id: String,
    /// 原任务的完整序列化内容，原样保存
    pub job_snapshot: String,
    pub error_type: ErrorType,
    pub error_message: String,
    pub failed_at: DateTime<Utc>,
    pub retry_count_at_failure: u32,
}

impl DeadLetterEntry {
    /// 从失败任务创建死信条目
    pub fn from_job(
        job: &Job,
        error_type: ErrorType,
        error_message: impl Into<String>,
        failed_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            job_id: job.id,
            subject_id: job.subject_id.clone(),
            job_snapshot: serde_json::to_string(job)?,
            error_type,
            error_message: error_message.into(),
            failed_at,
            retry_count_at_failure: job.retry_count(),
        })
    }

    /// 还原原始任务
    pub fn original_job(&self) -> Result<Job, serde_json::Error> {
        serde_json::from_str(&self.job_snapshot)
    }
}

/// 按错误类型聚合的死信数量
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorTypeCount {
    pub error_type: String,
    pub count: u64,
}
