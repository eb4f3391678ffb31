// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::error_type::ErrorType;
use super::metadata::MetadataSnapshot;

/// 同步任务
///
/// 一个主体的一次元数据传播。重试元数据保存在 `payload` 中并随任务持久化，
/// 进程在重试中途崩溃后可以从存储中恢复正确的重试进度。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// 任务唯一标识符
    pub id: Uuid,
    /// 上游主体标识
    pub subject_id: String,
    /// 元数据快照与重试元数据
    pub payload: JobPayload,
    /// 队列中的状态
    pub status: JobStatus,
    /// 入队时间
    pub enqueued_at: DateTime<Utc>,
    /// 最早可被租用的时间
    pub available_at: DateTime<Utc>,
    /// 当前租约令牌
    pub lease_token: Option<Uuid>,
    /// 租约过期时间
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
}

/// 任务负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct JobPayload {
    pub metadata: MetadataSnapshot,
    #[serde(default)]
    pub retry: RetryMetadata,
}

/// 重试元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RetryMetadata {
    /// 已失败次数
    pub retry_count: u32,
    /// 下次允许尝试的时间
    pub next_retry_at: Option<DateTime<Utc>>,
    /// 最近一次失败的错误类型
    pub last_error_type: Option<ErrorType>,
    /// 最近一次失败的错误信息
    pub last_error_message: Option<String>,
    /// 最近一次因熔断打开被退回的时间
    #[serde(default)]
    pub last_short_circuit_at: Option<DateTime<Utc>>,
}

/// 任务状态
///
/// 已确认的任务直接从队列删除，进入死信队列的任务同样从队列删除，
/// 因此队列中只存在这两种状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// 等待租用
    #[default]
    Pending,
    /// 已被租用，尚未确认
    Leased,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Leased => write!(f, "leased"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "leased" => Ok(JobStatus::Leased),
            _ => Err(()),
        }
    }
}

impl Job {
    /// 创建新的待处理任务
    ///
    /// # 参数
    ///
    /// * `subject_id` - 上游主体标识
    /// * `metadata` - 元数据快照
    pub fn new(subject_id: impl Into<String>, metadata: MetadataSnapshot) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            subject_id: subject_id.into(),
            payload: JobPayload {
                metadata,
                retry: RetryMetadata::default(),
            },
            status: JobStatus::Pending,
            enqueued_at: now,
            available_at: now,
            lease_token: None,
            lease_expires_at: None,
            updated_at: now,
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.payload.retry.retry_count
    }

    /// 是否已到允许尝试的时间
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.payload
            .retry
            .next_retry_at
            .is_none_or(|at| at <= now)
    }

    /// 记录一次失败，返回新的重试次数
    pub fn record_failure(
        &mut self,
        error_type: ErrorType,
        message: impl Into<String>,
        next_retry_at: DateTime<Utc>,
    ) -> u32 {
        let retry = &mut self.payload.retry;
        retry.retry_count += 1;
        retry.next_retry_at = Some(next_retry_at);
        retry.last_error_type = Some(error_type);
        retry.last_error_message = Some(message.into());
        retry.retry_count
    }
}
