// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::dead_letter::DeadLetterEntry;
use crate::domain::models::job::Job;
use crate::domain::models::metadata::MetadataSnapshot;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::DbErr;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// 记录未找到
    #[error("Record not found")]
    NotFound,
    /// 租约已失效（过期后被其他进程重新租用）
    #[error("Lease lost for job {0}")]
    LeaseLost(Uuid),
    /// 并发写入冲突
    #[error("Concurrent update conflict on {0}")]
    Conflict(&'static str),
}

/// 队列统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// 当前可租用的任务数
    pub pending: u64,
    /// 等待重试时间到达的任务数
    pub delayed: u64,
    /// 已被租用的任务数
    pub leased: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.delayed + self.leased
    }
}

/// 任务仓库特质
///
/// 每个方法对应存储上的一次原子操作。确认、退回和移除都以租约令牌为条件，
/// 租约过期后被其他进程重新租用的任务不会被旧的持有者修改。
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 写入新任务
    async fn create(&self, job: &Job) -> Result<Job, RepositoryError>;
    /// 根据ID查找任务
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>, RepositoryError>;
    /// 尝试租用一个可用任务（包括租约已过期的任务）
    async fn try_lease(
        &self,
        now: DateTime<Utc>,
        lease_duration: Duration,
    ) -> Result<Option<Job>, RepositoryError>;
    /// 确认并删除任务
    async fn ack(&self, id: Uuid, lease_token: Uuid) -> Result<(), RepositoryError>;
    /// 写回负载并退回队列
    async fn release(
        &self,
        job: &Job,
        available_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    /// 移除任务，调用方负责写入死信
    async fn remove(&self, id: Uuid, lease_token: Uuid) -> Result<(), RepositoryError>;
    /// 在同一事务中移除任务并写入死信
    async fn move_to_dead_letter(
        &self,
        job: &Job,
        entry: &DeadLetterEntry,
    ) -> Result<(), RepositoryError>;
    /// 查找某主体的未租用任务
    async fn find_pending_by_subject(
        &self,
        subject_id: &str,
    ) -> Result<Option<Job>, RepositoryError>;
    /// 某主体是否有任务在队列中（任意状态）
    async fn exists_by_subject(&self, subject_id: &str) -> Result<bool, RepositoryError>;
    /// 替换未租用任务的元数据快照，保留重试元数据
    async fn replace_metadata(
        &self,
        id: Uuid,
        metadata: &MetadataSnapshot,
    ) -> Result<bool, RepositoryError>;
    /// 按状态统计
    async fn stats(&self, now: DateTime<Utc>) -> Result<QueueStats, RepositoryError>;
    /// 将租约已过期的任务退回等待状态
    async fn release_expired_leases(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
    /// 清空队列
    async fn clear(&self) -> Result<u64, RepositoryError>;
}
