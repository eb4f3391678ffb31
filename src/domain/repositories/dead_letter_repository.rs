// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::job_repository::RepositoryError;
use crate::domain::models::dead_letter::{DeadLetterEntry, ErrorTypeCount};
use crate::domain::models::error_type::ErrorType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// 死信仓库特质
#[async_trait]
pub trait DeadLetterRepository: Send + Sync {
    /// 写入死信条目
    async fn insert(&self, entry: &DeadLetterEntry) -> Result<(), RepositoryError>;
    /// 根据ID查找
    async fn find_by_id(&self, id: Uuid) -> Result<Option<DeadLetterEntry>, RepositoryError>;
    /// 按失败时间倒序分页列出
    async fn list(&self, limit: u64, offset: u64)
        -> Result<Vec<DeadLetterEntry>, RepositoryError>;
    /// 查找失败时间落在窗口内且错误类型在集合中的条目，最早的在前
    async fn find_in_window(
        &self,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        error_types: &[ErrorType],
    ) -> Result<Vec<DeadLetterEntry>, RepositoryError>;
    /// 条目总数
    async fn count(&self) -> Result<u64, RepositoryError>;
    /// 按错误类型聚合
    async fn count_by_error_type(&self) -> Result<Vec<ErrorTypeCount>, RepositoryError>;
    /// 清空
    async fn clear(&self) -> Result<u64, RepositoryError>;
    /// 删除早于截止时间的条目
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError>;
}
