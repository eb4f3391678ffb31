// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::job_repository::RepositoryError;
use crate::domain::models::outage::OutageRecord;
use async_trait::async_trait;

/// 故障记录仓库特质
///
/// 记录的开始与结束随熔断器状态一同写入，这里只负责查询与计数。
#[async_trait]
pub trait OutageRepository: Send + Sync {
    /// 最近一条进行中的记录
    async fn ongoing(&self) -> Result<Option<OutageRecord>, RepositoryError>;
    /// 进行中的记录 `id` 的受影响任务数加一，记录已结束时返回 false
    async fn increment_jobs_affected(&self, id: i32) -> Result<bool, RepositoryError>;
    /// 全部记录，最早的在前
    async fn list(&self) -> Result<Vec<OutageRecord>, RepositoryError>;
    /// 最近一条已结束的记录
    async fn latest_completed(&self) -> Result<Option<OutageRecord>, RepositoryError>;
}
