// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::QueueSettings;
use crate::domain::models::dead_letter::DeadLetterEntry;
use crate::domain::models::job::Job;
use crate::domain::models::metadata::MetadataSnapshot;
use crate::domain::repositories::job_repository::{JobRepository, QueueStats, RepositoryError};
use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::debug;
use uuid::Uuid;

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// 仓库错误
    #[error("Repository error: {0}")]
    Repository(RepositoryError),

    /// 租约已失效，任务已被其他持有者处理或重新租用
    #[error("Lease lost for job {0}")]
    LeaseLost(Uuid),

    /// 任务没有租约
    #[error("Job {0} is not leased")]
    NotLeased(Uuid),
}

impl From<RepositoryError> for QueueError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::LeaseLost(id) => QueueError::LeaseLost(id),
            other => QueueError::Repository(other),
        }
    }
}

/// 队列参数
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// 租约时长，超时后任务重新可见
    pub lease_timeout: Duration,
    /// 等待租用时的轮询间隔
    pub poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_millis(200),
        }
    }
}

impl From<&QueueSettings> for QueueConfig {
    fn from(settings: &QueueSettings) -> Self {
        Self {
            lease_timeout: Duration::from_secs(settings.lease_timeout_secs),
            poll_interval: Duration::from_millis(settings.poll_interval_ms.max(1)),
        }
    }
}

/// 持久化任务队列特质
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// 入队任务，返回任务ID
    async fn enqueue(&self, job: Job) -> Result<Uuid, QueueError>;

    /// 租用下一个可用任务，最多等待 `wait`
    async fn lease_next(&self, wait: Duration) -> Result<Option<Job>, QueueError>;

    /// 确认完成并移除任务
    async fn ack(&self, job: &Job) -> Result<(), QueueError>;

    /// 写回任务负载并在 `delay` 后重新可见
    async fn nack(&self, job: &Job, delay: Duration) -> Result<(), QueueError>;

    /// 移除任务，调用方负责写入死信
    async fn fail(&self, job: &Job) -> Result<(), QueueError>;

    /// 在同一事务中移除任务并写入死信
    async fn promote_to_dead_letter(
        &self,
        job: &Job,
        entry: &DeadLetterEntry,
    ) -> Result<(), QueueError>;

    /// 按状态统计
    async fn stats(&self) -> Result<QueueStats, QueueError>;

    async fn find_pending_by_subject(&self, subject_id: &str) -> Result<Option<Job>, QueueError>;

    /// 某主体是否有任务在队列中，包括已租用的任务
    async fn contains_subject(&self, subject_id: &str) -> Result<bool, QueueError>;

    /// 替换未租用任务的元数据，任务已被租用时返回 false
    async fn replace_metadata(
        &self,
        job_id: Uuid,
        metadata: &MetadataSnapshot,
    ) -> Result<bool, QueueError>;

    /// 将租约已过期的任务退回等待状态
    async fn release_expired_leases(&self) -> Result<u64, QueueError>;

    /// 清空队列
    async fn clear(&self) -> Result<u64, QueueError>;
}

/// 基于 SQL 存储的任务队列实现
pub struct SqlJobQueue<R: JobRepository> {
    /// 任务仓库
    repository: Arc<R>,
    config: QueueConfig,
}

impl<R: JobRepository> SqlJobQueue<R> {
    /// 创建新的任务队列实例
    ///
    /// # 参数
    ///
    /// * `repository` - 任务仓库
    /// * `config` - 租约与轮询参数
    pub fn new(repository: Arc<R>, config: QueueConfig) -> Self {
        Self { repository, config }
    }

    fn lease_token(job: &Job) -> Result<Uuid, QueueError> {
        job.lease_token.ok_or(QueueError::NotLeased(job.id))
    }
}

#[async_trait]
impl<R: JobRepository> JobQueue for SqlJobQueue<R> {
    async fn enqueue(&self, job: Job) -> Result<Uuid, QueueError> {
        let created = self.repository.create(&job).await?;
        counter!("sync_jobs_enqueued_total").increment(1);
        debug!("Enqueued job {} for subject {}", created.id, created.subject_id);
        Ok(created.id)
    }

    async fn lease_next(&self, wait: Duration) -> Result<Option<Job>, QueueError> {
        let lease_duration = chrono::Duration::from_std(self.config.lease_timeout)
            .unwrap_or(chrono::Duration::MAX);
        let deadline = Instant::now() + wait;

        loop {
            if let Some(job) = self.repository.try_lease(Utc::now(), lease_duration).await? {
                return Ok(Some(job));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            sleep(self.config.poll_interval.min(deadline - now)).await;
        }
    }

    async fn ack(&self, job: &Job) -> Result<(), QueueError> {
        let token = Self::lease_token(job)?;
        self.repository.ack(job.id, token).await?;
        Ok(())
    }

    async fn nack(&self, job: &Job, delay: Duration) -> Result<(), QueueError> {
        Self::lease_token(job)?;
        let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
        self.repository.release(job, Utc::now() + delay).await?;
        Ok(())
    }

    async fn fail(&self, job: &Job) -> Result<(), QueueError> {
        let token = Self::lease_token(job)?;
        self.repository.remove(job.id, token).await?;
        Ok(())
    }

    async fn promote_to_dead_letter(
        &self,
        job: &Job,
        entry: &DeadLetterEntry,
    ) -> Result<(), QueueError> {
        Self::lease_token(job)?;
        self.repository.move_to_dead_letter(job, entry).await?;
        counter!("sync_jobs_dead_lettered_total", "error_type" => entry.error_type.as_str())
            .increment(1);
        Ok(())
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        Ok(self.repository.stats(Utc::now()).await?)
    }

    async fn find_pending_by_subject(&self, subject_id: &str) -> Result<Option<Job>, QueueError> {
        Ok(self.repository.find_pending_by_subject(subject_id).await?)
    }

    async fn contains_subject(&self, subject_id: &str) -> Result<bool, QueueError> {
        Ok(self.repository.exists_by_subject(subject_id).await?)
    }

    async fn replace_metadata(
        &self,
        job_id: Uuid,
        metadata: &MetadataSnapshot,
    ) -> Result<bool, QueueError> {
        Ok(self.repository.replace_metadata(job_id, metadata).await?)
    }

    async fn release_expired_leases(&self) -> Result<u64, QueueError> {
        Ok(self.repository.release_expired_leases(Utc::now()).await?)
    }

    async fn clear(&self) -> Result<u64, QueueError> {
        Ok(self.repository.clear().await?)
    }
}
