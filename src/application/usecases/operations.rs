// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::application::usecases::recover_outage_jobs::{
    OutageRecoveryService, OutageWindow, RecoveryError, RecoveryReport,
};
use crate::domain::models::circuit::CircuitBreakerState;
use crate::domain::models::dead_letter::{DeadLetterEntry, ErrorTypeCount};
use crate::domain::models::error_type::ErrorType;
use crate::domain::models::outage::OutageSummary;
use crate::domain::models::recovery::RecoveryState;
use crate::domain::repositories::dead_letter_repository::DeadLetterRepository;
use crate::domain::repositories::job_repository::{QueueStats, RepositoryError};
use crate::queue::job_queue::{JobQueue, QueueError};
use crate::queue::pending_set::PendingSubjects;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::outage_history::OutageHistory;
use crate::resilience::recovery_scheduler::RecoveryScheduler;
use crate::utils::errors::WorkerError;
use crate::workers::sync_worker::{DrainReport, SyncWorker};

#[derive(Error, Debug)]
pub enum OperationError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    #[error("older_than_days must not be negative")]
    InvalidRetention,
}

/// 死信队列概况
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DlqStatus {
    pub total: u64,
    pub by_error_type: Vec<ErrorTypeCount>,
}

/// 引擎状态
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub queue: QueueStats,
    pub dlq: DlqStatus,
    pub circuit: CircuitBreakerState,
    pub outages: OutageSummary,
    pub recovery: RecoveryState,
    pub pending_subjects: usize,
}

/// 运维操作
pub struct AdminService {
    queue: Arc<dyn JobQueue>,
    dead_letters: Arc<dyn DeadLetterRepository>,
    circuit: Arc<CircuitBreaker>,
    history: Arc<OutageHistory>,
    scheduler: Arc<RecoveryScheduler>,
    worker: Arc<SyncWorker>,
    recovery: Arc<OutageRecoveryService>,
    pending: Arc<PendingSubjects>,
}

impl AdminService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn JobQueue>,
        dead_letters: Arc<dyn DeadLetterRepository>,
        circuit: Arc<CircuitBreaker>,
        history: Arc<OutageHistory>,
        scheduler: Arc<RecoveryScheduler>,
        worker: Arc<SyncWorker>,
        recovery: Arc<OutageRecoveryService>,
        pending: Arc<PendingSubjects>,
    ) -> Self {
        Self {
            queue,
            dead_letters,
            circuit,
            history,
            scheduler,
            worker,
            recovery,
            pending,
        }
    }

    pub async fn status(&self) -> Result<StatusReport, OperationError> {
        Ok(StatusReport {
            queue: self.queue.stats().await?,
            dlq: DlqStatus {
                total: self.dead_letters.count().await?,
                by_error_type: self.dead_letters.count_by_error_type().await?,
            },
            circuit: self.circuit.snapshot().await?,
            outages: self.history.summary(Utc::now()).await?,
            recovery: self.scheduler.state().await?,
            pending_subjects: self.pending.len(),
        })
    }

    pub async fn clear_queue(&self) -> Result<u64, OperationError> {
        let removed = self.queue.clear().await?;
        self.pending.clear();
        info!("Cleared {} jobs from the queue", removed);
        Ok(removed)
    }

    pub async fn clear_dlq(&self) -> Result<u64, OperationError> {
        let removed = self.dead_letters.clear().await?;
        info!("Cleared {} dead letters", removed);
        Ok(removed)
    }

    /// 按失败时间倒序分页列出死信
    pub async fn list_dlq(
        &self,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<DeadLetterEntry>, OperationError> {
        Ok(self.dead_letters.list(limit, offset).await?)
    }

    /// 删除失败时间早于 `older_than_days` 天前的死信
    pub async fn purge_dlq(&self, older_than_days: i64) -> Result<u64, OperationError> {
        if older_than_days < 0 {
            return Err(OperationError::InvalidRetention);
        }
        let cutoff = Utc::now() - Duration::days(older_than_days);
        let removed = self.dead_letters.purge_older_than(cutoff).await?;
        info!("Purged {} dead letters older than {} days", removed, older_than_days);
        Ok(removed)
    }

    /// 不受调用时长限制地处理队列直到为空
    pub async fn drain(&self) -> Result<DrainReport, OperationError> {
        Ok(self.worker.process_until_empty().await?)
    }

    /// 恢复故障期间进入死信队列的任务，未给出窗口时使用最近一次已结束的故障
    pub async fn recover(
        &self,
        error_types: Option<Vec<ErrorType>>,
        window: Option<OutageWindow>,
    ) -> Result<RecoveryReport, OperationError> {
        let types = error_types.as_deref();
        let report = match window {
            Some(window) => self.recovery.recover(window, types).await?,
            None => self.recovery.recover_latest(types).await?,
        };
        Ok(report)
    }
}
