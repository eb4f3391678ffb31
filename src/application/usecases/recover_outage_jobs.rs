// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clients::traits::{DownstreamClient, DownstreamError, SourceClient, SourceError};
use crate::domain::models::error_type::{ErrorType, ParseErrorTypeError};
use crate::domain::models::job::Job;
use crate::domain::repositories::dead_letter_repository::DeadLetterRepository;
use crate::domain::repositories::job_repository::RepositoryError;
use crate::queue::job_queue::{JobQueue, QueueError};
use crate::queue::pending_set::PendingSubjects;
use crate::resilience::outage_history::OutageHistory;

/// 故障时间窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutageWindow {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// 一次恢复的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub window: OutageWindow,
    pub error_types: Vec<ErrorType>,
    /// 窗口内符合错误类型的死信数
    pub examined: usize,
    pub requeued: Vec<Uuid>,
    /// 主体已在队列中
    pub skipped_in_queue: usize,
    /// 源对象已被删除
    pub skipped_missing_source: usize,
}

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Error type {0} is permanent and cannot be recovered")]
    PermanentErrorType(ErrorType),

    #[error(transparent)]
    InvalidErrorType(#[from] ParseErrorTypeError),

    #[error("Outage window ends before it starts")]
    InvalidWindow,

    #[error("No completed outage to recover from")]
    NoCompletedOutage,

    #[error("Downstream is still unhealthy: {0}")]
    Unhealthy(DownstreamError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Corrupt job snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// 解析错误类型名称列表
pub fn parse_error_types<S: AsRef<str>>(names: &[S]) -> Result<Vec<ErrorType>, RecoveryError> {
    names
        .iter()
        .map(|name| name.as_ref().parse::<ErrorType>().map_err(RecoveryError::from))
        .collect()
}

/// 故障相关死信的恢复
///
/// 查找失败时间落在故障窗口内、错误类型在允许集合中的死信，按失败时间从早到晚，
/// 依次经过健康检查、队列去重、源对象存在性三道检查后重新入队。
/// 死信条目保留用于审计。
pub struct OutageRecoveryService {
    dead_letters: Arc<dyn DeadLetterRepository>,
    queue: Arc<dyn JobQueue>,
    downstream: Arc<dyn DownstreamClient>,
    source: Arc<dyn SourceClient>,
    history: Arc<OutageHistory>,
    pending: Arc<PendingSubjects>,
    default_error_types: Vec<ErrorType>,
    probe_timeout: Duration,
}

impl OutageRecoveryService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dead_letters: Arc<dyn DeadLetterRepository>,
        queue: Arc<dyn JobQueue>,
        downstream: Arc<dyn DownstreamClient>,
        source: Arc<dyn SourceClient>,
        history: Arc<OutageHistory>,
        pending: Arc<PendingSubjects>,
        default_error_types: Vec<ErrorType>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            dead_letters,
            queue,
            downstream,
            source,
            history,
            pending,
            default_error_types,
            probe_timeout,
        }
    }

    /// 在最近一次已结束的故障窗口上恢复
    pub async fn recover_latest(
        &self,
        error_types: Option<&[ErrorType]>,
    ) -> Result<RecoveryReport, RecoveryError> {
        self.effective_types(error_types)?;
        let outage = self
            .history
            .latest_completed()
            .await?
            .ok_or(RecoveryError::NoCompletedOutage)?;
        let ended_at = outage.ended_at.ok_or(RecoveryError::NoCompletedOutage)?;

        self.recover(
            OutageWindow {
                started_at: outage.started_at,
                ended_at,
            },
            error_types,
        )
        .await
    }

    /// 在给定窗口上恢复
    ///
    /// # 参数
    ///
    /// * `window` - 故障窗口（闭区间）
    /// * `error_types` - 允许恢复的错误类型，为空时使用默认集合
    ///
    /// # 返回值
    ///
    /// 健康检查失败时整批中止并返回 `RecoveryError::Unhealthy`
    pub async fn recover(
        &self,
        window: OutageWindow,
        error_types: Option<&[ErrorType]>,
    ) -> Result<RecoveryReport, RecoveryError> {
        if window.ended_at < window.started_at {
            return Err(RecoveryError::InvalidWindow);
        }
        let error_types = self.effective_types(error_types)?;

        let entries = self
            .dead_letters
            .find_in_window(window.started_at, window.ended_at, &error_types)
            .await?;

        let mut report = RecoveryReport {
            window,
            error_types,
            examined: entries.len(),
            requeued: Vec::new(),
            skipped_in_queue: 0,
            skipped_missing_source: 0,
        };
        if entries.is_empty() {
            return Ok(report);
        }

        self.downstream
            .health_check(self.probe_timeout)
            .await
            .map_err(RecoveryError::Unhealthy)?;

        for entry in entries {
            if self.queue.contains_subject(&entry.subject_id).await? {
                debug!("Subject {} already queued, skipping", entry.subject_id);
                report.skipped_in_queue += 1;
                continue;
            }
            if !self.source.exists(&entry.subject_id).await? {
                debug!("Subject {} deleted upstream, skipping", entry.subject_id);
                report.skipped_missing_source += 1;
                continue;
            }

            let original = entry.original_job()?;
            let job = Job::new(entry.subject_id.clone(), original.payload.metadata);
            let job_id = self.queue.enqueue(job).await?;
            self.pending.insert(entry.subject_id.clone(), job_id);
            report.requeued.push(job_id);
        }

        counter!("dlq_recovered_total").increment(report.requeued.len() as u64);
        if report.requeued.is_empty() {
            warn!("Outage recovery found {} entries but requeued none", report.examined);
        } else {
            info!(
                "Outage recovery requeued {} of {} dead letters",
                report.requeued.len(),
                report.examined
            );
        }
        Ok(report)
    }

    /// 未给出或为空时使用默认集合，永久错误类型不可恢复
    fn effective_types(
        &self,
        error_types: Option<&[ErrorType]>,
    ) -> Result<Vec<ErrorType>, RecoveryError> {
        let error_types = match error_types {
            Some(types) if !types.is_empty() => types.to_vec(),
            _ => self.default_error_types.clone(),
        };
        match error_types.iter().find(|t| t.is_permanent()) {
            Some(permanent) => Err(RecoveryError::PermanentErrorType(*permanent)),
            None => Ok(error_types),
        }
    }
}
