// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clients::traits::{SourceClient, SourceError};
use crate::domain::models::job::Job;
use crate::domain::models::metadata::MetadataSnapshot;
use crate::queue::job_queue::{JobQueue, QueueError};
use crate::queue::pending_set::PendingSubjects;

/// 源对象的变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// 宿主应用发出的变更事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectEvent {
    pub subject_id: String,
    pub change: ChangeKind,
}

/// 提交结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// 创建了新任务
    Enqueued { job_id: Uuid },
    /// 合并到已排队的任务
    Merged { job_id: Uuid },
    /// 删除事件或源对象已不存在
    Ignored,
}

#[derive(Error, Debug)]
pub enum EnqueueError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

/// 同步任务入队
///
/// 同一主体已有未租用的任务时替换其元数据而不新建任务；
/// 正在处理中的任务不受影响，新快照作为新任务排队。
pub struct SyncEnqueuer {
    queue: Arc<dyn JobQueue>,
    source: Arc<dyn SourceClient>,
    pending: Arc<PendingSubjects>,
}

impl SyncEnqueuer {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        source: Arc<dyn SourceClient>,
        pending: Arc<PendingSubjects>,
    ) -> Self {
        Self {
            queue,
            source,
            pending,
        }
    }

    /// 提交一个主体的最新快照
    ///
    /// # 参数
    ///
    /// * `subject_id` - 源对象标识
    /// * `snapshot` - 元数据快照
    pub async fn submit(
        &self,
        subject_id: &str,
        snapshot: MetadataSnapshot,
    ) -> Result<SubmitOutcome, EnqueueError> {
        if let Some(job_id) = self.pending.get(subject_id) {
            if self.queue.replace_metadata(job_id, &snapshot).await? {
                return Ok(self.merged(subject_id, job_id));
            }
            // 任务已被租用或已完成
            self.pending.remove_if(subject_id, job_id);
        }

        if let Some(job) = self.queue.find_pending_by_subject(subject_id).await? {
            if self.queue.replace_metadata(job.id, &snapshot).await? {
                self.pending.insert(subject_id, job.id);
                return Ok(self.merged(subject_id, job.id));
            }
        }

        let job_id = self.queue.enqueue(Job::new(subject_id, snapshot)).await?;
        self.pending.insert(subject_id, job_id);
        info!("Queued sync job {} for subject {}", job_id, subject_id);
        Ok(SubmitOutcome::Enqueued { job_id })
    }

    /// 处理变更事件，从源系统读取最新快照后提交
    pub async fn handle_event(&self, event: &SubjectEvent) -> Result<SubmitOutcome, EnqueueError> {
        if event.change == ChangeKind::Deleted {
            debug!("Ignoring deletion of subject {}", event.subject_id);
            return Ok(SubmitOutcome::Ignored);
        }

        match self.source.fetch_snapshot(&event.subject_id).await? {
            Some(snapshot) => self.submit(&event.subject_id, snapshot).await,
            None => {
                debug!("Subject {} no longer exists upstream", event.subject_id);
                Ok(SubmitOutcome::Ignored)
            }
        }
    }

    fn merged(&self, subject_id: &str, job_id: Uuid) -> SubmitOutcome {
        counter!("sync_jobs_deduplicated_total").increment(1);
        debug!("Merged snapshot for subject {} into job {}", subject_id, job_id);
        SubmitOutcome::Merged { job_id }
    }
}
