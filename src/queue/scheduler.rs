// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::repositories::dead_letter_repository::DeadLetterRepository;
use crate::queue::job_queue::{JobQueue, QueueError};
use chrono::{Duration, Utc};
use metrics::gauge;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration as TokioDuration, MissedTickBehavior};
use tracing::{error, info};

/// 一次维护的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// 退回的过期租约数
    pub released: u64,
    /// 按保留期清理的死信数
    pub purged: u64,
}

/// 队列维护调度器
///
/// 定期把租约过期的任务退回队列，并按保留天数清理死信。
pub struct MaintenanceScheduler {
    queue: Arc<dyn JobQueue>,
    dead_letters: Arc<dyn DeadLetterRepository>,
    retention_days: i64,
    period: TokioDuration,
}

impl MaintenanceScheduler {
    /// 创建维护调度器
    ///
    /// # 参数
    ///
    /// * `queue` - 任务队列
    /// * `dead_letters` - 死信仓库
    /// * `retention_days` - 死信保留天数，0 或负数表示不清理
    /// * `period` - 维护间隔
    pub fn new(
        queue: Arc<dyn JobQueue>,
        dead_letters: Arc<dyn DeadLetterRepository>,
        retention_days: i64,
        period: TokioDuration,
    ) -> Self {
        Self {
            queue,
            dead_letters,
            retention_days,
            period,
        }
    }

    /// 执行一次维护
    pub async fn run_once(&self) -> Result<MaintenanceReport, QueueError> {
        let released = self.queue.release_expired_leases().await?;
        if released > 0 {
            info!("Released {} expired leases", released);
        }

        let purged = if self.retention_days > 0 {
            let cutoff = Utc::now() - Duration::days(self.retention_days);
            self.dead_letters.purge_older_than(cutoff).await?
        } else {
            0
        };
        if purged > 0 {
            info!("Purged {} dead letters older than {} days", purged, self.retention_days);
        }

        let stats = self.queue.stats().await?;
        gauge!("sync_queue_depth", "state" => "pending").set(stats.pending as f64);
        gauge!("sync_queue_depth", "state" => "delayed").set(stats.delayed as f64);
        gauge!("sync_queue_depth", "state" => "leased").set(stats.leased as f64);
        gauge!("dlq_entries").set(self.dead_letters.count().await? as f64);

        Ok(MaintenanceReport { released, purged })
    }

    /// 启动后台维护任务，收到关闭信号后退出
    pub fn start(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!("Queue maintenance failed: {}", e);
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Maintenance scheduler stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::dead_letter::DeadLetterEntry;
    use crate::domain::models::error_type::ErrorType;
    use crate::domain::models::job::Job;
    use crate::domain::models::metadata::MetadataSnapshot;
    use crate::infrastructure::database::memory_db;
    use crate::infrastructure::repositories::dead_letter_repo_impl::DeadLetterRepositoryImpl;
    use crate::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
    use crate::queue::job_queue::{QueueConfig, SqlJobQueue};

    #[tokio::test]
    async fn test_run_once_releases_leases_and_purges_old_entries() {
        let db = memory_db().await;
        let queue: Arc<dyn JobQueue> = Arc::new(SqlJobQueue::new(
            Arc::new(JobRepositoryImpl::new(db.clone())),
            QueueConfig {
                lease_timeout: TokioDuration::ZERO,
                poll_interval: TokioDuration::from_millis(10),
            },
        ));
        let dead_letters: Arc<dyn DeadLetterRepository> =
            Arc::new(DeadLetterRepositoryImpl::new(db));

        queue
            .enqueue(Job::new("s1", MetadataSnapshot::new("Heat")))
            .await
            .unwrap();
        queue.lease_next(TokioDuration::ZERO).await.unwrap().unwrap();

        let old = Job::new("s2", MetadataSnapshot::new("Alien"));
        let stale = DeadLetterEntry::from_job(
            &old,
            ErrorType::AuthError,
            "401",
            Utc::now() - Duration::days(45),
        )
        .unwrap();
        let fresh =
            DeadLetterEntry::from_job(&old, ErrorType::AuthError, "401", Utc::now()).unwrap();
        dead_letters.insert(&stale).await.unwrap();
        dead_letters.insert(&fresh).await.unwrap();

        let scheduler = MaintenanceScheduler::new(
            queue.clone(),
            dead_letters.clone(),
            30,
            TokioDuration::from_secs(60),
        );
        let report = scheduler.run_once().await.unwrap();

        assert_eq!(report, MaintenanceReport { released: 1, purged: 1 });
        assert_eq!(queue.stats().await.unwrap().pending, 1);
        assert_eq!(dead_letters.count().await.unwrap(), 1);
    }
}
