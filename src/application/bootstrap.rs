// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;

use crate::application::usecases::enqueue_sync::SyncEnqueuer;
use crate::application::usecases::operations::AdminService;
use crate::application::usecases::recover_outage_jobs::{
    parse_error_types, OutageRecoveryService, RecoveryError,
};
use crate::clients::traits::{DownstreamClient, SourceClient};
use crate::config::settings::Settings;
use crate::domain::repositories::dead_letter_repository::DeadLetterRepository;
use crate::domain::services::confidence_matcher::ConfidenceMatcher;
use crate::infrastructure::repositories::circuit_state_repo_impl::CircuitStateRepositoryImpl;
use crate::infrastructure::repositories::dead_letter_repo_impl::DeadLetterRepositoryImpl;
use crate::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
use crate::infrastructure::repositories::outage_repo_impl::OutageRepositoryImpl;
use crate::infrastructure::repositories::recovery_state_repo_impl::RecoveryStateRepositoryImpl;
use crate::queue::job_queue::{JobQueue, QueueConfig, SqlJobQueue};
use crate::queue::pending_set::PendingSubjects;
use crate::queue::scheduler::MaintenanceScheduler;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitListener};
use crate::resilience::outage_history::OutageHistory;
use crate::resilience::recovery_scheduler::{ProbeConfig, RecoveryScheduler};
use crate::utils::retry_policy::RetryPolicy;
use crate::workers::sync_worker::{SyncWorker, SyncWorkerConfig};

/// 组装好的引擎组件
///
/// 熔断器只持有故障历史的弱引用，故障历史由这里持有。
pub struct Components {
    pub queue: Arc<dyn JobQueue>,
    pub dead_letters: Arc<dyn DeadLetterRepository>,
    pub circuit: Arc<CircuitBreaker>,
    pub history: Arc<OutageHistory>,
    pub scheduler: Arc<RecoveryScheduler>,
    pub pending: Arc<PendingSubjects>,
    pub worker: Arc<SyncWorker>,
    pub enqueuer: Arc<SyncEnqueuer>,
    pub recovery: Arc<OutageRecoveryService>,
    pub admin: Arc<AdminService>,
}

impl Components {
    /// 根据配置组装全部组件
    ///
    /// # 参数
    ///
    /// * `settings` - 应用配置
    /// * `db` - 已完成迁移的数据库连接
    /// * `downstream` - 下游目录客户端
    /// * `source` - 上游源客户端
    pub fn build(
        settings: &Settings,
        db: Arc<DatabaseConnection>,
        downstream: Arc<dyn DownstreamClient>,
        source: Arc<dyn SourceClient>,
    ) -> Result<Self, RecoveryError> {
        let queue: Arc<dyn JobQueue> = Arc::new(SqlJobQueue::new(
            Arc::new(JobRepositoryImpl::new(db.clone())),
            QueueConfig::from(&settings.queue),
        ));
        let dead_letters: Arc<dyn DeadLetterRepository> =
            Arc::new(DeadLetterRepositoryImpl::new(db.clone()));

        let circuit = Arc::new(CircuitBreaker::new(
            Arc::new(
                CircuitStateRepositoryImpl::new(db.clone())
                    .with_outage_capacity(settings.recovery.outage_history_capacity),
            ),
            CircuitConfig::from(&settings.circuit_breaker),
        ));
        let history = Arc::new(OutageHistory::new(Arc::new(OutageRepositoryImpl::new(
            db.clone(),
        ))));
        let listener: Arc<dyn CircuitListener> = history.clone();
        circuit.subscribe(Arc::downgrade(&listener));

        let scheduler = Arc::new(
            RecoveryScheduler::new(
                circuit.clone(),
                downstream.clone(),
                Arc::new(RecoveryStateRepositoryImpl::new(db)),
                ProbeConfig::from(&settings.recovery),
            )
            .with_history(Arc::downgrade(&history)),
        );

        let matcher = Arc::new(ConfidenceMatcher::with_default_strategies(
            downstream.clone(),
            settings.matching.mode,
            settings.matching.library.clone(),
        ));
        let pending = Arc::new(PendingSubjects::new());

        let worker = Arc::new(SyncWorker::new(
            queue.clone(),
            downstream.clone(),
            matcher,
            circuit.clone(),
            history.clone(),
            scheduler.clone(),
            pending.clone(),
            RetryPolicy::from(&settings.retry),
            SyncWorkerConfig::from(&settings.queue),
        ));

        let enqueuer = Arc::new(SyncEnqueuer::new(
            queue.clone(),
            source.clone(),
            pending.clone(),
        ));

        let recovery = Arc::new(OutageRecoveryService::new(
            dead_letters.clone(),
            queue.clone(),
            downstream,
            source,
            history.clone(),
            pending.clone(),
            parse_error_types(&settings.recovery.default_error_types)?,
            Duration::from_secs(settings.recovery.probe_timeout_secs),
        ));

        let admin = Arc::new(AdminService::new(
            queue.clone(),
            dead_letters.clone(),
            circuit.clone(),
            history.clone(),
            scheduler.clone(),
            worker.clone(),
            recovery.clone(),
            pending.clone(),
        ));

        Ok(Self {
            queue,
            dead_letters,
            circuit,
            history,
            scheduler,
            pending,
            worker,
            enqueuer,
            recovery,
            admin,
        })
    }

    /// 队列维护调度器
    pub fn maintenance(&self, settings: &Settings) -> MaintenanceScheduler {
        MaintenanceScheduler::new(
            self.queue.clone(),
            self.dead_letters.clone(),
            settings.dlq.retention_days,
            Duration::from_secs(settings.dlq.maintenance_interval_secs.max(1)),
        )
    }
}
