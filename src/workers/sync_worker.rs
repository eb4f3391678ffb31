// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::clients::traits::DownstreamClient;
use crate::config::settings::QueueSettings;
use crate::domain::models::dead_letter::DeadLetterEntry;
use crate::domain::models::error_type::ErrorType;
use crate::domain::models::job::Job;
use crate::domain::services::confidence_matcher::{ConfidenceMatcher, MatchError, MatchSubject};
use crate::queue::job_queue::{JobQueue, QueueError};
use crate::queue::pending_set::PendingSubjects;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::outage_history::OutageHistory;
use crate::resilience::recovery_scheduler::RecoveryScheduler;
use crate::utils::errors::WorkerError;
use crate::utils::retry_policy::RetryPolicy;
use crate::workers::worker::Worker;

/// 同步工作器参数
#[derive(Debug, Clone)]
pub struct SyncWorkerConfig {
    /// 每次租用的最长等待时间
    pub lease_wait: Duration,
    /// 熔断打开时任务重新入队的延迟
    pub circuit_open_requeue: Duration,
    /// 队列为空或出错后的休眠时间
    pub idle_interval: Duration,
}

impl Default for SyncWorkerConfig {
    fn default() -> Self {
        Self {
            lease_wait: Duration::from_millis(1000),
            circuit_open_requeue: Duration::from_secs(30),
            idle_interval: Duration::from_millis(200),
        }
    }
}

impl From<&QueueSettings> for SyncWorkerConfig {
    fn from(settings: &QueueSettings) -> Self {
        Self {
            lease_wait: Duration::from_millis(settings.lease_wait_ms),
            circuit_open_requeue: Duration::from_secs(settings.circuit_open_requeue_secs),
            idle_interval: Duration::from_millis(settings.poll_interval_ms),
        }
    }
}

/// 一个处理周期的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// 队列中没有可租用的任务
    Idle,
    Completed {
        job_id: Uuid,
        target_key: String,
    },
    /// 瞬时失败，已带退避延迟重新入队
    Retried {
        job_id: Uuid,
        error_type: ErrorType,
        retry_count: u32,
        delay: Duration,
    },
    DeadLettered {
        job_id: Uuid,
        error_type: ErrorType,
    },
    /// 熔断打开，未联系下游即重新入队，不消耗重试次数
    ShortCircuited { job_id: Uuid },
    /// 未到重试时间，退回剩余时间
    NotDue { job_id: Uuid },
    /// 收到关闭信号，租用的任务已退回
    Released { job_id: Uuid },
    /// 租约在处理期间失效，任务已由其他进程接管
    LeaseLost { job_id: Uuid },
}

/// 排空队列的汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub completed: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub short_circuited: u64,
    pub deferred: u64,
}

/// 同步工作器
///
/// 每个周期租用一个任务并完整处理：熔断检查、重试时间检查、身份匹配、写入下游，
/// 再根据结果确认、带退避重新入队或转入死信。同一进程内的周期串行执行。
/// 未到重试时间或以非熔断相关错误结束的任务会交还领取到的半开试探。
pub struct SyncWorker {
    queue: Arc<dyn JobQueue>,
    downstream: Arc<dyn DownstreamClient>,
    matcher: Arc<ConfidenceMatcher>,
    circuit: Arc<CircuitBreaker>,
    history: Arc<OutageHistory>,
    scheduler: Arc<RecoveryScheduler>,
    pending: Arc<PendingSubjects>,
    policy: RetryPolicy,
    config: SyncWorkerConfig,
    cycle: Mutex<()>,
}

impl SyncWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn JobQueue>,
        downstream: Arc<dyn DownstreamClient>,
        matcher: Arc<ConfidenceMatcher>,
        circuit: Arc<CircuitBreaker>,
        history: Arc<OutageHistory>,
        scheduler: Arc<RecoveryScheduler>,
        pending: Arc<PendingSubjects>,
        policy: RetryPolicy,
        config: SyncWorkerConfig,
    ) -> Self {
        Self {
            queue,
            downstream,
            matcher,
            circuit,
            history,
            scheduler,
            pending,
            policy,
            config,
            cycle: Mutex::new(()),
        }
    }

    /// 执行一个处理周期
    pub async fn process_one(&self) -> Result<ProcessOutcome, WorkerError> {
        self.cycle_with(self.config.lease_wait, None).await
    }

    /// 反复处理直到没有可租用的任务
    ///
    /// 熔断打开时停止，剩余任务留在队列中等待恢复。
    pub async fn process_until_empty(&self) -> Result<DrainReport, WorkerError> {
        let mut report = DrainReport::default();
        loop {
            match self.cycle_with(Duration::ZERO, None).await? {
                ProcessOutcome::Idle => break,
                ProcessOutcome::Completed { .. } => report.completed += 1,
                ProcessOutcome::Retried { .. } => report.retried += 1,
                ProcessOutcome::DeadLettered { .. } => report.dead_lettered += 1,
                ProcessOutcome::ShortCircuited { .. } => {
                    report.short_circuited += 1;
                    break;
                }
                ProcessOutcome::NotDue { .. }
                | ProcessOutcome::Released { .. }
                | ProcessOutcome::LeaseLost { .. } => report.deferred += 1,
            }
        }
        info!(
            "Drain finished: {} completed, {} retried, {} dead-lettered",
            report.completed, report.retried, report.dead_lettered
        );
        Ok(report)
    }

    async fn cycle_with(
        &self,
        wait: Duration,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<ProcessOutcome, WorkerError> {
        let _guard = self.cycle.lock().await;

        if let Err(e) = self.scheduler.tick().await {
            error!("Recovery check failed: {}", e);
        }

        let Some(job) = self.queue.lease_next(wait).await? else {
            return Ok(ProcessOutcome::Idle);
        };

        if shutdown.is_some_and(|s| *s.borrow()) {
            self.queue.nack(&job, Duration::ZERO).await?;
            return Ok(ProcessOutcome::Released { job_id: job.id });
        }

        let job_id = job.id;
        match self.handle(job.clone()).await {
            Err(WorkerError::Queue(QueueError::LeaseLost(_))) => {
                warn!("Lease on job {} lost during processing", job_id);
                Ok(ProcessOutcome::LeaseLost { job_id })
            }
            Err(e) => {
                // 尽量交还租约，失败时等待租约超时
                if let Err(release_err) = self.queue.nack(&job, Duration::ZERO).await {
                    debug!("Failed to release job {}: {}", job_id, release_err);
                }
                Err(e)
            }
            ok => ok,
        }
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, subject = %job.subject_id))]
    async fn handle(&self, mut job: Job) -> Result<ProcessOutcome, WorkerError> {
        let now = Utc::now();
        if !self.circuit.allow_request_at(now).await? {
            counter!("sync_jobs_short_circuited_total").increment(1);
            let retry = &mut job.payload.retry;
            self.history
                .record_affected_job(retry.last_short_circuit_at)
                .await?;
            retry.last_short_circuit_at = Some(now);
            self.queue.nack(&job, self.config.circuit_open_requeue).await?;
            debug!("Circuit open, job requeued");
            return Ok(ProcessOutcome::ShortCircuited { job_id: job.id });
        }

        if !job.is_due(now) {
            let remaining = job
                .payload
                .retry
                .next_retry_at
                .and_then(|at| (at - now).to_std().ok())
                .unwrap_or_default();
            self.circuit.release_trial(now).await?;
            self.queue.nack(&job, remaining).await?;
            return Ok(ProcessOutcome::NotDue { job_id: job.id });
        }

        match self.attempt(&job).await {
            Ok(target_key) => {
                self.queue.ack(&job).await?;
                self.circuit.record_success().await?;
                self.pending.remove_if(&job.subject_id, job.id);
                counter!("sync_jobs_completed_total").increment(1);
                info!("Synced metadata to {}", target_key);
                Ok(ProcessOutcome::Completed {
                    job_id: job.id,
                    target_key,
                })
            }
            Err(err) => self.handle_failure(&mut job, err, now).await,
        }
    }

    async fn attempt(&self, job: &Job) -> Result<String, MatchError> {
        let snapshot = &job.payload.metadata;
        let target = self.matcher.find_target(&MatchSubject::from(snapshot)).await?;
        self.downstream.apply_metadata(&target.key, snapshot).await?;
        Ok(target.key)
    }

    /// `admitted_at` 为熔断器放行本次尝试的时间，用于交还未计入结果的半开试探
    async fn handle_failure(
        &self,
        job: &mut Job,
        err: MatchError,
        admitted_at: DateTime<Utc>,
    ) -> Result<ProcessOutcome, WorkerError> {
        let error_type = err.error_type();
        let message = err.to_string();

        if error_type.is_circuit_relevant() {
            self.circuit.record_failure().await?;
        } else {
            self.circuit.release_trial(admitted_at).await?;
        }

        let attempt = job.retry_count();
        if self.policy.should_retry(attempt + 1, error_type) {
            let (delay, next_retry_at) =
                self.policy.next_retry_time(attempt, error_type, Utc::now());
            let retry_count = job.record_failure(error_type, &message, next_retry_at);
            self.queue.nack(job, delay).await?;
            counter!("sync_jobs_retried_total", "error_type" => error_type.as_str()).increment(1);
            debug!(
                "Attempt {} failed with {}, retrying in {:?}: {}",
                retry_count, error_type, delay, message
            );
            return Ok(ProcessOutcome::Retried {
                job_id: job.id,
                error_type,
                retry_count,
                delay,
            });
        }

        let entry = DeadLetterEntry::from_job(job, error_type, &message, Utc::now())?;
        self.queue.promote_to_dead_letter(job, &entry).await?;
        self.pending.remove_if(&job.subject_id, job.id);
        warn!(
            "Job moved to dead letter queue after {} retries ({}): {}",
            entry.retry_count_at_failure, error_type, message
        );
        Ok(ProcessOutcome::DeadLettered {
            job_id: job.id,
            error_type,
        })
    }
}

#[async_trait]
impl Worker for SyncWorker {
    async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), WorkerError> {
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            let idle = match self.cycle_with(self.config.lease_wait, Some(&shutdown)).await {
                Ok(ProcessOutcome::Idle) => true,
                Ok(_) => false,
                Err(e) => {
                    error!("Sync cycle failed: {}", e);
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = sleep(self.config.idle_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn name(&self) -> &str {
        "sync_worker"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::traits::DownstreamError;
    use crate::domain::models::circuit::CircuitStatus;
    use crate::domain::models::matching::CatalogItem;
    use crate::domain::models::metadata::MetadataSnapshot;
    use crate::domain::repositories::dead_letter_repository::DeadLetterRepository;
    use crate::domain::services::confidence_matcher::MatchMode;
    use crate::infrastructure::database::memory_db;
    use crate::infrastructure::repositories::circuit_state_repo_impl::CircuitStateRepositoryImpl;
    use crate::infrastructure::repositories::dead_letter_repo_impl::DeadLetterRepositoryImpl;
    use crate::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
    use crate::infrastructure::repositories::outage_repo_impl::OutageRepositoryImpl;
    use crate::infrastructure::repositories::recovery_state_repo_impl::RecoveryStateRepositoryImpl;
    use crate::queue::job_queue::{QueueConfig, SqlJobQueue};
    use crate::resilience::circuit_breaker::{CircuitConfig, CircuitListener};
    use crate::resilience::recovery_scheduler::ProbeConfig;
    use crate::utils::retry_policy::BackoffProfile;
    use parking_lot::Mutex as SyncMutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// 可控的下游目录
    struct FakeCatalog {
        items: Vec<CatalogItem>,
        failure: SyncMutex<Option<DownstreamError>>,
        healthy: AtomicBool,
        calls: AtomicUsize,
        applied: SyncMutex<Vec<String>>,
    }

    impl FakeCatalog {
        fn new(items: Vec<CatalogItem>) -> Self {
            Self {
                items,
                failure: SyncMutex::new(None),
                healthy: AtomicBool::new(true),
                calls: AtomicUsize::new(0),
                applied: SyncMutex::new(Vec::new()),
            }
        }

        fn fail_with(&self, err: Option<DownstreamError>) {
            *self.failure.lock() = err;
        }

        fn check(&self) -> Result<(), DownstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.failure.lock().clone() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl DownstreamClient for FakeCatalog {
        async fn search(&self, _: &str, title: &str) -> Result<Vec<CatalogItem>, DownstreamError> {
            self.check()?;
            Ok(self.items.iter().filter(|i| i.title == title).cloned().collect())
        }

        async fn scan(&self, _: &str) -> Result<Vec<CatalogItem>, DownstreamError> {
            self.check()?;
            Ok(self.items.clone())
        }

        async fn apply_metadata(
            &self,
            key: &str,
            _: &MetadataSnapshot,
        ) -> Result<(), DownstreamError> {
            self.check()?;
            self.applied.lock().push(key.to_string());
            Ok(())
        }

        async fn health_check(&self, _: Duration) -> Result<(), DownstreamError> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(DownstreamError::Unreachable("connection refused".into()))
            }
        }
    }

    struct Harness {
        worker: SyncWorker,
        queue: Arc<dyn JobQueue>,
        dead_letters: Arc<dyn DeadLetterRepository>,
        circuit: Arc<CircuitBreaker>,
        history: Arc<OutageHistory>,
        catalog: Arc<FakeCatalog>,
        policy: RetryPolicy,
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            standard: BackoffProfile {
                base: Duration::from_millis(1),
                cap: Duration::from_millis(16),
                max_attempts: 5,
            },
            not_found: BackoffProfile {
                base: Duration::ZERO,
                cap: Duration::ZERO,
                max_attempts: 12,
            },
        }
    }

    async fn harness(circuit_config: CircuitConfig, probe: ProbeConfig) -> Harness {
        harness_with(
            circuit_config,
            probe,
            SyncWorkerConfig {
                lease_wait: Duration::from_millis(200),
                circuit_open_requeue: Duration::from_secs(30),
                idle_interval: Duration::from_millis(5),
            },
        )
        .await
    }

    async fn harness_with(
        circuit_config: CircuitConfig,
        probe: ProbeConfig,
        config: SyncWorkerConfig,
    ) -> Harness {
        let db = memory_db().await;
        let queue: Arc<dyn JobQueue> = Arc::new(SqlJobQueue::new(
            Arc::new(JobRepositoryImpl::new(db.clone())),
            QueueConfig {
                lease_timeout: Duration::from_secs(60),
                poll_interval: Duration::from_millis(5),
            },
        ));
        let dead_letters: Arc<dyn DeadLetterRepository> =
            Arc::new(DeadLetterRepositoryImpl::new(db.clone()));

        let catalog = Arc::new(FakeCatalog::new(vec![
            CatalogItem {
                key: "42".into(),
                title: "Heat".into(),
                file_paths: vec!["/movies/heat.mkv".into()],
            },
            CatalogItem {
                key: "43".into(),
                title: "Alien".into(),
                file_paths: vec!["/movies/alien.mkv".into()],
            },
        ]));

        let circuit = Arc::new(CircuitBreaker::new(
            Arc::new(CircuitStateRepositoryImpl::new(db.clone())),
            circuit_config,
        ));
        let history = Arc::new(OutageHistory::new(Arc::new(OutageRepositoryImpl::new(
            db.clone(),
        ))));
        let listener: Arc<dyn CircuitListener> = history.clone();
        circuit.subscribe(Arc::downgrade(&listener));

        let scheduler = Arc::new(
            RecoveryScheduler::new(
                circuit.clone(),
                catalog.clone(),
                Arc::new(RecoveryStateRepositoryImpl::new(db)),
                probe,
            )
            .with_history(Arc::downgrade(&history)),
        );
        let matcher = Arc::new(ConfidenceMatcher::with_default_strategies(
            catalog.clone(),
            MatchMode::Strict,
            "movies",
        ));

        let policy = fast_policy();
        let worker = SyncWorker::new(
            queue.clone(),
            catalog.clone(),
            matcher,
            circuit.clone(),
            history.clone(),
            scheduler,
            Arc::new(PendingSubjects::new()),
            policy.clone(),
            config,
        );

        Harness {
            worker,
            queue,
            dead_letters,
            circuit,
            history,
            catalog,
            policy,
        }
    }

    fn job(title: &str, path: &str) -> Job {
        Job::new(
            format!("subject-{title}"),
            MetadataSnapshot::new(title).with_path(path),
        )
    }

    fn lenient_circuit() -> CircuitConfig {
        CircuitConfig {
            failure_threshold: 100,
            recovery_timeout: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn test_success_acks_and_applies() {
        let h = harness(CircuitConfig::default(), ProbeConfig::default()).await;
        let id = h.queue.enqueue(job("Heat", "/movies/heat.mkv")).await.unwrap();

        let outcome = h.worker.process_one().await.unwrap();
        assert_eq!(
            outcome,
            ProcessOutcome::Completed {
                job_id: id,
                target_key: "42".into()
            }
        );
        assert_eq!(*h.catalog.applied.lock(), vec!["42"]);
        assert_eq!(h.queue.stats().await.unwrap().total(), 0);
        assert_eq!(h.worker.process_one().await.unwrap(), ProcessOutcome::Idle);
    }

    #[tokio::test]
    async fn test_transient_failures_exhaust_budget_into_dlq() {
        let h = harness(lenient_circuit(), ProbeConfig::default()).await;
        h.catalog
            .fail_with(Some(DownstreamError::Unreachable("timeout".into())));
        let id = h.queue.enqueue(job("Heat", "/movies/heat.mkv")).await.unwrap();

        for attempt in 0..5u32 {
            match h.worker.process_one().await.unwrap() {
                ProcessOutcome::Retried {
                    job_id,
                    error_type,
                    retry_count,
                    delay,
                } => {
                    assert_eq!(job_id, id);
                    assert_eq!(error_type, ErrorType::DownstreamUnreachable);
                    assert_eq!(retry_count, attempt + 1);
                    assert!(delay <= h.policy.standard.upper_bound(attempt));
                }
                other => panic!("attempt {attempt}: unexpected outcome {other:?}"),
            }
        }

        assert_eq!(
            h.worker.process_one().await.unwrap(),
            ProcessOutcome::DeadLettered {
                job_id: id,
                error_type: ErrorType::DownstreamUnreachable
            }
        );
        assert_eq!(h.queue.stats().await.unwrap().total(), 0);

        let entries = h.dead_letters.list(10, 0).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].retry_count_at_failure, 5);
        let snapshot = entries[0].original_job().unwrap();
        assert_eq!(snapshot.id, id);
        assert_eq!(snapshot.payload.metadata.title, "Heat");
    }

    #[tokio::test]
    async fn test_permanent_failure_skips_retry_and_circuit() {
        let h = harness(
            CircuitConfig {
                failure_threshold: 1,
                recovery_timeout: Duration::from_secs(60),
            },
            ProbeConfig::default(),
        )
        .await;
        h.catalog
            .fail_with(Some(DownstreamError::Auth("invalid token".into())));
        let id = h.queue.enqueue(job("Heat", "/movies/heat.mkv")).await.unwrap();

        assert_eq!(
            h.worker.process_one().await.unwrap(),
            ProcessOutcome::DeadLettered {
                job_id: id,
                error_type: ErrorType::AuthError
            }
        );
        let state = h.circuit.snapshot().await.unwrap();
        assert_eq!(state.state, CircuitStatus::Closed);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(h.dead_letters.list(10, 0).await.unwrap()[0].retry_count_at_failure, 0);
    }

    #[tokio::test]
    async fn test_not_found_retries_without_tripping_circuit() {
        let h = harness(
            CircuitConfig {
                failure_threshold: 1,
                recovery_timeout: Duration::from_secs(60),
            },
            ProbeConfig::default(),
        )
        .await;
        h.queue
            .enqueue(job("Unknown", "/movies/unknown.mkv"))
            .await
            .unwrap();

        match h.worker.process_one().await.unwrap() {
            ProcessOutcome::Retried { error_type, .. } => {
                assert_eq!(error_type, ErrorType::NotFound)
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(h.circuit.snapshot().await.unwrap().state, CircuitStatus::Closed);
    }

    #[tokio::test]
    async fn test_consecutive_failures_open_circuit_and_short_circuit_next_job() {
        let h = harness(CircuitConfig::default(), ProbeConfig::default()).await;
        h.catalog.healthy.store(false, Ordering::SeqCst);
        h.catalog
            .fail_with(Some(DownstreamError::Unreachable("connection refused".into())));
        for title in ["Heat", "Alien"] {
            h.queue
                .enqueue(job(title, &format!("/movies/{}.mkv", title.to_lowercase())))
                .await
                .unwrap();
        }

        for _ in 0..5 {
            assert!(matches!(
                h.worker.process_one().await.unwrap(),
                ProcessOutcome::Retried { .. }
            ));
        }
        assert_eq!(h.circuit.snapshot().await.unwrap().state, CircuitStatus::Open);
        let calls_before = h.catalog.calls.load(Ordering::SeqCst);

        assert!(matches!(
            h.worker.process_one().await.unwrap(),
            ProcessOutcome::ShortCircuited { .. }
        ));
        assert_eq!(h.catalog.calls.load(Ordering::SeqCst), calls_before);

        let records = h.history.records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_ongoing());
        assert_eq!(records[0].jobs_affected, 1);
    }

    #[tokio::test]
    async fn test_half_open_trial_success_closes_outage() {
        let h = harness(
            CircuitConfig {
                failure_threshold: 1,
                recovery_timeout: Duration::ZERO,
            },
            ProbeConfig::default(),
        )
        .await;
        h.catalog.healthy.store(false, Ordering::SeqCst);
        h.catalog
            .fail_with(Some(DownstreamError::Server {
                status: 503,
                message: "maintenance".into(),
            }));
        let first = h.queue.enqueue(job("Heat", "/movies/heat.mkv")).await.unwrap();

        assert!(matches!(
            h.worker.process_one().await.unwrap(),
            ProcessOutcome::Retried { .. }
        ));
        assert_eq!(h.circuit.snapshot().await.unwrap().state, CircuitStatus::Open);

        // 下游恢复，健康探测仍失败，由半开试探完成恢复
        h.catalog.fail_with(None);
        assert_eq!(
            h.worker.process_one().await.unwrap(),
            ProcessOutcome::Completed {
                job_id: first,
                target_key: "42".into()
            }
        );
        assert_eq!(h.circuit.snapshot().await.unwrap().state, CircuitStatus::Closed);

        let outage = h.history.latest_completed().await.unwrap().unwrap();
        assert!(outage.ended_at.is_some());
        assert!(outage.duration_ms.is_some());

        let second = h.queue.enqueue(job("Alien", "/movies/alien.mkv")).await.unwrap();
        assert_eq!(
            h.worker.process_one().await.unwrap(),
            ProcessOutcome::Completed {
                job_id: second,
                target_key: "43".into()
            }
        );
    }

    #[tokio::test]
    async fn test_process_until_empty_drains_queue() {
        let h = harness(CircuitConfig::default(), ProbeConfig::default()).await;
        h.queue.enqueue(job("Heat", "/movies/heat.mkv")).await.unwrap();
        h.queue.enqueue(job("Alien", "/movies/alien.mkv")).await.unwrap();
        h.queue.enqueue(job("Ghost", "/movies/ghost.mkv")).await.unwrap();

        let report = h.worker.process_until_empty().await.unwrap();
        assert_eq!(report.completed, 2);
        // 未找到的任务使用零退避，持续重试直到耗尽
        assert_eq!(report.retried, 12);
        assert_eq!(report.dead_lettered, 1);
        assert_eq!(h.queue.stats().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let h = harness(CircuitConfig::default(), ProbeConfig::default()).await;
        h.queue.enqueue(job("Heat", "/movies/heat.mkv")).await.unwrap();
        let worker = Arc::new(h.worker);

        let (tx, rx) = watch::channel(false);
        let running = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.run(rx).await })
        };

        for _ in 0..100 {
            if h.queue.stats().await.unwrap().total() == 0 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(h.queue.stats().await.unwrap().total(), 0);

        tx.send(true).unwrap();
        running.await.unwrap().unwrap();
    }

    fn slow_recovery() -> CircuitConfig {
        CircuitConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(60),
        }
    }

    /// 熔断器在恢复等待时间之前打开，下一次放行即进入半开
    async fn open_long_ago(h: &Harness) {
        h.catalog.healthy.store(false, Ordering::SeqCst);
        h.circuit
            .record_failure_at(Utc::now() - chrono::Duration::seconds(120))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_not_due_job_returns_half_open_trial() {
        let h = harness(slow_recovery(), ProbeConfig::default()).await;
        open_long_ago(&h).await;

        let mut waiting = job("Heat", "/movies/heat.mkv");
        waiting.record_failure(
            ErrorType::ServerError,
            "503",
            Utc::now() + chrono::Duration::hours(1),
        );
        let waiting_id = h.queue.enqueue(waiting).await.unwrap();
        assert_eq!(
            h.worker.process_one().await.unwrap(),
            ProcessOutcome::NotDue { job_id: waiting_id }
        );
        let state = h.circuit.snapshot().await.unwrap();
        assert_eq!(state.state, CircuitStatus::HalfOpen);
        assert_eq!(state.last_probe_at, None);

        // 下一个到期任务领取试探并完成恢复
        let ready = h.queue.enqueue(job("Alien", "/movies/alien.mkv")).await.unwrap();
        assert_eq!(
            h.worker.process_one().await.unwrap(),
            ProcessOutcome::Completed {
                job_id: ready,
                target_key: "43".into()
            }
        );
        assert_eq!(h.circuit.snapshot().await.unwrap().state, CircuitStatus::Closed);
    }

    #[tokio::test]
    async fn test_not_found_during_half_open_returns_trial() {
        let h = harness(slow_recovery(), ProbeConfig::default()).await;
        open_long_ago(&h).await;
        h.queue
            .enqueue(job("Unknown", "/movies/unknown.mkv"))
            .await
            .unwrap();

        match h.worker.process_one().await.unwrap() {
            ProcessOutcome::Retried { error_type, .. } => {
                assert_eq!(error_type, ErrorType::NotFound)
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        let state = h.circuit.snapshot().await.unwrap();
        assert_eq!(state.state, CircuitStatus::HalfOpen);
        assert_eq!(state.last_probe_at, None);
        assert!(h.circuit.allow_request().await.unwrap());
    }

    #[tokio::test]
    async fn test_requeued_job_counts_once_per_outage() {
        let h = harness_with(
            slow_recovery(),
            ProbeConfig::default(),
            SyncWorkerConfig {
                lease_wait: Duration::from_millis(200),
                circuit_open_requeue: Duration::ZERO,
                idle_interval: Duration::from_millis(5),
            },
        )
        .await;
        h.catalog.healthy.store(false, Ordering::SeqCst);
        h.circuit.record_failure().await.unwrap();
        let id = h.queue.enqueue(job("Heat", "/movies/heat.mkv")).await.unwrap();

        for _ in 0..3 {
            assert_eq!(
                h.worker.process_one().await.unwrap(),
                ProcessOutcome::ShortCircuited { job_id: id }
            );
        }

        let records = h.history.records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].jobs_affected, 1);

        let requeued = h
            .queue
            .find_pending_by_subject("subject-Heat")
            .await
            .unwrap()
            .unwrap();
        assert!(requeued.payload.retry.last_short_circuit_at.is_some());
        assert_eq!(requeued.retry_count(), 0);
    }
}
