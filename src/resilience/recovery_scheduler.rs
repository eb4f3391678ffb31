// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use metrics::counter;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clients::traits::DownstreamClient;
use crate::config::settings::RecoverySettings;
use crate::domain::models::circuit::CircuitStatus;
use crate::domain::models::recovery::RecoveryState;
use crate::domain::repositories::job_repository::RepositoryError;
use crate::domain::repositories::recovery_state_repository::RecoveryStateRepository;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::outage_history::OutageHistory;

const MAX_CAS_ATTEMPTS: usize = 16;

/// 健康探测配置
#[derive(Clone, Debug)]
pub struct ProbeConfig {
    pub floor: Duration,
    pub cap: Duration,
    /// 单次探测超时
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            floor: Duration::from_secs(5),
            cap: Duration::from_secs(60),
            timeout: Duration::from_secs(5),
        }
    }
}

impl From<&RecoverySettings> for ProbeConfig {
    fn from(settings: &RecoverySettings) -> Self {
        Self {
            floor: Duration::from_secs(settings.probe_floor_secs),
            cap: Duration::from_secs(settings.probe_cap_secs),
            timeout: Duration::from_secs(settings.probe_timeout_secs),
        }
    }
}

/// 一次检查的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// 熔断器关闭，无需探测
    Idle,
    /// 距上次探测未到间隔
    NotDue,
    /// 其他进程已领取本轮探测
    ClaimedElsewhere,
    ProbeFailed,
    /// 探测通过，但熔断器尚在恢复等待时间内或试探已被其他请求领取
    Healthy,
    Recovered,
}

/// 恢复调度器
///
/// 每次调用时做一次轻量检查，熔断器非关闭且到达探测间隔时发起一次健康探测，
/// 探测结果反馈给熔断器。探测通过时需要先领取半开试探，熔断器从 OPEN
/// 经过恢复等待时间进入 HALF_OPEN 后才会关闭。
/// 探测间隔按连续失败次数指数增长，介于下限与上限之间。
pub struct RecoveryScheduler {
    circuit: Arc<CircuitBreaker>,
    downstream: Arc<dyn DownstreamClient>,
    repository: Arc<dyn RecoveryStateRepository>,
    history: Option<Weak<OutageHistory>>,
    config: ProbeConfig,
}

impl RecoveryScheduler {
    pub fn new(
        circuit: Arc<CircuitBreaker>,
        downstream: Arc<dyn DownstreamClient>,
        repository: Arc<dyn RecoveryStateRepository>,
        config: ProbeConfig,
    ) -> Self {
        Self {
            circuit,
            downstream,
            repository,
            history: None,
            config,
        }
    }

    /// 关联故障历史，用于恢复通知中的故障时长
    pub fn with_history(mut self, history: Weak<OutageHistory>) -> Self {
        self.history = Some(history);
        self
    }

    /// 给定连续失败次数下的探测间隔
    pub fn probe_interval(&self, consecutive_failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(consecutive_failures.min(31));
        self.config
            .floor
            .checked_mul(factor)
            .unwrap_or(self.config.cap)
            .min(self.config.cap)
    }

    pub async fn state(&self) -> Result<RecoveryState, RepositoryError> {
        self.repository.load().await
    }

    pub async fn tick(&self) -> Result<TickOutcome, RepositoryError> {
        self.tick_at(Utc::now()).await
    }

    /// 以给定时间执行一次检查
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<TickOutcome, RepositoryError> {
        if self.circuit.snapshot().await?.state == CircuitStatus::Closed {
            return Ok(TickOutcome::Idle);
        }

        let state = self.repository.load().await?;
        let interval = self.probe_interval(state.consecutive_probe_failures);
        let interval = chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::MAX);
        if state.last_check_time.is_some_and(|last| now - last < interval) {
            return Ok(TickOutcome::NotDue);
        }

        // 先写入检查时间领取本轮探测
        let claimed = RecoveryState {
            last_check_time: Some(now),
            ..state
        };
        if !self.repository.compare_and_save(&claimed).await? {
            debug!("Recovery probe claimed by another process");
            return Ok(TickOutcome::ClaimedElsewhere);
        }

        match self.downstream.health_check(self.config.timeout).await {
            Ok(()) => {
                counter!("recovery_probes_total", "result" => "success").increment(1);
                if !self.circuit.allow_request_at(now).await? {
                    debug!("Downstream healthy, circuit not ready to close");
                    self.update_state(|s| {
                        s.consecutive_probe_successes =
                            s.consecutive_probe_successes.saturating_add(1);
                        s.consecutive_probe_failures = 0;
                    })
                    .await?;
                    return Ok(TickOutcome::Healthy);
                }

                let recovered = self.circuit.record_success_at(now).await?;
                self.update_state(|s| {
                    s.consecutive_probe_successes = s.consecutive_probe_successes.saturating_add(1);
                    s.consecutive_probe_failures = 0;
                    s.recovery_count += 1;
                    s.last_recovery_time = Some(now);
                })
                .await?;
                self.notify_recovered(recovered).await;
                Ok(TickOutcome::Recovered)
            }
            Err(e) => {
                counter!("recovery_probes_total", "result" => "failure").increment(1);
                warn!("Recovery probe failed: {}", e);
                self.circuit.record_failure_at(now).await?;
                self.update_state(|s| {
                    s.consecutive_probe_failures = s.consecutive_probe_failures.saturating_add(1);
                    s.consecutive_probe_successes = 0;
                })
                .await?;
                Ok(TickOutcome::ProbeFailed)
            }
        }
    }

    async fn update_state<F>(&self, mutate: F) -> Result<(), RepositoryError>
    where
        F: Fn(&mut RecoveryState) + Send + Sync,
    {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let mut state = self.repository.load().await?;
            mutate(&mut state);
            if self.repository.compare_and_save(&state).await? {
                return Ok(());
            }
        }
        Err(RepositoryError::Conflict("recovery_state"))
    }

    async fn notify_recovered(&self, transitioned: bool) {
        if !transitioned {
            info!("Recovery probe passed, circuit already closed");
            return;
        }
        let history = self.history.as_ref().and_then(Weak::upgrade);
        let latest = match history {
            Some(history) => history.latest_completed().await.ok().flatten(),
            None => None,
        };
        match latest {
            Some(outage) => info!(
                "Downstream recovered after {} ms, resuming job processing",
                outage.duration_ms.unwrap_or_default()
            ),
            None => info!("Downstream recovered, resuming job processing"),
        }
    }
}
