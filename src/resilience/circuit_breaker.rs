// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::settings::CircuitBreakerSettings;
use crate::domain::models::circuit::{CircuitBreakerState, CircuitStatus};
use crate::domain::models::outage::OutageChange;
use crate::domain::repositories::circuit_state_repository::CircuitStateRepository;
use crate::domain::repositories::job_repository::RepositoryError;

/// 比较并交换的最大尝试次数
const MAX_CAS_ATTEMPTS: usize = 16;

/// 熔断器配置
#[derive(Clone, Debug)]
pub struct CircuitConfig {
    /// 连续失败阈值
    pub failure_threshold: u32,
    /// 打开后进入半开的等待时间
    pub recovery_timeout: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&CircuitBreakerSettings> for CircuitConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold.max(1),
            recovery_timeout: Duration::from_secs(settings.recovery_timeout_secs),
        }
    }
}

/// 状态转换
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: CircuitStatus,
    pub to: CircuitStatus,
    pub at: DateTime<Utc>,
}

/// 状态转换监听器
#[async_trait]
pub trait CircuitListener: Send + Sync {
    async fn on_transition(&self, transition: Transition);
}

/// 熔断器
///
/// 状态保存在数据库中，每次操作都重新读取并以版本号做比较并交换写入，
/// 多个进程共享同一个熔断器。故障记录的开始与结束和状态在同一事务中提交，
/// 只有写入成功的一方发出状态转换通知。
pub struct CircuitBreaker {
    repository: Arc<dyn CircuitStateRepository>,
    config: CircuitConfig,
    listeners: RwLock<Vec<Weak<dyn CircuitListener>>>,
}

impl CircuitBreaker {
    /// 创建熔断器
    ///
    /// # 参数
    ///
    /// * `repository` - 状态仓库
    /// * `config` - 配置
    pub fn new(repository: Arc<dyn CircuitStateRepository>, config: CircuitConfig) -> Self {
        Self {
            repository,
            config,
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    /// 注册状态转换监听器，只保留弱引用
    pub fn subscribe(&self, listener: Weak<dyn CircuitListener>) {
        self.listeners.write().push(listener);
    }

    /// 读取当前持久化状态
    pub async fn snapshot(&self) -> Result<CircuitBreakerState, RepositoryError> {
        self.repository.load().await
    }

    /// 是否允许一次下游调用
    pub async fn allow_request(&self) -> Result<bool, RepositoryError> {
        self.allow_request_at(Utc::now()).await
    }

    /// 以给定时间判断是否放行
    ///
    /// OPEN 状态超过恢复等待时间后转入 HALF_OPEN 并领取唯一的试探机会；
    /// HALF_OPEN 状态下试探已被领取时拒绝，领取超过恢复等待时间视为失效。
    pub async fn allow_request_at(&self, now: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let timeout = chrono::Duration::from_std(self.config.recovery_timeout)
            .unwrap_or(chrono::Duration::MAX);

        let outcome = self
            .update(|state| match state.state {
                CircuitStatus::Closed => None,
                CircuitStatus::Open => {
                    let elapsed = state.opened_at.is_none_or(|at| now - at >= timeout);
                    elapsed.then(|| CircuitBreakerState {
                        state: CircuitStatus::HalfOpen,
                        last_probe_at: Some(now),
                        ..state.clone()
                    })
                }
                CircuitStatus::HalfOpen => {
                    let claimable = state.last_probe_at.is_none_or(|at| now - at >= timeout);
                    claimable.then(|| CircuitBreakerState {
                        last_probe_at: Some(now),
                        ..state.clone()
                    })
                }
            }, now)
            .await?;

        let allowed = match outcome {
            Update::Unchanged(state) => state.state == CircuitStatus::Closed,
            Update::Saved { .. } => true,
        };

        if !allowed {
            counter!("circuit_breaker_rejected_total").increment(1);
        }
        Ok(allowed)
    }

    /// 记录成功
    ///
    /// CLOSED 下连续失败计数清零；HALF_OPEN 下试探成功回到 CLOSED；
    /// OPEN 状态不受影响，恢复必须先经过恢复等待时间进入 HALF_OPEN。
    /// 返回是否发生了恢复转换。
    pub async fn record_success(&self) -> Result<bool, RepositoryError> {
        self.record_success_at(Utc::now()).await
    }

    pub async fn record_success_at(&self, now: DateTime<Utc>) -> Result<bool, RepositoryError> {
        counter!("circuit_breaker_requests_total").increment(1);
        counter!("circuit_breaker_successes_total").increment(1);

        let outcome = self
            .update(|state| match state.state {
                CircuitStatus::Closed if state.consecutive_failures == 0 => None,
                CircuitStatus::Open => None,
                CircuitStatus::Closed | CircuitStatus::HalfOpen => Some(CircuitBreakerState {
                    state: CircuitStatus::Closed,
                    consecutive_failures: 0,
                    opened_at: None,
                    last_probe_at: None,
                    version: state.version,
                }),
            }, now)
            .await?;

        Ok(matches!(outcome, Update::Saved { from, .. } if from != CircuitStatus::Closed))
    }

    /// 交还未使用的半开试探机会
    ///
    /// 仅当试探仍由 `claimed_at` 这次领取持有时清除，之后的请求可以重新领取。
    pub async fn release_trial(&self, claimed_at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let outcome = self
            .update(|state| {
                let held = state.state == CircuitStatus::HalfOpen
                    && state.last_probe_at == Some(claimed_at);
                held.then(|| CircuitBreakerState {
                    last_probe_at: None,
                    ..state.clone()
                })
            }, claimed_at)
            .await?;

        Ok(matches!(outcome, Update::Saved { .. }))
    }

    /// 记录失败
    ///
    /// CLOSED 下连续失败达到阈值转为 OPEN；HALF_OPEN 下试探失败重新打开并重置打开时间。
    pub async fn record_failure(&self) -> Result<CircuitStatus, RepositoryError> {
        self.record_failure_at(Utc::now()).await
    }

    pub async fn record_failure_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<CircuitStatus, RepositoryError> {
        counter!("circuit_breaker_requests_total").increment(1);
        counter!("circuit_breaker_failures_total").increment(1);

        let threshold = self.config.failure_threshold;
        let outcome = self
            .update(|state| {
                let failures = state.consecutive_failures.saturating_add(1);
                let next = match state.state {
                    CircuitStatus::Closed if failures >= threshold => CircuitBreakerState {
                        state: CircuitStatus::Open,
                        consecutive_failures: failures,
                        opened_at: Some(now),
                        last_probe_at: None,
                        version: state.version,
                    },
                    CircuitStatus::HalfOpen => CircuitBreakerState {
                        state: CircuitStatus::Open,
                        consecutive_failures: failures,
                        opened_at: Some(now),
                        last_probe_at: None,
                        version: state.version,
                    },
                    _ => CircuitBreakerState {
                        consecutive_failures: failures,
                        ..state.clone()
                    },
                };
                Some(next)
            }, now)
            .await?;

        Ok(match outcome {
            Update::Unchanged(state) => state.state,
            Update::Saved { to, .. } => to,
        })
    }

    /// 读取、计算、条件写入，冲突时重试
    async fn update<F>(&self, mutate: F, now: DateTime<Utc>) -> Result<Update, RepositoryError>
    where
        F: Fn(&CircuitBreakerState) -> Option<CircuitBreakerState> + Send + Sync,
    {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.repository.load().await?;
            let Some(next) = mutate(&current) else {
                return Ok(Update::Unchanged(current));
            };

            let (from, to) = (current.state, next.state);
            let saved = match OutageChange::for_transition(from, to, now) {
                Some(change) => {
                    self.repository
                        .compare_and_save_with_outage(&next, change)
                        .await?
                }
                None => self.repository.compare_and_save(&next).await?,
            };
            if saved {
                if from != to {
                    self.on_transition(Transition { from, to, at: now }).await;
                }
                return Ok(Update::Saved { from, to });
            }
            debug!("Circuit state changed concurrently, retrying");
        }
        Err(RepositoryError::Conflict("circuit_breaker_state"))
    }

    async fn on_transition(&self, transition: Transition) {
        update_status_metric(transition.to);
        match transition.to {
            CircuitStatus::Open => warn!(
                "Circuit breaker opened ({} -> {})",
                transition.from, transition.to
            ),
            _ => info!(
                "Circuit breaker transition {} -> {}",
                transition.from, transition.to
            ),
        }

        let listeners: Vec<Arc<dyn CircuitListener>> = {
            let mut guard = self.listeners.write();
            guard.retain(|l| l.strong_count() > 0);
            guard.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in listeners {
            listener.on_transition(transition).await;
        }
    }
}

enum Update {
    Unchanged(CircuitBreakerState),
    Saved {
        from: CircuitStatus,
        to: CircuitStatus,
    },
}

/// 更新状态指标
fn update_status_metric(status: CircuitStatus) {
    let val = match status {
        CircuitStatus::Closed => 0.0,
        CircuitStatus::Open => 1.0,
        CircuitStatus::HalfOpen => 0.5,
    };
    gauge!("circuit_breaker_status").set(val);
}
