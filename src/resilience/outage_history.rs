// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::models::circuit::CircuitStatus;
use crate::domain::models::outage::{OutageRecord, OutageSummary};
use crate::domain::repositories::job_repository::RepositoryError;
use crate::domain::repositories::outage_repository::OutageRepository;
use crate::resilience::circuit_breaker::{CircuitListener, Transition};

/// 故障历史
///
/// 记录由熔断器在状态转换的同一事务中开始和结束，这里负责受影响任务计数、
/// 查询与统计。作为监听器只输出日志与指标。
pub struct OutageHistory {
    repository: Arc<dyn OutageRepository>,
}

impl OutageHistory {
    pub fn new(repository: Arc<dyn OutageRepository>) -> Self {
        Self { repository }
    }

    /// 任务在进行中的故障里首次被短路时受影响任务数加一
    ///
    /// # 参数
    ///
    /// * `counted_at` - 该任务上一次被短路的时间，不早于故障开始时说明本次故障已计数
    ///
    /// # 返回值
    ///
    /// 是否计数
    pub async fn record_affected_job(
        &self,
        counted_at: Option<DateTime<Utc>>,
    ) -> Result<bool, RepositoryError> {
        let Some(outage) = self.repository.ongoing().await? else {
            warn!("Job short-circuited without an ongoing outage record");
            return Ok(false);
        };
        if counted_at.is_some_and(|at| at >= outage.started_at) {
            return Ok(false);
        }
        self.repository.increment_jobs_affected(outage.id).await
    }

    /// 全部记录，最早的在前
    pub async fn records(&self) -> Result<Vec<OutageRecord>, RepositoryError> {
        self.repository.list().await
    }

    pub async fn latest_completed(&self) -> Result<Option<OutageRecord>, RepositoryError> {
        self.repository.latest_completed().await
    }

    /// 汇总统计
    ///
    /// # 参数
    ///
    /// * `now` - 计算进行中故障与观测窗口的截止时间
    ///
    /// # 返回值
    ///
    /// MTTR 为已结束故障的平均持续时间；MTBF 为相邻故障开始时间的平均间隔；
    /// 可用率为观测窗口（第一条记录开始至 `now`）内非故障时间的占比。
    pub async fn summary(&self, now: DateTime<Utc>) -> Result<OutageSummary, RepositoryError> {
        let records = self.repository.list().await?;
        Ok(summarize(&records, now))
    }
}

#[async_trait]
impl CircuitListener for OutageHistory {
    async fn on_transition(&self, transition: Transition) {
        match (transition.from, transition.to) {
            (CircuitStatus::Closed, CircuitStatus::Open) => {
                counter!("outages_total").increment(1);
                warn!("Outage started at {}", transition.at);
            }
            (from, CircuitStatus::Closed) if from != CircuitStatus::Closed => {
                match self.repository.latest_completed().await {
                    Ok(Some(record)) => info!(
                        "Downstream recovered, outage {} lasted {} ms ({} jobs affected)",
                        record.id,
                        record.duration_ms.unwrap_or_default(),
                        record.jobs_affected
                    ),
                    Ok(None) => {}
                    Err(e) => debug!("Failed to read outage history: {}", e),
                }
            }
            _ => {}
        }
    }
}

fn summarize(records: &[OutageRecord], now: DateTime<Utc>) -> OutageSummary {
    let completed: Vec<i64> = records.iter().filter_map(|r| r.duration_ms).collect();
    let mttr_secs = (!completed.is_empty())
        .then(|| completed.iter().sum::<i64>() as f64 / completed.len() as f64 / 1000.0);

    let mtbf_secs = (records.len() > 1).then(|| {
        let gaps: i64 = records
            .windows(2)
            .map(|w| (w[1].started_at - w[0].started_at).num_milliseconds())
            .sum();
        gaps as f64 / (records.len() - 1) as f64 / 1000.0
    });

    let availability = match records.first() {
        Some(first) => {
            let window = (now - first.started_at).num_milliseconds();
            if window <= 0 {
                0.0
            } else {
                let down: i64 = records
                    .iter()
                    .map(|r| {
                        let end = r.ended_at.unwrap_or(now);
                        (end - r.started_at).num_milliseconds().max(0)
                    })
                    .sum();
                (1.0 - down as f64 / window as f64).clamp(0.0, 1.0)
            }
        }
        None => 1.0,
    };

    OutageSummary {
        total_outages: records.len(),
        ongoing: records.last().is_some_and(OutageRecord::is_ongoing),
        mttr_secs,
        mtbf_secs,
        availability,
        total_jobs_affected: records.iter().map(|r| r.jobs_affected).sum(),
    }
}
