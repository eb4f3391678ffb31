// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::circuit::CircuitStatus;

/// 一次故障窗口
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutageRecord {
    pub id: i32,
    pub started_at: DateTime<Utc>,
    /// 故障进行中时为空
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    /// 故障期间被短路的任务数
    pub jobs_affected: i64,
}

impl OutageRecord {
    pub fn is_ongoing(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// 故障统计摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutageSummary {
    pub total_outages: usize,
    pub ongoing: bool,
    /// 平均恢复时间（秒）
    pub mttr_secs: Option<f64>,
    /// 平均故障间隔（秒）
    pub mtbf_secs: Option<f64>,
    /// 可用率 (0.0-1.0)
    pub availability: f64,
    pub total_jobs_affected: i64,
}

/// 随熔断器状态一同提交的故障记录变更
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutageChange {
    /// CLOSED→OPEN，追加一条进行中的记录
    Start(DateTime<Utc>),
    /// 回到 CLOSED，结束最近一条进行中的记录
    End(DateTime<Utc>),
}

impl OutageChange {
    /// 状态转换对应的记录变更，故障期间内部的转换没有变更
    pub fn for_transition(
        from: CircuitStatus,
        to: CircuitStatus,
        at: DateTime<Utc>,
    ) -> Option<Self> {
        match (from, to) {
            (CircuitStatus::Closed, CircuitStatus::Open) => Some(Self::Start(at)),
            (from, CircuitStatus::Closed) if from != CircuitStatus::Closed => Some(Self::End(at)),
            _ => None,
        }
    }
}
