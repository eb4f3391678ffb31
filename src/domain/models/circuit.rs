// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 熔断器状态枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStatus {
    /// 关闭状态，请求正常通过
    #[default]
    Closed,
    /// 打开状态，请求直接短路
    Open,
    /// 半开状态，只放行一次试探
    HalfOpen,
}

impl fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CircuitStatus::Closed => write!(f, "closed"),
            CircuitStatus::Open => write!(f, "open"),
            CircuitStatus::HalfOpen => write!(f, "half_open"),
        }
    }
}

impl FromStr for CircuitStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "closed" => Ok(CircuitStatus::Closed),
            "open" => Ok(CircuitStatus::Open),
            "half_open" => Ok(CircuitStatus::HalfOpen),
            _ => Err(()),
        }
    }
}

/// 持久化的熔断器状态
///
/// `version` 用于跨进程的比较并交换写入。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct CircuitBreakerState {
    pub state: CircuitStatus,
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
    /// 半开状态下试探请求被领取的时间
    pub last_probe_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub version: i64,
}
