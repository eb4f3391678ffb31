// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 恢复调度器的持久化记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct RecoveryState {
    pub last_check_time: Option<DateTime<Utc>>,
    pub consecutive_probe_successes: u32,
    pub consecutive_probe_failures: u32,
    pub recovery_count: u64,
    pub last_recovery_time: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub version: i64,
}
