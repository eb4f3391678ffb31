// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::config::settings::RetrySettings;
use crate::domain::models::error_type::ErrorType;

/// 退避参数
///
/// `delay(attempt)` 从 `[0, min(cap, base * 2^attempt)]` 中均匀抽取（full jitter）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffProfile {
    /// 基础退避时间
    pub base: Duration,
    /// 退避上限
    pub cap: Duration,
    /// 最多允许的失败次数，超过后进入死信队列
    pub max_attempts: u32,
}

impl BackoffProfile {
    /// 通用瞬时失败：5s 起，80s 封顶，最多 5 次
    pub fn standard() -> Self {
        Self {
            base: Duration::from_secs(5),
            cap: Duration::from_secs(80),
            max_attempts: 5,
        }
    }

    /// 目标对象尚未在下游出现：30s 起，600s 封顶，最多 12 次（约两小时）
    pub fn not_found() -> Self {
        Self {
            base: Duration::from_secs(30),
            cap: Duration::from_secs(600),
            max_attempts: 12,
        }
    }

    /// 第 `attempt` 次重试（从 0 开始）的延迟上界
    pub fn upper_bound(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.cap, |d| d.min(self.cap))
    }

    /// 计算带 full jitter 的退避时间
    pub fn delay(&self, attempt: u32) -> Duration {
        let upper_ms = self.upper_bound(attempt).as_millis() as u64;
        if upper_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::random_range(0..=upper_ms))
    }
}

/// 重试策略
///
/// 按错误类型选择退避参数：`not_found` 使用长退避，其余瞬时错误使用标准退避，
/// 永久错误不重试。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub standard: BackoffProfile,
    pub not_found: BackoffProfile,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            standard: BackoffProfile::standard(),
            not_found: BackoffProfile::not_found(),
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            standard: BackoffProfile {
                base: Duration::from_secs(settings.standard_base_secs),
                cap: Duration::from_secs(settings.standard_cap_secs),
                max_attempts: settings.standard_max_attempts,
            },
            not_found: BackoffProfile {
                base: Duration::from_secs(settings.not_found_base_secs),
                cap: Duration::from_secs(settings.not_found_cap_secs),
                max_attempts: settings.not_found_max_attempts,
            },
        }
    }
}

impl RetryPolicy {
    /// 错误类型对应的退避参数
    pub fn profile(&self, error_type: ErrorType) -> &BackoffProfile {
        match error_type {
            ErrorType::NotFound => &self.not_found,
            _ => &self.standard,
        }
    }

    /// 计算下次重试的退避时间
    ///
    /// `attempt` 为本次失败前已失败的次数
    pub fn delay(&self, attempt: u32, error_type: ErrorType) -> Duration {
        self.profile(error_type).delay(attempt)
    }

    /// 计算下次重试时间
    pub fn next_retry_time(
        &self,
        attempt: u32,
        error_type: ErrorType,
        base_time: DateTime<Utc>,
    ) -> (Duration, DateTime<Utc>) {
        let delay = self.delay(attempt, error_type);
        let at = base_time + chrono::Duration::milliseconds(delay.as_millis() as i64);
        (delay, at)
    }

    /// 失败次数达到 `failures` 后是否还应该重试
    pub fn should_retry(&self, failures: u32, error_type: ErrorType) -> bool {
        error_type.is_transient() && failures <= self.profile(error_type).max_attempts
    }
}
