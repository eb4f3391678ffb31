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

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::domain::services::confidence_matcher::MatchMode;

/// 应用程序配置设置
///
/// 包含存储、服务器、队列、重试、熔断、恢复、死信以及上下游客户端的所有配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 数据库配置
    pub database: DatabaseSettings,
    /// 服务器配置
    pub server: ServerSettings,
    /// 指标配置
    pub metrics: MetricsSettings,
    /// 队列配置
    pub queue: QueueSettings,
    /// 重试配置
    pub retry: RetrySettings,
    /// 熔断器配置
    pub circuit_breaker: CircuitBreakerSettings,
    /// 恢复调度配置
    pub recovery: RecoverySettings,
    /// 死信队列配置
    pub dlq: DlqSettings,
    /// 身份匹配配置
    pub matching: MatchingSettings,
    /// 下游目录客户端配置
    pub downstream: ClientSettings,
    /// 上游数据源客户端配置
    pub source: ClientSettings,
}

/// 数据库配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// 数据库连接URL
    pub url: String,
    /// 最大连接数
    pub max_connections: Option<u32>,
    /// 最小连接数
    pub min_connections: Option<u32>,
    /// 连接超时时间（秒）
    pub connect_timeout: Option<u64>,
    /// 空闲连接超时时间（秒）
    pub idle_timeout: Option<u64>,
}

/// 服务器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// 服务器监听主机地址
    pub host: String,
    /// 服务器监听端口
    pub port: u16,
}

/// 指标配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    pub enabled: bool,
    /// Prometheus 抓取地址
    pub listen_addr: String,
}

/// 队列配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    /// 租约超时（秒），超时后任务重新可见
    pub lease_timeout_secs: u64,
    /// 租用等待上限（毫秒）
    pub lease_wait_ms: u64,
    /// 队列为空时的轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 熔断打开时任务的退回延迟（秒）
    pub circuit_open_requeue_secs: u64,
}

/// 重试配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    pub standard_base_secs: u64,
    pub standard_cap_secs: u64,
    pub standard_max_attempts: u32,
    pub not_found_base_secs: u64,
    pub not_found_cap_secs: u64,
    pub not_found_max_attempts: u32,
}

/// 熔断器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerSettings {
    /// 连续失败阈值
    pub failure_threshold: u32,
    /// 打开后进入半开的等待时间（秒）
    pub recovery_timeout_secs: u64,
}

/// 恢复调度配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct RecoverySettings {
    /// 探测间隔下限（秒）
    pub probe_floor_secs: u64,
    /// 探测间隔上限（秒）
    pub probe_cap_secs: u64,
    /// 健康探测超时（秒）
    pub probe_timeout_secs: u64,
    /// 故障记录保留条数
    pub outage_history_capacity: usize,
    /// 死信恢复默认允许的错误类型
    pub default_error_types: Vec<String>,
}

/// 死信队列配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct DlqSettings {
    /// 保留天数
    pub retention_days: i64,
    /// 维护任务间隔（秒）
    pub maintenance_interval_secs: u64,
}

/// 身份匹配配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    /// strict 或 permissive
    pub mode: MatchMode,
    /// 下游目录中的库名
    pub library: String,
}

/// HTTP 客户端配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSettings {
    pub base_url: String,
    pub token: Option<String>,
    /// 普通请求超时（秒）
    pub request_timeout_secs: u64,
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次叠加默认值、`config/default`、`config/{APP_ENVIRONMENT}` 和
    /// `METASYNC__` 前缀的环境变量
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        Self::builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("METASYNC").separator("__"))
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<config::builder::ConfigBuilder<config::builder::DefaultState>, ConfigError>
    {
        Config::builder()
            .set_default("database.url", "sqlite://data/metasync.db?mode=rwc")?
            .set_default("database.max_connections", 5)?
            .set_default("database.min_connections", 1)?
            .set_default("database.connect_timeout", 10)?
            .set_default("database.idle_timeout", 300)?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("metrics.enabled", false)?
            .set_default("metrics.listen_addr", "127.0.0.1:9000")?
            .set_default("queue.lease_timeout_secs", 300)?
            .set_default("queue.lease_wait_ms", 1000)?
            .set_default("queue.poll_interval_ms", 200)?
            .set_default("queue.circuit_open_requeue_secs", 30)?
            .set_default("retry.standard_base_secs", 5)?
            .set_default("retry.standard_cap_secs", 80)?
            .set_default("retry.standard_max_attempts", 5)?
            .set_default("retry.not_found_base_secs", 30)?
            .set_default("retry.not_found_cap_secs", 600)?
            .set_default("retry.not_found_max_attempts", 12)?
            .set_default("circuit_breaker.failure_threshold", 5)?
            .set_default("circuit_breaker.recovery_timeout_secs", 60)?
            .set_default("recovery.probe_floor_secs", 5)?
            .set_default("recovery.probe_cap_secs", 60)?
            .set_default("recovery.probe_timeout_secs", 5)?
            .set_default("recovery.outage_history_capacity", 30)?
            .set_default("recovery.default_error_types", vec!["downstream_unreachable"])?
            .set_default("dlq.retention_days", 30)?
            .set_default("dlq.maintenance_interval_secs", 300)?
            .set_default("matching.mode", "strict")?
            .set_default("matching.library", "default")?
            .set_default("downstream.base_url", "http://127.0.0.1:8096")?
            .set_default("downstream.request_timeout_secs", 30)?
            .set_default("source.base_url", "http://127.0.0.1:8080")?
            .set_default("source.request_timeout_secs", 30)
    }
}
