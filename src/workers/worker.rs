// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::utils::errors::WorkerError;
use async_trait::async_trait;
use tokio::sync::watch;

/// 后台工作器
///
/// 由 `WorkerManager` 启动。关闭信号变为 `true` 后，应在当前处理周期结束时返回，
/// 已租用但未处理的任务需交还队列。
#[async_trait]
pub trait Worker: Send + Sync {
    /// 持续处理直到收到关闭信号
    async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), WorkerError>;

    /// 用于日志的名称
    fn name(&self) -> &str;
}
