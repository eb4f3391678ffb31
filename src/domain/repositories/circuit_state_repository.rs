// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::job_repository::RepositoryError;
use crate::domain::models::circuit::CircuitBreakerState;
use crate::domain::models::outage::OutageChange;
use async_trait::async_trait;

/// 熔断器状态仓库特质
#[async_trait]
pub trait CircuitStateRepository: Send + Sync {
    /// 读取当前状态
    async fn load(&self) -> Result<CircuitBreakerState, RepositoryError>;
    /// 仅当存储中的版本仍为 `state.version` 时写入，成功后版本号加一
    async fn compare_and_save(&self, state: &CircuitBreakerState)
        -> Result<bool, RepositoryError>;
    /// 与 `compare_and_save` 相同，并在同一事务中写入故障记录变更
    async fn compare_and_save_with_outage(
        &self,
        state: &CircuitBreakerState,
        change: OutageChange,
    ) -> Result<bool, RepositoryError>;
}
