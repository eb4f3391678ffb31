// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::job_repository::RepositoryError;
use crate::domain::models::recovery::RecoveryState;
use async_trait::async_trait;

/// 恢复状态仓库特质
#[async_trait]
pub trait RecoveryStateRepository: Send + Sync {
    async fn load(&self) -> Result<RecoveryState, RepositoryError>;
    /// 版本号匹配时写入
    async fn compare_and_save(&self, state: &RecoveryState) -> Result<bool, RepositoryError>;
}
