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

use crate::domain::models::recovery::RecoveryState;
use crate::domain::repositories::job_repository::RepositoryError;
use crate::domain::repositories::recovery_state_repository::RecoveryStateRepository;
use crate::infrastructure::database::entities::recovery_state as recovery_entity;
use async_trait::async_trait;
use sea_orm::{sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;

const STATE_ROW_ID: i32 = 1;

/// 恢复状态仓库实现
#[derive(Clone)]
pub struct RecoveryStateRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl RecoveryStateRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<recovery_entity::Model> for RecoveryState {
    fn from(model: recovery_entity::Model) -> Self {
        Self {
            last_check_time: model.last_check_time,
            consecutive_probe_successes: u32::try_from(model.consecutive_probe_successes)
                .unwrap_or(0),
            consecutive_probe_failures: u32::try_from(model.consecutive_probe_failures)
                .unwrap_or(0),
            recovery_count: u64::try_from(model.recovery_count).unwrap_or(0),
            last_recovery_time: model.last_recovery_time,
            version: model.version,
        }
    }
}

#[async_trait]
impl RecoveryStateRepository for RecoveryStateRepositoryImpl {
    async fn load(&self) -> Result<RecoveryState, RepositoryError> {
        let model = recovery_entity::Entity::find_by_id(STATE_ROW_ID)
            .one(self.db.as_ref())
            .await?
            .ok_or(RepositoryError::NotFound)?;
        Ok(model.into())
    }

    async fn compare_and_save(&self, state: &RecoveryState) -> Result<bool, RepositoryError> {
        let successes = i32::try_from(state.consecutive_probe_successes).unwrap_or(i32::MAX);
        let failures = i32::try_from(state.consecutive_probe_failures).unwrap_or(i32::MAX);
        let recoveries = i64::try_from(state.recovery_count).unwrap_or(i64::MAX);

        let result = recovery_entity::Entity::update_many()
            .col_expr(
                recovery_entity::Column::LastCheckTime,
                Expr::value(state.last_check_time),
            )
            .col_expr(
                recovery_entity::Column::ConsecutiveProbeSuccesses,
                Expr::value(successes),
            )
            .col_expr(
                recovery_entity::Column::ConsecutiveProbeFailures,
                Expr::value(failures),
            )
            .col_expr(recovery_entity::Column::RecoveryCount, Expr::value(recoveries))
            .col_expr(
                recovery_entity::Column::LastRecoveryTime,
                Expr::value(state.last_recovery_time),
            )
            .col_expr(recovery_entity::Column::Version, Expr::value(state.version + 1))
            .filter(recovery_entity::Column::Id.eq(STATE_ROW_ID))
            .filter(recovery_entity::Column::Version.eq(state.version))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::memory_db;
    use chrono::Utc;

    #[tokio::test]
    async fn test_recovery_state_round_trip() {
        let repo = RecoveryStateRepositoryImpl::new(memory_db().await);
        let mut state = repo.load().await.unwrap();
        assert_eq!(state, RecoveryState::default());

        state.last_check_time = Some(Utc::now());
        state.consecutive_probe_failures = 3;
        state.recovery_count = 2;
        state.last_recovery_time = Some(Utc::now());
        assert!(repo.compare_and_save(&state).await.unwrap());

        let reloaded = repo.load().await.unwrap();
        assert_eq!(reloaded.version, state.version + 1);
        assert_eq!(
            RecoveryState {
                version: state.version,
                ..reloaded
            },
            state
        );
    }
}
