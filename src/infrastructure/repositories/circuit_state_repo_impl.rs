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

use crate::domain::models::circuit::CircuitBreakerState;
use crate::domain::models::outage::OutageChange;
use crate::domain::repositories::circuit_state_repository::CircuitStateRepository;
use crate::domain::repositories::job_repository::RepositoryError;
use crate::infrastructure::database::entities::circuit_breaker_state as circuit_entity;
use crate::infrastructure::repositories::outage_repo_impl::{append_outage, close_latest_outage};
use async_trait::async_trait;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::warn;

/// 单行记录的主键
const STATE_ROW_ID: i32 = 1;

/// 默认保留的故障记录数
const DEFAULT_OUTAGE_CAPACITY: usize = 30;

/// 熔断器状态仓库实现
///
/// 状态转换引起的故障记录开始与结束和状态行在同一事务中提交，
/// 进程在两者之间被终止不会留下没有故障记录的 OPEN 状态。
#[derive(Clone)]
pub struct CircuitStateRepositoryImpl {
    db: Arc<DatabaseConnection>,
    outage_capacity: usize,
}

impl CircuitStateRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            outage_capacity: DEFAULT_OUTAGE_CAPACITY,
        }
    }

    /// 设置故障记录上限，超出时淘汰最早的记录
    pub fn with_outage_capacity(mut self, capacity: usize) -> Self {
        self.outage_capacity = capacity.max(1);
        self
    }
}

impl From<circuit_entity::Model> for CircuitBreakerState {
    fn from(model: circuit_entity::Model) -> Self {
        Self {
            state: model.state.parse().unwrap_or_default(),
            consecutive_failures: u32::try_from(model.consecutive_failures).unwrap_or(0),
            opened_at: model.opened_at,
            last_probe_at: model.last_probe_at,
            version: model.version,
        }
    }
}

/// 版本号匹配时写入状态行
async fn save_if_version<C: ConnectionTrait>(
    conn: &C,
    state: &CircuitBreakerState,
) -> Result<bool, RepositoryError> {
    let failures = i32::try_from(state.consecutive_failures).unwrap_or(i32::MAX);
    let result = circuit_entity::Entity::update_many()
        .col_expr(circuit_entity::Column::State, Expr::value(state.state.to_string()))
        .col_expr(circuit_entity::Column::ConsecutiveFailures, Expr::value(failures))
        .col_expr(circuit_entity::Column::OpenedAt, Expr::value(state.opened_at))
        .col_expr(
            circuit_entity::Column::LastProbeAt,
            Expr::value(state.last_probe_at),
        )
        .col_expr(circuit_entity::Column::Version, Expr::value(state.version + 1))
        .filter(circuit_entity::Column::Id.eq(STATE_ROW_ID))
        .filter(circuit_entity::Column::Version.eq(state.version))
        .exec(conn)
        .await?;

    Ok(result.rows_affected == 1)
}

#[async_trait]
impl CircuitStateRepository for CircuitStateRepositoryImpl {
    async fn load(&self) -> Result<CircuitBreakerState, RepositoryError> {
        let model = circuit_entity::Entity::find_by_id(STATE_ROW_ID)
            .one(self.db.as_ref())
            .await?
            .ok_or(RepositoryError::NotFound)?;
        Ok(model.into())
    }

    async fn compare_and_save(
        &self,
        state: &CircuitBreakerState,
    ) -> Result<bool, RepositoryError> {
        save_if_version(self.db.as_ref(), state).await
    }

    async fn compare_and_save_with_outage(
        &self,
        state: &CircuitBreakerState,
        change: OutageChange,
    ) -> Result<bool, RepositoryError> {
        let txn = self.db.begin().await?;

        if !save_if_version(&txn, state).await? {
            txn.rollback().await?;
            return Ok(false);
        }

        match change {
            OutageChange::Start(at) => {
                append_outage(&txn, at, self.outage_capacity).await?;
            }
            OutageChange::End(at) => {
                if close_latest_outage(&txn, at).await?.is_none() {
                    warn!("Circuit closed without an ongoing outage record");
                }
            }
        }

        txn.commit().await?;
        Ok(true)
    }
}
