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

use crate::domain::models::outage::OutageRecord;
use crate::domain::repositories::job_repository::RepositoryError;
use crate::domain::repositories::outage_repository::OutageRepository;
use crate::infrastructure::database::entities::outage_record as outage_entity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;

/// 故障记录仓库实现
///
/// 以自增主键作为追加顺序，超出容量时删除主键最小的记录。
/// 记录的开始与结束由熔断器状态仓库在同一事务中写入，见 [`append_outage`]。
#[derive(Clone)]
pub struct OutageRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl OutageRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<outage_entity::Model> for OutageRecord {
    fn from(model: outage_entity::Model) -> Self {
        Self {
            id: model.id,
            started_at: model.started_at,
            ended_at: model.ended_at,
            duration_ms: model.duration_ms,
            jobs_affected: model.jobs_affected,
        }
    }
}

/// 追加一条进行中的故障记录，超出容量时淘汰最早的记录
///
/// # 参数
///
/// * `conn` - 数据库连接或调用方的事务
/// * `started_at` - 故障开始时间
/// * `capacity` - 保留的记录上限
pub(crate) async fn append_outage<C: ConnectionTrait>(
    conn: &C,
    started_at: DateTime<Utc>,
    capacity: usize,
) -> Result<OutageRecord, RepositoryError> {
    let model = outage_entity::ActiveModel {
        started_at: Set(started_at),
        ended_at: Set(None),
        duration_ms: Set(None),
        jobs_affected: Set(0),
        ..Default::default()
    };
    let inserted = outage_entity::Entity::insert(model).exec(conn).await?;

    let total = outage_entity::Entity::find().count(conn).await?;
    let capacity = capacity.max(1) as u64;
    if total > capacity {
        let evicted: Vec<i32> = outage_entity::Entity::find()
            .select_only()
            .column(outage_entity::Column::Id)
            .order_by_asc(outage_entity::Column::Id)
            .limit(total - capacity)
            .into_tuple()
            .all(conn)
            .await?;
        outage_entity::Entity::delete_many()
            .filter(outage_entity::Column::Id.is_in(evicted))
            .exec(conn)
            .await?;
    }

    Ok(OutageRecord {
        id: inserted.last_insert_id,
        started_at,
        ended_at: None,
        duration_ms: None,
        jobs_affected: 0,
    })
}

/// 结束最近一条进行中的记录，没有进行中的记录时返回 `None`
pub(crate) async fn close_latest_outage<C: ConnectionTrait>(
    conn: &C,
    ended_at: DateTime<Utc>,
) -> Result<Option<OutageRecord>, RepositoryError> {
    let Some(open) = find_ongoing(conn).await? else {
        return Ok(None);
    };

    let duration_ms = (ended_at - open.started_at).num_milliseconds().max(0);
    let result = outage_entity::Entity::update_many()
        .col_expr(outage_entity::Column::EndedAt, Expr::value(Some(ended_at)))
        .col_expr(outage_entity::Column::DurationMs, Expr::value(Some(duration_ms)))
        .filter(outage_entity::Column::Id.eq(open.id))
        .filter(outage_entity::Column::EndedAt.is_null())
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Ok(None);
    }

    let mut record: OutageRecord = open.into();
    record.ended_at = Some(ended_at);
    record.duration_ms = Some(duration_ms);
    Ok(Some(record))
}

async fn find_ongoing<C: ConnectionTrait>(
    conn: &C,
) -> Result<Option<outage_entity::Model>, RepositoryError> {
    Ok(outage_entity::Entity::find()
        .filter(outage_entity::Column::EndedAt.is_null())
        .order_by_desc(outage_entity::Column::Id)
        .one(conn)
        .await?)
}

#[async_trait]
impl OutageRepository for OutageRepositoryImpl {
    async fn ongoing(&self) -> Result<Option<OutageRecord>, RepositoryError> {
        Ok(find_ongoing(self.db.as_ref()).await?.map(Into::into))
    }

    async fn increment_jobs_affected(&self, id: i32) -> Result<bool, RepositoryError> {
        let result = outage_entity::Entity::update_many()
            .col_expr(
                outage_entity::Column::JobsAffected,
                Expr::col(outage_entity::Column::JobsAffected).add(1),
            )
            .filter(outage_entity::Column::Id.eq(id))
            .filter(outage_entity::Column::EndedAt.is_null())
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected == 1)
    }

    async fn list(&self) -> Result<Vec<OutageRecord>, RepositoryError> {
        let models = outage_entity::Entity::find()
            .order_by_asc(outage_entity::Column::Id)
            .all(self.db.as_ref())
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn latest_completed(&self) -> Result<Option<OutageRecord>, RepositoryError> {
        let model = outage_entity::Entity::find()
            .filter(outage_entity::Column::EndedAt.is_not_null())
            .order_by_desc(outage_entity::Column::Id)
            .one(self.db.as_ref())
            .await?;
        Ok(model.map(Into::into))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::memory_db;
    use chrono::Duration;

    #[tokio::test]
    async fn test_append_evicts_oldest_beyond_capacity() {
        let db = memory_db().await;
        let repo = OutageRepositoryImpl::new(db.clone());
        let base = Utc::now() - Duration::hours(10);

        for i in 0..5 {
            let start = base + Duration::hours(i);
            append_outage(db.as_ref(), start, 3).await.unwrap();
            close_latest_outage(db.as_ref(), start + Duration::minutes(10))
                .await
                .unwrap();
        }

        let records = repo.list().await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].started_at, base + Duration::hours(2));
        assert_eq!(records[2].started_at, base + Duration::hours(4));
    }

    #[tokio::test]
    async fn test_close_sets_duration_and_counts_affected_jobs() {
        let db = memory_db().await;
        let repo = OutageRepositoryImpl::new(db.clone());
        let start = Utc::now() - Duration::minutes(5);
        let record = append_outage(db.as_ref(), start, 30).await.unwrap();
        assert_eq!(repo.ongoing().await.unwrap(), Some(record.clone()));

        assert!(repo.increment_jobs_affected(record.id).await.unwrap());
        assert!(repo.increment_jobs_affected(record.id).await.unwrap());
        assert!(repo.latest_completed().await.unwrap().is_none());

        let closed = close_latest_outage(db.as_ref(), start + Duration::seconds(90))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(closed.duration_ms, Some(90_000));
        assert_eq!(closed.jobs_affected, 2);

        // 已结束的故障不再计数
        assert!(!repo.increment_jobs_affected(record.id).await.unwrap());
        assert!(repo.ongoing().await.unwrap().is_none());
        assert!(close_latest_outage(db.as_ref(), Utc::now())
            .await
            .unwrap()
            .is_none());
        assert_eq!(repo.latest_completed().await.unwrap(), Some(closed));
    }
}
