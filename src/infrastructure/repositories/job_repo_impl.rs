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

use crate::domain::models::dead_letter::DeadLetterEntry;
use crate::domain::models::job::{Job, JobPayload, JobStatus};
use crate::domain::models::metadata::MetadataSnapshot;
use crate::domain::repositories::job_repository::{JobRepository, QueueStats, RepositoryError};
use crate::infrastructure::database::entities::sync_job as job_entity;
use crate::infrastructure::repositories::dead_letter_repo_impl::to_active_model as dead_letter_model;
use crate::infrastructure::database::entities::dead_letter as dead_letter_entity;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

/// 每次租用尝试读取的候选数量
const LEASE_CANDIDATES: u64 = 8;

/// 任务仓库实现
///
/// 基于SeaORM实现。租用采用乐观方式：先读出候选，再用带条件的 UPDATE
/// 领取，影响行数为 0 说明被其他进程抢先，继续尝试下一个候选。
#[derive(Clone)]
pub struct JobRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl JobRepositoryImpl {
    /// 创建新的任务仓库实例
    ///
    /// # 参数
    ///
    /// * `db` - 数据库连接
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// 可被租用的条件：等待中且已到可用时间，或租约已过期
    fn leasable(now: DateTime<Utc>) -> Condition {
        Condition::any()
            .add(
                Condition::all()
                    .add(job_entity::Column::Status.eq(JobStatus::Pending.to_string()))
                    .add(job_entity::Column::AvailableAt.lte(now)),
            )
            .add(
                Condition::all()
                    .add(job_entity::Column::Status.eq(JobStatus::Leased.to_string()))
                    .add(job_entity::Column::LeaseExpiresAt.lte(now)),
            )
    }
}

impl TryFrom<job_entity::Model> for Job {
    type Error = serde_json::Error;

    fn try_from(model: job_entity::Model) -> Result<Self, Self::Error> {
        let payload: JobPayload = serde_json::from_value(model.payload)?;
        Ok(Self {
            id: model.id,
            subject_id: model.subject_id,
            payload,
            status: model.status.parse().unwrap_or_default(),
            enqueued_at: model.enqueued_at,
            available_at: model.available_at,
            lease_token: model.lease_token,
            lease_expires_at: model.lease_expires_at,
            updated_at: model.updated_at,
        })
    }
}

fn to_active_model(job: &Job) -> Result<job_entity::ActiveModel, serde_json::Error> {
    Ok(job_entity::ActiveModel {
        id: Set(job.id),
        subject_id: Set(job.subject_id.clone()),
        payload: Set(serde_json::to_value(&job.payload)?),
        status: Set(job.status.to_string()),
        enqueued_at: Set(job.enqueued_at),
        available_at: Set(job.available_at),
        lease_token: Set(job.lease_token),
        lease_expires_at: Set(job.lease_expires_at),
        updated_at: Set(job.updated_at),
    })
}

#[async_trait]
impl JobRepository for JobRepositoryImpl {
    async fn create(&self, job: &Job) -> Result<Job, RepositoryError> {
        let model = to_active_model(job)?;
        job_entity::Entity::insert(model)
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(job.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>, RepositoryError> {
        let model = job_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;

        Ok(model.map(Job::try_from).transpose()?)
    }

    async fn try_lease(
        &self,
        now: DateTime<Utc>,
        lease_duration: Duration,
    ) -> Result<Option<Job>, RepositoryError> {
        let candidates = job_entity::Entity::find()
            .filter(Self::leasable(now))
            .order_by_asc(job_entity::Column::AvailableAt)
            .order_by_asc(job_entity::Column::EnqueuedAt)
            .limit(LEASE_CANDIDATES)
            .all(self.db.as_ref())
            .await?;

        for mut candidate in candidates {
            let token = Uuid::new_v4();
            let expires_at = now + lease_duration;

            let result = job_entity::Entity::update_many()
                .col_expr(
                    job_entity::Column::Status,
                    Expr::value(JobStatus::Leased.to_string()),
                )
                .col_expr(job_entity::Column::LeaseToken, Expr::value(Some(token)))
                .col_expr(
                    job_entity::Column::LeaseExpiresAt,
                    Expr::value(Some(expires_at)),
                )
                .col_expr(job_entity::Column::UpdatedAt, Expr::value(now))
                .filter(job_entity::Column::Id.eq(candidate.id))
                .filter(Self::leasable(now))
                .exec(self.db.as_ref())
                .await?;

            if result.rows_affected == 1 {
                candidate.status = JobStatus::Leased.to_string();
                candidate.lease_token = Some(token);
                candidate.lease_expires_at = Some(expires_at);
                candidate.updated_at = now;
                return Ok(Some(Job::try_from(candidate)?));
            }
        }

        Ok(None)
    }

    async fn ack(&self, id: Uuid, lease_token: Uuid) -> Result<(), RepositoryError> {
        self.remove(id, lease_token).await
    }

    async fn release(
        &self,
        job: &Job,
        available_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let token = job.lease_token.ok_or(RepositoryError::LeaseLost(job.id))?;
        let payload = serde_json::to_value(&job.payload)?;

        let result = job_entity::Entity::update_many()
            .col_expr(
                job_entity::Column::Status,
                Expr::value(JobStatus::Pending.to_string()),
            )
            .col_expr(job_entity::Column::Payload, Expr::value(payload))
            .col_expr(job_entity::Column::AvailableAt, Expr::value(available_at))
            .col_expr(
                job_entity::Column::LeaseToken,
                Expr::value(Option::<Uuid>::None),
            )
            .col_expr(
                job_entity::Column::LeaseExpiresAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(job_entity::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(job_entity::Column::Id.eq(job.id))
            .filter(job_entity::Column::LeaseToken.eq(token))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::LeaseLost(job.id));
        }
        Ok(())
    }

    async fn remove(&self, id: Uuid, lease_token: Uuid) -> Result<(), RepositoryError> {
        let result = job_entity::Entity::delete_many()
            .filter(job_entity::Column::Id.eq(id))
            .filter(job_entity::Column::LeaseToken.eq(lease_token))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::LeaseLost(id));
        }
        Ok(())
    }

    async fn move_to_dead_letter(
        &self,
        job: &Job,
        entry: &DeadLetterEntry,
    ) -> Result<(), RepositoryError> {
        let token = job.lease_token.ok_or(RepositoryError::LeaseLost(job.id))?;
        let txn = self.db.begin().await?;

        let removed = job_entity::Entity::delete_many()
            .filter(job_entity::Column::Id.eq(job.id))
            .filter(job_entity::Column::LeaseToken.eq(token))
            .exec(&txn)
            .await?;

        if removed.rows_affected == 0 {
            txn.rollback().await?;
            return Err(RepositoryError::LeaseLost(job.id));
        }

        dead_letter_entity::Entity::insert(dead_letter_model(entry))
            .exec_without_returning(&txn)
            .await?;

        txn.commit().await?;
        Ok(())
    }

    async fn find_pending_by_subject(
        &self,
        subject_id: &str,
    ) -> Result<Option<Job>, RepositoryError> {
        let model = job_entity::Entity::find()
            .filter(job_entity::Column::SubjectId.eq(subject_id))
            .filter(job_entity::Column::Status.eq(JobStatus::Pending.to_string()))
            .order_by_desc(job_entity::Column::EnqueuedAt)
            .one(self.db.as_ref())
            .await?;

        Ok(model.map(Job::try_from).transpose()?)
    }

    async fn exists_by_subject(&self, subject_id: &str) -> Result<bool, RepositoryError> {
        let count = job_entity::Entity::find()
            .filter(job_entity::Column::SubjectId.eq(subject_id))
            .count(self.db.as_ref())
            .await?;
        Ok(count > 0)
    }

    async fn replace_metadata(
        &self,
        id: Uuid,
        metadata: &MetadataSnapshot,
    ) -> Result<bool, RepositoryError> {
        let txn = self.db.begin().await?;

        let model = job_entity::Entity::find_by_id(id)
            .filter(job_entity::Column::Status.eq(JobStatus::Pending.to_string()))
            .one(&txn)
            .await?;

        let Some(model) = model else {
            txn.rollback().await?;
            return Ok(false);
        };

        let mut payload: JobPayload = serde_json::from_value(model.payload.clone())?;
        payload.metadata = metadata.clone();

        let mut active: job_entity::ActiveModel = model.into();
        active.payload = Set(serde_json::to_value(&payload)?);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        txn.commit().await?;
        Ok(true)
    }

    async fn stats(&self, now: DateTime<Utc>) -> Result<QueueStats, RepositoryError> {
        let pending = job_entity::Entity::find()
            .filter(job_entity::Column::Status.eq(JobStatus::Pending.to_string()))
            .filter(job_entity::Column::AvailableAt.lte(now))
            .count(self.db.as_ref())
            .await?;

        let delayed = job_entity::Entity::find()
            .filter(job_entity::Column::Status.eq(JobStatus::Pending.to_string()))
            .filter(job_entity::Column::AvailableAt.gt(now))
            .count(self.db.as_ref())
            .await?;

        let leased = job_entity::Entity::find()
            .filter(job_entity::Column::Status.eq(JobStatus::Leased.to_string()))
            .count(self.db.as_ref())
            .await?;

        Ok(QueueStats {
            pending,
            delayed,
            leased,
        })
    }

    async fn release_expired_leases(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = job_entity::Entity::update_many()
            .col_expr(
                job_entity::Column::Status,
                Expr::value(JobStatus::Pending.to_string()),
            )
            .col_expr(
                job_entity::Column::LeaseToken,
                Expr::value(Option::<Uuid>::None),
            )
            .col_expr(
                job_entity::Column::LeaseExpiresAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(job_entity::Column::UpdatedAt, Expr::value(now))
            .filter(job_entity::Column::Status.eq(JobStatus::Leased.to_string()))
            .filter(job_entity::Column::LeaseExpiresAt.lte(now))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected)
    }

    async fn clear(&self) -> Result<u64, RepositoryError> {
        let result = job_entity::Entity::delete_many()
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }
}
