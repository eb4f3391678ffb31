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

use crate::domain::models::dead_letter::{DeadLetterEntry, ErrorTypeCount};
use crate::domain::models::error_type::ErrorType;
use crate::domain::repositories::dead_letter_repository::DeadLetterRepository;
use crate::domain::repositories::job_repository::RepositoryError;
use crate::infrastructure::database::entities::dead_letter as dead_letter_entity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use uuid::Uuid;

/// 死信仓库实现
#[derive(Clone)]
pub struct DeadLetterRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl DeadLetterRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<dead_letter_entity::Model> for DeadLetterEntry {
    fn from(model: dead_letter_entity::Model) -> Self {
        Self {
            id: model.id,
            job_id: model.job_id,
            subject_id: model.subject_id,
            job_snapshot: model.job_snapshot,
            error_type: model.error_type.parse().unwrap_or(ErrorType::Unknown),
            error_message: model.error_message,
            failed_at: model.failed_at,
            retry_count_at_failure: u32::try_from(model.retry_count_at_failure).unwrap_or(0),
        }
    }
}

pub(crate) fn to_active_model(entry: &DeadLetterEntry) -> dead_letter_entity::ActiveModel {
    dead_letter_entity::ActiveModel {
        id: Set(entry.id),
        job_id: Set(entry.job_id),
        subject_id: Set(entry.subject_id.clone()),
        job_snapshot: Set(entry.job_snapshot.clone()),
        error_type: Set(entry.error_type.to_string()),
        error_message: Set(entry.error_message.clone()),
        failed_at: Set(entry.failed_at),
        retry_count_at_failure: Set(i32::try_from(entry.retry_count_at_failure).unwrap_or(i32::MAX)),
    }
}

#[async_trait]
impl DeadLetterRepository for DeadLetterRepositoryImpl {
    async fn insert(&self, entry: &DeadLetterEntry) -> Result<(), RepositoryError> {
        dead_letter_entity::Entity::insert(to_active_model(entry))
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<DeadLetterEntry>, RepositoryError> {
        let model = dead_letter_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;
        Ok(model.map(Into::into))
    }

    async fn list(
        &self,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<DeadLetterEntry>, RepositoryError> {
        let models = dead_letter_entity::Entity::find()
            .order_by_desc(dead_letter_entity::Column::FailedAt)
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn find_in_window(
        &self,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        error_types: &[ErrorType],
    ) -> Result<Vec<DeadLetterEntry>, RepositoryError> {
        if error_types.is_empty() {
            return Ok(Vec::new());
        }

        let models = dead_letter_entity::Entity::find()
            .filter(dead_letter_entity::Column::FailedAt.gte(started_at))
            .filter(dead_letter_entity::Column::FailedAt.lte(ended_at))
            .filter(
                dead_letter_entity::Column::ErrorType
                    .is_in(error_types.iter().map(|t| t.to_string())),
            )
            .order_by_asc(dead_letter_entity::Column::FailedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count = dead_letter_entity::Entity::find()
            .count(self.db.as_ref())
            .await?;
        Ok(count)
    }

    async fn count_by_error_type(&self) -> Result<Vec<ErrorTypeCount>, RepositoryError> {
        let rows: Vec<(String, i64)> = dead_letter_entity::Entity::find()
            .select_only()
            .column(dead_letter_entity::Column::ErrorType)
            .column_as(
                Expr::col(dead_letter_entity::Column::Id).count(),
                "count",
            )
            .group_by(dead_letter_entity::Column::ErrorType)
            .order_by_asc(dead_letter_entity::Column::ErrorType)
            .into_tuple()
            .all(self.db.as_ref())
            .await?;

        Ok(rows
            .into_iter()
            .map(|(error_type, count)| ErrorTypeCount {
                error_type,
                count: u64::try_from(count).unwrap_or(0),
            })
            .collect())
    }

    async fn clear(&self) -> Result<u64, RepositoryError> {
        let result = dead_letter_entity::Entity::delete_many()
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = dead_letter_entity::Entity::delete_many()
            .filter(dead_letter_entity::Column::FailedAt.lt(cutoff))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }
}
