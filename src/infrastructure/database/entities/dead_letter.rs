// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "dead_letters")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub job_id: Uuid,
    pub subject_id: String,
    #[sea_orm(column_type = "Text")]
    pub job_snapshot: String,
    pub error_type: String,
    #[sea_orm(column_type = "Text")]
    pub error_message: String,
    pub failed_at: ChronoDateTimeUtc,
    pub retry_count_at_failure: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
