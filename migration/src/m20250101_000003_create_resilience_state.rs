use sea_orm_migration::prelude::*;

/// 单行状态记录的固定主键
const SINGLETON_ID: i32 = 1;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CircuitBreakerState::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CircuitBreakerState::Id)
                            .integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CircuitBreakerState::State).string().not_null())
                    .col(
                        ColumnDef::new(CircuitBreakerState::ConsecutiveFailures)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(CircuitBreakerState::OpenedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(CircuitBreakerState::LastProbeAt)
                            .timestamp_with_time_zone(),
                    )
                    .col(
                        ColumnDef::new(CircuitBreakerState::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OutageRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OutageRecords::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OutageRecords::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OutageRecords::EndedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(OutageRecords::DurationMs).big_integer())
                    .col(
                        ColumnDef::new(OutageRecords::JobsAffected)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RecoveryState::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RecoveryState::Id)
                            .integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RecoveryState::LastCheckTime).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(RecoveryState::ConsecutiveProbeSuccesses)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RecoveryState::ConsecutiveProbeFailures)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RecoveryState::RecoveryCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RecoveryState::LastRecoveryTime)
                            .timestamp_with_time_zone(),
                    )
                    .col(
                        ColumnDef::new(RecoveryState::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        // 单行记录在建表时写入，之后只做条件更新
        manager
            .exec_stmt(
                Query::insert()
                    .into_table(CircuitBreakerState::Table)
                    .columns([
                        CircuitBreakerState::Id,
                        CircuitBreakerState::State,
                        CircuitBreakerState::ConsecutiveFailures,
                        CircuitBreakerState::Version,
                    ])
                    .values_panic([SINGLETON_ID.into(), "closed".into(), 0.into(), 0.into()])
                    .to_owned(),
            )
            .await?;

        manager
            .exec_stmt(
                Query::insert()
                    .into_table(RecoveryState::Table)
                    .columns([
                        RecoveryState::Id,
                        RecoveryState::ConsecutiveProbeSuccesses,
                        RecoveryState::ConsecutiveProbeFailures,
                        RecoveryState::RecoveryCount,
                        RecoveryState::Version,
                    ])
                    .values_panic([
                        SINGLETON_ID.into(),
                        0.into(),
                        0.into(),
                        0.into(),
                        0.into(),
                    ])
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RecoveryState::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OutageRecords::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CircuitBreakerState::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CircuitBreakerState {
    Table,
    Id,
    State,
    ConsecutiveFailures,
    OpenedAt,
    LastProbeAt,
    Version,
}

#[derive(DeriveIden)]
enum OutageRecords {
    Table,
    Id,
    StartedAt,
    EndedAt,
    DurationMs,
    JobsAffected,
}

#[derive(DeriveIden)]
enum RecoveryState {
    Table,
    Id,
    LastCheckTime,
    ConsecutiveProbeSuccesses,
    ConsecutiveProbeFailures,
    RecoveryCount,
    LastRecoveryTime,
    Version,
}
