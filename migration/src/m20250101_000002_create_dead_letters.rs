use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeadLetters::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(DeadLetters::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(DeadLetters::JobId).uuid().not_null())
                    .col(ColumnDef::new(DeadLetters::SubjectId).string().not_null())
                    .col(ColumnDef::new(DeadLetters::JobSnapshot).text().not_null())
                    .col(ColumnDef::new(DeadLetters::ErrorType).string().not_null())
                    .col(ColumnDef::new(DeadLetters::ErrorMessage).text().not_null())
                    .col(
                        ColumnDef::new(DeadLetters::FailedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeadLetters::RetryCountAtFailure)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        // 按错误类型聚合统计
        manager
            .create_index(
                Index::create()
                    .name("idx_dead_letters_error_type")
                    .table(DeadLetters::Table)
                    .col(DeadLetters::ErrorType)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_dead_letters_failed_at")
                    .table(DeadLetters::Table)
                    .col(DeadLetters::FailedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeadLetters::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DeadLetters {
    Table,
    Id,
    JobId,
    SubjectId,
    JobSnapshot,
    ErrorType,
    ErrorMessage,
    FailedAt,
    RetryCountAtFailure,
}
