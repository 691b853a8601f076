use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(NotificationJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(NotificationJobs::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(NotificationJobs::Name).string().not_null())
                    .col(
                        ColumnDef::new(NotificationJobs::Payload)
                            .json_binary()
                            .not_null(),
                    )
                    .col(ColumnDef::new(NotificationJobs::State).string().not_null())
                    .col(
                        ColumnDef::new(NotificationJobs::AttemptsMade)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(NotificationJobs::MaxAttempts)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(NotificationJobs::RunAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(NotificationJobs::LastError).string())
                    .col(ColumnDef::new(NotificationJobs::Result).json_binary())
                    .col(
                        ColumnDef::new(NotificationJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NotificationJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(NotificationJobs::FinishedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Index for worker poll queries (due jobs by run_at).
        manager
            .create_index(
                Index::create()
                    .table(NotificationJobs::Table)
                    .col(NotificationJobs::State)
                    .col(NotificationJobs::RunAt)
                    .name("idx_notification_jobs_state_run_at")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(NotificationJobs::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum NotificationJobs {
    Table,
    Id,
    Name,
    Payload,
    State,
    AttemptsMade,
    MaxAttempts,
    RunAt,
    LastError,
    Result,
    CreatedAt,
    UpdatedAt,
    FinishedAt,
}
