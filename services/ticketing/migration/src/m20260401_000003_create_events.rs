use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Events::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Events::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Events::OrganiserId).uuid().not_null())
                    .col(ColumnDef::new(Events::Title).string().not_null())
                    .col(ColumnDef::new(Events::Location).string())
                    .col(
                        ColumnDef::new(Events::StartAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Events::EndAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Events::VisibilityTier)
                            .small_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Events::RegistrationTier)
                            .small_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Events::AllowedGroupIds)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(ColumnDef::new(Events::RegistrationCutoffHours).integer())
                    .col(ColumnDef::new(Events::ExternalCutoffHours).integer())
                    .col(ColumnDef::new(Events::ForwardingEmail).string())
                    .col(
                        ColumnDef::new(Events::IsDeleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Events::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .check(
                        Expr::col(Events::RegistrationTier)
                            .gte(Expr::col(Events::VisibilityTier)),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(Events::Table)
                    .col(Events::OrganiserId)
                    .name("idx_events_organiser_id")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Events::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Events {
    Table,
    Id,
    OrganiserId,
    Title,
    Location,
    StartAt,
    EndAt,
    VisibilityTier,
    RegistrationTier,
    AllowedGroupIds,
    RegistrationCutoffHours,
    ExternalCutoffHours,
    ForwardingEmail,
    IsDeleted,
    CreatedAt,
}
