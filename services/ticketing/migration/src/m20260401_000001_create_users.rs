use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Users::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
                    .col(ColumnDef::new(Users::Name).string().not_null())
                    .col(ColumnDef::new(Users::Affiliation).string())
                    .col(
                        ColumnDef::new(Users::NotificationsEnabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(GroupMemberships::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(GroupMemberships::UserId).uuid().not_null())
                    .col(ColumnDef::new(GroupMemberships::GroupId).uuid().not_null())
                    .primary_key(
                        Index::create()
                            .col(GroupMemberships::UserId)
                            .col(GroupMemberships::GroupId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(GroupMemberships::Table, GroupMemberships::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GroupMemberships::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub(crate) enum Users {
    Table,
    Id,
    Email,
    Name,
    Affiliation,
    NotificationsEnabled,
    CreatedAt,
}

#[derive(Iden)]
enum GroupMemberships {
    Table,
    UserId,
    GroupId,
}
