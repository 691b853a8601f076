use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tickets::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Tickets::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Tickets::EventId).uuid().not_null())
                    .col(ColumnDef::new(Tickets::Name).string().not_null())
                    .col(ColumnDef::new(Tickets::PriceMinor).big_integer().not_null())
                    .col(ColumnDef::new(Tickets::Stock).integer())
                    .col(ColumnDef::new(Tickets::ReleaseStart).timestamp_with_time_zone())
                    .col(ColumnDef::new(Tickets::ReleaseEnd).timestamp_with_time_zone())
                    .check(Expr::col(Tickets::PriceMinor).gte(0))
                    .check(Expr::col(Tickets::Stock).gte(0))
                    .foreign_key(
                        ForeignKey::create()
                            .from(Tickets::Table, Tickets::EventId)
                            .to(Events::Table, Events::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(Tickets::Table)
                    .col(Tickets::EventId)
                    .name("idx_tickets_event_id")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Tickets::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Tickets {
    Table,
    Id,
    EventId,
    Name,
    PriceMinor,
    Stock,
    ReleaseStart,
    ReleaseEnd,
}

#[derive(Iden)]
enum Events {
    Table,
    Id,
}
