use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Registrations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Registrations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Registrations::EventId).uuid().not_null())
                    .col(ColumnDef::new(Registrations::TicketId).uuid().not_null())
                    .col(ColumnDef::new(Registrations::UserId).uuid())
                    .col(ColumnDef::new(Registrations::HolderName).string().not_null())
                    .col(ColumnDef::new(Registrations::HolderEmail).string().not_null())
                    .col(ColumnDef::new(Registrations::Quantity).integer().not_null())
                    .col(ColumnDef::new(Registrations::IsExternal).boolean().not_null())
                    .col(ColumnDef::new(Registrations::PaymentId).uuid())
                    .col(ColumnDef::new(Registrations::PaymentStatus).string())
                    .col(
                        ColumnDef::new(Registrations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Registrations::Table, Registrations::EventId)
                            .to(Events::Table, Events::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Registrations::Table, Registrations::TicketId)
                            .to(Tickets::Table, Tickets::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Backstop against double registration under concurrent settlement.
        manager
            .create_index(
                Index::create()
                    .table(Registrations::Table)
                    .col(Registrations::EventId)
                    .col(Registrations::HolderEmail)
                    .unique()
                    .name("uq_registrations_event_holder_email")
                    .to_owned(),
            )
            .await?;

        // Derived stock sums quantity per ticket.
        manager
            .create_index(
                Index::create()
                    .table(Registrations::Table)
                    .col(Registrations::TicketId)
                    .name("idx_registrations_ticket_id")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Registrations::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Registrations {
    Table,
    Id,
    EventId,
    TicketId,
    UserId,
    HolderName,
    HolderEmail,
    Quantity,
    IsExternal,
    PaymentId,
    PaymentStatus,
    CreatedAt,
}

#[derive(Iden)]
enum Events {
    Table,
    Id,
}

#[derive(Iden)]
enum Tickets {
    Table,
    Id,
}
