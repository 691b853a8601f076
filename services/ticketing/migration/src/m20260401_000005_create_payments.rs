use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Payments::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Payments::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Payments::EventId).uuid().not_null())
                    .col(ColumnDef::new(Payments::TicketId).uuid().not_null())
                    .col(ColumnDef::new(Payments::PayerId).uuid())
                    .col(
                        ColumnDef::new(Payments::SessionId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Payments::BuyerEmail).string().not_null())
                    .col(ColumnDef::new(Payments::BuyerName).string().not_null())
                    .col(ColumnDef::new(Payments::Quantity).integer().not_null())
                    .col(ColumnDef::new(Payments::IsGuest).boolean().not_null())
                    .col(ColumnDef::new(Payments::IsExternal).boolean().not_null())
                    .col(ColumnDef::new(Payments::Currency).string().not_null())
                    .col(ColumnDef::new(Payments::GrossMinor).big_integer().not_null())
                    .col(
                        ColumnDef::new(Payments::PlatformFeeMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Payments::PayeeShareMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Payments::FeeVersion).small_integer().not_null())
                    .col(
                        ColumnDef::new(Payments::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Payments::PaymentReference).string())
                    .col(ColumnDef::new(Payments::RegistrationId).uuid())
                    .col(ColumnDef::new(Payments::RefundAmountMinor).big_integer())
                    .col(ColumnDef::new(Payments::RefundReference).string())
                    .col(ColumnDef::new(Payments::FailureReason).string())
                    .col(
                        ColumnDef::new(Payments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Payments::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .check(Expr::col(Payments::Status).is_in([
                        "pending",
                        "succeeded",
                        "refunded",
                        "failed",
                    ]))
                    .check(
                        Expr::col(Payments::PlatformFeeMinor)
                            .add(Expr::col(Payments::PayeeShareMinor))
                            .eq(Expr::col(Payments::GrossMinor)),
                    )
                    .to_owned(),
            )
            .await?;

        // Refund webhooks look payments up by processor reference.
        manager
            .create_index(
                Index::create()
                    .table(Payments::Table)
                    .col(Payments::PaymentReference)
                    .name("idx_payments_payment_reference")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Payments::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Payments {
    Table,
    Id,
    EventId,
    TicketId,
    PayerId,
    SessionId,
    BuyerEmail,
    BuyerName,
    Quantity,
    IsGuest,
    IsExternal,
    Currency,
    GrossMinor,
    PlatformFeeMinor,
    PayeeShareMinor,
    FeeVersion,
    Status,
    PaymentReference,
    RegistrationId,
    RefundAmountMinor,
    RefundReference,
    FailureReason,
    CreatedAt,
    UpdatedAt,
}
