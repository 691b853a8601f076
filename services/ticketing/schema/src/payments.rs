use sea_orm::entity::prelude::*;

/// One checkout attempt, anchored by the processor's session id.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub event_id: Uuid,
    pub ticket_id: Uuid,
    /// `None` for guest checkouts.
    pub payer_id: Option<Uuid>,
    #[sea_orm(unique)]
    pub session_id: String,
    pub buyer_email: String,
    pub buyer_name: String,
    pub quantity: i32,
    pub is_guest: bool,
    pub is_external: bool,
    pub currency: String,
    pub gross_minor: i64,
    pub platform_fee_minor: i64,
    pub payee_share_minor: i64,
    pub fee_version: i16,
    /// pending | succeeded | refunded | failed
    pub status: String,
    /// Processor payment reference, set at settlement.
    pub payment_reference: Option<String>,
    pub registration_id: Option<Uuid>,
    pub refund_amount_minor: Option<i64>,
    pub refund_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
