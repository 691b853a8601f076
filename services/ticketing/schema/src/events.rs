use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organiser_id: Uuid,
    pub title: String,
    pub location: Option<String>,
    pub start_at: chrono::DateTime<chrono::Utc>,
    pub end_at: chrono::DateTime<chrono::Utc>,
    /// `AccessTier` wire value.
    pub visibility_tier: i16,
    /// `AccessTier` wire value; never looser than `visibility_tier`.
    pub registration_tier: i16,
    /// JSON array of group UUIDs.
    pub allowed_group_ids: Json,
    pub registration_cutoff_hours: Option<i32>,
    pub external_cutoff_hours: Option<i32>,
    /// Contact that receives the external-attendee list before the event.
    pub forwarding_email: Option<String>,
    pub is_deleted: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::tickets::Entity")]
    Tickets,
    #[sea_orm(has_many = "super::registrations::Entity")]
    Registrations,
}

impl Related<super::tickets::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tickets.def()
    }
}

impl Related<super::registrations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Registrations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
