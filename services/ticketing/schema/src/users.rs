use sea_orm::entity::prelude::*;

/// Read-only profile of a platform user.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub email: String,
    pub name: String,
    /// University or society the user belongs to; drives internal/external status.
    pub affiliation: Option<String>,
    pub notifications_enabled: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::group_memberships::Entity")]
    GroupMemberships,
    #[sea_orm(has_one = "super::organiser_accounts::Entity")]
    OrganiserAccount,
}

impl Related<super::group_memberships::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GroupMemberships.def()
    }
}

impl Related<super::organiser_accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrganiserAccount.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
