use sea_orm_migration::prelude::*;

mod m20260401_000001_create_users;
mod m20260401_000002_create_organiser_accounts;
mod m20260401_000003_create_events;
mod m20260401_000004_create_tickets;
mod m20260401_000005_create_payments;
mod m20260401_000006_create_registrations;
mod m20260401_000007_create_notification_jobs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260401_000001_create_users::Migration),
            Box::new(m20260401_000002_create_organiser_accounts::Migration),
            Box::new(m20260401_000003_create_events::Migration),
            Box::new(m20260401_000004_create_tickets::Migration),
            Box::new(m20260401_000005_create_payments::Migration),
            Box::new(m20260401_000006_create_registrations::Migration),
            Box::new(m20260401_000007_create_notification_jobs::Migration),
        ]
    }
}
