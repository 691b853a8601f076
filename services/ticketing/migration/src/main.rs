use sea_orm_migration::prelude::*;

use gather_ticketing_migration::Migrator;

#[tokio::main]
async fn main() {
    cli::run_cli(Migrator).await;
}
