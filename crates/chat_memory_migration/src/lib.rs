pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_dialog_and_message;
mod m20260301_000002_create_write_lock;
mod m20260315_000001_create_dialog_snapshot;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_dialog_and_message::Migration),
            Box::new(m20260301_000002_create_write_lock::Migration),
            Box::new(m20260315_000001_create_dialog_snapshot::Migration),
        ]
    }
}
