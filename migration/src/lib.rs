pub use sea_orm_migration::prelude::*;

mod m20251201_000001_crm_tables;
mod m20251201_000002_current_state_view;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20251201_000001_crm_tables::Migration),
            Box::new(m20251201_000002_current_state_view::Migration),
        ]
    }
}
