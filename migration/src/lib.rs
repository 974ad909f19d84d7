pub use sea_orm_migration::prelude::*;

pub mod raw;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            sql_up!("000001_bus_routes"),
            sql_up!("000002_buses"),
            sql_up_down!("000003_location_updates"),
        ]
    }
}
