use sea_orm_migration::{
    async_trait, sea_orm::ConnectionTrait, DbErr, MigrationName, MigrationTrait, SchemaManager,
};

/// Migration from a forward-only SQL file in `src/sql/`
#[macro_export]
macro_rules! sql_up {
    ($name:expr) => {
        $crate::raw::RawMigration::boxed($name, include_str!(concat!("sql/", $name, ".sql")), None)
    };
}

/// Migration from a `src/sql/<name>/` directory holding `up.sql` and `down.sql`
#[macro_export]
macro_rules! sql_up_down {
    ($name:expr) => {
        $crate::raw::RawMigration::boxed(
            $name,
            include_str!(concat!("sql/", $name, "/up.sql")),
            Some(include_str!(concat!("sql/", $name, "/down.sql"))),
        )
    };
}

pub struct RawMigration {
    name: &'static str,
    up_sql: &'static str,
    down_sql: Option<&'static str>,
}

impl RawMigration {
    pub fn boxed(
        name: &'static str,
        up_sql: &'static str,
        down_sql: Option<&'static str>,
    ) -> Box<dyn MigrationTrait> {
        Box::new(RawMigration {
            name,
            up_sql,
            down_sql,
        })
    }
}

impl MigrationName for RawMigration {
    fn name(&self) -> &str {
        self.name
    }
}

#[async_trait::async_trait]
impl MigrationTrait for RawMigration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(self.up_sql)
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let down_sql = self.down_sql.ok_or_else(|| {
            DbErr::Migration(format!("{}: down migration not implemented", self.name))
        })?;

        manager
            .get_connection()
            .execute_unprepared(down_sql)
            .await?;

        Ok(())
    }
}
