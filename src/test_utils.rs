use std::ops::Deref;

use migration::{Migrator, MigratorTrait};
use tempfile::TempDir;

use crate::db::util::open_seaorm;
use crate::ContextData;

pub fn init() {
    dotenvy::from_filename(".dev.vars").ok();
    env_logger::try_init().ok();
}

/// A migrated database in a temporary directory, removed on drop
pub struct TestContext {
    ctx: ContextData,
    _dir: TempDir,
}

impl Deref for TestContext {
    type Target = ContextData;

    fn deref(&self) -> &Self::Target {
        &self.ctx
    }
}

pub async fn ctx() -> TestContext {
    init();

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("test.sqlite");
    let db = open_seaorm(db_path.to_str().unwrap()).await.unwrap();
    Migrator::up(&db, None).await.unwrap();

    TestContext {
        ctx: ContextData { db },
        _dir: dir,
    }
}
