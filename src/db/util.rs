use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, DatabaseConnection, SqlxSqliteConnector};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous},
    SqlitePool,
};

use super::error::{DbError, DbResult};

pub async fn open_seaorm(db_path: &str) -> Result<DatabaseConnection, sqlx::Error> {
    // Create via sqlx so we can customise the options
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal); // with WAL, worst that could happen is a rollback of last tx

    let pool = SqlitePool::connect_with(options).await?;

    Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
}

/// Timestamps are stored as unix milliseconds
pub fn from_millis(millis: i64) -> DbResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| DbError::Convert(format!("Invalid timestamp: {}", millis)))
}

pub trait OptionMapSet<T: Into<sea_orm::Value>> {
    /// `Some` sets the column, `None` leaves it untouched
    fn map_set(self) -> ActiveValue<T>;
}

impl<T: Into<sea_orm::Value>> OptionMapSet<T> for Option<T> {
    fn map_set(self) -> ActiveValue<T> {
        match self {
            Some(v) => ActiveValue::Set(v),
            None => ActiveValue::NotSet,
        }
    }
}
