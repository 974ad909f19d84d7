#[derive(thiserror::Error, Debug)]
pub enum DbError {
    /// A stored row could not be turned into its API shape
    #[error("{0}")]
    Convert(String),

    #[error("{0}")]
    Query(#[from] sea_orm::DbErr),
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Convert(format!("{}", e))
    }
}

pub type DbResult<T> = Result<T, DbError>;
