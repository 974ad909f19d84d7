use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

use crate::db::error::DbError;

#[derive(thiserror::Error, Debug)]
pub enum BusConnectError {
    /// Malformed or out of range input, surfaced as a 400
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {0}")]
    Connect(#[from] sqlx::Error),
}

impl BusConnectError {
    pub fn invalid(message: impl Into<String>) -> Self {
        BusConnectError::InvalidArgument(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        BusConnectError::NotFound(message.into())
    }
}

impl From<BusConnectError> for std::io::Error {
    fn from(e: BusConnectError) -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::Other, e)
    }
}

impl ResponseError for BusConnectError {
    fn error_response(&self) -> HttpResponse<actix_web::body::BoxBody> {
        match self {
            BusConnectError::InvalidArgument(message) | BusConnectError::NotFound(message) => {
                HttpResponse::build(self.status_code()).json(json!({ "error": message }))
            }
            other => {
                log::error!("{}", other);
                HttpResponse::InternalServerError().finish()
            }
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            BusConnectError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            BusConnectError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type BusConnectResult<T> = Result<T, BusConnectError>;

#[cfg(test)]
mod test {
    use actix_web::body::to_bytes;

    use super::*;

    #[actix_web::test]
    async fn test_invalid_argument_response() {
        let response = BusConnectError::invalid("Latitude and longitude are required").error_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "Latitude and longitude are required");
    }

    #[test]
    fn test_storage_errors_are_opaque() {
        let err = BusConnectError::from(sea_orm::DbErr::Custom("disk on fire".to_string()));
        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
