//! Error taxonomy shared by every service and handler.
//!
//! Service functions return `Result<T, AppError>`; actix renders the error
//! through [`ResponseError`] as a JSON body with a mapped status code.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use log::{debug, error};
use serde::Serialize;
use thiserror::Error;

use crate::models::Role;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No {0} profile for this user")]
    ProfileMissing(Role),

    #[error("State conflict: {0}")]
    StateConflict(String),

    #[error("Insufficient credits: balance {balance}, required {required}")]
    InsufficientCredits { balance: i64, required: i64 },

    #[error("Transaction reference already recorded: {0}")]
    DuplicateTransaction(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetails,
}

#[derive(Serialize)]
struct ErrorDetails {
    code: &'static str,
    message: String,
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Permission(_) => "PERMISSION_ERROR",
            AppError::Unauthenticated(_) => "UNAUTHENTICATED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::ProfileMissing(_) => "PROFILE_MISSING",
            AppError::StateConflict(_) => "STATE_CONFLICT",
            AppError::InsufficientCredits { .. } => "INSUFFICIENT_CREDITS",
            AppError::DuplicateTransaction(_) => "DUPLICATE_TRANSACTION",
            AppError::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn not_found(what: &str, id: &str) -> Self {
        AppError::NotFound(format!("{} {} not found", what, id))
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::Permission(_)
            | AppError::ProfileMissing(_)
            | AppError::StateConflict(_)
            | AppError::InsufficientCredits { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateTransaction(_) => StatusCode::CONFLICT,
            AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("{} ({})", self, self.code());
        } else {
            debug!("{} ({})", self, self.code());
        }
        HttpResponse::build(status).json(ErrorBody {
            error: ErrorDetails {
                code: self.code(),
                message: self.to_string(),
            },
        })
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<mongodb::bson::ser::Error> for AppError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        AppError::Database(format!("serialization: {}", err))
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AppError::Internal(format!("password hashing: {}", err))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("background task: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::Unauthenticated(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::ExternalService(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(
            AppError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Permission("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::InsufficientCredits { balance: 1, required: 2 }.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Unauthenticated("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::not_found("project", "p1").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Database("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[actix_web::test]
    async fn error_body_carries_code_and_message() {
        let resp = AppError::StateConflict("proposal already accepted".into()).error_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "STATE_CONFLICT");
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("proposal already accepted"));
    }
}
