use actix_web::{error::BlockingError, http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::handlers::Envelope;
use crate::message_database::{RemoveError, StoreError};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("message not found")]
    NotFound,
    #[error("not allowed to retract this message")]
    Forbidden,
    #[error("request body exceeds {0} bytes")]
    TooLarge(usize),
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("store task failed: {0}")]
    Blocking(#[from] BlockingError),
}

impl From<RemoveError> for ApiError {
    fn from(e: RemoveError) -> Self {
        match e {
            RemoveError::NotFound => ApiError::NotFound,
            RemoveError::Forbidden => ApiError::Forbidden,
            RemoveError::Store(e) => ApiError::Storage(e),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Storage(_) | ApiError::Blocking(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            ApiError::Storage(_) | ApiError::Blocking(_) => {
                tracing::error!(error = %self, "storage failure");
                "internal server error".to_string()
            }
            other => {
                tracing::debug!(message = %other, "request rejected");
                other.to_string()
            }
        };
        HttpResponse::build(self.status_code()).json(Envelope::<()>::failure(message))
    }
}
