use actix_web::error::{JsonPayloadError, PayloadError};
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

use crate::api::common::ErrorCode;

#[derive(Error, Debug)]
pub enum MNError {
    #[error("{}", .0.message())]
    Validation(ErrorCode),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{}", .0.message())]
    Conflict(ErrorCode),

    #[error("Too many requests, please try again later")]
    RateLimited,

    #[error("Request body could not be read: {0}")]
    Payload(#[from] PayloadError),

    #[error("Malformed form data: {0}")]
    Multipart(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Store executor unavailable: {0}")]
    Mailbox(#[from] actix::MailboxError),

    #[error("Blocking task failed: {0}")]
    Blocking(#[from] actix_web::error::BlockingError),
}

impl From<actix_multipart::MultipartError> for MNError {
    fn from(e: actix_multipart::MultipartError) -> Self {
        MNError::Multipart(e.to_string())
    }
}

impl MNError {
    fn code(&self) -> Option<ErrorCode> {
        match self {
            MNError::Validation(code) | MNError::Conflict(code) => Some(*code),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<ErrorCode>,
}

impl ResponseError for MNError {
    fn status_code(&self) -> StatusCode {
        match self {
            MNError::Validation(_) => StatusCode::BAD_REQUEST,
            MNError::Unauthorized => StatusCode::UNAUTHORIZED,
            MNError::Forbidden(_) => StatusCode::FORBIDDEN,
            MNError::NotFound(_) => StatusCode::NOT_FOUND,
            MNError::Conflict(_) => StatusCode::CONFLICT,
            MNError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            MNError::Payload(_) | MNError::Multipart(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self);
            "Internal server error".to_owned()
        } else {
            self.to_string()
        };
        HttpResponse::build(status).json(ErrorBody { error, code: self.code() })
    }
}

/// Installed as the `JsonConfig` error handler so rejected JSON bodies get
/// the same `{error, code}` shape as every other failure.
pub fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    tracing::debug!("Rejected JSON body: {}", err);
    let code = match err {
        JsonPayloadError::Overflow { .. } | JsonPayloadError::OverflowKnownLength { .. } => {
            ErrorCode::BodyTooLarge
        }
        _ => ErrorCode::BodyInvalid,
    };
    MNError::Validation(code).into()
}

pub type Result<T> = std::result::Result<T, MNError>;
