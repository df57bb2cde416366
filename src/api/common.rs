use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{FromRequest, HttpRequest};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::error::MNError;

pub const TOKEN_BYTES: usize = 32;
pub const TOKEN_LENGTH: usize = TOKEN_BYTES * 2;

#[derive(Serialize_repr, Deserialize_repr, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    EmailDuplicated = 1,
    NameMissing = 2,
    NameTooLong = 3,
    EmailMissing = 4,
    EmailTooLong = 5,
    EmailInvalid = 6,
    PasswordMissing = 7,
    PasswordTooShort = 8,
    BioTooLong = 9,
    TitleMissing = 10,
    TitleTooLong = 11,
    ContentMissing = 12,
    ContentTooLong = 13,
    ImageReferenceInvalid = 14,
    CommentTooShort = 15,
    CommentTooLong = 16,
    AlreadyLiked = 17,
    AlreadyBookmarked = 18,
    UploadEmpty = 19,
    UploadTypeInvalid = 20,
    UploadTooLarge = 21,
    BodyInvalid = 22,
    BodyTooLarge = 23,
}

impl ErrorCode {
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::EmailDuplicated => "Email already registered",
            ErrorCode::NameMissing => "Name is required",
            ErrorCode::NameTooLong => "Name is too long",
            ErrorCode::EmailMissing => "Email is required",
            ErrorCode::EmailTooLong => "Email is too long",
            ErrorCode::EmailInvalid => "Email is invalid",
            ErrorCode::PasswordMissing => "Password is required",
            ErrorCode::PasswordTooShort => "Password is too short",
            ErrorCode::BioTooLong => "Bio is too long",
            ErrorCode::TitleMissing => "Title is required",
            ErrorCode::TitleTooLong => "Title is too long",
            ErrorCode::ContentMissing => "Content is required",
            ErrorCode::ContentTooLong => "Content is too long",
            ErrorCode::ImageReferenceInvalid => "Image reference is invalid",
            ErrorCode::CommentTooShort => "Comment is empty",
            ErrorCode::CommentTooLong => "Comment is too long",
            ErrorCode::AlreadyLiked => "Note already liked",
            ErrorCode::AlreadyBookmarked => "Note already bookmarked",
            ErrorCode::UploadEmpty => "Upload is empty",
            ErrorCode::UploadTypeInvalid => "Unsupported image type",
            ErrorCode::UploadTooLarge => "Upload exceeds 5 MB",
            ErrorCode::BodyInvalid => "Request body is malformed",
            ErrorCode::BodyTooLarge => "Request body is too large",
        }
    }
}

pub fn get_current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 256 random bits, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn is_token(token: &str) -> bool {
    token.len() == TOKEN_LENGTH && token.chars().all(|ch| ch.is_ascii_hexdigit())
}

/// Returns the value when it is present and non-blank.
pub fn required(value: Option<String>, missing: ErrorCode) -> Result<String, MNError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(MNError::Validation(missing)),
    }
}

pub fn check_max_len(value: &str, max_bytes: usize, too_long: ErrorCode) -> Result<(), MNError> {
    if value.len() > max_bytes {
        Err(MNError::Validation(too_long))
    } else {
        Ok(())
    }
}

/// Bearer credential from the `Authorization` header, sent either raw or as
/// `Bearer <token>`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Credential(pub Option<String>);

impl Credential {
    fn from_header(value: &str) -> Option<String> {
        let value = value.trim();
        let token = match value.split_once(char::is_whitespace) {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
            _ if value.eq_ignore_ascii_case("bearer") => "",
            _ => value,
        };
        if token.is_empty() {
            None
        } else {
            Some(token.to_owned())
        }
    }
}

impl FromRequest for Credential {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let token = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(Credential::from_header);
        ready(Ok(Credential(token)))
    }
}
