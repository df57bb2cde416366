//! Bodies for routes that accept either JSON or `multipart/form-data` with
//! one optional file field, as browser forms send them.

use std::collections::HashMap;

use actix_multipart::Multipart;
use actix_web::http::header::CONTENT_TYPE;
use actix_web::web::{self, Bytes, BytesMut};
use actix_web::HttpRequest;
use futures::{Stream, TryStreamExt};
use serde::de::DeserializeOwned;

use crate::api::common::ErrorCode;
use crate::api::upload::MAX_UPLOAD_BYTES;
use crate::error::MNError;

pub const MAX_JSON_BYTES: usize = 256 * 1024;

pub struct UploadedFile {
    pub filename: String,
    pub data: BytesMut,
}

#[derive(Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    pub file: Option<UploadedFile>,
}

impl FormData {
    pub fn text(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }

    /// Checkbox-style values: `true`, `on` and `1` are set, anything else is not.
    pub fn flag(&mut self, name: &str) -> Option<bool> {
        self.text(name)
            .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "on" | "1"))
    }
}

pub enum Body<T> {
    Json(T),
    Form(FormData),
}

fn is_multipart(req: &HttpRequest) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map_or(false, |value| {
            value.trim_start().to_ascii_lowercase().starts_with("multipart/form-data")
        })
}

/// Buffers a byte stream, failing with `too_large` as soon as it exceeds
/// `limit` bytes.
pub async fn read_limited<S, E>(stream: &mut S, limit: usize, too_large: ErrorCode) -> Result<BytesMut, MNError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    MNError: From<E>,
{
    let mut body = BytesMut::new();
    while let Some(chunk) = stream.try_next().await? {
        if body.len() + chunk.len() > limit {
            return Err(MNError::Validation(too_large));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

pub async fn read_body<T: DeserializeOwned>(
    req: &HttpRequest,
    mut payload: web::Payload,
    file_field: &str,
) -> Result<Body<T>, MNError> {
    if is_multipart(req) {
        let form = read_form(Multipart::new(req.headers(), payload), file_field).await?;
        return Ok(Body::Form(form));
    }
    let bytes = read_limited(&mut payload, MAX_JSON_BYTES, ErrorCode::BodyTooLarge).await?;
    serde_json::from_slice(&bytes).map(Body::Json).map_err(|e| {
        tracing::debug!("Rejected JSON body: {}", e);
        MNError::Validation(ErrorCode::BodyInvalid)
    })
}

async fn read_form(mut multipart: Multipart, file_field: &str) -> Result<FormData, MNError> {
    let mut form = FormData::default();
    while let Some(mut field) = multipart.try_next().await? {
        let disposition = field.content_disposition();
        let name = disposition.get_name().unwrap_or_default().to_owned();
        let filename = disposition.get_filename().unwrap_or_default().to_owned();
        if name == file_field {
            let data = read_limited(&mut field, MAX_UPLOAD_BYTES, ErrorCode::UploadTooLarge).await?;
            // Browsers send an empty, unnamed part when no file was picked.
            if !filename.is_empty() || !data.is_empty() {
                form.file = Some(UploadedFile { filename, data });
            }
        } else {
            let data = read_limited(&mut field, MAX_JSON_BYTES, ErrorCode::BodyTooLarge).await?;
            let text = String::from_utf8(data.to_vec())
                .map_err(|_| MNError::Validation(ErrorCode::BodyInvalid))?;
            form.fields.insert(name, text);
        }
    }
    Ok(form)
}

/// Encodes a `multipart/form-data` body the way a browser `FormData` does.
#[cfg(test)]
pub fn encode_multipart(
    boundary: &str,
    fields: &[(&str, &str)],
    file: Option<(&str, &str, &[u8])>,
) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                boundary, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((name, filename, data)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                boundary, name, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}
