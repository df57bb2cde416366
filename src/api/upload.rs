use std::fs;
use std::path::{Path, PathBuf};

use actix_web::dev::HttpServiceFactory;
use actix_web::{post, web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use crate::api::common::{new_id, Credential, ErrorCode};
use crate::api::form::{read_limited, UploadedFile};
use crate::database::auth;
use crate::error::MNError;
use crate::AppState;

pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
pub const UPLOAD_URL_PREFIX: &str = "/assets/";
const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Whether `reference` is shaped like a file this module stored.
pub fn is_upload_reference(reference: &str) -> bool {
    match reference.strip_prefix(UPLOAD_URL_PREFIX) {
        Some(file_name) => {
            !file_name.is_empty()
                && !file_name.starts_with('.')
                && file_name
                    .chars()
                    .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '.')
        }
        None => false,
    }
}

fn stored_path(dir: &Path, reference: &str) -> Option<PathBuf> {
    if !is_upload_reference(reference) {
        return None;
    }
    reference
        .strip_prefix(UPLOAD_URL_PREFIX)
        .map(|file_name| dir.join(file_name))
}

/// Rejects references to files that are not in the upload directory.
pub fn check_stored(dir: &Path, reference: Option<&str>) -> Result<(), MNError> {
    match reference {
        Some(reference) if !stored_path(dir, reference).map_or(false, |path| path.is_file()) => {
            Err(MNError::Validation(ErrorCode::ImageReferenceInvalid))
        }
        _ => Ok(()),
    }
}

fn allowed_extension(original_name: &str) -> Result<String, MNError> {
    Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .ok_or(MNError::Validation(ErrorCode::UploadTypeInvalid))
}

/// Writes the image under a fresh name and returns its reference.
pub fn store_upload(dir: &Path, original_name: &str, data: &[u8]) -> Result<String, MNError> {
    if data.is_empty() {
        return Err(MNError::Validation(ErrorCode::UploadEmpty));
    }
    if data.len() > MAX_UPLOAD_BYTES {
        return Err(MNError::Validation(ErrorCode::UploadTooLarge));
    }
    let extension = allowed_extension(original_name)?;
    fs::create_dir_all(dir)?;
    let file_name = format!("{}.{}", new_id(), extension);
    fs::write(dir.join(&file_name), data)?;
    Ok(format!("{}{}", UPLOAD_URL_PREFIX, file_name))
}

pub async fn store_file(dir: PathBuf, file: UploadedFile) -> Result<String, MNError> {
    web::block(move || store_upload(&dir, &file.filename, &file.data)).await?
}

/// Removes the file stored for a request whose mutation then failed.
pub async fn release_on_error<T>(
    dir: PathBuf,
    reference: Option<String>,
    result: Result<T, MNError>,
) -> Result<T, MNError> {
    if let (Err(_), Some(reference)) = (&result, reference) {
        let removed = web::block(move || match stored_path(&dir, &reference) {
            Some(path) => fs::remove_file(path),
            None => Ok(()),
        })
        .await;
        if let Ok(Err(e)) = removed {
            tracing::warn!("Failed to remove orphaned upload: {}", e);
        }
    }
    result
}

/// Id of the caller, who must be an active user.
pub async fn active_user_id(state: &AppState, token: Option<String>) -> Result<String, MNError> {
    state
        .store
        .query(move |snapshot| Ok(auth::authenticate_active(snapshot, token.as_deref())?.id.clone()))
        .await
}

#[derive(Deserialize)]
struct UploadQuery {
    filename: String,
}

#[derive(Serialize)]
struct UploadResponse {
    reference: String,
}

#[post("")]
async fn upload_handler(
    state: web::Data<AppState>,
    credential: Credential,
    query: web::Query<UploadQuery>,
    mut body: web::Payload,
) -> Result<impl Responder, MNError> {
    let user_id = active_user_id(&state, credential.0).await?;
    let data = read_limited(&mut body, MAX_UPLOAD_BYTES, ErrorCode::UploadTooLarge).await?;
    let file = UploadedFile {
        filename: query.into_inner().filename,
        data,
    };
    let reference = store_file(state.upload_dir.clone(), file).await?;
    tracing::info!("User {} uploaded {}", user_id, reference);
    Ok(HttpResponse::Created().json(UploadResponse { reference }))
}

pub fn get_service() -> impl HttpServiceFactory {
    web::scope("/uploads").service(upload_handler)
}
