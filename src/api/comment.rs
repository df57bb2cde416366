use actix_web::{get, post, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::common::{self, Credential, ErrorCode};
use crate::api::note::viewer_id;
use crate::api::notification::notify;
use crate::database::{auth, visibility};
use crate::error::MNError;
use crate::models::{Comment, NotificationPayload, Snapshot, User};
use crate::AppState;

pub const MAX_COMMENT_BYTES: usize = 4096;
pub const MIN_COMMENT_BYTES: usize = 1;

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommentAuthor {
    id: String,
    name: String,
    avatar: String,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    id: String,
    note_id: String,
    content: String,
    created_at: DateTime<Utc>,
    user: CommentAuthor,
}

fn to_response(comment: &Comment, author: &User) -> CommentResponse {
    CommentResponse {
        id: comment.id.clone(),
        note_id: comment.note_id.clone(),
        content: comment.content.clone(),
        created_at: comment.created_at,
        user: CommentAuthor {
            id: author.id.clone(),
            name: author.name.clone(),
            avatar: author.avatar.clone(),
        },
    }
}

fn validate_content(content: &str) -> Result<(), MNError> {
    if content.trim().len() < MIN_COMMENT_BYTES {
        return Err(MNError::Validation(ErrorCode::CommentTooShort));
    }
    if content.len() > MAX_COMMENT_BYTES {
        return Err(MNError::Validation(ErrorCode::CommentTooLong));
    }
    Ok(())
}

/// Comments go on notes the caller can see. The note owner is notified
/// unless they commented on their own note.
pub fn add_comment(
    snapshot: &mut Snapshot,
    token: Option<&str>,
    note_id: &str,
    content: String,
    now: DateTime<Utc>,
) -> Result<CommentResponse, MNError> {
    let author = auth::authenticate_active(snapshot, token)?.clone();
    validate_content(&content)?;
    let owner_id = visibility::visible_note(snapshot, note_id, Some(author.id.as_str()))?
        .user_id
        .clone();
    let comment = Comment {
        id: common::new_id(),
        note_id: note_id.to_owned(),
        user_id: author.id.clone(),
        content,
        created_at: now,
    };
    snapshot.comments.push(comment.clone());
    if owner_id != author.id {
        notify(
            snapshot,
            &owner_id,
            NotificationPayload::Comment {
                note_id: note_id.to_owned(),
                comment_id: comment.id.clone(),
                from_user_id: author.id.clone(),
            },
            now,
        );
    }
    Ok(to_response(&comment, &author))
}

/// Newest first. Comments whose author record is gone are skipped.
pub fn list_comments(
    snapshot: &Snapshot,
    viewer_id: Option<&str>,
    note_id: &str,
) -> Result<Vec<CommentResponse>, MNError> {
    visibility::visible_note(snapshot, note_id, viewer_id)?;
    Ok(snapshot
        .comments
        .iter()
        .rev()
        .filter(|comment| comment.note_id == note_id)
        .filter_map(|comment| {
            snapshot
                .find_user(&comment.user_id)
                .map(|author| to_response(comment, author))
        })
        .collect())
}

#[derive(Deserialize)]
struct SendPayload {
    content: Option<String>,
}

#[post("/{id}/comments")]
async fn send_handler(
    state: web::Data<AppState>,
    credential: Credential,
    path: web::Path<String>,
    payload: web::Json<SendPayload>,
) -> Result<impl Responder, MNError> {
    let token = credential.0;
    let note_id = path.into_inner();
    let content = payload.into_inner().content.unwrap_or_default();
    let now = common::get_current_timestamp();
    let comment = state
        .store
        .transact(move |snapshot| add_comment(snapshot, token.as_deref(), &note_id, content, now))
        .await?;
    tracing::info!("User {} commented on note {}", comment.user.id, comment.note_id);
    Ok(HttpResponse::Created().json(comment))
}

#[get("/{id}/comments")]
async fn get_note_comments_handler(
    state: web::Data<AppState>,
    credential: Credential,
    path: web::Path<String>,
) -> Result<impl Responder, MNError> {
    let token = credential.0;
    let note_id = path.into_inner();
    let comments = state
        .store
        .query(move |snapshot| {
            let viewer = viewer_id(snapshot, token.as_deref());
            list_comments(snapshot, viewer.as_deref(), &note_id)
        })
        .await?;
    Ok(HttpResponse::Ok().json(comments))
}

/// Mounted inside the `/notes` scope.
pub fn configure_note_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(send_handler).service(get_note_comments_handler);
}
