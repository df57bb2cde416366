//! Likes and bookmarks. Each user likes or bookmarks a note at most once.

use actix_web::dev::HttpServiceFactory;
use actix_web::{get, post, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};

use crate::api::common::{self, Credential, ErrorCode};
use crate::api::notification::notify;
use crate::database::stats::{self, NoteWithStats};
use crate::database::{auth, visibility};
use crate::error::MNError;
use crate::models::{Bookmark, Like, NotificationPayload, Snapshot};
use crate::AppState;

/// Likes a note the caller can see and notifies its owner.
pub fn like_note(
    snapshot: &mut Snapshot,
    token: Option<&str>,
    note_id: &str,
    now: DateTime<Utc>,
) -> Result<Like, MNError> {
    let user_id = auth::authenticate_active(snapshot, token)?.id.clone();
    let owner_id = visibility::visible_note(snapshot, note_id, Some(user_id.as_str()))?
        .user_id
        .clone();
    if snapshot
        .likes
        .iter()
        .any(|like| like.note_id == note_id && like.user_id == user_id)
    {
        return Err(MNError::Conflict(ErrorCode::AlreadyLiked));
    }
    let like = Like {
        id: common::new_id(),
        note_id: note_id.to_owned(),
        user_id: user_id.clone(),
        created_at: now,
    };
    snapshot.likes.push(like.clone());
    if owner_id != user_id {
        notify(
            snapshot,
            &owner_id,
            NotificationPayload::Like {
                note_id: note_id.to_owned(),
                from_user_id: user_id,
            },
            now,
        );
    }
    Ok(like)
}

pub fn bookmark_note(
    snapshot: &mut Snapshot,
    token: Option<&str>,
    note_id: &str,
    now: DateTime<Utc>,
) -> Result<Bookmark, MNError> {
    let user_id = auth::authenticate_active(snapshot, token)?.id.clone();
    visibility::visible_note(snapshot, note_id, Some(user_id.as_str()))?;
    if snapshot
        .bookmarks
        .iter()
        .any(|bookmark| bookmark.note_id == note_id && bookmark.user_id == user_id)
    {
        return Err(MNError::Conflict(ErrorCode::AlreadyBookmarked));
    }
    let bookmark = Bookmark {
        id: common::new_id(),
        note_id: note_id.to_owned(),
        user_id,
        created_at: now,
    };
    snapshot.bookmarks.push(bookmark.clone());
    Ok(bookmark)
}

/// The caller's bookmarked notes in bookmark order, minus any that have
/// since become hidden from them.
pub fn list_bookmarks(snapshot: &Snapshot, token: Option<&str>) -> Result<Vec<NoteWithStats>, MNError> {
    let user_id = auth::authenticate(snapshot, token)?.id.as_str();
    let notes = snapshot
        .bookmarks
        .iter()
        .filter(|bookmark| bookmark.user_id == user_id)
        .filter_map(|bookmark| snapshot.find_note(&bookmark.note_id))
        .filter(|note| visibility::can_view(snapshot, note, Some(user_id)));
    Ok(stats::enrich_all(snapshot, notes))
}

#[post("/{id}/like")]
async fn like_handler(
    state: web::Data<AppState>,
    credential: Credential,
    path: web::Path<String>,
) -> Result<impl Responder, MNError> {
    let token = credential.0;
    let note_id = path.into_inner();
    let now = common::get_current_timestamp();
    let like = state
        .store
        .transact(move |snapshot| like_note(snapshot, token.as_deref(), &note_id, now))
        .await?;
    tracing::info!("User {} liked note {}", like.user_id, like.note_id);
    Ok(HttpResponse::Created().json(like))
}

#[post("/{id}/bookmark")]
async fn bookmark_handler(
    state: web::Data<AppState>,
    credential: Credential,
    path: web::Path<String>,
) -> Result<impl Responder, MNError> {
    let token = credential.0;
    let note_id = path.into_inner();
    let now = common::get_current_timestamp();
    let bookmark = state
        .store
        .transact(move |snapshot| bookmark_note(snapshot, token.as_deref(), &note_id, now))
        .await?;
    tracing::info!("User {} bookmarked note {}", bookmark.user_id, bookmark.note_id);
    Ok(HttpResponse::Created().json(bookmark))
}

#[get("")]
async fn list_bookmarks_handler(
    state: web::Data<AppState>,
    credential: Credential,
) -> Result<impl Responder, MNError> {
    let token = credential.0;
    let notes = state
        .store
        .query(move |snapshot| list_bookmarks(snapshot, token.as_deref()))
        .await?;
    Ok(HttpResponse::Ok().json(notes))
}

/// Mounted inside the `/notes` scope.
pub fn configure_note_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(like_handler).service(bookmark_handler);
}

pub fn get_service() -> impl HttpServiceFactory {
    web::scope("/bookmarks").service(list_bookmarks_handler)
}
