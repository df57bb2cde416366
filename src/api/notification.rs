use actix_web::dev::HttpServiceFactory;
use actix_web::{get, post, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};

use crate::api::common::{self, Credential};
use crate::database::auth;
use crate::error::MNError;
use crate::models::{Notification, NotificationPayload, Snapshot};
use crate::AppState;

pub fn notify(
    snapshot: &mut Snapshot,
    target_user_id: &str,
    payload: NotificationPayload,
    now: DateTime<Utc>,
) {
    snapshot.notifications.push(Notification {
        id: common::new_id(),
        target_user_id: target_user_id.to_owned(),
        payload,
        read: false,
        created_at: now,
    });
}

/// Newest first.
pub fn list_notifications(
    snapshot: &Snapshot,
    token: Option<&str>,
) -> Result<Vec<Notification>, MNError> {
    let user_id = auth::authenticate(snapshot, token)?.id.as_str();
    Ok(snapshot
        .notifications
        .iter()
        .rev()
        .filter(|notification| notification.target_user_id == user_id)
        .cloned()
        .collect())
}

pub fn mark_read(
    snapshot: &mut Snapshot,
    token: Option<&str>,
    notification_id: &str,
) -> Result<Notification, MNError> {
    let user_id = auth::authenticate_active(snapshot, token)?.id.clone();
    let notification = snapshot
        .notifications
        .iter_mut()
        .find(|notification| notification.id == notification_id)
        .ok_or(MNError::NotFound("Notification not found"))?;
    if notification.target_user_id != user_id {
        return Err(MNError::Forbidden("Not your notification"));
    }
    notification.read = true;
    Ok(notification.clone())
}

#[get("")]
async fn list_handler(
    state: web::Data<AppState>,
    credential: Credential,
) -> Result<impl Responder, MNError> {
    let token = credential.0;
    let notifications = state
        .store
        .query(move |snapshot| list_notifications(snapshot, token.as_deref()))
        .await?;
    Ok(HttpResponse::Ok().json(notifications))
}

#[post("/{id}/read")]
async fn mark_read_handler(
    state: web::Data<AppState>,
    credential: Credential,
    path: web::Path<String>,
) -> Result<impl Responder, MNError> {
    let token = credential.0;
    let notification_id = path.into_inner();
    let notification = state
        .store
        .transact(move |snapshot| mark_read(snapshot, token.as_deref(), &notification_id))
        .await?;
    Ok(HttpResponse::Ok().json(notification))
}

pub fn get_service() -> impl HttpServiceFactory {
    web::scope("/notifications")
        .service(list_handler)
        .service(mark_read_handler)
}
