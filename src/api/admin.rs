//! Moderation routes. The single admin account lives in the snapshot and
//! authenticates with its own token, separate from user sessions.

use actix_web::dev::HttpServiceFactory;
use actix_web::{get, post, put, web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use crate::api::common::{generate_token, required, Credential, ErrorCode};
use crate::api::user::UserProfile;
use crate::database::auth;
use crate::error::MNError;
use crate::models::Snapshot;
use crate::password::verify_password;
use crate::AppState;

#[derive(Serialize, Debug)]
struct AdminIdentity {
    id: String,
    email: String,
}

#[derive(Serialize, Debug)]
struct AdminSessionResponse {
    success: bool,
    token: String,
    admin: AdminIdentity,
}

/// Checks the admin credentials and rotates the admin token.
pub fn admin_login(snapshot: &mut Snapshot, email: &str, password: &str) -> Result<String, MNError> {
    let admin = &mut snapshot.admin;
    if !admin.email.eq_ignore_ascii_case(email) || !verify_password(password, &admin.password_hash)? {
        return Err(MNError::Forbidden("Invalid admin credentials"));
    }
    let token = generate_token();
    admin.token = Some(token.clone());
    Ok(token)
}

pub fn set_suspension(
    snapshot: &mut Snapshot,
    token: Option<&str>,
    user_id: &str,
    suspended: bool,
) -> Result<UserProfile, MNError> {
    auth::authenticate_admin(snapshot, token)?;
    let user = snapshot
        .users
        .iter_mut()
        .find(|user| user.id == user_id)
        .ok_or(MNError::NotFound("User not found"))?;
    user.is_suspended = suspended;
    Ok(UserProfile::from(&*user))
}

#[derive(Deserialize)]
struct AdminLoginPayload {
    email: Option<String>,
    password: Option<String>,
}

#[post("/login")]
async fn login_handler(
    state: web::Data<AppState>,
    payload: web::Json<AdminLoginPayload>,
) -> Result<impl Responder, MNError> {
    let payload = payload.into_inner();
    let email = required(payload.email, ErrorCode::EmailMissing)?.trim().to_owned();
    let password = required(payload.password, ErrorCode::PasswordMissing)?;
    let (token, admin) = state
        .store
        .transact(move |snapshot| {
            let token = admin_login(snapshot, &email, &password)?;
            let admin = AdminIdentity {
                id: snapshot.admin.id.clone(),
                email: snapshot.admin.email.clone(),
            };
            Ok((token, admin))
        })
        .await?;
    tracing::info!("Admin {} logged in", admin.id);
    Ok(HttpResponse::Ok().json(AdminSessionResponse {
        success: true,
        token,
        admin,
    }))
}

#[get("/users")]
async fn list_users_handler(
    state: web::Data<AppState>,
    credential: Credential,
) -> Result<impl Responder, MNError> {
    let token = credential.0;
    let users: Vec<UserProfile> = state
        .store
        .query(move |snapshot| {
            auth::authenticate_admin(snapshot, token.as_deref())?;
            Ok(snapshot.users.iter().map(UserProfile::from).collect())
        })
        .await?;
    Ok(HttpResponse::Ok().json(users))
}

#[derive(Deserialize)]
struct SuspensionPayload {
    suspended: bool,
}

#[put("/users/{id}/suspension")]
async fn suspension_handler(
    state: web::Data<AppState>,
    credential: Credential,
    path: web::Path<String>,
    payload: web::Json<SuspensionPayload>,
) -> Result<impl Responder, MNError> {
    let token = credential.0;
    let user_id = path.into_inner();
    let suspended = payload.suspended;
    let profile = state
        .store
        .transact(move |snapshot| set_suspension(snapshot, token.as_deref(), &user_id, suspended))
        .await?;
    tracing::info!(
        "User {} {}",
        profile.summary.id,
        if suspended { "suspended" } else { "reinstated" }
    );
    Ok(HttpResponse::Ok().json(profile))
}

pub fn get_service() -> impl HttpServiceFactory {
    web::scope("/admin")
        .service(login_handler)
        .service(list_users_handler)
        .service(suspension_handler)
}
