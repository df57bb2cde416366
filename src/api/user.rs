use actix_web::{get, post, put, web, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::api::common::{
    self, check_max_len, generate_token, required, Credential, ErrorCode,
};
use crate::api::form::{self, Body};
use crate::api::upload::{self, is_upload_reference};
use crate::database::{auth, stats};
use crate::error::MNError;
use crate::models::{Snapshot, User};
use crate::password::{hash_password, verify_password};
use crate::AppState;

const MAX_USER_NAME_BYTES: usize = 64;
const MAX_EMAIL_BYTES: usize = 128;
const MIN_PASSWORD_BYTES: usize = 6;
const MAX_BIO_BYTES: usize = 1024;
const AVATAR_BACKGROUND: &str = "4a6fa5";

/// Characters `encodeURIComponent` leaves untouched.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn default_avatar_url(name: &str) -> String {
    format!(
        "https://ui-avatars.com/api/?name={}&background={}&color=fff",
        percent_encoding::utf8_percent_encode(name, URI_COMPONENT),
        AVATAR_BACKGROUND
    )
}

fn validate_name(name: &str) -> Result<(), MNError> {
    check_max_len(name, MAX_USER_NAME_BYTES, ErrorCode::NameTooLong)
}

fn validate_email(email: &str) -> Result<(), MNError> {
    check_max_len(email, MAX_EMAIL_BYTES, ErrorCode::EmailTooLong)?;
    lazy_static! {
        static ref EMAIL_REGEX: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err(MNError::Validation(ErrorCode::EmailInvalid));
    }
    Ok(())
}

fn validate_bio(bio: &str) -> Result<(), MNError> {
    check_max_len(bio, MAX_BIO_BYTES, ErrorCode::BioTooLong)
}

/// Fields shown to anyone.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub email: String,
    pub avatar: String,
    pub bio: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            avatar: user.avatar.clone(),
            bio: user.bio.clone(),
            created_at: user.created_at,
        }
    }
}

/// Everything but the password hash and the session token.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(flatten)]
    pub summary: UserSummary,
    pub is_suspended: bool,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        UserProfile {
            summary: user.into(),
            is_suspended: user.is_suspended,
        }
    }
}

/// Returned by register and login so the client can keep the token.
#[derive(Serialize, Debug)]
pub struct SessionResponse {
    #[serde(flatten)]
    profile: UserProfile,
    token: String,
}

impl From<&User> for SessionResponse {
    fn from(user: &User) -> Self {
        SessionResponse {
            profile: user.into(),
            token: user.token.clone().unwrap_or_default(),
        }
    }
}

#[derive(Deserialize, Default)]
pub struct RegisterPayload {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
    bio: Option<String>,
}

pub struct Registration {
    name: String,
    email: String,
    password: String,
    bio: String,
}

fn validate_registration(payload: RegisterPayload) -> Result<Registration, MNError> {
    let name = required(payload.name, ErrorCode::NameMissing)?.trim().to_owned();
    let email = normalize_email(&required(payload.email, ErrorCode::EmailMissing)?);
    let password = required(payload.password, ErrorCode::PasswordMissing)?;
    validate_name(&name)?;
    validate_email(&email)?;
    if password.len() < MIN_PASSWORD_BYTES {
        return Err(MNError::Validation(ErrorCode::PasswordTooShort));
    }
    let bio = payload.bio.unwrap_or_default();
    validate_bio(&bio)?;
    Ok(Registration { name, email, password, bio })
}

/// Emails are stored in this form, so lookups compare normalized strings.
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn find_by_email<'a>(snapshot: &'a Snapshot, email: &str) -> Option<&'a User> {
    let email = normalize_email(email);
    snapshot.users.iter().find(|user| user.email == email)
}

pub fn register(
    snapshot: &mut Snapshot,
    registration: Registration,
    password_hash: String,
    now: DateTime<Utc>,
) -> Result<User, MNError> {
    if find_by_email(snapshot, &registration.email).is_some() {
        return Err(MNError::Conflict(ErrorCode::EmailDuplicated));
    }
    let user = User {
        id: common::new_id(),
        avatar: default_avatar_url(&registration.name),
        name: registration.name,
        email: registration.email,
        password_hash,
        bio: registration.bio,
        created_at: now,
        token: Some(generate_token()),
        is_suspended: false,
    };
    snapshot.users.push(user.clone());
    Ok(user)
}

#[post("/register")]
async fn register_handler(
    state: web::Data<AppState>,
    payload: web::Json<RegisterPayload>,
) -> Result<impl Responder, MNError> {
    let registration = validate_registration(payload.into_inner())?;
    let password = registration.password.clone();
    let password_hash = web::block(move || hash_password(&password)).await??;
    let now = common::get_current_timestamp();
    let user = state
        .store
        .transact(move |snapshot| register(snapshot, registration, password_hash, now))
        .await?;
    tracing::info!("Registered user {}", user.id);
    Ok(HttpResponse::Created().json(SessionResponse::from(&user)))
}

#[derive(Deserialize)]
struct LoginPayload {
    email: Option<String>,
    password: Option<String>,
}

/// Rotates the session token; any earlier session of the user stops working.
pub fn login(snapshot: &mut Snapshot, email: &str, password: &str) -> Result<User, MNError> {
    let email = normalize_email(email);
    let index = snapshot
        .users
        .iter()
        .position(|user| user.email == email)
        .ok_or(MNError::Unauthorized)?;
    if !verify_password(password, &snapshot.users[index].password_hash)? {
        return Err(MNError::Unauthorized);
    }
    let user = &mut snapshot.users[index];
    if user.is_suspended {
        return Err(MNError::Forbidden("Account suspended"));
    }
    user.token = Some(generate_token());
    Ok(user.clone())
}

#[post("/login")]
async fn login_handler(
    state: web::Data<AppState>,
    payload: web::Json<LoginPayload>,
) -> Result<impl Responder, MNError> {
    let payload = payload.into_inner();
    let email = normalize_email(&required(payload.email, ErrorCode::EmailMissing)?);
    let password = required(payload.password, ErrorCode::PasswordMissing)?;
    let user = state
        .store
        .transact(move |snapshot| login(snapshot, &email, &password))
        .await?;
    tracing::info!("User {} logged in", user.id);
    Ok(HttpResponse::Ok().json(SessionResponse::from(&user)))
}

#[get("")]
async fn list_users_handler(state: web::Data<AppState>) -> Result<impl Responder, MNError> {
    let users: Vec<UserSummary> = state
        .store
        .query(|snapshot| Ok(snapshot.users.iter().map(UserSummary::from).collect()))
        .await?;
    Ok(HttpResponse::Ok().json(users))
}

#[get("/me")]
async fn me_handler(
    state: web::Data<AppState>,
    credential: Credential,
) -> Result<impl Responder, MNError> {
    let token = credential.0;
    let profile = state
        .store
        .query(move |snapshot| Ok(UserProfile::from(auth::authenticate(snapshot, token.as_deref())?)))
        .await?;
    Ok(HttpResponse::Ok().json(profile))
}

#[get("/stats/{id}")]
async fn stats_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<impl Responder, MNError> {
    let user_id = path.into_inner();
    let user_stats = state
        .store
        .query(move |snapshot| {
            snapshot
                .find_user(&user_id)
                .ok_or(MNError::NotFound("User not found"))?;
            Ok(stats::user_stats(snapshot, &user_id))
        })
        .await?;
    Ok(HttpResponse::Ok().json(user_stats))
}

#[get("/{id}")]
async fn get_user_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<impl Responder, MNError> {
    let user_id = path.into_inner();
    let profile = state
        .store
        .query(move |snapshot| {
            snapshot
                .find_user(&user_id)
                .map(UserProfile::from)
                .ok_or(MNError::NotFound("User not found"))
        })
        .await?;
    Ok(HttpResponse::Ok().json(profile))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileChanges {
    name: Option<String>,
    bio: Option<String>,
    avatar: Option<String>,
    #[serde(default)]
    remove_avatar: bool,
}

/// Merges the supplied fields over the caller's own record. A blank name
/// keeps the current one.
pub fn update_profile(
    snapshot: &mut Snapshot,
    token: Option<&str>,
    target_id: &str,
    changes: ProfileChanges,
) -> Result<User, MNError> {
    let caller_id = auth::authenticate_active(snapshot, token)?.id.clone();
    let index = snapshot
        .users
        .iter()
        .position(|user| user.id == target_id)
        .ok_or(MNError::NotFound("User not found"))?;
    if caller_id != target_id {
        return Err(MNError::Forbidden("Cannot edit another user's profile"));
    }

    let name = changes
        .name
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty());
    if let Some(name) = &name {
        validate_name(name)?;
    }
    if let Some(bio) = &changes.bio {
        validate_bio(bio)?;
    }
    if let Some(avatar) = &changes.avatar {
        if !is_upload_reference(avatar) {
            return Err(MNError::Validation(ErrorCode::ImageReferenceInvalid));
        }
    }

    let user = &mut snapshot.users[index];
    if let Some(name) = name {
        user.name = name;
    }
    if let Some(bio) = changes.bio {
        user.bio = bio;
    }
    if let Some(avatar) = changes.avatar {
        user.avatar = avatar;
    } else if changes.remove_avatar {
        user.avatar = default_avatar_url(&user.name);
    }
    Ok(user.clone())
}

/// JSON, or a form with `name`/`bio`/`removeAvatar` plus an optional
/// `avatar` file.
async fn read_profile_changes(
    state: &AppState,
    req: &HttpRequest,
    body: web::Payload,
) -> Result<(ProfileChanges, Option<String>), MNError> {
    match form::read_body::<ProfileChanges>(req, body, "avatar").await? {
        Body::Json(changes) => {
            upload::check_stored(&state.upload_dir, changes.avatar.as_deref())?;
            Ok((changes, None))
        }
        Body::Form(mut form) => {
            let stored = match form.file.take() {
                Some(file) => Some(upload::store_file(state.upload_dir.clone(), file).await?),
                None => None,
            };
            let changes = ProfileChanges {
                name: form.text("name"),
                bio: form.text("bio"),
                avatar: stored.clone(),
                remove_avatar: form.flag("removeAvatar").unwrap_or(false),
            };
            Ok((changes, stored))
        }
    }
}

#[put("/{id}")]
async fn update_profile_handler(
    state: web::Data<AppState>,
    credential: Credential,
    path: web::Path<String>,
    req: HttpRequest,
    body: web::Payload,
) -> Result<impl Responder, MNError> {
    let token = credential.0;
    let target_id = path.into_inner();
    upload::active_user_id(&state, token.clone()).await?;
    let (changes, stored) = read_profile_changes(&state, &req, body).await?;
    let result = state
        .store
        .transact(move |snapshot| update_profile(snapshot, token.as_deref(), &target_id, changes))
        .await;
    let user = upload::release_on_error(state.upload_dir.clone(), stored, result).await?;
    tracing::info!("User {} updated their profile", user.id);
    Ok(HttpResponse::Ok().json(UserProfile::from(&user)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(register_handler)
        .service(login_handler)
        .service(
            web::scope("/users")
                .service(list_users_handler)
                .service(me_handler)
                .service(stats_handler)
                .service(get_user_handler)
                .service(update_profile_handler),
        );
}
