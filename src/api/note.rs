use actix_web::dev::HttpServiceFactory;
use actix_web::{get, post, put, web, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::api::common::{self, check_max_len, required, Credential, ErrorCode};
use crate::api::form::{self, Body};
use crate::api::upload::{self, is_upload_reference};
use crate::api::{comment, reaction};
use crate::database::stats::{self, NoteWithStats};
use crate::database::{auth, visibility};
use crate::error::MNError;
use crate::models::{Note, Snapshot, View};
use crate::AppState;

pub const MAX_TITLE_BYTES: usize = 200;
pub const MAX_CONTENT_BYTES: usize = 64 * 1024;

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NotePayload {
    title: Option<String>,
    content: Option<String>,
    is_public: Option<bool>,
    image: Option<String>,
    #[serde(default)]
    remove_image: bool,
}

struct ValidNote {
    title: String,
    content: String,
    is_public: Option<bool>,
    image: Option<String>,
    remove_image: bool,
}

fn validate_note(payload: NotePayload) -> Result<ValidNote, MNError> {
    let title = required(payload.title, ErrorCode::TitleMissing)?;
    let content = required(payload.content, ErrorCode::ContentMissing)?;
    check_max_len(&title, MAX_TITLE_BYTES, ErrorCode::TitleTooLong)?;
    check_max_len(&content, MAX_CONTENT_BYTES, ErrorCode::ContentTooLong)?;
    if let Some(image) = &payload.image {
        if !is_upload_reference(image) {
            return Err(MNError::Validation(ErrorCode::ImageReferenceInvalid));
        }
    }
    Ok(ValidNote {
        title,
        content,
        is_public: payload.is_public,
        image: payload.image,
        remove_image: payload.remove_image,
    })
}

/// The owner is always the authenticated caller.
pub fn create_note(
    snapshot: &mut Snapshot,
    token: Option<&str>,
    payload: NotePayload,
    now: DateTime<Utc>,
) -> Result<Note, MNError> {
    let user_id = auth::authenticate_active(snapshot, token)?.id.clone();
    let valid = validate_note(payload)?;
    let note = Note {
        id: common::new_id(),
        title: valid.title,
        content: valid.content,
        user_id,
        is_public: valid.is_public.unwrap_or(false),
        image: valid.image,
        created_at: now,
        updated_at: now,
    };
    snapshot.notes.push(note.clone());
    Ok(note)
}

/// Title and content are replaced; visibility and image only when supplied.
pub fn update_note(
    snapshot: &mut Snapshot,
    token: Option<&str>,
    note_id: &str,
    payload: NotePayload,
    now: DateTime<Utc>,
) -> Result<Note, MNError> {
    let user_id = auth::authenticate_active(snapshot, token)?.id.clone();
    let index = snapshot
        .notes
        .iter()
        .position(|note| note.id == note_id)
        .ok_or(MNError::NotFound("Note not found"))?;
    if snapshot.notes[index].user_id != user_id {
        return Err(MNError::Forbidden("Cannot edit another user's note"));
    }
    let valid = validate_note(payload)?;

    let note = &mut snapshot.notes[index];
    note.title = valid.title;
    note.content = valid.content;
    if let Some(is_public) = valid.is_public {
        note.is_public = is_public;
    }
    if valid.image.is_some() {
        note.image = valid.image;
    } else if valid.remove_image {
        note.image = None;
    }
    note.updated_at = now;
    Ok(note.clone())
}

/// Records one view and returns the note with its counts, the new view
/// included.
pub fn view_note(
    snapshot: &mut Snapshot,
    viewer_id: Option<String>,
    note_id: &str,
    now: DateTime<Utc>,
) -> Result<NoteWithStats, MNError> {
    let note = visibility::visible_note(snapshot, note_id, viewer_id.as_deref())?.clone();
    snapshot.views.push(View {
        id: common::new_id(),
        note_id: note.id.clone(),
        user_id: viewer_id,
        timestamp: now,
    });
    Ok(stats::enrich(snapshot, &note))
}

/// The owner sees every note; anyone else only what they may view.
pub fn list_user_notes(
    snapshot: &Snapshot,
    viewer_id: Option<&str>,
    user_id: &str,
) -> Vec<NoteWithStats> {
    let notes = visibility::list_notes_for_user(snapshot, user_id);
    if viewer_id == Some(user_id) {
        stats::enrich_all(snapshot, notes)
    } else {
        stats::enrich_all(
            snapshot,
            notes
                .into_iter()
                .filter(|note| visibility::can_view(snapshot, note, viewer_id)),
        )
    }
}

/// Optional-auth routes treat a missing or stale credential as anonymous.
pub fn viewer_id(snapshot: &Snapshot, token: Option<&str>) -> Option<String> {
    token.and_then(|token| auth::authenticate(snapshot, Some(token)).ok().map(|user| user.id.clone()))
}

#[get("/public")]
async fn list_public_handler(state: web::Data<AppState>) -> Result<impl Responder, MNError> {
    let notes = state
        .store
        .query(|snapshot| {
            Ok(stats::enrich_all(snapshot, visibility::list_public_notes(snapshot)))
        })
        .await?;
    Ok(HttpResponse::Ok().json(notes))
}

#[get("/user/{user_id}")]
async fn list_user_notes_handler(
    state: web::Data<AppState>,
    credential: Credential,
    path: web::Path<String>,
) -> Result<impl Responder, MNError> {
    let token = credential.0;
    let user_id = path.into_inner();
    let notes = state
        .store
        .query(move |snapshot| {
            let viewer = viewer_id(snapshot, token.as_deref());
            Ok(list_user_notes(snapshot, viewer.as_deref(), &user_id))
        })
        .await?;
    Ok(HttpResponse::Ok().json(notes))
}

/// JSON, or a form with text fields plus an optional `image` file. A file
/// from the form is stored first and becomes the note's image reference.
async fn read_note_payload(
    state: &AppState,
    req: &HttpRequest,
    body: web::Payload,
) -> Result<(NotePayload, Option<String>), MNError> {
    match form::read_body::<NotePayload>(req, body, "image").await? {
        Body::Json(payload) => {
            upload::check_stored(&state.upload_dir, payload.image.as_deref())?;
            Ok((payload, None))
        }
        Body::Form(mut form) => {
            let stored = match form.file.take() {
                Some(file) => Some(upload::store_file(state.upload_dir.clone(), file).await?),
                None => None,
            };
            let payload = NotePayload {
                title: form.text("title"),
                content: form.text("content"),
                is_public: form.flag("isPublic"),
                image: stored.clone(),
                remove_image: form.flag("removeImage").unwrap_or(false),
            };
            Ok((payload, stored))
        }
    }
}

#[post("")]
async fn create_note_handler(
    state: web::Data<AppState>,
    credential: Credential,
    req: HttpRequest,
    body: web::Payload,
) -> Result<impl Responder, MNError> {
    let token = credential.0;
    upload::active_user_id(&state, token.clone()).await?;
    let (payload, stored) = read_note_payload(&state, &req, body).await?;
    let now = common::get_current_timestamp();
    let result = state
        .store
        .transact(move |snapshot| create_note(snapshot, token.as_deref(), payload, now))
        .await;
    let note = upload::release_on_error(state.upload_dir.clone(), stored, result).await?;
    tracing::info!("User {} created note {}", note.user_id, note.id);
    Ok(HttpResponse::Created().json(note))
}

#[get("/{id}")]
async fn get_note_handler(
    state: web::Data<AppState>,
    credential: Credential,
    path: web::Path<String>,
) -> Result<impl Responder, MNError> {
    let token = credential.0;
    let note_id = path.into_inner();
    let now = common::get_current_timestamp();
    let note = state
        .store
        .transact(move |snapshot| {
            let viewer = viewer_id(snapshot, token.as_deref());
            view_note(snapshot, viewer, &note_id, now)
        })
        .await?;
    Ok(HttpResponse::Ok().json(note))
}

#[put("/{id}")]
async fn update_note_handler(
    state: web::Data<AppState>,
    credential: Credential,
    path: web::Path<String>,
    req: HttpRequest,
    body: web::Payload,
) -> Result<impl Responder, MNError> {
    let token = credential.0;
    let note_id = path.into_inner();
    upload::active_user_id(&state, token.clone()).await?;
    let (payload, stored) = read_note_payload(&state, &req, body).await?;
    let now = common::get_current_timestamp();
    let result = state
        .store
        .transact(move |snapshot| update_note(snapshot, token.as_deref(), &note_id, payload, now))
        .await;
    let note = upload::release_on_error(state.upload_dir.clone(), stored, result).await?;
    tracing::info!("User {} updated note {}", note.user_id, note.id);
    Ok(HttpResponse::Ok().json(note))
}

pub fn get_service() -> impl HttpServiceFactory {
    web::scope("/notes")
        .service(list_public_handler)
        .service(list_user_notes_handler)
        .service(create_note_handler)
        .service(get_note_handler)
        .service(update_note_handler)
        .configure(comment::configure_note_routes)
        .configure(reaction::configure_note_routes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::{self, user};
    use actix_web::http::StatusCode;
    use actix_web::test::TestRequest;
    use chrono::Duration;
    use serde_json::{json, Value};

    fn payload(title: &str, content: &str, is_public: bool) -> NotePayload {
        NotePayload {
            title: Some(title.to_owned()),
            content: Some(content.to_owned()),
            is_public: Some(is_public),
            ..Default::default()
        }
    }

    fn with_users() -> (Snapshot, String, String) {
        let mut snapshot = test_support::snapshot();
        let alice = user("alice");
        let bob = user("bob");
        let tokens = (alice.token.clone().unwrap(), bob.token.clone().unwrap());
        snapshot.users.push(alice);
        snapshot.users.push(bob);
        (snapshot, tokens.0, tokens.1)
    }

    #[test]
    fn create_binds_owner_to_caller() {
        let (mut snapshot, alice, _) = with_users();
        let now = Utc::now();
        let note = create_note(&mut snapshot, Some(alice.as_str()), payload("Hi", "Hello world", true), now)
            .unwrap();
        assert_eq!(note.user_id, "alice");
        assert!(note.is_public);
        assert_eq!(note.created_at, now);
        assert_eq!(note.updated_at, now);
        assert_eq!(snapshot.notes, vec![note]);
    }

    #[test]
    fn create_validates_fields_and_caller() {
        let (mut snapshot, alice, _) = with_users();
        let now = Utc::now();
        assert!(matches!(
            create_note(&mut snapshot, Some(alice.as_str()), payload("", "body", true), now),
            Err(MNError::Validation(ErrorCode::TitleMissing))
        ));
        assert!(matches!(
            create_note(&mut snapshot, Some(alice.as_str()), payload("Hi", "  ", true), now),
            Err(MNError::Validation(ErrorCode::ContentMissing))
        ));
        let with_foreign_image = NotePayload {
            image: Some("https://elsewhere.example/a.png".to_owned()),
            ..payload("Hi", "body", true)
        };
        assert!(matches!(
            create_note(&mut snapshot, Some(alice.as_str()), with_foreign_image, now),
            Err(MNError::Validation(ErrorCode::ImageReferenceInvalid))
        ));
        assert!(matches!(
            create_note(&mut snapshot, None, payload("Hi", "body", true), now),
            Err(MNError::Unauthorized)
        ));

        snapshot.users[0].is_suspended = true;
        assert!(matches!(
            create_note(&mut snapshot, Some(alice.as_str()), payload("Hi", "body", true), now),
            Err(MNError::Forbidden(_))
        ));
        assert!(snapshot.notes.is_empty());
    }

    #[test]
    fn only_owner_may_update() {
        let (mut snapshot, alice, bob) = with_users();
        let created = Utc::now();
        let note = create_note(&mut snapshot, Some(alice.as_str()), payload("Hi", "Hello", true), created)
            .unwrap();

        let later = created + Duration::seconds(5);
        assert!(matches!(
            update_note(&mut snapshot, Some(bob.as_str()), &note.id, payload("Mine", "now", true), later),
            Err(MNError::Forbidden(_))
        ));
        assert!(matches!(
            update_note(&mut snapshot, Some(alice.as_str()), "missing", payload("a", "b", true), later),
            Err(MNError::NotFound(_))
        ));

        let updated = update_note(
            &mut snapshot,
            Some(alice.as_str()),
            &note.id,
            NotePayload {
                title: Some("Hi again".to_owned()),
                content: Some("Edited".to_owned()),
                ..Default::default()
            },
            later,
        )
        .unwrap();
        assert_eq!(updated.title, "Hi again");
        assert!(updated.is_public);
        assert_eq!(updated.created_at, created);
        assert_eq!(updated.updated_at, later);
        assert_ne!(updated.updated_at, note.updated_at);
    }

    #[test]
    fn update_can_attach_and_remove_image() {
        let (mut snapshot, alice, _) = with_users();
        let now = Utc::now();
        let note = create_note(&mut snapshot, Some(alice.as_str()), payload("Hi", "Hello", false), now)
            .unwrap();
        let attached = update_note(
            &mut snapshot,
            Some(alice.as_str()),
            &note.id,
            NotePayload {
                image: Some("/assets/abc.png".to_owned()),
                ..payload("Hi", "Hello", false)
            },
            now,
        )
        .unwrap();
        assert_eq!(attached.image.as_deref(), Some("/assets/abc.png"));

        let removed = update_note(
            &mut snapshot,
            Some(alice.as_str()),
            &note.id,
            NotePayload {
                remove_image: true,
                ..payload("Hi", "Hello", false)
            },
            now,
        )
        .unwrap();
        assert!(removed.image.is_none());
    }

    #[test]
    fn viewing_records_a_view_row() {
        let (mut snapshot, alice, _) = with_users();
        let note = create_note(&mut snapshot, Some(alice.as_str()), payload("Hi", "Hello", true), Utc::now())
            .unwrap();
        let first = view_note(&mut snapshot, None, &note.id, Utc::now()).unwrap();
        let second = view_note(&mut snapshot, Some("bob".to_owned()), &note.id, Utc::now()).unwrap();
        assert_eq!(first.counts.views, 1);
        assert_eq!(second.counts.views, 2);
        assert_eq!(second.counts.likes, 0);
        assert_eq!(snapshot.views[1].user_id.as_deref(), Some("bob"));
    }

    #[test]
    fn private_note_views_are_owner_only() {
        let (mut snapshot, alice, _) = with_users();
        let note = create_note(&mut snapshot, Some(alice.as_str()), payload("Hi", "Hello", false), Utc::now())
            .unwrap();
        assert!(matches!(
            view_note(&mut snapshot, Some("bob".to_owned()), &note.id, Utc::now()),
            Err(MNError::NotFound(_))
        ));
        assert!(view_note(&mut snapshot, Some("alice".to_owned()), &note.id, Utc::now()).is_ok());
        assert_eq!(snapshot.views.len(), 1);
    }

    #[test]
    fn user_listing_depends_on_viewer() {
        let (mut snapshot, alice, _) = with_users();
        create_note(&mut snapshot, Some(alice.as_str()), payload("Pub", "x", true), Utc::now()).unwrap();
        create_note(&mut snapshot, Some(alice.as_str()), payload("Priv", "x", false), Utc::now()).unwrap();

        assert_eq!(list_user_notes(&snapshot, Some("alice"), "alice").len(), 2);
        assert_eq!(list_user_notes(&snapshot, Some("bob"), "alice").len(), 1);
        assert_eq!(list_user_notes(&snapshot, None, "alice").len(), 1);
        assert!(list_user_notes(&snapshot, None, "nobody").is_empty());
    }

    fn titles(body: &Value) -> Vec<String> {
        body.as_array()
            .unwrap()
            .iter()
            .map(|note| note["title"].as_str().unwrap().to_owned())
            .collect()
    }

    #[actix_rt::test]
    async fn suspension_scenario() {
        let (app, _dir) = test_app!();
        let (alice_id, alice_token) = register_user!(app, "Alice", "alice@x.com");
        create_note!(app, alice_token, "Hi", true);
        create_note!(app, alice_token, "Diary", false);

        let (status, body) = call_json!(app, TestRequest::get().uri("/api/notes/public"));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(titles(&body), vec!["Hi"]);
        assert_eq!(body[0]["views"], 0);
        assert_eq!(body[0]["userId"], alice_id.as_str());

        let (_, body) = call_json!(
            app,
            TestRequest::post().uri("/api/admin/login").set_json(json!({
                "email": crate::models::ADMIN_EMAIL,
                "password": crate::models::ADMIN_DEFAULT_PASSWORD,
            }))
        );
        let admin_token = body["token"].as_str().unwrap().to_owned();
        let (status, _) = call_json!(
            app,
            TestRequest::put()
                .uri(&format!("/api/admin/users/{}/suspension", alice_id))
                .insert_header(("Authorization", admin_token.as_str()))
                .set_json(json!({ "suspended": true }))
        );
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call_json!(app, TestRequest::get().uri("/api/notes/public"));
        assert!(titles(&body).is_empty());

        let (_, body) = call_json!(
            app,
            TestRequest::get()
                .uri(&format!("/api/notes/user/{}", alice_id))
                .insert_header(("Authorization", alice_token.as_str()))
        );
        assert_eq!(titles(&body), vec!["Hi", "Diary"]);

        let (_, body) = call_json!(
            app,
            TestRequest::get().uri(&format!("/api/notes/user/{}", alice_id))
        );
        assert!(titles(&body).is_empty());
    }

    #[actix_rt::test]
    async fn update_ownership_over_http() {
        let (app, _dir) = test_app!();
        let (_, alice_token) = register_user!(app, "Alice", "alice@x.com");
        let (_, bob_token) = register_user!(app, "Bob", "bob@x.com");
        let note_id = create_note!(app, alice_token, "Hi", true);
        let uri = format!("/api/notes/{}", note_id);

        let (_, original) = call_json!(app, TestRequest::get().uri(&uri));

        let (status, _) = call_json!(
            app,
            TestRequest::put()
                .uri(&uri)
                .insert_header(("Authorization", bob_token.as_str()))
                .set_json(json!({ "title": "Hacked", "content": "x" }))
        );
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, updated) = call_json!(
            app,
            TestRequest::put()
                .uri(&uri)
                .insert_header(("Authorization", alice_token.as_str()))
                .set_json(json!({ "title": "Hi there", "content": "Hello again" }))
        );
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["title"], "Hi there");
        assert_ne!(updated["updatedAt"], original["updatedAt"]);
        assert_eq!(updated["createdAt"], original["createdAt"]);

        let (status, _) = call_json!(
            app,
            TestRequest::post()
                .uri("/api/notes")
                .set_json(json!({ "title": "Hi", "content": "x" }))
        );
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[actix_rt::test]
    async fn get_note_counts_views() {
        let (app, _dir) = test_app!();
        let (_, alice_token) = register_user!(app, "Alice", "alice@x.com");
        let public_id = create_note!(app, alice_token, "Hi", true);
        let private_id = create_note!(app, alice_token, "Diary", false);

        let uri = format!("/api/notes/{}", public_id);
        call_json!(app, TestRequest::get().uri(&uri));
        let (status, body) = call_json!(app, TestRequest::get().uri(&uri));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["views"], 2);

        let (status, _) = call_json!(
            app,
            TestRequest::get().uri(&format!("/api/notes/{}", private_id))
        );
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call_json!(
            app,
            TestRequest::get()
                .uri(&format!("/api/notes/{}", private_id))
                .insert_header(("Authorization", alice_token.as_str()))
        );
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isPublic"], false);
    }

    fn form_request(token: &str, body: Vec<u8>) -> TestRequest {
        TestRequest::post()
            .uri("/api/notes")
            .insert_header(("Authorization", token))
            .insert_header(("Content-Type", "multipart/form-data; boundary=note-boundary"))
            .set_payload(body)
    }

    #[actix_rt::test]
    async fn create_note_from_form_with_image() {
        let (app, dir) = test_app!();
        let (_, token) = register_user!(app, "Alice", "alice@x.com");
        let body = form::encode_multipart(
            "note-boundary",
            &[("title", "Trip"), ("content", "Photos"), ("isPublic", "true")],
            Some(("image", "beach.png", &b"png bytes"[..])),
        );
        let (status, note) = call_json!(app, form_request(&token, body));
        assert_eq!(status, StatusCode::CREATED, "{}", note);
        assert_eq!(note["title"], "Trip");
        assert_eq!(note["isPublic"], true);
        let image = note["image"].as_str().unwrap();
        assert!(image.ends_with(".png"));
        assert!(dir
            .path()
            .join(image.trim_start_matches(upload::UPLOAD_URL_PREFIX))
            .is_file());

        let (status, _) = call_json!(
            app,
            TestRequest::post()
                .uri("/api/notes")
                .insert_header(("Authorization", token.as_str()))
                .set_json(json!({ "title": "Again", "content": "x", "image": image }))
        );
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call_json!(
            app,
            TestRequest::post()
                .uri("/api/notes")
                .insert_header(("Authorization", token.as_str()))
                .set_json(json!({ "title": "Fake", "content": "x", "image": "/assets/never-uploaded.png" }))
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], ErrorCode::ImageReferenceInvalid as u8);
    }

    #[actix_rt::test]
    async fn rejected_form_keeps_no_upload() {
        let (app, dir) = test_app!();
        let (_, token) = register_user!(app, "Alice", "alice@x.com");
        let body = form::encode_multipart(
            "note-boundary",
            &[("content", "No title")],
            Some(("image", "beach.png", &b"png bytes"[..])),
        );
        let (status, body) = call_json!(app, form_request(&token, body));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], ErrorCode::TitleMissing as u8);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[actix_rt::test]
    async fn malformed_note_body_is_a_validation_error() {
        let (app, _dir) = test_app!();
        let (_, token) = register_user!(app, "Alice", "alice@x.com");
        let (status, body) = call_json!(
            app,
            TestRequest::post()
                .uri("/api/notes")
                .insert_header(("Authorization", token.as_str()))
                .insert_header(("Content-Type", "application/json"))
                .set_payload("{ not json")
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], ErrorCode::BodyInvalid as u8);
    }
}
