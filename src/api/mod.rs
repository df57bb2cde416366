use actix_web::dev::HttpServiceFactory;
use actix_web::web;

#[cfg(test)]
macro_rules! test_app {
    () => {{
        let upload_dir = tempfile::TempDir::new().unwrap();
        let store = crate::database::Store::start(std::sync::Arc::new(
            crate::database::MemoryStore::new().unwrap(),
        ));
        let state = actix_web::web::Data::new(crate::AppState {
            store,
            upload_dir: upload_dir.path().to_path_buf(),
        });
        let app = actix_web::test::init_service(
            actix_web::App::new()
                .app_data(state)
                .service(crate::api::get_service()),
        )
        .await;
        (app, upload_dir)
    }};
}

#[cfg(test)]
macro_rules! call_json {
    ($app:expr, $req:expr) => {{
        let resp = actix_web::test::call_service(&$app, $req.to_request()).await;
        let status = resp.status();
        let body: serde_json::Value = actix_web::test::read_body_json(resp).await;
        (status, body)
    }};
}

/// Registers a user and returns `(id, token)`.
#[cfg(test)]
macro_rules! register_user {
    ($app:expr, $name:expr, $email:expr) => {{
        let (status, body) = call_json!(
            $app,
            actix_web::test::TestRequest::post()
                .uri("/api/register")
                .set_json(serde_json::json!({
                    "name": $name,
                    "email": $email,
                    "password": "secret1",
                }))
        );
        assert_eq!(status, actix_web::http::StatusCode::CREATED, "{}", body);
        (
            body["id"].as_str().unwrap().to_owned(),
            body["token"].as_str().unwrap().to_owned(),
        )
    }};
}

/// Creates a note as the given user and returns its id.
#[cfg(test)]
macro_rules! create_note {
    ($app:expr, $token:expr, $title:expr, $is_public:expr) => {{
        let (status, body) = call_json!(
            $app,
            actix_web::test::TestRequest::post()
                .uri("/api/notes")
                .insert_header(("Authorization", $token.as_str()))
                .set_json(serde_json::json!({
                    "title": $title,
                    "content": "Hello world",
                    "isPublic": $is_public,
                }))
        );
        assert_eq!(status, actix_web::http::StatusCode::CREATED, "{}", body);
        body["id"].as_str().unwrap().to_owned()
    }};
}

pub mod admin;
pub mod comment;
pub mod common;
pub mod form;
pub mod note;
pub mod notification;
pub mod reaction;
pub mod upload;
pub mod user;

pub fn get_service() -> impl HttpServiceFactory {
    web::scope("/api")
        .app_data(
            web::JsonConfig::default()
                .limit(form::MAX_JSON_BYTES)
                .error_handler(crate::error::json_error),
        )
        .configure(user::configure)
        .service(admin::get_service())
        .service(note::get_service())
        .service(reaction::get_service())
        .service(notification::get_service())
        .service(upload::get_service())
}
