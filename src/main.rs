#[macro_use]
extern crate lazy_static;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Settings;
use crate::database::{FileStore, MemoryStore, RecordStore, Store};
use crate::rate_limit::RateLimit;

mod api;
mod config;
mod database;
mod error;
mod models;
mod password;
mod rate_limit;

/// `DATA_FILE` value that keeps everything in memory.
const IN_MEMORY_DATA_FILE: &str = ":memory:";

pub struct AppState {
    pub store: Store,
    pub upload_dir: PathBuf,
}

fn open_record_store(settings: &Settings) -> io::Result<Arc<dyn RecordStore>> {
    let to_io = |e: error::MNError| io::Error::new(io::ErrorKind::Other, e);
    if settings.data_file.as_os_str() == IN_MEMORY_DATA_FILE {
        tracing::warn!("Using in-memory storage; nothing will be persisted");
        return Ok(Arc::new(MemoryStore::new().map_err(to_io)?));
    }
    let store = FileStore::open(&settings.data_file).map_err(to_io)?;
    tracing::info!("Using data file {}", store.path().display());
    Ok(Arc::new(store))
}

fn build_cors(origins: &[String]) -> Cors {
    let cors = if origins.is_empty() {
        Cors::default().allow_any_origin()
    } else {
        origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };
    cors.allowed_methods(vec!["GET", "POST", "PUT"])
        .allowed_headers(vec!["Content-Type", "Authorization"])
        .max_age(3600)
}

#[actix_rt::main]
async fn main() -> io::Result<()> {
    dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mynotes=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env();
    let record_store = open_record_store(&settings)?;
    std::fs::create_dir_all(&settings.upload_dir)?;
    let state = web::Data::new(AppState {
        store: Store::start(record_store),
        upload_dir: settings.upload_dir.clone(),
    });

    tracing::info!("Listening on {}", settings.bind_address);
    let cors_origins = settings.cors_origins.clone();
    // Built once so every worker shares the same per-client budgets.
    let rate_limit = RateLimit::new(settings.rate_limit_requests, settings.rate_limit_window);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(rate_limit.clone())
            .wrap(build_cors(&cors_origins))
            .wrap(Logger::default())
            .service(api::get_service())
    })
    .bind(&settings.bind_address)?
    .run()
    .await
}
