#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the shelter map application.
//!
//! Serves the public read API (search, detail, cities, urgent needs, need
//! vocabulary) and, when `PANEL_TOKEN` is set, the bearer-protected panel
//! API that creates, updates and deletes shelters and needs.

mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use shelter_map_cache::ResultCache;
use shelter_map_database::{MemoryStore, ShelterStore, SqlStore, db, run_migrations};
use shelter_map_service::{CacheTtls, ShelterService};

/// Shared application state.
pub struct AppState {
    /// Query service shared by every worker.
    pub service: Arc<ShelterService>,
    /// Bearer token required by the panel routes. `None` disables them.
    pub panel_token: Option<String>,
}

/// Registers every route under `/api`.
///
/// Panel routes are only registered when `panel_enabled` is set.
pub fn configure(cfg: &mut web::ServiceConfig, panel_enabled: bool) {
    let mut api = web::scope("/api")
        .route("/health", web::get().to(handlers::health))
        .service(
            web::scope("/public")
                .route("/shelters", web::get().to(handlers::search_shelters))
                .route("/shelters/{id}", web::get().to(handlers::get_shelter))
                .route("/cities", web::get().to(handlers::cities))
                .route("/urgent-needs", web::get().to(handlers::urgent_needs))
                .route("/need-terms", web::get().to(handlers::need_terms)),
        );

    if panel_enabled {
        api = api.service(
            web::scope("/panel")
                .route("/shelters", web::get().to(handlers::panel_list_shelters))
                .route("/shelters", web::post().to(handlers::panel_create_shelter))
                .route("/shelters/{id}", web::patch().to(handlers::panel_update_shelter))
                .route("/shelters/{id}", web::delete().to(handlers::panel_delete_shelter))
                .route("/shelters/{id}/needs", web::get().to(handlers::panel_list_needs))
                .route("/shelters/{id}/needs", web::post().to(handlers::panel_create_need))
                .route("/needs/{id}", web::patch().to(handlers::panel_update_need))
                .route("/needs/{id}", web::delete().to(handlers::panel_delete_need)),
        );
    }

    cfg.service(api);
}

/// Opens the store selected by `SHELTER_STORE`: `memory` for an empty
/// in-process store, anything else for `PostgreSQL` via `DATABASE_URL`.
async fn open_store() -> std::io::Result<Arc<dyn ShelterStore>> {
    let kind = std::env::var("SHELTER_STORE").unwrap_or_else(|_| "postgres".to_string());

    if kind.eq_ignore_ascii_case("memory") {
        log::warn!("Using in-memory store; data is lost on shutdown");
        return Ok(Arc::new(MemoryStore::new()));
    }

    log::info!("Connecting to database...");
    let db_conn = db::connect_from_env()
        .await
        .map_err(|e| std::io::Error::other(format!("Failed to connect to database: {e}")))?;

    log::info!("Running migrations...");
    run_migrations(db_conn.as_ref())
        .await
        .map_err(|e| std::io::Error::other(format!("Failed to run migrations: {e}")))?;

    Ok(Arc::new(SqlStore::new(Arc::from(db_conn))))
}

/// Starts the shelter map API server.
///
/// Opens the configured store, builds the cache and query service, and
/// starts the Actix-Web HTTP server. The caller provides the async runtime
/// (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the store cannot be opened, the
/// HTTP server fails to bind, or it encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let store = open_store().await?;
    let ttls = CacheTtls::from_env();
    log::info!("Cache lifetimes: {ttls:?}");

    let panel_token = std::env::var("PANEL_TOKEN")
        .ok()
        .filter(|token| !token.trim().is_empty());
    if panel_token.is_none() {
        log::warn!("PANEL_TOKEN is not set; panel routes are disabled");
    }
    let panel_enabled = panel_token.is_some();

    let state = web::Data::new(AppState {
        service: Arc::new(ShelterService::new(
            store,
            Arc::new(ResultCache::new()),
            ttls,
        )),
        panel_token,
    });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(|cfg| configure(cfg, panel_enabled))
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
