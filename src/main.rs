// src/main.rs
mod config;
mod fetch;
mod handlers;
mod models;
mod normalize;
mod query;
mod refresh;
mod storage;
mod utils;

use actix_web::{web, App, HttpServer};
use env_logger::Env;
use governor::RateLimiter;
use log::{error, info};
use std::sync::Arc;
use crate::config::{Config, USER_AGENT};
use crate::fetch::UpstreamClient;
use crate::handlers::servers::ClientRateLimiter;
use crate::refresh::Refresher;
use crate::storage::cache;
use crate::storage::memory::ServerStorage;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = Config::from_env();
    if !config.has_credentials() {
        error!("MATCHMAKING_USERNAME and MATCHMAKING_TOKEN must be set");
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "missing matchmaking credentials",
        ));
    }
    info!("{} starting", USER_AGENT);

    let client = UpstreamClient::new(&config).map_err(|e| {
        error!("Failed to build HTTP client: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;

    let storage = Arc::new(ServerStorage::new(config.clone()));
    if let Some(loaded) = cache::load_or_empty(&config.cache_file) {
        if storage.restore(loaded.servers, loaded.captured_at) {
            info!("Read cached server list ({} servers)", storage.snapshot().servers.len());
        }
    }

    let refresher = web::Data::new(Refresher::new(Arc::clone(&storage), client));
    tokio::spawn(refresher.clone().into_inner().run_background());

    let server_list_rate_limiter: web::Data<ClientRateLimiter> =
        web::Data::new(RateLimiter::keyed(config.server_list_quota()));
    tokio::spawn(handlers::servers::purge_rate_limiter(
        server_list_rate_limiter.clone(),
        config.limiter_purge(),
    ));
    if !config.trusted_proxies.is_empty() {
        info!("Honouring X-Forwarded-For from {:?}", config.trusted_proxies);
    }

    let bind_address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let bind = format!("{}:{}", bind_address, port);

    info!("Starting server on {}", bind);
    HttpServer::new(move || {
        App::new()
            .app_data(refresher.clone())
            .app_data(server_list_rate_limiter.clone())
            .route("/", web::get().to(handlers::servers::get_servers::<UpstreamClient>))
            .route("/versions", web::get().to(handlers::servers::get_versions::<UpstreamClient>))
            .route("/health", web::get().to(handlers::index::health::<UpstreamClient>))
    })
        .bind(&bind)?
        .run().await
}
