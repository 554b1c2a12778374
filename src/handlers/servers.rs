// src/handlers/servers.rs
use actix_web::{web, HttpRequest, HttpResponse};
use governor::{RateLimiter, clock::DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use log::{debug, warn};
use serde::Serialize;
use std::net::IpAddr;
use std::time::Duration;
use crate::fetch::ServerSource;
use crate::models::server::VersionCount;
use crate::query::{run_query, QueryParams};
use crate::refresh::Refresher;
use crate::utils::{extract_client_ip, RequestError};

pub type ClientRateLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Drops limiter entries whose quota has fully replenished. Returns how many went.
pub fn purge_stale_keys(limiter: &ClientRateLimiter) -> usize {
    let before = limiter.len();
    limiter.retain_recent();
    limiter.shrink_to_fit();
    before.saturating_sub(limiter.len())
}

pub async fn purge_rate_limiter(limiter: web::Data<ClientRateLimiter>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        let purged = purge_stale_keys(&limiter);
        if purged > 0 {
            debug!("Purged {} idle rate limiter keys, {} left", purged, limiter.len());
        }
    }
}

/// `GET /`: one page of the server list.
pub async fn get_servers<S: ServerSource + 'static>(
    refresher: web::Data<Refresher<S>>,
    rate_limiter: web::Data<ClientRateLimiter>,
    query: web::Query<Vec<(String, String)>>,
    req: HttpRequest,
) -> Result<HttpResponse, RequestError> {
    let client_ip = extract_client_ip(&req, &refresher.storage().config().trusted_proxies)?;
    if rate_limiter.check_key(&client_ip).is_err() {
        warn!("Rate limit exceeded for server list for ip: {}", client_ip);
        return Err(RequestError::RateLimitExceeded);
    }

    debug!("Request: {}", req.uri());
    refresher.refresh_if_due().await;

    let params = QueryParams::from_pairs(query.into_inner());
    let storage = refresher.storage();
    let snapshot = storage.snapshot();
    let view = run_query(&snapshot, &params, storage.config().items_per_page);

    debug!(
        "Returning {} of {} matching servers (page {}/{})",
        view.servers.len(),
        view.total_count,
        view.current_page,
        view.total_pages
    );
    Ok(HttpResponse::Ok().json(view))
}

#[derive(Serialize)]
struct VersionsResponse {
    versions: Vec<VersionCount>,
}

/// `GET /versions`: servers per game version.
pub async fn get_versions<S: ServerSource + 'static>(
    refresher: web::Data<Refresher<S>>,
) -> HttpResponse {
    let snapshot = refresher.storage().snapshot();
    HttpResponse::Ok().json(VersionsResponse {
        versions: snapshot.versions.clone(),
    })
}
