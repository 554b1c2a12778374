// src/handlers/index.rs
use actix_web::{web, HttpResponse};
use serde::Serialize;
use std::time::Instant;
use crate::fetch::ServerSource;
use crate::refresh::Refresher;

#[derive(Serialize)]
struct Health {
    status: &'static str,
    servers: usize,
    players: usize,
    last_refresh_secs_ago: Option<u64>,
    last_attempt_secs_ago: Option<u64>,
}

pub async fn health<S: ServerSource + 'static>(refresher: web::Data<Refresher<S>>) -> HttpResponse {
    let storage = refresher.storage();
    let snapshot = storage.snapshot();
    let state = storage.refresh_state();
    let now = Instant::now();
    let ago = |t: Option<Instant>| t.map(|t| now.saturating_duration_since(t).as_secs());

    HttpResponse::Ok().json(Health {
        status: "ok",
        servers: snapshot.servers.len(),
        players: snapshot.player_count,
        last_refresh_secs_ago: ago(state.last_success),
        last_attempt_secs_ago: ago(state.last_attempt),
    })
}
