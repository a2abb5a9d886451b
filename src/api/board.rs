use std::sync::Arc;

use actix_web::{get, web, HttpResponse, Responder};
use serde::Serialize;

use crate::models::LeaderboardEntry;
use crate::util::api_util::*;
use crate::util::cache::Cache;
use crate::Ext;

#[derive(Debug, Serialize)]
struct LeaderboardResponse<'a> {
    leaderboard: &'a [LeaderboardEntry],
}

// [[API]]
// desp: Richest players. Served from the cache, a few seconds stale at most.
// Method: GET
// URL: /api/leaderboard
// Response Body: `LeaderboardResponse`
#[get("/leaderboard")]
pub async fn leaderboard(cache: web::Data<Arc<Cache>>) -> Result<impl Responder, APIError> {
    let location = "leaderboard";
    let board = cache
        .get_leaderboard()
        .await
        .map_err(|e| e.set_location(location).tap(APIError::log))?;
    Ok(HttpResponse::Ok().json(LeaderboardResponse {
        leaderboard: &board,
    }))
}

#[get("/stats")]
pub async fn stats(cache: web::Data<Arc<Cache>>) -> Result<impl Responder, APIError> {
    let location = "stats";
    let stats = cache
        .get_stats()
        .await
        .map_err(|e| e.set_location(location).tap(APIError::log))?;
    Ok(HttpResponse::Ok().json(stats.as_ref()))
}
