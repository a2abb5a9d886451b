use std::collections::BTreeMap;
use std::sync::Arc;

use actix_session::Session;
use actix_web::{get, post, web, HttpResponse, Responder};
use chrono::Utc;
use diesel_async::AsyncConnection;
use log::info;
use serde::{Deserialize, Serialize};

use crate::util::api_util::*;
use crate::util::minigame::{self, Claim, Progress, Settlement};
use crate::util::{catalog, ledger};
use crate::{DbPool, Ext};

#[derive(Debug, Serialize, PartialEq)]
struct LevelView {
    level: i32,
    last_played: Option<i64>,
    cooldown_remaining: i64,
    required_score: i64,
    reward: i64,
}

impl LevelView {
    fn new(game: &catalog::GameSpec, progress: Progress, now: chrono::DateTime<Utc>) -> Self {
        Self {
            level: progress.level,
            last_played: progress.last_played.map(|time| time.timestamp_millis()),
            cooldown_remaining: progress.cooldown_remaining(now),
            required_score: minigame::required_score(game, progress.level),
            reward: minigame::reward(game, progress.level),
        }
    }
}

// [[API]]
// desp: Progress in every game, including the ones never played.
// Method: GET
// URL: /api/game-levels
// Response Body: `{[game_id]: LevelView}`
#[get("/game-levels")]
pub async fn game_levels(
    pool: web::Data<Arc<DbPool>>,
    session: Session,
    query: web::Query<Claimed>,
) -> Result<impl Responder, APIError> {
    let location = "game_levels";
    let user_id = session_user(&session, query.username.as_deref())?;
    let mut conn = pool
        .get()
        .await
        .map_err(|e| log_server_error(e, location, ERROR_DB_CONNECTION))?;

    let now = Utc::now();
    let rows = ledger::fetch_levels(user_id, &mut conn)
        .await
        .map_err(|e| e.set_location(location).tap(APIError::log))?;

    let levels: BTreeMap<&str, LevelView> = catalog::GAMES
        .iter()
        .map(|game| {
            let progress = rows
                .iter()
                .find(|row| row.game_id == game.id)
                .map(Progress::from)
                .unwrap_or_default();
            (game.id, LevelView::new(game, progress, now))
        })
        .collect();
    Ok(HttpResponse::Ok().json(levels))
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    username: Option<String>,
    game_id: String,
}

#[derive(Debug, Serialize)]
struct StartResponse {
    game_id: String,
    level: i32,
    required_score: i64,
    start_time: i64,
    valid_until: i64,
}

// [[API]]
// desp: Open a game session. Any unclaimed session is dropped.
// Method: POST
// URL: /api/game/start
// Request Body: `StartRequest`
// Response Body: `StartResponse`
#[post("/game/start")]
pub async fn start_game(
    pool: web::Data<Arc<DbPool>>,
    mut session: Session,
    form: web::Json<StartRequest>,
) -> Result<impl Responder, APIError> {
    let location = "start_game";
    let user_id = session_user(&session, form.username.as_deref())?;
    let game = catalog::game(&form.game_id).ok_or(Rejection::UnknownGame)?;
    let mut conn = pool
        .get()
        .await
        .map_err(|e| log_server_error(e, location, ERROR_DB_CONNECTION))?;

    let now = Utc::now();
    let result = conn
        .transaction::<_, APIError, _>(|conn| {
            Box::pin(async move {
                let user = ledger::lock_user(user_id, conn).await?;
                let progress = ledger::fetch_level(user.id, game.id, conn)
                    .await?
                    .as_ref()
                    .map(Progress::from)
                    .unwrap_or_default();
                progress.check_start(now)?;

                let opened = minigame::open_session(user.id, game, now);
                ledger::replace_session(&opened, conn).await?;
                Ok(StartResponse {
                    game_id: opened.game_id,
                    level: progress.level,
                    required_score: minigame::required_score(game, progress.level),
                    start_time: opened.start_time.timestamp_millis(),
                    valid_until: opened.valid_until.timestamp_millis(),
                })
            })
        })
        .await
        .inspect_err(kill_session(&mut session))
        .map_err(|e| e.set_location(location).tap(APIError::log))?;

    Ok(accepted("Jogo iniciado!", result))
}

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    username: Option<String>,
    game_id: String,
    score: i64,
    won: bool,
}

#[derive(Debug, Serialize)]
struct ClaimResponse {
    reward: i64,
    power_expires_at: i64,
    battery: bool,
    batteries: i32,
    level: i32,
}

// [[API]]
// desp: Claim the reward of a finished game. Any claim that gets past the
//       session checks uses the session up, won or not.
// Method: POST
// URL: /api/game/claim
// Request Body: `ClaimRequest`
// Response Body: `ClaimResponse`
#[post("/game/claim")]
pub async fn claim_game(
    pool: web::Data<Arc<DbPool>>,
    mut session: Session,
    form: web::Json<ClaimRequest>,
) -> Result<impl Responder, APIError> {
    let location = "claim_game";
    let user_id = session_user(&session, form.username.as_deref())?;
    let game = catalog::game(&form.game_id).ok_or(Rejection::UnknownGame)?;
    let mut conn = pool
        .get()
        .await
        .map_err(|e| log_server_error(e, location, ERROR_DB_CONNECTION))?;

    let now = Utc::now();
    let battery = minigame::roll_battery_drop(&mut rand::thread_rng());
    let (score, won) = (form.score, form.won);

    // A rejection that consumed the session must still commit the deletion.
    let verdict = conn
        .transaction::<_, APIError, _>(|conn| {
            Box::pin(async move {
                let user = ledger::lock_user(user_id, conn).await?;
                let open = ledger::fetch_session(user.id, conn).await?;
                let progress = ledger::fetch_level(user.id, game.id, conn)
                    .await?
                    .as_ref()
                    .map(Progress::from)
                    .unwrap_or_default();
                let claim = Claim {
                    game_id: game.id,
                    score,
                    won,
                };

                let verdict = minigame::judge(open.as_ref(), game, claim, progress, now);
                let (win, grant_until, battery) = match minigame::settle(verdict, battery, now) {
                    Settlement::Keep(rejection) => return Err(rejection.into()),
                    Settlement::Consume(rejection) => {
                        ledger::delete_session(user.id, conn).await?;
                        return Ok(Err(rejection));
                    }
                    Settlement::Pay {
                        win,
                        grant_until,
                        battery,
                    } => (win, grant_until, battery),
                };

                ledger::insert_grant(user.id, win.reward, grant_until, conn).await?;
                let batteries = if battery {
                    ledger::add_batteries(user.id, 1, conn).await?
                } else {
                    user.batteries
                };
                ledger::upsert_level(user.id, game.id, win.next_level, now, conn).await?;
                ledger::delete_session(user.id, conn).await?;

                Ok(Ok(ClaimResponse {
                    reward: win.reward,
                    power_expires_at: grant_until.timestamp_millis(),
                    battery,
                    batteries,
                    level: win.next_level,
                }))
            })
        })
        .await
        .inspect_err(kill_session(&mut session))
        .map_err(|e| e.set_location(location).tap(APIError::log))?;

    let result = verdict?;
    info!(
        "User {} won {} at level {} (+{} power)",
        user_id,
        game.id,
        result.level - 1,
        result.reward
    );
    let message = if result.battery {
        format!("Vitória! +{} de poder por 24h e uma bateria", result.reward)
    } else {
        format!("Vitória! +{} de poder por 24h", result.reward)
    };
    Ok(accepted(&message, result))
}
