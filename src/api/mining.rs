use std::sync::Arc;

use actix_session::Session;
use actix_web::{get, post, web, HttpResponse, Responder};
use chrono::Utc;
use diesel_async::AsyncConnection;
use log::info;
use serde::{Deserialize, Serialize};

use crate::models::{MachineView, RackView};
use crate::util::api_util::*;
use crate::util::cache::Cache;
use crate::util::economy::{self, MineDecision};
use crate::util::energy::{self, EnergyState, RechargeKind};
use crate::util::{catalog, ledger, power};
use crate::{DbPool, Ext};

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    username: String,
    balance: f64,
    batteries: i32,
    rooms_unlocked: i32,
    next_room_cost: Option<f64>,
    total_power: i64,
    total_watts: i64,
    network_power: f64,
    estimated_reward: f64,
    has_energy: bool,
    energy_bars: i64,
    electricity_expires_at: i64,
    server_time: i64,
    racks: Vec<RackView>,
    machines: Vec<MachineView>,
}

// [[API]]
// desp: Everything the client needs to redraw the game.
// Method: GET
// URL: /api/status
// Response Body: `StatusResponse`
#[get("/status")]
pub async fn status(
    pool: web::Data<Arc<DbPool>>,
    mut session: Session,
    query: web::Query<Claimed>,
) -> Result<impl Responder, APIError> {
    let location = "status";
    let user_id = session_user(&session, query.username.as_deref())?;
    let mut conn = pool
        .get()
        .await
        .map_err(|e| log_server_error(e, location, ERROR_DB_CONNECTION))?;

    let now = Utc::now();
    let user = ledger::fetch_user(user_id, &mut conn)
        .await
        .inspect_err(kill_session(&mut session))
        .map_err(|e| e.set_location(location).tap(APIError::log))?;
    let racks = ledger::fetch_racks(user.id, &mut conn)
        .await
        .map_err(|e| e.set_location(location).tap(APIError::log))?;
    let machines = ledger::fetch_machines(user.id, &mut conn)
        .await
        .map_err(|e| e.set_location(location).tap(APIError::log))?;
    let grants = ledger::fetch_active_grants(user.id, now, &mut conn)
        .await
        .map_err(|e| e.set_location(location).tap(APIError::log))?;
    let network_power = ledger::fetch_network_power(&mut conn)
        .await
        .map_err(|e| e.set_location(location).tap(APIError::log))?;

    let report =
        power::PowerReport::compute(user.electricity_expires_at, &racks, &machines, &grants, now);
    let total_power = report.total();

    Ok(HttpResponse::Ok().json(StatusResponse {
        username: user.username,
        balance: user.balance,
        batteries: user.batteries,
        rooms_unlocked: user.rooms_unlocked,
        next_room_cost: catalog::room_cost(user.rooms_unlocked),
        total_power,
        total_watts: report.powered_watts(),
        network_power,
        estimated_reward: economy::block_reward_for(total_power, network_power),
        has_energy: report.has_energy,
        energy_bars: energy::bars_left(user.electricity_expires_at, now),
        electricity_expires_at: user.electricity_expires_at.timestamp_millis(),
        server_time: now.timestamp_millis(),
        racks: racks.iter().map(RackView::from).collect(),
        machines: machines.iter().map(MachineView::from).collect(),
    }))
}

#[derive(Debug, Serialize)]
struct MineResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    reward: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    balance: Option<f64>,
}

// [[API]]
// desp: One mining tick. Ticks that come too early or without power are
//       accepted and change nothing.
// Method: POST
// URL: /api/mine
// Request Body: `Claimed`
// Response Body: `MineResponse`
#[post("/mine")]
pub async fn mine(
    pool: web::Data<Arc<DbPool>>,
    cache: web::Data<Arc<Cache>>,
    mut session: Session,
    form: web::Json<Claimed>,
) -> Result<impl Responder, APIError> {
    let location = "mine";
    let user_id = session_user(&session, form.username.as_deref())?;
    let mut conn = pool
        .get()
        .await
        .map_err(|e| log_server_error(e, location, ERROR_DB_CONNECTION))?;

    let now = Utc::now();
    let result = conn
        .transaction::<_, APIError, _>(|conn| {
            Box::pin(async move {
                let user = ledger::lock_user(user_id, conn).await?;
                let report = power::fetch_power_report(&user, now, conn).await?;
                let network_power = ledger::fetch_network_power(conn).await?;

                match economy::decide_mine(user.last_mine_time, report.total(), network_power, now)
                {
                    MineDecision::TooSoon | MineDecision::NoPower => Ok(MineResponse {
                        reward: None,
                        balance: None,
                    }),
                    MineDecision::Reward(reward) => {
                        let new_balance = user.balance + reward;
                        ledger::record_mine(user.id, new_balance, now, conn).await?;
                        ledger::grow_network_power(economy::network_growth_rate(), conn).await?;
                        Ok(MineResponse {
                            reward: Some(reward),
                            balance: Some(new_balance),
                        })
                    }
                }
            })
        })
        .await
        .inspect_err(kill_session(&mut session))
        .map_err(|e| e.set_location(location).tap(APIError::log))?;

    if result.reward.is_some() {
        cache.invalidate_leaderboard().await;
    }
    Ok(accepted("OK", result))
}

#[derive(Debug, Deserialize)]
pub struct RechargeRequest {
    username: Option<String>,
    #[serde(rename = "type")]
    kind: RechargeKind,
}

#[derive(Debug, Serialize)]
struct RechargeResponse {
    batteries: i32,
    expires_at: i64,
    energy_bars: i64,
}

// [[API]]
// desp: Add one bar of electricity, either from the daily free recharge or
//       by spending a battery.
// Method: POST
// URL: /api/recharge
// Request Body: `RechargeRequest`
// Response Body: `RechargeResponse`
#[post("/recharge")]
pub async fn recharge(
    pool: web::Data<Arc<DbPool>>,
    mut session: Session,
    form: web::Json<RechargeRequest>,
) -> Result<impl Responder, APIError> {
    let location = "recharge";
    let user_id = session_user(&session, form.username.as_deref())?;
    let mut conn = pool
        .get()
        .await
        .map_err(|e| log_server_error(e, location, ERROR_DB_CONNECTION))?;

    let now = Utc::now();
    let kind = form.kind;
    let charged = conn
        .transaction::<_, APIError, _>(|conn| {
            Box::pin(async move {
                let user = ledger::lock_user(user_id, conn).await?;
                let charged = EnergyState {
                    expires_at: user.electricity_expires_at,
                    batteries: user.batteries,
                    last_free_recharge: user.last_free_recharge,
                }
                .recharge(kind, now)?;
                ledger::save_energy(user.id, &charged, conn).await?;
                Ok(charged)
            })
        })
        .await
        .inspect_err(kill_session(&mut session))
        .map_err(|e| e.set_location(location).tap(APIError::log))?;

    info!("User {} recharged ({:?})", user_id, kind);
    Ok(accepted(
        "Energia recarregada!",
        RechargeResponse {
            batteries: charged.batteries,
            expires_at: charged.expires_at.timestamp_millis(),
            energy_bars: energy::bars_left(charged.expires_at, now),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recharge_request_reads_type_field() {
        let form: RechargeRequest =
            serde_json::from_str(r#"{"username": "bob", "type": "battery"}"#).unwrap();
        assert_eq!(form.kind, RechargeKind::Battery);
        assert_eq!(form.username.as_deref(), Some("bob"));

        let form: RechargeRequest = serde_json::from_str(r#"{"type": "free"}"#).unwrap();
        assert_eq!(form.kind, RechargeKind::Free);
        assert!(form.username.is_none());
    }

    #[test]
    fn unknown_recharge_type_is_rejected() {
        assert!(serde_json::from_str::<RechargeRequest>(r#"{"type": "solar"}"#).is_err());
    }

    #[test]
    fn idle_mine_tick_has_no_fields() {
        let value = serde_json::to_value(MineResponse {
            reward: None,
            balance: None,
        })
        .unwrap();
        assert_eq!(value, serde_json::json!({}));
    }
}
