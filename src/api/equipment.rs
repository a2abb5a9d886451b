use std::sync::Arc;

use actix_session::Session;
use actix_web::{post, web, Responder};
use chrono::Utc;
use diesel_async::AsyncConnection;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::models::{MachineId, RackId, RackView};
use crate::util::api_util::*;
use crate::util::{ledger, placement, power};
use crate::{DbPool, Ext};

#[derive(Debug, Deserialize)]
pub struct PlaceRackRequest {
    username: Option<String>,
    rack_id: RackId,
    room_idx: i32,
    position: i32,
}

#[derive(Debug, Deserialize)]
pub struct UnplaceRackRequest {
    username: Option<String>,
    rack_id: RackId,
}

#[derive(Debug, Serialize)]
struct RackResponse {
    rack: RackView,
    total_power: i64,
}

// [[API]]
// desp: Install an owned rack into a room slot, or move it there.
// Method: POST
// URL: /api/rack/place
// Request Body: `PlaceRackRequest`
// Response Body: `RackResponse`
#[post("/rack/place")]
pub async fn place_rack(
    pool: web::Data<Arc<DbPool>>,
    mut session: Session,
    form: web::Json<PlaceRackRequest>,
) -> Result<impl Responder, APIError> {
    let location = "place_rack";
    let user_id = session_user(&session, form.username.as_deref())?;
    let mut conn = pool
        .get()
        .await
        .map_err(|e| log_server_error(e, location, ERROR_DB_CONNECTION))?;

    let now = Utc::now();
    let (target, room_idx, position) = (form.rack_id, form.room_idx, form.position);
    let result = conn
        .transaction::<_, APIError, _>(|conn| {
            Box::pin(async move {
                let user = ledger::lock_user(user_id, conn).await?;
                let racks = ledger::fetch_racks(user.id, conn).await?;
                let mut rack = racks
                    .iter()
                    .find(|rack| rack.id == target)
                    .cloned()
                    .ok_or(Rejection::ItemNotFound)?;
                placement::check_rack_placement(
                    user.rooms_unlocked,
                    target,
                    room_idx,
                    position,
                    &racks,
                )?;
                ledger::place_rack(user.id, target, Some((room_idx, position)), conn).await?;
                rack.room_idx = Some(room_idx);
                rack.position = Some(position);

                let report = power::fetch_power_report(&user, now, conn).await?;
                Ok(RackResponse {
                    rack: RackView::from(&rack),
                    total_power: report.total(),
                })
            })
        })
        .await
        .inspect_err(kill_session(&mut session))
        .map_err(|e| e.set_location(location).tap(APIError::log))?;

    debug!("User {} placed rack {} at {}:{}", user_id, target, room_idx, position);
    Ok(accepted("Rack instalado!", result))
}

// [[API]]
// desp: Take a rack out of its room. Its machines stay in it, unpowered.
// Method: POST
// URL: /api/rack/unplace
// Request Body: `UnplaceRackRequest`
// Response Body: `RackResponse`
#[post("/rack/unplace")]
pub async fn unplace_rack(
    pool: web::Data<Arc<DbPool>>,
    mut session: Session,
    form: web::Json<UnplaceRackRequest>,
) -> Result<impl Responder, APIError> {
    let location = "unplace_rack";
    let user_id = session_user(&session, form.username.as_deref())?;
    let mut conn = pool
        .get()
        .await
        .map_err(|e| log_server_error(e, location, ERROR_DB_CONNECTION))?;

    let now = Utc::now();
    let target = form.rack_id;
    let result = conn
        .transaction::<_, APIError, _>(|conn| {
            Box::pin(async move {
                let user = ledger::lock_user(user_id, conn).await?;
                let mut rack = ledger::fetch_racks(user.id, conn)
                    .await?
                    .into_iter()
                    .find(|rack| rack.id == target)
                    .ok_or(Rejection::ItemNotFound)?;
                ledger::place_rack(user.id, target, None, conn).await?;
                rack.room_idx = None;
                rack.position = None;

                let report = power::fetch_power_report(&user, now, conn).await?;
                Ok(RackResponse {
                    rack: RackView::from(&rack),
                    total_power: report.total(),
                })
            })
        })
        .await
        .inspect_err(kill_session(&mut session))
        .map_err(|e| e.set_location(location).tap(APIError::log))?;

    Ok(accepted("Rack removido", result))
}

#[derive(Debug, Deserialize)]
pub struct EquipRequest {
    username: Option<String>,
    machine_id: MachineId,
    rack_id: RackId,
    position: i32,
}

#[derive(Debug, Deserialize)]
pub struct UnequipRequest {
    username: Option<String>,
    machine_id: MachineId,
}

#[derive(Debug, Serialize)]
struct EquipResponse {
    total_power: i64,
}

// [[API]]
// desp: Put an owned miner into a slot of an owned rack.
// Method: POST
// URL: /api/miner/equip
// Request Body: `EquipRequest`
// Response Body: `EquipResponse`
#[post("/miner/equip")]
pub async fn equip_miner(
    pool: web::Data<Arc<DbPool>>,
    mut session: Session,
    form: web::Json<EquipRequest>,
) -> Result<impl Responder, APIError> {
    let location = "equip_miner";
    let user_id = session_user(&session, form.username.as_deref())?;
    let mut conn = pool
        .get()
        .await
        .map_err(|e| log_server_error(e, location, ERROR_DB_CONNECTION))?;

    let now = Utc::now();
    let (machine_id, rack_id, position) = (form.machine_id, form.rack_id, form.position);
    let result = conn
        .transaction::<_, APIError, _>(|conn| {
            Box::pin(async move {
                let user = ledger::lock_user(user_id, conn).await?;
                let machines = ledger::fetch_machines(user.id, conn).await?;
                if !machines.iter().any(|machine| machine.id == machine_id) {
                    return Err(Rejection::ItemNotFound.into());
                }
                let rack = ledger::fetch_racks(user.id, conn)
                    .await?
                    .into_iter()
                    .find(|rack| rack.id == rack_id)
                    .ok_or(Rejection::ItemNotFound)?;
                placement::check_equip(&rack, machine_id, position, &machines)?;
                ledger::seat_machine(user.id, machine_id, Some((rack_id, position)), conn).await?;

                let report = power::fetch_power_report(&user, now, conn).await?;
                Ok(EquipResponse {
                    total_power: report.total(),
                })
            })
        })
        .await
        .inspect_err(kill_session(&mut session))
        .map_err(|e| e.set_location(location).tap(APIError::log))?;

    debug!("User {} equipped machine {} in rack {}", user_id, machine_id, rack_id);
    Ok(accepted("Minerador equipado!", result))
}

// [[API]]
// desp: Move a miner back to the inventory.
// Method: POST
// URL: /api/miner/unequip
// Request Body: `UnequipRequest`
// Response Body: `EquipResponse`
#[post("/miner/unequip")]
pub async fn unequip_miner(
    pool: web::Data<Arc<DbPool>>,
    mut session: Session,
    form: web::Json<UnequipRequest>,
) -> Result<impl Responder, APIError> {
    let location = "unequip_miner";
    let user_id = session_user(&session, form.username.as_deref())?;
    let mut conn = pool
        .get()
        .await
        .map_err(|e| log_server_error(e, location, ERROR_DB_CONNECTION))?;

    let now = Utc::now();
    let machine_id = form.machine_id;
    let result = conn
        .transaction::<_, APIError, _>(|conn| {
            Box::pin(async move {
                let user = ledger::lock_user(user_id, conn).await?;
                ledger::seat_machine(user.id, machine_id, None, conn).await?;
                let report = power::fetch_power_report(&user, now, conn).await?;
                Ok(EquipResponse {
                    total_power: report.total(),
                })
            })
        })
        .await
        .inspect_err(kill_session(&mut session))
        .map_err(|e| e.set_location(location).tap(APIError::log))?;

    Ok(accepted("Minerador removido", result))
}
