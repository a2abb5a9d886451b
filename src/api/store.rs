use std::sync::Arc;

use actix_session::Session;
use actix_web::{get, post, web, HttpResponse, Responder};
use diesel_async::AsyncConnection;
use log::info;
use serde::{Deserialize, Serialize};

use crate::models::{MachineView, RackView};
use crate::util::api_util::*;
use crate::util::cache::Cache;
use crate::util::catalog::{self, ItemKind};
use crate::util::{economy, ledger};
use crate::{DbPool, Ext};

#[get("/catalog")]
pub async fn get_catalog() -> impl Responder {
    HttpResponse::Ok().json(catalog::view())
}

#[derive(Debug, Deserialize)]
pub struct BuyRequest {
    username: Option<String>,
    item_id: String,
    #[serde(rename = "type")]
    kind: String,
}

impl BuyRequest {
    fn item_kind(&self) -> Result<ItemKind, Rejection> {
        ItemKind::parse(&self.kind).ok_or(Rejection::ItemNotFound)
    }
}

impl APIRequest for BuyRequest {
    fn ok(&self) -> bool {
        !self.item_id.is_empty() && self.item_id.len() <= 64
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Purchased {
    Miner(MachineView),
    Rack(RackView),
    Upgrade { id: String, batteries: i32 },
}

#[derive(Debug, Serialize)]
struct BuyResponse {
    balance: f64,
    batteries: i32,
    item: Purchased,
}

// [[API]]
// desp: Buy one catalog item. Miners and racks land unplaced in the
//       inventory, upgrades are applied at once.
// Method: POST
// URL: /api/buy
// Request Body: `BuyRequest`
// Response Body: `BuyResponse`
#[post("/buy")]
pub async fn buy(
    pool: web::Data<Arc<DbPool>>,
    cache: web::Data<Arc<Cache>>,
    mut session: Session,
    form: web::Json<BuyRequest>,
) -> Result<impl Responder, APIError> {
    let location = "buy";
    form.sanity()?;
    let user_id = session_user(&session, form.username.as_deref())?;
    let kind = form.item_kind()?;
    let mut conn = pool
        .get()
        .await
        .map_err(|e| log_server_error(e, location, ERROR_DB_CONNECTION))?;

    let item_id = form.item_id.clone();
    let result = conn
        .transaction::<_, APIError, _>(|conn| {
            Box::pin(async move {
                let user = ledger::lock_user(user_id, conn).await?;
                let cost = catalog::item_cost(kind, &item_id).ok_or(Rejection::ItemNotFound)?;
                let new_balance = economy::debit(user.balance, cost)?;
                ledger::set_balance(user.id, new_balance, conn).await?;

                let (item, batteries) = match kind {
                    ItemKind::Miner => {
                        let machine = ledger::insert_machine(user.id, &item_id, None, conn).await?;
                        (Purchased::Miner(MachineView::from(&machine)), user.batteries)
                    }
                    ItemKind::Rack => {
                        let rack = ledger::insert_rack(user.id, &item_id, None, conn).await?;
                        (Purchased::Rack(RackView::from(&rack)), user.batteries)
                    }
                    ItemKind::Upgrade => {
                        let spec = catalog::upgrade(&item_id).ok_or(Rejection::ItemNotFound)?;
                        let batteries = ledger::add_batteries(user.id, spec.batteries, conn).await?;
                        (
                            Purchased::Upgrade {
                                id: item_id.clone(),
                                batteries: spec.batteries,
                            },
                            batteries,
                        )
                    }
                };
                Ok(BuyResponse {
                    balance: new_balance,
                    batteries,
                    item,
                })
            })
        })
        .await
        .inspect_err(kill_session(&mut session))
        .map_err(|e| e.set_location(location).tap(APIError::log))?;

    info!("User {} bought {:?} {}", user_id, kind, form.item_id);
    cache.invalidate_leaderboard().await;
    Ok(accepted("Compra realizada!", result))
}

#[derive(Debug, Serialize)]
struct RoomResponse {
    cost: f64,
    balance: f64,
    rooms_unlocked: i32,
    next_room_cost: Option<f64>,
}

// [[API]]
// desp: Unlock the next room.
// Method: POST
// URL: /api/room/buy
// Request Body: `Claimed`
// Response Body: `RoomResponse`
#[post("/room/buy")]
pub async fn buy_room(
    pool: web::Data<Arc<DbPool>>,
    cache: web::Data<Arc<Cache>>,
    mut session: Session,
    form: web::Json<Claimed>,
) -> Result<impl Responder, APIError> {
    let location = "buy_room";
    let user_id = session_user(&session, form.username.as_deref())?;
    let mut conn = pool
        .get()
        .await
        .map_err(|e| log_server_error(e, location, ERROR_DB_CONNECTION))?;

    let result = conn
        .transaction::<_, APIError, _>(|conn| {
            Box::pin(async move {
                let user = ledger::lock_user(user_id, conn).await?;
                let (new_balance, cost) = economy::buy_room(user.rooms_unlocked, user.balance)?;
                let rooms_unlocked = user.rooms_unlocked + 1;
                ledger::set_rooms(user.id, new_balance, rooms_unlocked, conn).await?;
                Ok(RoomResponse {
                    cost,
                    balance: new_balance,
                    rooms_unlocked,
                    next_room_cost: catalog::room_cost(rooms_unlocked),
                })
            })
        })
        .await
        .inspect_err(kill_session(&mut session))
        .map_err(|e| e.set_location(location).tap(APIError::log))?;

    info!("User {} unlocked room {}", user_id, result.rooms_unlocked);
    cache.invalidate_leaderboard().await;
    Ok(accepted("Sala desbloqueada!", result))
}
