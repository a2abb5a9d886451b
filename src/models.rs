use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::util::catalog;

pub type UserId = i32;
pub type RackId = i32;
pub type MachineId = i32;

#[derive(Queryable, Selectable, Clone, Debug)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password: String,
    pub salt: String,
    pub balance: f64,
    pub batteries: i32,
    pub electricity_expires_at: DateTime<Utc>,
    pub rooms_unlocked: i32,
    pub last_free_recharge: Option<DateTime<Utc>>,
    pub last_mine_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub salt: &'a str,
    pub balance: f64,
    pub batteries: i32,
    pub electricity_expires_at: DateTime<Utc>,
    pub rooms_unlocked: i32,
}

#[derive(Queryable, Selectable, Clone, Debug, PartialEq)]
#[diesel(table_name = crate::schema::rack)]
pub struct Rack {
    pub id: RackId,
    pub owner: UserId,
    pub type_id: String,
    pub room_idx: Option<i32>,
    pub position: Option<i32>,
}

impl Rack {
    pub fn is_installed(&self) -> bool {
        self.room_idx.is_some()
    }

    pub fn slots(&self) -> i32 {
        catalog::rack(&self.type_id).map_or(0, |spec| spec.slots)
    }
}

#[derive(Queryable, Selectable, Clone, Debug, PartialEq)]
#[diesel(table_name = crate::schema::machine)]
pub struct Machine {
    pub id: MachineId,
    pub owner: UserId,
    pub type_id: String,
    pub rack_id: Option<RackId>,
    pub position: Option<i32>,
}

impl Machine {
    pub fn power(&self) -> i64 {
        catalog::miner(&self.type_id).map_or(0, |spec| spec.power)
    }
}

#[derive(Queryable, Selectable, Clone, Debug)]
#[diesel(table_name = crate::schema::game_power)]
pub struct GamePower {
    pub id: i32,
    pub owner: UserId,
    pub amount: i64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Clone, Debug)]
#[diesel(table_name = crate::schema::game_level)]
pub struct GameLevel {
    pub id: i32,
    pub owner: UserId,
    pub game_id: String,
    pub level: i32,
    pub last_played: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Insertable, Clone, Debug)]
#[diesel(table_name = crate::schema::game_session)]
pub struct GameSession {
    pub owner: UserId,
    pub game_id: String,
    pub start_time: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct RackView {
    pub id: RackId,
    pub type_id: String,
    pub room_idx: Option<i32>,
    pub position: Option<i32>,
    pub slots: i32,
}

impl From<&Rack> for RackView {
    fn from(rack: &Rack) -> Self {
        Self {
            id: rack.id,
            type_id: rack.type_id.clone(),
            room_idx: rack.room_idx,
            position: rack.position,
            slots: rack.slots(),
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct MachineView {
    pub id: MachineId,
    pub type_id: String,
    pub rack_id: Option<RackId>,
    pub position: Option<i32>,
    pub power: i64,
}

impl From<&Machine> for MachineView {
    fn from(machine: &Machine) -> Self {
        Self {
            id: machine.id,
            type_id: machine.type_id.clone(),
            rack_id: machine.rack_id,
            position: machine.position,
            power: machine.power(),
        }
    }
}

#[derive(Serialize, Clone, Debug, QueryableByName)]
pub struct LeaderboardEntry {
    #[diesel(sql_type = diesel::sql_types::Varchar)]
    pub username: String,
    #[diesel(sql_type = diesel::sql_types::Float8)]
    pub balance: f64,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub machines: i64,
}
