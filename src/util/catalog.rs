//! Static reference data: everything a player can buy or play.
//!
//! Nothing here is mutated at runtime. Owned instances in the database only
//! store the `id` of their catalog entry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MinerSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub power: i64,
    pub size: i32,
    pub watts: i64,
    pub cost: f64,
    pub style: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RackSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub slots: i32,
    pub cost: f64,
    pub style: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UpgradeSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub batteries: i32,
    pub cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GameSpec {
    #[serde(skip)]
    pub id: &'static str,
    pub name: &'static str,
    /// Power granted on a level 1 win.
    pub reward: i64,
    /// Nominal round length in seconds.
    pub time: i64,
    /// Fastest plausible winning round in seconds.
    pub min_time: i64,
    pub base_target: i64,
    pub target_step: i64,
    pub diff_mult: f64,
}

pub static MINERS: [MinerSpec; 4] = [
    MinerSpec {
        id: "miner_starter",
        name: "Starter Miner",
        power: 100,
        size: 1,
        watts: 100,
        cost: 100.00,
        style: "STARTER",
    },
    MinerSpec {
        id: "miner_gpu",
        name: "GPU Miner",
        power: 500,
        size: 2,
        watts: 300,
        cost: 500.00,
        style: "GT730",
    },
    MinerSpec {
        id: "miner_asic",
        name: "ASIC Miner",
        power: 1000,
        size: 3,
        watts: 1000,
        cost: 1000.00,
        style: "ASIC",
    },
    MinerSpec {
        id: "miner_quantum",
        name: "Quantum Miner",
        power: 5000,
        size: 4,
        watts: 5000,
        cost: 5000.00,
        style: "QUANTUM",
    },
];

pub static RACKS: [RackSpec; 2] = [
    RackSpec {
        id: "r_small",
        name: "Small Rack",
        slots: 4,
        cost: 50.00,
        style: "wood",
    },
    RackSpec {
        id: "r_large",
        name: "Large Rack",
        slots: 8,
        cost: 100.00,
        style: "metal",
    },
];

pub static UPGRADES: [UpgradeSpec; 2] = [
    UpgradeSpec {
        id: "battery_single",
        name: "Battery",
        description: "+1 bateria",
        batteries: 1,
        cost: 40.00,
    },
    UpgradeSpec {
        id: "battery_pack",
        name: "Battery Pack",
        description: "+5 baterias",
        batteries: 5,
        cost: 180.00,
    },
];

pub static GAMES: [GameSpec; 3] = [
    GameSpec {
        id: "coin-clicker",
        name: "Coin Clicker",
        reward: 100,
        time: 60,
        min_time: 20,
        base_target: 50,
        target_step: 30,
        diff_mult: 1.2,
    },
    GameSpec {
        id: "flappy-rocket",
        name: "Flappy Rocket",
        reward: 150,
        time: 60,
        min_time: 10,
        base_target: 10,
        target_step: 2,
        diff_mult: 1.3,
    },
    GameSpec {
        id: "crypto-2048",
        name: "Crypto 2048",
        reward: 200,
        time: 120,
        min_time: 30,
        base_target: 256,
        target_step: 128,
        diff_mult: 1.5,
    },
];

pub const MAX_ROOMS: i32 = 5;

// Price of the next room, indexed by how many rooms are already unlocked.
pub const ROOM_COSTS: [f64; MAX_ROOMS as usize] = [0.0, 1000.0, 2500.0, 5000.0, 10000.0];

pub const STARTER_RACK: &str = "r_small";
pub const STARTER_MINER: &str = "miner_starter";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Miner,
    Rack,
    Upgrade,
}

impl ItemKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "miner" => Some(ItemKind::Miner),
            "rack" => Some(ItemKind::Rack),
            "upgrade" => Some(ItemKind::Upgrade),
            _ => None,
        }
    }
}

pub fn miner(id: &str) -> Option<&'static MinerSpec> {
    MINERS.iter().find(|spec| spec.id == id)
}

pub fn rack(id: &str) -> Option<&'static RackSpec> {
    RACKS.iter().find(|spec| spec.id == id)
}

pub fn upgrade(id: &str) -> Option<&'static UpgradeSpec> {
    UPGRADES.iter().find(|spec| spec.id == id)
}

pub fn game(id: &str) -> Option<&'static GameSpec> {
    GAMES.iter().find(|spec| spec.id == id)
}

pub fn item_cost(kind: ItemKind, id: &str) -> Option<f64> {
    match kind {
        ItemKind::Miner => miner(id).map(|spec| spec.cost),
        ItemKind::Rack => rack(id).map(|spec| spec.cost),
        ItemKind::Upgrade => upgrade(id).map(|spec| spec.cost),
    }
}

/// `None` once every room is unlocked.
pub fn room_cost(rooms_unlocked: i32) -> Option<f64> {
    usize::try_from(rooms_unlocked)
        .ok()
        .and_then(|idx| ROOM_COSTS.get(idx))
        .copied()
}

#[derive(Debug, Serialize)]
pub struct CatalogItems {
    pub miners: &'static [MinerSpec],
    pub racks: &'static [RackSpec],
    pub upgrades: &'static [UpgradeSpec],
    pub rooms: &'static [f64],
}

#[derive(Debug, Serialize)]
pub struct CatalogView {
    pub catalog: CatalogItems,
    pub games: BTreeMap<&'static str, &'static GameSpec>,
}

pub fn view() -> CatalogView {
    CatalogView {
        catalog: CatalogItems {
            miners: &MINERS,
            racks: &RACKS,
            upgrades: &UPGRADES,
            rooms: &ROOM_COSTS,
        },
        games: GAMES.iter().map(|spec| (spec.id, spec)).collect(),
    }
}
