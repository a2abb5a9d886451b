pub mod api_util;
pub mod cache;
pub mod catalog;
pub mod cipher_util;
pub mod economy;
pub mod energy;
pub mod ledger;
pub mod minigame;
pub mod placement;
pub mod power;
