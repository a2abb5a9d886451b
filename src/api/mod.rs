pub mod board;
pub mod equipment;
pub mod game;
pub mod mining;
pub mod monitor;
pub mod register;
pub mod store;
