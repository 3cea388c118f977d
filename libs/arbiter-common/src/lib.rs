pub mod config;
pub mod error;
pub mod fixtures;
pub mod redis;
pub mod scoreboard;
pub mod store;
pub mod types;
