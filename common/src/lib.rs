// Scene broadcast engine: scene data caching, push delivery and cron scheduling

pub mod bootstrap;
pub mod broadcast;
pub mod cache;
pub mod clock;
pub mod config;
pub mod db;
pub mod delivery;
pub mod engine;
pub mod errors;
pub mod models;
pub mod push;
pub mod retry;
pub mod scene;
pub mod scheduler;
pub mod telemetry;

pub use engine::{Engine, EngineBuilder};
