pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod gate;
pub mod models;
pub mod routes;
pub mod security;
pub mod validation;


use tracing_subscriber::EnvFilter;

pub use routes::{router, AppState};

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
