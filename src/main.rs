use std::process::ExitCode;

use restaurant_pos::commands::auth;
use restaurant_pos::config::Settings;
use restaurant_pos::db::Database;
use restaurant_pos::security::{PasswordHasher, TokenService};
use restaurant_pos::{init_tracing, router, AppState};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "server stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load()?;

    let db = if settings.database.path == ":memory:" {
        Database::open_in_memory()?
    } else {
        Database::open(&settings.database.path)?
    };
    tracing::info!(path = %settings.database.path, "database ready");

    let hasher = PasswordHasher::new(&settings.password)?;
    auth::bootstrap_admin(&db, &hasher, &settings.bootstrap)?;

    let state = AppState::new(db, TokenService::new(&settings.jwt), hasher);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&settings.server.bind_addr).await?;
    tracing::info!(addr = %settings.server.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
