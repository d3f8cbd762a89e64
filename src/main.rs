use std::sync::Arc;

use therasuite_lib::config::{self, ServerConfig};
use therasuite_lib::state::AppState;
use therasuite_lib::{api, db, init_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let settings = ServerConfig::from_env();
    std::fs::create_dir_all(&settings.data_dir)?;

    // Migrations run here, before the listener binds.
    let db_path = settings.database_path();
    db::open_database(&db_path)?;
    tracing::info!(path = %db_path.display(), "Database ready");

    let state = Arc::new(AppState::new(db_path, settings.session_ttl));
    let server = api::start_server(state.clone(), settings.bind).await?;
    tracing::info!(addr = %server.session.server_addr, "Listening");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    server.stop().await;

    match state.flush_and_prune_audit() {
        Ok(flushed) => tracing::info!(flushed, "Audit log flushed"),
        Err(e) => tracing::warn!("Audit flush on shutdown failed: {e}"),
    }
    Ok(())
}

