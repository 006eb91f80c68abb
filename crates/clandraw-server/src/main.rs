// Clan draw server entry point.
//
// Startup sequence:
// 1. Initialize tracing
// 2. Load config (copying defaults/ into config/ on first run)
// 3. Build shared state and spawn the roster task
// 4. Serve HTTP until Ctrl+C

use std::sync::Arc;

use anyhow::Context;
use clandraw_core::config;
use clandraw_server::{router, AppState};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    info!("Clan draw server starting up");

    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: {} user(s), screenshots in {}, {} byte upload limit",
        config.users.len(),
        config.archive.dir,
        config.archive.max_bytes
    );

    let state = AppState::from_config(&config).context("failed to set up screenshot archive")?;
    info!("Screenshot archive at {}", state.archive.root().display());

    let app = router(Arc::new(state), &config.server.public_dir);

    let listener = TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Clan draw server shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Ctrl+C received, shutting down");
}

fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("clandraw_core=info,clandraw_server=info,clandraw=info,warn")
            }),
        )
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
