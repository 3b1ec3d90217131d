//! `cat_tests`
//!
//! Shared fixtures for the socket-level integration tests in `tests/`.

use std::time::Duration;

use cat_server::server::{bind_ephemeral_with, Server};
use cat_shared::config::CatConfig;
use tokio::task::JoinHandle;

/// Installs a test-friendly subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Binds a server on an ephemeral port and ticks it on a background task
/// until `done` holds (or ten seconds pass). The task hands the server back
/// so tests can inspect its final state.
pub async fn spawn_server(
    cfg: CatConfig,
    done: fn(&Server) -> bool,
) -> anyhow::Result<(CatConfig, JoinHandle<anyhow::Result<Server>>)> {
    let (mut server, cfg) = bind_ephemeral_with(cfg).await?;
    tracing::debug!(port = cfg.port, "Test server bound");
    let handle = tokio::spawn(async move {
        server.run_until(done, Duration::from_secs(10)).await?;
        Ok(server)
    });
    Ok((cfg, handle))
}

/// Default test config: fast ticks, default limits.
pub fn test_config() -> CatConfig {
    CatConfig {
        tick_hz: 500,
        ..Default::default()
    }
}
