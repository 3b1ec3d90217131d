//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p cat_client -- [--address localhost] [--port 2000] [--verb info]
//!
//! The client connects to a running pad server, opens the demo scene,
//! streams one extra label into it, closes it and exits.

use std::env;

use anyhow::Context;
use cat_client::{demo, PadClient};
use cat_shared::{
    config::{CatConfig, Verbosity},
    gp::Gp,
};
use tracing::info;

fn parse_args() -> anyhow::Result<CatConfig> {
    let mut cfg = CatConfig::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--address" if i + 1 < args.len() => {
                cfg.address = args[i + 1].clone();
                i += 2;
            }
            "--port" if i + 1 < args.len() => {
                cfg.port = args[i + 1].parse().context("parse --port")?;
                i += 2;
            }
            "--verb" if i + 1 < args.len() => {
                cfg.verb = args[i + 1]
                    .parse::<Verbosity>()
                    .map_err(anyhow::Error::msg)?;
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = parse_args()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cfg.verb.as_filter().into()),
        )
        .init();

    info!(endpoint = %cfg.endpoint(), verb = %cfg.verb, "Starting client");

    let mut client = PadClient::connect(&cfg).await.context("connect")?;
    info!(server = %client.server_peer()?, "Connected to server");

    let scene = demo::demo_scene();
    let handle = client.begin(&scene).await.context("begin demo scene")?;

    let label = demo::status_label(scene.len() + 1);
    let count = client.add(handle, &Gp::Label(label)).await.context("add label")?;
    info!(%handle, primitives = count, "Label added");

    client.close(handle).await.context("close demo scene")?;
    client.exit().await?;

    Ok(())
}
