//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p cat_server -- [--address localhost] [--port 2000] [--verb info] [--tick-hz 60]
//!
//! The server accepts client connections, dispatches their scene commands
//! and redraws the pad whenever a scene changes.
//!
//! Console commands:
//!   status         - Show server status
//!   scenes         - List live scenes
//!   dump <handle>  - Print a scene as JSON
//!   quit           - Shutdown server

use std::env;
use std::io::{BufRead, Write};

use anyhow::Context;
use cat_server::{server::Server, trace_render::TraceRenderer};
use cat_shared::config::{CatConfig, Verbosity};
use tokio::sync::mpsc;
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
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().context("parse --tick-hz")?;
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

    info!(endpoint = %cfg.endpoint(), tick_hz = cfg.tick_hz, verb = %cfg.verb, "Starting server");

    let mut server = Server::bind(cfg.clone()).await.context("create server")?;
    server.set_renderer(Box::new(TraceRenderer::new()));
    let local = server.local_addr()?;
    info!(%local, "Server listening");

    // Set up console input channel.
    let (console_tx, console_rx) = mpsc::channel::<String>(32);
    server.set_console_input(console_rx);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Server ready. Type 'status' for info, 'scenes' to list scenes, 'quit' to exit.");
    println!();

    // Main server loop.
    let tick_interval = std::time::Duration::from_secs_f32(1.0 / cfg.tick_hz.max(1) as f32);
    let mut next_tick = tokio::time::Instant::now();

    while !server.is_shutdown() {
        server.tick().await?;

        // Wait for next tick.
        next_tick += tick_interval;
        tokio::time::sleep_until(next_tick).await;
    }

    Ok(())
}
