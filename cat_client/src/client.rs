//! Client implementation.
//!
//! The client holds one command connection to the pad server and issues
//! requests synchronously: every command except EXIT waits for its reply.
//! Non-`Ok` replies surface as errors carrying the server's status.

use std::fmt;
use std::net::SocketAddr;

use anyhow::Context;
use cat_shared::{
    config::CatConfig,
    gp::Gp,
    net::CommandConn,
    scene::{Scene, SceneHandle},
    wire::{Command, Reply, Status},
};
use tracing::{debug, info};

/// A reply whose status was not `Ok`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedCommand {
    pub status: Status,
    pub message: String,
}

impl fmt::Display for RejectedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "server rejected command ({:?}): {}", self.status, self.message)
    }
}

impl std::error::Error for RejectedCommand {}

/// Remote handle on a pad server.
pub struct PadClient {
    conn: CommandConn,
    /// Scenes this client opened and has not closed.
    open_scenes: Vec<SceneHandle>,
}

impl PadClient {
    /// Connects to `cfg.address:cfg.port`.
    pub async fn connect(cfg: &CatConfig) -> anyhow::Result<Self> {
        info!(endpoint = %cfg.endpoint(), "Connecting to pad server");
        let conn = CommandConn::connect(&cfg.address, cfg.port).await?;
        Ok(Self {
            conn,
            open_scenes: Vec::new(),
        })
    }

    pub fn open_scenes(&self) -> &[SceneHandle] {
        &self.open_scenes
    }

    /// Sends a command and waits for its reply, whatever the status.
    pub async fn request(&mut self, cmd: &Command) -> anyhow::Result<Reply> {
        self.conn.send(cmd).await?;
        let reply = self.conn.recv_reply().await?;
        debug!(opcode = cmd.header.word0, status = ?reply.status, value = reply.value, "Reply");
        Ok(reply)
    }

    async fn checked(&mut self, cmd: &Command) -> anyhow::Result<u64> {
        let reply = self.request(cmd).await?;
        if !reply.is_ok() {
            return Err(RejectedCommand {
                status: reply.status,
                message: reply.message,
            }
            .into());
        }
        Ok(reply.value)
    }

    /// BEGIN: opens a scene on the server.
    pub async fn begin(&mut self, scene: &Scene) -> anyhow::Result<SceneHandle> {
        let raw = self.checked(&Command::begin(scene)).await?;
        let handle = SceneHandle::new(raw).context("server returned the zero handle")?;
        info!(%handle, title = %scene.title, primitives = scene.len(), "Scene opened");
        self.open_scenes.push(handle);
        Ok(handle)
    }

    /// ADD: appends one primitive. Returns the scene's primitive count.
    pub async fn add(&mut self, handle: SceneHandle, gp: &Gp) -> anyhow::Result<usize> {
        let count = self.checked(&Command::add(handle, gp)).await?;
        Ok(count as usize)
    }

    /// CLOSE: removes a scene. Returns how many primitives it held.
    pub async fn close(&mut self, handle: SceneHandle) -> anyhow::Result<usize> {
        let count = self.checked(&Command::close(handle)).await?;
        self.open_scenes.retain(|h| *h != handle);
        info!(%handle, primitives = count, "Scene closed");
        Ok(count as usize)
    }

    /// EXIT: ends the session. The server releases any scenes still open.
    pub async fn exit(mut self) -> anyhow::Result<()> {
        self.conn.send(&Command::exit()).await?;
        self.conn.shutdown().await?;
        info!(left_open = self.open_scenes.len(), "Session ended");
        Ok(())
    }

    pub fn server_peer(&self) -> anyhow::Result<SocketAddr> {
        self.conn.peer_addr()
    }
}

/// Extracts the rejected status from an error returned by [`PadClient`].
pub fn rejected_status(err: &anyhow::Error) -> Option<Status> {
    err.downcast_ref::<RejectedCommand>().map(|r| r.status)
}
