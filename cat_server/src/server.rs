//! Server implementation.
//!
//! A cooperative, single-threaded polling loop. Each [`Server::tick`]:
//! - accepts pending connections
//! - drains whatever bytes each open client has ready, without blocking,
//!   pausing once one largest command is buffered
//! - runs at most `max_commands_per_tick` complete commands per client,
//!   queueing replies and flushing them with non-blocking writes
//! - removes clients marked `Closing` (two-phase close, so the client list
//!   is never mutated mid-scan)
//! - redraws the pad if anything changed
//!
//! Partial headers and payloads stay buffered in the client's decoder
//! until the rest arrives on a later tick. A client whose reply queue
//! reaches `max_outbound_len` is not served until it reads; if it stays
//! backed up for `stall_timeout_ms` it is disconnected.

use bytes::{Buf, BytesMut};
use cat_shared::{
    config::CatConfig,
    net::{ClientId, CommandListener},
    render::{NullRenderer, RenderBackend},
    scene::SceneHandle,
    wire::{CommandDecoder, Reply, Status, WireError},
};
use std::{io, net::SocketAddr, time::Duration};
use tokio::{net::TcpStream, sync::mpsc, time::Instant};
use tracing::{debug, info, warn};

use crate::{
    dispatch::{CommandLoop, Outcome},
    pad::Pad,
};

/// Bytes read from one client per tick at most.
const READ_BUDGET: usize = 256 * 1024;

const READ_CHUNK: usize = 16 * 1024;

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Open,
    /// Scheduled for teardown at the next housekeeping pass.
    Closing,
    Closed,
}

/// Connected client state.
struct ClientConn {
    id: ClientId,
    stream: TcpStream,
    peer: SocketAddr,
    status: ClientStatus,
    decoder: CommandDecoder,
    /// Encoded replies not yet accepted by the socket.
    outbound: BytesMut,
    /// When the reply queue last reached its limit.
    backlog_since: Option<Instant>,
    /// Peer sent FIN; finish buffered commands, then close.
    peer_eof: bool,
    commands: u64,
    bytes_in: u64,
    close_reason: &'static str,
}

impl ClientConn {
    fn mark_closing(&mut self, reason: &'static str) {
        if self.status == ClientStatus::Open {
            self.status = ClientStatus::Closing;
            self.close_reason = reason;
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub accepted: usize,
    pub commands: usize,
    pub closed: usize,
    pub redrawn: bool,
}

/// Scene-graph server.
pub struct Server {
    pub cfg: CatConfig,
    listener: CommandListener,
    clients: Vec<ClientConn>,
    commands: CommandLoop,
    renderer: Box<dyn RenderBackend>,

    tick: u64,
    /// Clients torn down since start.
    clients_served: u64,
    shutdown: bool,

    /// Channel for console commands from stdin.
    console_rx: Option<mpsc::Receiver<String>>,
}

impl Server {
    /// Binds the listening socket on `cfg.address:cfg.port`.
    pub async fn bind(cfg: CatConfig) -> anyhow::Result<Self> {
        let listener = CommandListener::bind(&cfg.address, cfg.port).await?;
        let commands = CommandLoop::new(cfg.max_scenes_per_client);
        Ok(Self {
            cfg,
            listener,
            clients: Vec::new(),
            commands,
            renderer: Box::new(NullRenderer),
            tick: 0,
            clients_served: 0,
            shutdown: false,
            console_rx: None,
        })
    }

    pub fn set_renderer(&mut self, renderer: Box<dyn RenderBackend>) {
        self.renderer = renderer;
    }

    /// Sets the console input receiver.
    pub fn set_console_input(&mut self, rx: mpsc::Receiver<String>) {
        self.console_rx = Some(rx);
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn pad(&self) -> &Pad {
        self.commands.pad()
    }

    pub fn command_loop(&self) -> &CommandLoop {
        &self.commands
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Clients currently connected, closing ones included.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn clients_served(&self) -> u64 {
        self.clients_served
    }

    /// Undecoded bytes held across all clients.
    pub fn inbound_buffered(&self) -> usize {
        self.clients.iter().map(|c| c.decoder.buffered()).sum()
    }

    /// Reply bytes waiting to be written across all clients.
    pub fn outbound_queued(&self) -> usize {
        self.clients.iter().map(|c| c.outbound.len()).sum()
    }

    pub fn client_status(&self, id: ClientId) -> ClientStatus {
        self.clients
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.status)
            .unwrap_or(ClientStatus::Closed)
    }

    /// Set by the `quit` console command.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Runs one cooperative pass over listener, clients and pad.
    pub async fn tick(&mut self) -> anyhow::Result<TickReport> {
        let mut report = TickReport::default();

        self.process_console_commands();

        let timeout = Duration::from_millis(self.cfg.accept_timeout_ms);
        for _ in 0..self.cfg.max_accepts_per_tick {
            match self.try_accept(timeout).await {
                Some(_) => report.accepted += 1,
                None => break,
            }
        }

        let budget = self.cfg.max_commands_per_tick;
        let inbound_limit = self.cfg.max_inbound_buffered();
        let outbound_limit = self.cfg.max_outbound_len;
        let stall_timeout = Duration::from_millis(self.cfg.stall_timeout_ms);
        let now = Instant::now();
        for client in self.clients.iter_mut() {
            if client.status == ClientStatus::Open {
                Self::fill(client, inbound_limit);
                Self::flush(client);
                report.commands += Self::serve(client, &mut self.commands, budget, outbound_limit);
            }
            Self::flush(client);
            Self::check_backlog(client, outbound_limit, stall_timeout, now);
        }

        report.closed = self.housekeeping();

        if self.commands.pad_mut().take_dirty() {
            self.commands.pad_mut().render(self.renderer.as_mut());
            report.redrawn = true;
        }

        self.tick += 1;
        Ok(report)
    }

    /// Ticks until `done` holds or `deadline` passes.
    pub async fn run_until<F>(&mut self, mut done: F, deadline: Duration) -> anyhow::Result<()>
    where
        F: FnMut(&Server) -> bool,
    {
        let period = Duration::from_secs_f32(1.0 / self.cfg.tick_hz.max(1) as f32);
        let end = Instant::now() + deadline;
        loop {
            self.tick().await?;
            if done(self) {
                return Ok(());
            }
            if Instant::now() >= end {
                anyhow::bail!("server condition not met within {:?}", deadline);
            }
            tokio::time::sleep(period).await;
        }
    }

    /// Runs the server for a number of ticks at `tick_hz`.
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = Duration::from_secs_f32(1.0 / self.cfg.tick_hz.max(1) as f32);
        let mut next = Instant::now();

        for _ in 0..ticks {
            next += dt;
            self.tick().await?;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    /// Accepts a client with timeout (non-blocking). Failed accepts are
    /// logged and skipped.
    pub async fn try_accept(&mut self, timeout: Duration) -> Option<ClientId> {
        let accepted = tokio::time::timeout(timeout, self.listener.accept())
            .await
            .ok()?;
        self.admit(accepted)
    }

    fn admit(&mut self, accepted: anyhow::Result<(TcpStream, SocketAddr)>) -> Option<ClientId> {
        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = ?e, "Accept failed");
                return None;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            warn!(%peer, error = %e, "Dropping connection: nodelay failed");
            return None;
        }
        let id = ClientId::new_unique();
        self.clients.push(ClientConn {
            id,
            stream,
            peer,
            status: ClientStatus::Open,
            decoder: CommandDecoder::new(self.cfg.max_payload_len),
            outbound: BytesMut::new(),
            backlog_since: None,
            peer_eof: false,
            commands: 0,
            bytes_in: 0,
            close_reason: "",
        });
        info!(client_id = ?id, %peer, "Client connected");
        Some(id)
    }

    /// Moves the bytes the socket has ready into the decoder, stopping
    /// once `limit` bytes are buffered.
    fn fill(client: &mut ClientConn, limit: usize) {
        let mut buf = [0u8; READ_CHUNK];
        let mut read = 0;
        while read < READ_BUDGET && !client.peer_eof && client.decoder.buffered() < limit {
            match client.stream.try_read(&mut buf) {
                Ok(0) => {
                    debug!(client_id = ?client.id, "Peer closed its side");
                    client.peer_eof = true;
                }
                Ok(n) => {
                    client.decoder.extend(&buf[..n]);
                    client.bytes_in += n as u64;
                    read += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(client_id = ?client.id, error = %e, "Read failed");
                    client.mark_closing("read error");
                    break;
                }
            }
        }
    }

    /// Writes queued replies until the socket would block.
    fn flush(client: &mut ClientConn) {
        while !client.outbound.is_empty() {
            match client.stream.try_write(&client.outbound) {
                Ok(n) => client.outbound.advance(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(client_id = ?client.id, error = %e, "Reply write failed");
                    client.outbound.clear();
                    client.mark_closing("write error");
                    break;
                }
            }
        }
    }

    /// Disconnects a client whose reply queue has stayed full too long.
    fn check_backlog(client: &mut ClientConn, limit: usize, timeout: Duration, now: Instant) {
        if client.outbound.len() < limit {
            client.backlog_since = None;
            return;
        }
        let since = *client.backlog_since.get_or_insert(now);
        if now.duration_since(since) >= timeout && client.status == ClientStatus::Open {
            warn!(client_id = ?client.id, queued = client.outbound.len(), "Client stopped reading replies");
            client.mark_closing("reply backlog");
        }
    }

    /// Runs up to `budget` buffered commands, queueing their replies.
    /// Returns how many ran.
    fn serve(
        client: &mut ClientConn,
        commands: &mut CommandLoop,
        budget: usize,
        outbound_limit: usize,
    ) -> usize {
        let mut handled = 0;
        let mut drained = false;
        while client.status == ClientStatus::Open {
            if handled == budget || client.outbound.len() >= outbound_limit {
                break;
            }
            let cmd = match client.decoder.next_command() {
                Ok(Some(cmd)) => cmd,
                Ok(None) => {
                    drained = true;
                    break;
                }
                Err(e @ WireError::PayloadTooLarge { .. }) => {
                    warn!(client_id = ?client.id, error = %e, "Protocol violation");
                    let reply = Reply::error(Status::PayloadTooLarge, e.to_string());
                    client.outbound.extend_from_slice(&reply.to_bytes());
                    client.mark_closing("payload too large");
                    break;
                }
                Err(e) => {
                    warn!(client_id = ?client.id, error = %e, "Undecodable command");
                    client.mark_closing("decode error");
                    break;
                }
            };

            handled += 1;
            client.commands += 1;
            match commands.execute(client.id, &cmd) {
                Outcome::Reply(reply) => client.outbound.extend_from_slice(&reply.to_bytes()),
                Outcome::Exit => client.mark_closing("exit"),
            }
        }

        if client.peer_eof && drained {
            if client.decoder.is_mid_frame() {
                debug!(client_id = ?client.id, buffered = client.decoder.buffered(), "Discarding truncated command");
            }
            client.mark_closing("peer closed");
        }
        handled
    }

    /// Tears down every `Closing` client and releases its scenes.
    fn housekeeping(&mut self) -> usize {
        let mut closed = 0;
        let mut i = 0;
        while i < self.clients.len() {
            if self.clients[i].status != ClientStatus::Closing {
                i += 1;
                continue;
            }
            let mut client = self.clients.swap_remove(i);
            let released = self.commands.drop_client(client.id);
            client.status = ClientStatus::Closed;
            info!(
                client_id = ?client.id,
                peer = %client.peer,
                reason = client.close_reason,
                commands = client.commands,
                bytes = client.bytes_in,
                scenes_released = released,
                "Client closed"
            );
            closed += 1;
            self.clients_served += 1;
        }
        closed
    }

    fn process_console_commands(&mut self) {
        // Collect lines first to avoid borrow conflict
        let lines: Vec<String> = if let Some(ref mut rx) = self.console_rx {
            let mut collected = Vec::new();
            while let Ok(line) = rx.try_recv() {
                collected.push(line);
            }
            collected
        } else {
            Vec::new()
        };

        for line in lines {
            for out in self.exec_console(&line) {
                println!("{}", out);
            }
        }
    }

    /// Executes a console command.
    pub fn exec_console(&mut self, line: &str) -> Vec<String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            return Vec::new();
        }

        match tokens[0] {
            "status" => {
                let mut out = Vec::new();
                out.push(format!("Tick: {}", self.tick));
                out.push(format!("Scenes: {}", self.pad().len()));
                out.push(format!("Frames drawn: {}", self.pad().frames_drawn()));
                out.push(format!(
                    "Clients: {} (served {})",
                    self.clients.len(),
                    self.clients_served
                ));
                for c in &self.clients {
                    out.push(format!(
                        "  {:?}: peer={} status={:?} commands={} queued={} scenes={}",
                        c.id,
                        c.peer,
                        c.status,
                        c.commands,
                        c.outbound.len(),
                        self.commands.scenes_of(c.id).len()
                    ));
                }
                out
            }
            "scenes" => self
                .pad()
                .iter()
                .map(|(h, e)| {
                    format!(
                        "{} '{}' owner={:?} primitives={} adds={} opened={}",
                        h,
                        e.scene.title,
                        e.owner,
                        e.scene.len(),
                        e.adds,
                        e.opened_at.format("%H:%M:%S")
                    )
                })
                .collect(),
            "dump" => {
                let Some(handle) = tokens
                    .get(1)
                    .and_then(|s| s.trim_start_matches('#').parse().ok())
                    .and_then(SceneHandle::new)
                else {
                    return vec!["Usage: dump <handle>".to_string()];
                };
                match self.pad().get(handle) {
                    Some(entry) => match serde_json::to_string_pretty(entry) {
                        Ok(json) => json.lines().map(str::to_string).collect(),
                        Err(e) => vec![format!("Failed to serialize scene: {}", e)],
                    },
                    None => vec![format!("No scene {}", handle)],
                }
            }
            "quit" | "exit" => {
                info!("Server shutting down");
                self.shutdown = true;
                vec!["Shutting down".to_string()]
            }
            other => vec![format!("Unknown command '{}'", other)],
        }
    }
}

/// Helper for tests: bind to an ephemeral loopback port.
pub async fn bind_ephemeral() -> anyhow::Result<(Server, CatConfig)> {
    bind_ephemeral_with(CatConfig {
        tick_hz: 200,
        ..Default::default()
    })
    .await
}

/// Like [`bind_ephemeral`], keeping every other field of `cfg`.
pub async fn bind_ephemeral_with(mut cfg: CatConfig) -> anyhow::Result<(Server, CatConfig)> {
    cfg.address = "127.0.0.1".to_string();
    cfg.port = 0;
    let server = Server::bind(cfg.clone()).await?;
    cfg.port = server.local_addr()?.port();
    Ok((server, cfg))
}
