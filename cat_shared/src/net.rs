//! Networking primitives.
//!
//! Goals:
//! - Provide the TCP command channel used by client and server.
//! - Keep framing explicit: see [`crate::wire`] for the byte layout.
//!
//! The server does not use [`CommandConn`] for reading; it drains its
//! sockets without blocking and feeds a [`CommandDecoder`](crate::wire::CommandDecoder).

use anyhow::Context;
use std::{
    net::SocketAddr,
    sync::atomic::{AtomicU32, Ordering},
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use tracing::debug;

use crate::wire::{Command, Header, Reply, HEADER_LEN, MAX_REPLY_MESSAGE};

static NEXT_CLIENT_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies a connected client; also the owner key for its scenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u32);

impl ClientId {
    pub fn new_unique() -> Self {
        ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Writes a command frame.
pub async fn write_command<W: AsyncWrite + Unpin>(
    w: &mut W,
    frame: &Command,
) -> anyhow::Result<()> {
    w.write_all(&frame.to_bytes())
        .await
        .context("tcp write frame")?;
    Ok(())
}

/// Reads one complete command frame, waiting for every byte.
pub async fn read_command<R: AsyncRead + Unpin>(
    r: &mut R,
    max_payload: u64,
) -> anyhow::Result<Command> {
    let mut raw = [0u8; HEADER_LEN];
    r.read_exact(&mut raw).await.context("tcp read header")?;
    let header = Header::parse(&raw).context("short header")?;
    if header.arg3 > max_payload {
        anyhow::bail!("payload of {} bytes exceeds limit of {}", header.arg3, max_payload);
    }
    let mut payload = vec![0u8; header.arg3 as usize];
    r.read_exact(&mut payload)
        .await
        .context("tcp read payload")?;
    Ok(Command::new(header, payload.into()))
}

/// Writes a reply.
pub async fn write_reply<W: AsyncWrite + Unpin>(
    w: &mut W,
    reply: &Reply,
) -> anyhow::Result<()> {
    w.write_all(&reply.to_bytes())
        .await
        .context("tcp write reply")?;
    Ok(())
}

/// Reads one reply.
pub async fn read_reply<R: AsyncRead + Unpin>(r: &mut R) -> anyhow::Result<Reply> {
    let mut raw = [0u8; HEADER_LEN];
    r.read_exact(&mut raw).await.context("tcp read reply header")?;
    let header = Header::parse(&raw).context("short reply header")?;
    if header.arg3 > MAX_REPLY_MESSAGE {
        anyhow::bail!("reply message of {} bytes is too long", header.arg3);
    }
    let mut message = vec![0u8; header.arg3 as usize];
    r.read_exact(&mut message)
        .await
        .context("tcp read reply message")?;
    Ok(Reply::from_parts(header, &message)?)
}

/// Client side of the command channel.
#[derive(Debug)]
pub struct CommandConn {
    stream: TcpStream,
}

impl CommandConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(host: &str, port: u16) -> anyhow::Result<Self> {
        let stream = TcpStream::connect((host, port))
            .await
            .with_context(|| format!("tcp connect {host}:{port}"))?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        debug!(host, port, "Connected");
        Ok(Self::new(stream))
    }

    pub async fn send(&mut self, frame: &Command) -> anyhow::Result<()> {
        write_command(&mut self.stream, frame).await
    }

    pub async fn recv_reply(&mut self) -> anyhow::Result<Reply> {
        read_reply(&mut self.stream).await
    }

    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.stream.shutdown().await.context("tcp shutdown")?;
        Ok(())
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }
}

/// TCP server listener.
pub struct CommandListener {
    listener: TcpListener,
}

impl CommandListener {
    pub async fn bind(host: &str, port: u16) -> anyhow::Result<Self> {
        let listener = TcpListener::bind((host, port))
            .await
            .with_context(|| format!("tcp bind {host}:{port}"))?;
        debug!(addr = ?listener.local_addr().ok(), "Listening");
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(TcpStream, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        Ok((stream, addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}
