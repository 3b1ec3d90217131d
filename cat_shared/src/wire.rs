//! Scene command wire format.
//!
//! Every command is a fixed 32-byte header of four little-endian `u64`
//! words, `{opcode, arg1, arg2, arg3}`, followed by `arg3` payload bytes.
//!
//! | opcode | arg1         | payload         |
//! |--------|--------------|-----------------|
//! | EXIT   | -            | -               |
//! | BEGIN  | -            | encoded `Scene` |
//! | ADD    | scene handle | encoded `Gp`    |
//! | CLOSE  | scene handle | -               |
//!
//! Replies reuse the header shape: `{status, value, 0, message_len}`
//! followed by a UTF-8 message (empty on success).

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    gp::Gp,
    scene::{Scene, SceneHandle},
    stream::encode,
};

/// Size of a command or reply header.
pub const HEADER_LEN: usize = 32;

/// Longest reply message a reader accepts.
pub const MAX_REPLY_MESSAGE: u64 = 64 * 1024;

/// Command opcodes. Zero is never valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum Opcode {
    Exit = 1,
    Begin = 2,
    Add = 3,
    Close = 4,
}

impl TryFrom<u64> for Opcode {
    type Error = u64;

    fn try_from(raw: u64) -> Result<Self, Self::Error> {
        match raw {
            1 => Ok(Opcode::Exit),
            2 => Ok(Opcode::Begin),
            3 => Ok(Opcode::Add),
            4 => Ok(Opcode::Close),
            other => Err(other),
        }
    }
}

/// Four-word header shared by commands and replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub word0: u64,
    pub arg1: u64,
    pub arg2: u64,
    pub arg3: u64,
}

impl Header {
    pub fn command(opcode: Opcode, arg1: u64, arg2: u64, payload_len: usize) -> Self {
        Self {
            word0: opcode as u64,
            arg1,
            arg2,
            arg3: payload_len as u64,
        }
    }

    pub fn put(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.word0);
        buf.put_u64_le(self.arg1);
        buf.put_u64_le(self.arg2);
        buf.put_u64_le(self.arg3);
    }

    pub fn parse(mut raw: &[u8]) -> Option<Self> {
        if raw.len() < HEADER_LEN {
            return None;
        }
        Some(Self {
            word0: raw.get_u64_le(),
            arg1: raw.get_u64_le(),
            arg2: raw.get_u64_le(),
            arg3: raw.get_u64_le(),
        })
    }

    pub fn opcode(&self) -> Result<Opcode, u64> {
        Opcode::try_from(self.word0)
    }
}

/// One complete command: header plus its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub header: Header,
    pub payload: Bytes,
}

impl Command {
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    pub fn begin(scene: &Scene) -> Self {
        let payload = encode(scene);
        Self::new(Header::command(Opcode::Begin, 0, 0, payload.len()), payload)
    }

    pub fn add(scene: SceneHandle, gp: &Gp) -> Self {
        let payload = encode(gp);
        Self::new(
            Header::command(Opcode::Add, scene.get(), 0, payload.len()),
            payload,
        )
    }

    pub fn close(scene: SceneHandle) -> Self {
        Self::new(Header::command(Opcode::Close, scene.get(), 0, 0), Bytes::new())
    }

    pub fn exit() -> Self {
        Self::new(Header::command(Opcode::Exit, 0, 0, 0), Bytes::new())
    }

    /// Header followed by payload, ready to write.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        self.header.put(&mut buf);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }
}

/// Reply status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum Status {
    Ok = 0,
    UnknownOpcode = 1,
    SceneNotFound = 2,
    NotOwner = 3,
    MalformedPayload = 4,
    PayloadTooLarge = 5,
    SceneLimit = 6,
}

impl Status {
    pub fn from_u64(raw: u64) -> Option<Self> {
        Some(match raw {
            0 => Status::Ok,
            1 => Status::UnknownOpcode,
            2 => Status::SceneNotFound,
            3 => Status::NotOwner,
            4 => Status::MalformedPayload,
            5 => Status::PayloadTooLarge,
            6 => Status::SceneLimit,
            _ => return None,
        })
    }
}

/// Server answer to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    pub value: u64,
    pub message: String,
}

impl Reply {
    pub fn ok(value: u64) -> Self {
        Self {
            status: Status::Ok,
            value,
            message: String::new(),
        }
    }

    pub fn error(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            value: 0,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    pub fn to_bytes(&self) -> Bytes {
        let msg = self.message.as_bytes();
        let mut buf = BytesMut::with_capacity(HEADER_LEN + msg.len());
        Header {
            word0: self.status as u64,
            arg1: self.value,
            arg2: 0,
            arg3: msg.len() as u64,
        }
        .put(&mut buf);
        buf.extend_from_slice(msg);
        buf.freeze()
    }

    /// Builds a reply from a parsed header and its message bytes.
    pub fn from_parts(header: Header, message: &[u8]) -> Result<Self, WireError> {
        let status = Status::from_u64(header.word0).ok_or(WireError::UnknownStatus(header.word0))?;
        let message = std::str::from_utf8(message)
            .map_err(|_| WireError::InvalidUtf8)?
            .to_string();
        Ok(Self {
            status,
            value: header.arg1,
            message,
        })
    }
}

/// Framing failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// A header announced more payload than the receiver allows.
    PayloadTooLarge { len: u64, max: u64 },
    UnknownStatus(u64),
    InvalidUtf8,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::PayloadTooLarge { len, max } => {
                write!(f, "payload of {len} bytes exceeds limit of {max}")
            }
            WireError::UnknownStatus(s) => write!(f, "unknown reply status {s}"),
            WireError::InvalidUtf8 => write!(f, "reply message is not valid UTF-8"),
        }
    }
}

impl std::error::Error for WireError {}

/// Incremental command decoder.
///
/// Bytes are fed in as they arrive; a frame is yielded only once its header
/// and entire payload are buffered. A partially received header or payload
/// stays buffered until the next `extend`.
#[derive(Debug)]
pub struct CommandDecoder {
    buf: BytesMut,
    pending: Option<Header>,
    max_payload: u64,
}

impl CommandDecoder {
    pub fn new(max_payload: u64) -> Self {
        Self {
            buf: BytesMut::with_capacity(HEADER_LEN * 4),
            pending: None,
            max_payload,
        }
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes received but not yet handed out as frames.
    pub fn buffered(&self) -> usize {
        self.buf.len() + if self.pending.is_some() { HEADER_LEN } else { 0 }
    }

    /// Whether a half-read frame is waiting for more bytes.
    pub fn is_mid_frame(&self) -> bool {
        self.pending.is_some() || !self.buf.is_empty()
    }

    pub fn next_command(&mut self) -> Result<Option<Command>, WireError> {
        let header = match self.pending.take() {
            Some(h) => h,
            None => {
                let Some(h) = Header::parse(&self.buf) else {
                    return Ok(None);
                };
                self.buf.advance(HEADER_LEN);
                if h.arg3 > self.max_payload {
                    return Err(WireError::PayloadTooLarge {
                        len: h.arg3,
                        max: self.max_payload,
                    });
                }
                h
            }
        };

        // Bounded by `max_payload`, which is a `usize`-sized config value.
        let len = header.arg3 as usize;
        if self.buf.len() < len {
            self.pending = Some(header);
            return Ok(None);
        }
        let payload = self.buf.split_to(len).freeze();
        Ok(Some(Command { header, payload }))
    }
}
