//! Command dispatch.
//!
//! The [`CommandLoop`] owns the pad and remembers which scenes each client
//! opened. Every command resolves to an [`Outcome`]; failures keep their
//! cause and map onto a wire [`Status`].

use std::{collections::HashMap, fmt};

use cat_shared::{
    gp::Gp,
    net::ClientId,
    scene::{Scene, SceneHandle},
    stream::{decode_exact, StreamError},
    wire::{Command, Opcode, Reply, Status},
};
use tracing::{debug, warn};

use crate::pad::Pad;

/// Why a command failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    UnknownOpcode(u64),
    SceneNotFound(SceneHandle),
    /// The scene exists but another client owns it.
    NotOwner(SceneHandle),
    MalformedPayload(StreamError),
    /// The client already holds this many scenes.
    SceneLimit(usize),
}

impl DispatchError {
    pub fn status(&self) -> Status {
        match self {
            DispatchError::UnknownOpcode(_) => Status::UnknownOpcode,
            DispatchError::SceneNotFound(_) => Status::SceneNotFound,
            DispatchError::NotOwner(_) => Status::NotOwner,
            DispatchError::MalformedPayload(_) => Status::MalformedPayload,
            DispatchError::SceneLimit(_) => Status::SceneLimit,
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::UnknownOpcode(op) => write!(f, "unknown opcode {op}"),
            DispatchError::SceneNotFound(h) => write!(f, "scene {h} not found"),
            DispatchError::NotOwner(h) => write!(f, "scene {h} belongs to another client"),
            DispatchError::MalformedPayload(e) => write!(f, "malformed payload: {e}"),
            DispatchError::SceneLimit(n) => write!(f, "client already holds {n} scenes"),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::MalformedPayload(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StreamError> for DispatchError {
    fn from(e: StreamError) -> Self {
        DispatchError::MalformedPayload(e)
    }
}

impl From<DispatchError> for Reply {
    fn from(e: DispatchError) -> Self {
        Reply::error(e.status(), e.to_string())
    }
}

/// What the connection should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Reply(Reply),
    /// EXIT: close the connection, no reply.
    Exit,
}

/// Scene-graph command executor.
#[derive(Debug)]
pub struct CommandLoop {
    pad: Pad,
    sessions: HashMap<ClientId, Vec<SceneHandle>>,
    max_scenes_per_client: usize,
}

impl CommandLoop {
    pub fn new(max_scenes_per_client: usize) -> Self {
        Self {
            pad: Pad::new(),
            sessions: HashMap::new(),
            max_scenes_per_client,
        }
    }

    pub fn pad(&self) -> &Pad {
        &self.pad
    }

    pub fn pad_mut(&mut self) -> &mut Pad {
        &mut self.pad
    }

    /// Scenes currently owned by `client`, in BEGIN order.
    pub fn scenes_of(&self, client: ClientId) -> &[SceneHandle] {
        self.sessions.get(&client).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Executes one command on behalf of `client`.
    pub fn execute(&mut self, client: ClientId, cmd: &Command) -> Outcome {
        let result = match cmd.header.opcode() {
            Ok(Opcode::Exit) => return Outcome::Exit,
            Ok(Opcode::Begin) => self.begin(client, &cmd.payload),
            Ok(Opcode::Add) => self.add(client, cmd.header.arg1, &cmd.payload),
            Ok(Opcode::Close) => self.close(client, cmd.header.arg1),
            Err(raw) => Err(DispatchError::UnknownOpcode(raw)),
        };
        match result {
            Ok(value) => Outcome::Reply(Reply::ok(value)),
            Err(e) => {
                warn!(client_id = ?client, opcode = cmd.header.word0, error = %e, "Command failed");
                Outcome::Reply(e.into())
            }
        }
    }

    /// BEGIN: decodes a scene and registers it. Returns the new handle.
    pub fn begin(&mut self, client: ClientId, payload: &[u8]) -> Result<u64, DispatchError> {
        let held = self.scenes_of(client).len();
        if held >= self.max_scenes_per_client {
            return Err(DispatchError::SceneLimit(held));
        }
        let scene: Scene = decode_exact(payload)?;
        let handle = self.pad.open(client, scene);
        self.sessions.entry(client).or_default().push(handle);
        Ok(handle.get())
    }

    /// ADD: appends a primitive to one of the client's scenes. Returns the
    /// scene's primitive count.
    pub fn add(&mut self, client: ClientId, raw: u64, payload: &[u8]) -> Result<u64, DispatchError> {
        let handle = self.owned(client, raw)?;
        let gp: Gp = decode_exact(payload)?;
        let count = self
            .pad
            .append(handle, gp)
            .ok_or(DispatchError::SceneNotFound(handle))?;
        Ok(count as u64)
    }

    /// CLOSE: removes one of the client's scenes. Returns how many
    /// primitives it held.
    pub fn close(&mut self, client: ClientId, raw: u64) -> Result<u64, DispatchError> {
        let handle = self.owned(client, raw)?;
        let scene = self
            .pad
            .remove(handle)
            .ok_or(DispatchError::SceneNotFound(handle))?;
        if let Some(list) = self.sessions.get_mut(&client) {
            list.retain(|h| *h != handle);
        }
        Ok(scene.len() as u64)
    }

    /// Releases everything a departing client owned.
    pub fn drop_client(&mut self, client: ClientId) -> usize {
        self.sessions.remove(&client);
        let released = self.pad.release(client);
        if !released.is_empty() {
            debug!(client_id = ?client, scenes = released.len(), "Dropped client scenes");
        }
        released.len()
    }

    fn owned(&self, client: ClientId, raw: u64) -> Result<SceneHandle, DispatchError> {
        let handle = SceneHandle::new(raw).ok_or(DispatchError::SceneNotFound(SceneHandle(raw)))?;
        match self.pad.owner_of(handle) {
            None => Err(DispatchError::SceneNotFound(handle)),
            Some(owner) if owner != client => Err(DispatchError::NotOwner(handle)),
            Some(_) => Ok(handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use cat_shared::{
        gp::{Cuboid, Label},
        math::Vec3,
        wire::Header,
    };

    fn reply(outcome: Outcome) -> Reply {
        match outcome {
            Outcome::Reply(r) => r,
            Outcome::Exit => panic!("unexpected exit"),
        }
    }

    fn begin(lp: &mut CommandLoop, client: ClientId, title: &str) -> SceneHandle {
        let r = reply(lp.execute(client, &Command::begin(&Scene::new(title))));
        assert!(r.is_ok(), "{r:?}");
        SceneHandle::new(r.value).expect("non-zero handle")
    }

    fn label() -> Gp {
        Gp::Label(Label::new(Vec3::ZERO, "x"))
    }

    #[test]
    fn begin_handles_are_unique_and_nonzero() {
        let mut lp = CommandLoop::new(16);
        let mut seen = std::collections::HashSet::new();
        for i in 0..10 {
            let h = begin(&mut lp, ClientId(1 + i % 3), "s");
            assert_ne!(h.get(), 0);
            assert!(seen.insert(h));
        }
        assert_eq!(lp.pad().len(), 10);
    }

    #[test]
    fn add_after_close_fails() {
        let mut lp = CommandLoop::new(16);
        let c = ClientId(1);
        let h = begin(&mut lp, c, "s");
        let r = reply(lp.execute(c, &Command::add(h, &label())));
        assert_eq!(r, Reply::ok(1));
        let r = reply(lp.execute(c, &Command::close(h)));
        assert_eq!(r, Reply::ok(1));
        let r = reply(lp.execute(c, &Command::add(h, &label())));
        assert_eq!(r.status, Status::SceneNotFound);
        assert!(lp.scenes_of(c).is_empty());
    }

    #[test]
    fn other_clients_cannot_touch_a_scene() {
        let mut lp = CommandLoop::new(16);
        let h = begin(&mut lp, ClientId(1), "mine");
        let r = reply(lp.execute(ClientId(2), &Command::add(h, &label())));
        assert_eq!(r.status, Status::NotOwner);
        let r = reply(lp.execute(ClientId(2), &Command::close(h)));
        assert_eq!(r.status, Status::NotOwner);
        assert!(lp.pad().get(h).is_some());
    }

    #[test]
    fn malformed_payloads_are_reported_distinctly() {
        let mut lp = CommandLoop::new(16);
        let c = ClientId(1);
        let bad = Command::new(
            Header::command(Opcode::Begin, 0, 0, 3),
            Bytes::from_static(&[1, 2, 3]),
        );
        let r = reply(lp.execute(c, &bad));
        assert_eq!(r.status, Status::MalformedPayload);
        assert!(r.message.contains("malformed payload"));
        assert!(lp.pad().is_empty());

        let h = begin(&mut lp, c, "s");
        let bad_add = Command::new(
            Header::command(Opcode::Add, h.get(), 0, 2),
            Bytes::from_static(&[9, 9]),
        );
        assert_eq!(reply(lp.execute(c, &bad_add)).status, Status::MalformedPayload);
    }

    #[test]
    fn unknown_opcode_is_an_error_not_a_success() {
        let mut lp = CommandLoop::new(16);
        let cmd = Command::new(
            Header {
                word0: 42,
                ..Default::default()
            },
            Bytes::new(),
        );
        let r = reply(lp.execute(ClientId(1), &cmd));
        assert_eq!(r.status, Status::UnknownOpcode);
        assert_eq!(r.message, "unknown opcode 42");
    }

    #[test]
    fn zero_handle_is_never_found() {
        let mut lp = CommandLoop::new(16);
        let cmd = Command::new(Header::command(Opcode::Close, 0, 0, 0), Bytes::new());
        assert_eq!(reply(lp.execute(ClientId(1), &cmd)).status, Status::SceneNotFound);
    }

    #[test]
    fn scene_limit_is_enforced_per_client() {
        let mut lp = CommandLoop::new(2);
        let c = ClientId(1);
        begin(&mut lp, c, "a");
        begin(&mut lp, c, "b");
        let r = reply(lp.execute(c, &Command::begin(&Scene::new("c"))));
        assert_eq!(r.status, Status::SceneLimit);
        // Another client is unaffected.
        begin(&mut lp, ClientId(2), "d");
    }

    #[test]
    fn exit_has_no_reply_and_drop_releases() {
        let mut lp = CommandLoop::new(16);
        let c = ClientId(7);
        let h = begin(&mut lp, c, "s");
        let cmd = Command::add(h, &Gp::Box(Cuboid::new(Vec3::ZERO, Vec3::ONE)));
        reply(lp.execute(c, &cmd));
        assert_eq!(lp.execute(c, &Command::exit()), Outcome::Exit);
        assert_eq!(lp.drop_client(c), 1);
        assert!(lp.pad().is_empty());
        assert!(lp.scenes_of(c).is_empty());
    }
}
