//! Scenes: ordered collections of primitives pushed by one client.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    gp::{Gp, GP_HEADER_LEN},
    stream::{StreamError, StreamReader, StreamWriter, Streamable},
};

/// Server-assigned scene handle. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SceneHandle(pub u64);

impl SceneHandle {
    /// Returns `None` for the reserved zero value.
    pub fn new(raw: u64) -> Option<Self> {
        (raw != 0).then_some(SceneHandle(raw))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SceneHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub title: String,
    pub primitives: Vec<Gp>,
}

impl Scene {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            primitives: Vec::new(),
        }
    }

    /// Builder-style append.
    pub fn with(mut self, gp: impl Into<Gp>) -> Self {
        self.primitives.push(gp.into());
        self
    }

    /// Appends a primitive and returns the new count.
    pub fn push(&mut self, gp: Gp) -> usize {
        self.primitives.push(gp);
        self.primitives.len()
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }
}

impl Streamable for Scene {
    fn write(&self, w: &mut StreamWriter) {
        w.put_str(&self.title);
        w.put_u32(self.primitives.len() as u32);
        for gp in &self.primitives {
            gp.write(w);
        }
    }

    fn read(r: &mut StreamReader<'_>) -> Result<Self, StreamError> {
        let title = r.get_string()?;
        let count = r.get_count(GP_HEADER_LEN)?;
        let mut primitives = Vec::with_capacity(count);
        for _ in 0..count {
            primitives.push(Gp::read(r)?);
        }
        Ok(Self { title, primitives })
    }
}
