//! The pad: registry of live scenes.
//!
//! Handles start at 1 and are never reused while the pad lives, so a stale
//! handle from a closed scene can never address a newer one.

use std::collections::BTreeMap;

use cat_shared::{
    gp::Gp,
    net::ClientId,
    render::RenderBackend,
    scene::{Scene, SceneHandle},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, trace};

/// One live scene and its bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct SceneEntry {
    #[serde(skip)]
    pub owner: ClientId,
    pub scene: Scene,
    pub opened_at: DateTime<Utc>,
    /// ADD commands applied since BEGIN.
    pub adds: u64,
}

#[derive(Debug)]
pub struct Pad {
    scenes: BTreeMap<SceneHandle, SceneEntry>,
    next_handle: u64,
    dirty: bool,
    frames_drawn: u64,
}

impl Default for Pad {
    fn default() -> Self {
        Self {
            scenes: BTreeMap::new(),
            next_handle: 1,
            dirty: false,
            frames_drawn: 0,
        }
    }
}

impl Pad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a scene under `owner` and returns its fresh handle.
    pub fn open(&mut self, owner: ClientId, scene: Scene) -> SceneHandle {
        let handle = SceneHandle(self.next_handle);
        self.next_handle += 1;
        debug!(%handle, owner = ?owner, title = %scene.title, primitives = scene.len(), "Scene opened");
        self.scenes.insert(
            handle,
            SceneEntry {
                owner,
                scene,
                opened_at: Utc::now(),
                adds: 0,
            },
        );
        self.dirty = true;
        handle
    }

    pub fn get(&self, handle: SceneHandle) -> Option<&SceneEntry> {
        self.scenes.get(&handle)
    }

    pub fn owner_of(&self, handle: SceneHandle) -> Option<ClientId> {
        self.scenes.get(&handle).map(|e| e.owner)
    }

    /// Appends a primitive, returning the scene's new primitive count.
    pub fn append(&mut self, handle: SceneHandle, gp: Gp) -> Option<usize> {
        let entry = self.scenes.get_mut(&handle)?;
        trace!(%handle, kind = gp.kind().name(), "Primitive appended");
        entry.adds += 1;
        let count = entry.scene.push(gp);
        self.dirty = true;
        Some(count)
    }

    pub fn remove(&mut self, handle: SceneHandle) -> Option<Scene> {
        let entry = self.scenes.remove(&handle)?;
        debug!(%handle, owner = ?entry.owner, "Scene closed");
        self.dirty = true;
        Some(entry.scene)
    }

    /// Drops every scene owned by `owner`.
    pub fn release(&mut self, owner: ClientId) -> Vec<SceneHandle> {
        let released: Vec<SceneHandle> = self
            .scenes
            .iter()
            .filter(|(_, e)| e.owner == owner)
            .map(|(h, _)| *h)
            .collect();
        for h in &released {
            self.scenes.remove(h);
        }
        if !released.is_empty() {
            debug!(owner = ?owner, count = released.len(), "Released client scenes");
            self.dirty = true;
        }
        released
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SceneHandle, &SceneEntry)> {
        self.scenes.iter().map(|(h, e)| (*h, e))
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Returns and clears the redraw request.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Draws every scene in handle order.
    pub fn render(&mut self, backend: &mut dyn RenderBackend) {
        backend.begin_frame();
        for (handle, entry) in &self.scenes {
            backend.begin_scene(*handle, &entry.scene.title);
            for gp in &entry.scene.primitives {
                backend.draw_primitive(gp);
            }
        }
        backend.end_frame();
        self.frames_drawn += 1;
    }
}
