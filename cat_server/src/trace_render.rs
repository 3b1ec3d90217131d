//! Headless render backend that logs each redraw through `tracing`.

use cat_shared::{gp::Gp, render::RenderBackend, scene::SceneHandle};
use tracing::{debug, trace};

#[derive(Debug, Default)]
pub struct TraceRenderer {
    frame: u64,
    scenes: usize,
    primitives: usize,
}

impl TraceRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RenderBackend for TraceRenderer {
    fn begin_frame(&mut self) {
        self.frame += 1;
        self.scenes = 0;
        self.primitives = 0;
    }

    fn begin_scene(&mut self, handle: SceneHandle, title: &str) {
        self.scenes += 1;
        trace!(frame = self.frame, %handle, title, "Draw scene");
    }

    fn draw_primitive(&mut self, gp: &Gp) {
        self.primitives += 1;
        trace!(frame = self.frame, kind = gp.kind().name(), visible = gp.is_visible(), "Draw primitive");
    }

    fn end_frame(&mut self) {
        debug!(frame = self.frame, scenes = self.scenes, primitives = self.primitives, "Pad redrawn");
    }
}
