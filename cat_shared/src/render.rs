//! Rendering abstraction.
//!
//! This crate intentionally does not depend on a graphics backend.
//! A viewer implements [`RenderBackend`]; the server drives it once per
//! tick whenever the pad changed.

use crate::{gp::Gp, scene::SceneHandle};

/// A minimal rendering API.
pub trait RenderBackend: Send {
    fn begin_frame(&mut self);
    fn begin_scene(&mut self, handle: SceneHandle, title: &str);
    fn draw_primitive(&mut self, gp: &Gp);
    fn end_frame(&mut self);
}

/// A no-op renderer useful for headless runs and tests.
#[derive(Default)]
pub struct NullRenderer;

impl RenderBackend for NullRenderer {
    fn begin_frame(&mut self) {}
    fn begin_scene(&mut self, _handle: SceneHandle, _title: &str) {}
    fn draw_primitive(&mut self, _gp: &Gp) {}
    fn end_frame(&mut self) {}
}
