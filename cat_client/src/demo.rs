//! Demo content pushed by the `client` binary.

use cat_shared::{
    gp::{Cuboid, FillFlags, Frame, Label, Material, Sphere, StrokeFlags, Tube},
    math::{Color, Vec3},
    scene::Scene,
};

/// A scene using every primitive kind.
pub fn demo_scene() -> Scene {
    let mut material = Material::default();
    material.set_diffuse(Color::rgb(0.3, 0.5, 0.9));
    material.set_specular(Color::rgb(1.0, 1.0, 1.0));
    material.set_shininess(48.0);

    let mut detector = Cuboid::new(Vec3::ZERO, Vec3::new(4.0, 4.0, 8.0));
    detector.filled.flags = FillFlags::WIREFRAME;
    detector.filled.stroked.line_color = Color::rgb(0.6, 0.6, 0.6);

    let mut hit = Sphere::new(Vec3::new(0.5, 1.2, 2.0), 0.15);
    hit.filled.fill_color = Color::rgb(0.9, 0.2, 0.1);
    hit.filled.flags = FillFlags::FILLED | FillFlags::SMOOTH;

    let mut track = Tube::new(Vec3::ZERO, Vec3::new(0.5, 1.2, 2.0), 0.02);
    track.filled.stroked.flags = StrokeFlags::VISIBLE | StrokeFlags::PICKABLE;

    Scene::new("demo")
        .with(material)
        .with(Frame::new(Vec3::ZERO, 1.0))
        .with(detector)
        .with(hit)
        .with(track)
        .with(Label::new(Vec3::new(0.5, 1.4, 2.0), "hit 0"))
}

/// Label streamed after the scene is open.
pub fn status_label(n: usize) -> Label {
    let mut label = Label::new(Vec3::new(-2.0, 2.2, 0.0), format!("{n} primitives"));
    label.fonted.font_size = 10.0;
    label.fonted.filled.fill_color = Color::rgb(1.0, 1.0, 0.0);
    label
}
