//! Graphics primitives (GPs).
//!
//! Primitives are plain data: the viewer draws them, this crate only
//! describes and streams them. Style is layered:
//!
//! ```text
//! Stroked  (line color, line width, stroke flags)
//!   └─ Filled  (fill color, fill flags)
//!        └─ Fonted  (font family, font size)
//! ```
//!
//! Each primitive embeds the layer it draws with and streams that layer
//! before its own fields.
//!
//! Kind codes are hierarchical: the high byte is the style [`Layer`], the
//! low bytes identify the primitive within it.

use serde::{Deserialize, Serialize};

use crate::{
    math::{Color, Vec3},
    stream::{encode, StreamError, StreamReader, StreamWriter, Streamable},
};

bitflags::bitflags! {
    /// Outline options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct StrokeFlags: u32 {
        const VISIBLE = 1 << 0;
        const DASHED = 1 << 1;
        const PICKABLE = 1 << 2;
    }
}

bitflags::bitflags! {
    /// Surface options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct FillFlags: u32 {
        const FILLED = 1 << 0;
        const WIREFRAME = 1 << 1;
        const SMOOTH = 1 << 2;
    }
}

/// Style layer a primitive draws with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Layer {
    Plain = 0,
    Stroked = 1,
    Filled = 2,
    Fonted = 3,
}

/// Primitive type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GpKind {
    Material,
    Frame,
    Box,
    Sphere,
    Tube,
    Label,
}

impl GpKind {
    pub const ALL: [GpKind; 6] = [
        GpKind::Material,
        GpKind::Frame,
        GpKind::Box,
        GpKind::Sphere,
        GpKind::Tube,
        GpKind::Label,
    ];

    pub const fn layer(self) -> Layer {
        match self {
            GpKind::Material => Layer::Plain,
            GpKind::Frame => Layer::Stroked,
            GpKind::Box | GpKind::Sphere | GpKind::Tube => Layer::Filled,
            GpKind::Label => Layer::Fonted,
        }
    }

    const fn ordinal(self) -> u32 {
        match self {
            GpKind::Material | GpKind::Frame | GpKind::Box | GpKind::Label => 1,
            GpKind::Sphere => 2,
            GpKind::Tube => 3,
        }
    }

    /// Wire code: `layer << 24 | ordinal`.
    pub const fn code(self) -> u32 {
        ((self.layer() as u32) << 24) | self.ordinal()
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.code() == code)
    }

    /// Current encoding version.
    pub const fn version(self) -> u32 {
        1
    }

    pub const fn name(self) -> &'static str {
        match self {
            GpKind::Material => "material",
            GpKind::Frame => "frame",
            GpKind::Box => "box",
            GpKind::Sphere => "sphere",
            GpKind::Tube => "tube",
            GpKind::Label => "label",
        }
    }
}

// ─── Style layers ───

/// Outline style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroked {
    pub line_color: Color,
    pub line_width: f32,
    pub flags: StrokeFlags,
}

impl Default for Stroked {
    fn default() -> Self {
        Self {
            line_color: Color::BLACK,
            line_width: 1.0,
            flags: StrokeFlags::VISIBLE,
        }
    }
}

impl Streamable for Stroked {
    fn write(&self, w: &mut StreamWriter) {
        w.put_color(self.line_color);
        w.put_f32(self.line_width);
        w.put_u32(self.flags.bits());
    }

    fn read(r: &mut StreamReader<'_>) -> Result<Self, StreamError> {
        Ok(Self {
            line_color: r.get_color()?,
            line_width: r.get_f32()?,
            flags: StrokeFlags::from_bits_retain(r.get_u32()?),
        })
    }
}

/// Outline plus surface style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filled {
    pub stroked: Stroked,
    pub fill_color: Color,
    pub flags: FillFlags,
}

impl Default for Filled {
    fn default() -> Self {
        Self {
            stroked: Stroked::default(),
            fill_color: Color::WHITE,
            flags: FillFlags::FILLED,
        }
    }
}

impl Streamable for Filled {
    fn write(&self, w: &mut StreamWriter) {
        self.stroked.write(w);
        w.put_color(self.fill_color);
        w.put_u32(self.flags.bits());
    }

    fn read(r: &mut StreamReader<'_>) -> Result<Self, StreamError> {
        Ok(Self {
            stroked: Stroked::read(r)?,
            fill_color: r.get_color()?,
            flags: FillFlags::from_bits_retain(r.get_u32()?),
        })
    }
}

/// Filled style plus text settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fonted {
    pub filled: Filled,
    pub font_family: String,
    pub font_size: f32,
}

impl Default for Fonted {
    fn default() -> Self {
        Self {
            filled: Filled::default(),
            font_family: "sans".to_string(),
            font_size: 12.0,
        }
    }
}

impl Streamable for Fonted {
    fn write(&self, w: &mut StreamWriter) {
        self.filled.write(w);
        w.put_str(&self.font_family);
        w.put_f32(self.font_size);
    }

    fn read(r: &mut StreamReader<'_>) -> Result<Self, StreamError> {
        Ok(Self {
            filled: Filled::read(r)?,
            font_family: r.get_string()?,
            font_size: r.get_f32()?,
        })
    }
}

// ─── Primitives ───

/// Surface material. Carries no style layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub ambient: Color,
    pub diffuse: Color,
    pub specular: Color,
    pub emission: Color,
    pub shininess: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            ambient: Color::rgb(0.2, 0.2, 0.2),
            diffuse: Color::rgb(0.8, 0.8, 0.8),
            specular: Color::BLACK,
            emission: Color::BLACK,
            shininess: 0.0,
        }
    }
}

impl Material {
    pub fn set_ambient(&mut self, c: Color) {
        self.ambient = c;
    }

    pub fn set_diffuse(&mut self, c: Color) {
        self.diffuse = c;
    }

    pub fn set_specular(&mut self, c: Color) {
        self.specular = c;
    }

    pub fn set_emission(&mut self, c: Color) {
        self.emission = c;
    }

    pub fn set_shininess(&mut self, s: f32) {
        self.shininess = s.clamp(0.0, 128.0);
    }
}

impl Streamable for Material {
    fn write(&self, w: &mut StreamWriter) {
        w.put_color(self.ambient);
        w.put_color(self.diffuse);
        w.put_color(self.specular);
        w.put_color(self.emission);
        w.put_f32(self.shininess);
    }

    fn read(r: &mut StreamReader<'_>) -> Result<Self, StreamError> {
        Ok(Self {
            ambient: r.get_color()?,
            diffuse: r.get_color()?,
            specular: r.get_color()?,
            emission: r.get_color()?,
            shininess: r.get_f32()?,
        })
    }
}

/// Coordinate axes at `origin`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub stroked: Stroked,
    pub origin: Vec3,
    pub axis_length: f32,
}

impl Frame {
    pub fn new(origin: Vec3, axis_length: f32) -> Self {
        Self {
            stroked: Stroked::default(),
            origin,
            axis_length,
        }
    }
}

impl Streamable for Frame {
    fn write(&self, w: &mut StreamWriter) {
        self.stroked.write(w);
        w.put_vec3(self.origin);
        w.put_f32(self.axis_length);
    }

    fn read(r: &mut StreamReader<'_>) -> Result<Self, StreamError> {
        Ok(Self {
            stroked: Stroked::read(r)?,
            origin: r.get_vec3()?,
            axis_length: r.get_f32()?,
        })
    }
}

/// Axis-aligned box (the `Box` primitive); `extent` is the full edge length per axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cuboid {
    pub filled: Filled,
    pub center: Vec3,
    pub extent: Vec3,
}

impl Cuboid {
    pub fn new(center: Vec3, extent: Vec3) -> Self {
        Self {
            filled: Filled::default(),
            center,
            extent,
        }
    }
}

impl Streamable for Cuboid {
    fn write(&self, w: &mut StreamWriter) {
        self.filled.write(w);
        w.put_vec3(self.center);
        w.put_vec3(self.extent);
    }

    fn read(r: &mut StreamReader<'_>) -> Result<Self, StreamError> {
        Ok(Self {
            filled: Filled::read(r)?,
            center: r.get_vec3()?,
            extent: r.get_vec3()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub filled: Filled,
    pub center: Vec3,
    pub radius: f32,
    pub slices: u32,
    pub stacks: u32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self {
            filled: Filled::default(),
            center,
            radius,
            slices: 16,
            stacks: 16,
        }
    }
}

impl Streamable for Sphere {
    fn write(&self, w: &mut StreamWriter) {
        self.filled.write(w);
        w.put_vec3(self.center);
        w.put_f32(self.radius);
        w.put_u32(self.slices);
        w.put_u32(self.stacks);
    }

    fn read(r: &mut StreamReader<'_>) -> Result<Self, StreamError> {
        Ok(Self {
            filled: Filled::read(r)?,
            center: r.get_vec3()?,
            radius: r.get_f32()?,
            slices: r.get_u32()?,
            stacks: r.get_u32()?,
        })
    }
}

/// Cylinder between two end points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tube {
    pub filled: Filled,
    pub start: Vec3,
    pub end: Vec3,
    pub radius: f32,
    pub slices: u32,
}

impl Tube {
    pub fn new(start: Vec3, end: Vec3, radius: f32) -> Self {
        Self {
            filled: Filled::default(),
            start,
            end,
            radius,
            slices: 16,
        }
    }

    pub fn length(&self) -> f32 {
        self.start.distance(self.end)
    }
}

impl Streamable for Tube {
    fn write(&self, w: &mut StreamWriter) {
        self.filled.write(w);
        w.put_vec3(self.start);
        w.put_vec3(self.end);
        w.put_f32(self.radius);
        w.put_u32(self.slices);
    }

    fn read(r: &mut StreamReader<'_>) -> Result<Self, StreamError> {
        Ok(Self {
            filled: Filled::read(r)?,
            start: r.get_vec3()?,
            end: r.get_vec3()?,
            radius: r.get_f32()?,
            slices: r.get_u32()?,
        })
    }
}

/// Text anchored at a point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub fonted: Fonted,
    pub anchor: Vec3,
    pub text: String,
}

impl Label {
    pub fn new(anchor: Vec3, text: impl Into<String>) -> Self {
        Self {
            fonted: Fonted::default(),
            anchor,
            text: text.into(),
        }
    }
}

impl Streamable for Label {
    fn write(&self, w: &mut StreamWriter) {
        self.fonted.write(w);
        w.put_vec3(self.anchor);
        w.put_str(&self.text);
    }

    fn read(r: &mut StreamReader<'_>) -> Result<Self, StreamError> {
        Ok(Self {
            fonted: Fonted::read(r)?,
            anchor: r.get_vec3()?,
            text: r.get_string()?,
        })
    }
}

/// Any graphics primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Gp {
    Material(Material),
    Frame(Frame),
    Box(Cuboid),
    Sphere(Sphere),
    Tube(Tube),
    Label(Label),
}

/// Bytes of the kind + version prefix in front of every encoded primitive.
pub const GP_HEADER_LEN: usize = 8;

impl Gp {
    pub fn kind(&self) -> GpKind {
        match self {
            Gp::Material(_) => GpKind::Material,
            Gp::Frame(_) => GpKind::Frame,
            Gp::Box(_) => GpKind::Box,
            Gp::Sphere(_) => GpKind::Sphere,
            Gp::Tube(_) => GpKind::Tube,
            Gp::Label(_) => GpKind::Label,
        }
    }

    pub fn version(&self) -> u32 {
        self.kind().version()
    }

    /// Exact encoded length in bytes, prefix included.
    pub fn size(&self) -> usize {
        encode(self).len()
    }

    /// Outline style, for every layer that has one.
    pub fn stroked(&self) -> Option<&Stroked> {
        match self {
            Gp::Material(_) => None,
            Gp::Frame(f) => Some(&f.stroked),
            Gp::Box(b) => Some(&b.filled.stroked),
            Gp::Sphere(s) => Some(&s.filled.stroked),
            Gp::Tube(t) => Some(&t.filled.stroked),
            Gp::Label(l) => Some(&l.fonted.filled.stroked),
        }
    }

    /// Whether the outline is drawn. Materials are never drawn directly.
    pub fn is_visible(&self) -> bool {
        self.stroked()
            .map(|s| s.flags.contains(StrokeFlags::VISIBLE))
            .unwrap_or(false)
    }
}

impl Streamable for Gp {
    fn write(&self, w: &mut StreamWriter) {
        let kind = self.kind();
        w.put_u32(kind.code());
        w.put_u32(kind.version());
        match self {
            Gp::Material(m) => m.write(w),
            Gp::Frame(f) => f.write(w),
            Gp::Box(b) => b.write(w),
            Gp::Sphere(s) => s.write(w),
            Gp::Tube(t) => t.write(w),
            Gp::Label(l) => l.write(w),
        }
    }

    fn read(r: &mut StreamReader<'_>) -> Result<Self, StreamError> {
        let code = r.get_u32()?;
        let kind = GpKind::from_code(code).ok_or(StreamError::UnknownKind(code))?;
        let version = r.get_u32()?;
        if version > kind.version() {
            return Err(StreamError::UnsupportedVersion {
                kind: code,
                version,
                supported: kind.version(),
            });
        }
        Ok(match kind {
            GpKind::Material => Gp::Material(Material::read(r)?),
            GpKind::Frame => Gp::Frame(Frame::read(r)?),
            GpKind::Box => Gp::Box(Cuboid::read(r)?),
            GpKind::Sphere => Gp::Sphere(Sphere::read(r)?),
            GpKind::Tube => Gp::Tube(Tube::read(r)?),
            GpKind::Label => Gp::Label(Label::read(r)?),
        })
    }
}

impl From<Material> for Gp {
    fn from(v: Material) -> Self {
        Gp::Material(v)
    }
}

impl From<Frame> for Gp {
    fn from(v: Frame) -> Self {
        Gp::Frame(v)
    }
}

impl From<Cuboid> for Gp {
    fn from(v: Cuboid) -> Self {
        Gp::Box(v)
    }
}

impl From<Sphere> for Gp {
    fn from(v: Sphere) -> Self {
        Gp::Sphere(v)
    }
}

impl From<Tube> for Gp {
    fn from(v: Tube) -> Self {
        Gp::Tube(v)
    }
}

impl From<Label> for Gp {
    fn from(v: Label) -> Self {
        Gp::Label(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::decode_exact;

    fn sample_all() -> Vec<Gp> {
        let mut material = Material::default();
        material.set_specular(Color::rgb(0.9, 0.9, 0.9));
        material.set_emission(Color::rgb(0.1, 0.0, 0.0));
        material.set_shininess(32.0);

        let mut sphere = Sphere::new(Vec3::new(0.0, 1.0, 0.0), 0.5);
        sphere.filled.flags = FillFlags::FILLED | FillFlags::SMOOTH;

        let mut tube = Tube::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 3.0), 0.1);
        tube.filled.stroked.flags = StrokeFlags::VISIBLE | StrokeFlags::DASHED;

        let mut label = Label::new(Vec3::new(1.0, 1.0, 1.0), "peak: 42 GeV");
        label.fonted.font_size = 18.0;

        vec![
            material.into(),
            Frame::new(Vec3::ZERO, 2.0).into(),
            Cuboid::new(Vec3::ONE, Vec3::new(2.0, 1.0, 0.5)).into(),
            sphere.into(),
            tube.into(),
            label.into(),
        ]
    }

    #[test]
    fn every_kind_roundtrips() {
        for gp in sample_all() {
            let bytes = encode(&gp);
            assert_eq!(bytes.len(), gp.size());
            let back: Gp = decode_exact(&bytes).unwrap();
            assert_eq!(back, gp, "{} did not roundtrip", gp.kind().name());
        }
    }

    #[test]
    fn kind_codes_are_unique_and_carry_layer() {
        for kind in GpKind::ALL {
            assert_eq!(GpKind::from_code(kind.code()), Some(kind));
            assert_eq!(kind.code() >> 24, kind.layer() as u32);
        }
        assert_eq!(GpKind::Label.code(), 0x0300_0001);
        assert_eq!(GpKind::from_code(0xdead_beef), None);
    }

    #[test]
    fn material_setters_touch_only_their_field() {
        let mut m = Material::default();
        let emission = m.emission;
        m.set_specular(Color::rgb(1.0, 0.0, 0.0));
        assert_eq!(m.specular, Color::rgb(1.0, 0.0, 0.0));
        assert_eq!(m.emission, emission);
    }

    #[test]
    fn layers_stream_parent_first() {
        let b = Cuboid::new(Vec3::ZERO, Vec3::ONE);
        let bytes = encode(&Gp::Box(b.clone()));
        // Prefix, then the Stroked layer's line color leads the body.
        let mut r = StreamReader::new(&bytes[GP_HEADER_LEN..]);
        assert_eq!(r.get_color().unwrap(), b.filled.stroked.line_color);
        assert_eq!(r.get_f32().unwrap(), b.filled.stroked.line_width);
    }

    #[test]
    fn newer_version_is_rejected() {
        let mut w = StreamWriter::new();
        w.put_u32(GpKind::Box.code());
        w.put_u32(GpKind::Box.version() + 1);
        let bytes = w.finish();
        assert!(matches!(
            decode_exact::<Gp>(&bytes),
            Err(StreamError::UnsupportedVersion { version: 2, .. })
        ));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut w = StreamWriter::new();
        w.put_u32(0x0900_0001);
        w.put_u32(1);
        assert_eq!(
            decode_exact::<Gp>(&w.finish()),
            Err(StreamError::UnknownKind(0x0900_0001))
        );
    }

    #[test]
    fn truncated_body_fails_cleanly() {
        let bytes = encode(&Gp::Label(Label::new(Vec3::ZERO, "cut")));
        let err = decode_exact::<Gp>(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(err, StreamError::UnexpectedEof { .. }));
    }

    #[test]
    fn visibility_follows_stroke_flags() {
        let mut f = Frame::new(Vec3::ZERO, 1.0);
        assert!(Gp::Frame(f.clone()).is_visible());
        f.stroked.flags.remove(StrokeFlags::VISIBLE);
        assert!(!Gp::Frame(f).is_visible());
        assert!(!Gp::Material(Material::default()).is_visible());
    }
}
