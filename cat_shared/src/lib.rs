//! `cat_shared`
//!
//! Shared libraries used by both client and server.
//!
//! Design goals:
//! - Explicit, little-endian binary formats with bounds-checked decoding.
//! - Clear separation of concerns (primitives, streaming, wire, net).
//! - Traits at the seams a viewer plugs into.
//! - No `unsafe`.

pub mod config;
pub mod gp;
pub mod math;
pub mod net;
pub mod render;
pub mod scene;
pub mod stream;
pub mod wire;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::gp::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::scene::*;
    pub use crate::stream::{decode_exact, encode, StreamError, Streamable};
    pub use crate::wire::*;
}
