//! `cat_client`
//!
//! Client-side systems:
//! - `PadClient`: BEGIN/ADD/CLOSE/EXIT over one TCP connection
//! - Demo content for the `client` binary

pub mod client;
pub mod demo;

pub use client::PadClient;
