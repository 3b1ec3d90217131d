//! `cat_server`
//!
//! Server-side systems:
//! - `Pad`: registry of live scenes with non-zero, never-reused handles
//! - `CommandLoop`: executes BEGIN/ADD/CLOSE/EXIT against the pad
//! - `Server`: accepts TCP clients and polls them once per tick
//!
//! Concurrency model:
//! - Single task, cooperative: `Server::tick` never blocks on one client
//! - Stdin console lines arrive over an mpsc channel

pub mod dispatch;
pub mod pad;
pub mod server;
pub mod trace_render;

pub use server::Server;
