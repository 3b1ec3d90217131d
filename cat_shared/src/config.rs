//! Configuration system.
//!
//! Loads CAT configuration from JSON strings (file IO left to app).
//! Both binaries start from [`CatConfig::default`] and override fields
//! from command-line flags.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::wire::HEADER_LEN;

/// Console verbosity, as accepted by `--verb`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Critical,
    Error,
    Warning,
    Message,
    #[default]
    Info,
    Debug,
    All,
}

impl Verbosity {
    pub const NAMES: [&'static str; 7] = [
        "critical", "error", "warning", "message", "info", "debug", "all",
    ];

    /// `tracing_subscriber::EnvFilter` directive for this level.
    pub fn as_filter(self) -> &'static str {
        match self {
            Verbosity::Critical | Verbosity::Error => "error",
            Verbosity::Warning => "warn",
            Verbosity::Message | Verbosity::Info => "info",
            Verbosity::Debug => "debug",
            Verbosity::All => "trace",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verbosity::Critical => "critical",
            Verbosity::Error => "error",
            Verbosity::Warning => "warning",
            Verbosity::Message => "message",
            Verbosity::Info => "info",
            Verbosity::Debug => "debug",
            Verbosity::All => "all",
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "critical" => Verbosity::Critical,
            "error" => Verbosity::Error,
            "warning" => Verbosity::Warning,
            "message" => Verbosity::Message,
            "info" => Verbosity::Info,
            "debug" => Verbosity::Debug,
            "all" => Verbosity::All,
            other => {
                return Err(format!(
                    "unknown verbosity '{other}', expected one of {}",
                    Self::NAMES.join(", ")
                ))
            }
        })
    }
}

/// Root configuration shared by client/server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatConfig {
    /// Host to connect to (client) or bind on (server).
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub verb: Verbosity,
    /// Server ticks per second.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    /// Largest accepted command payload.
    #[serde(default = "default_max_payload_len")]
    pub max_payload_len: u64,
    /// Commands handled per client per tick before moving on.
    #[serde(default = "default_max_commands_per_tick")]
    pub max_commands_per_tick: usize,
    #[serde(default = "default_max_accepts_per_tick")]
    pub max_accepts_per_tick: usize,
    /// How long one accept attempt waits.
    #[serde(default = "default_accept_timeout_ms")]
    pub accept_timeout_ms: u64,
    #[serde(default = "default_max_scenes_per_client")]
    pub max_scenes_per_client: usize,
    /// Queued reply bytes per client before the server stops running its
    /// commands.
    #[serde(default = "default_max_outbound_len")]
    pub max_outbound_len: usize,
    /// A client whose reply queue stays full this long is disconnected.
    #[serde(default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,
}

fn default_tick_hz() -> u32 {
    60
}

fn default_max_payload_len() -> u64 {
    16 * 1024 * 1024
}

fn default_max_commands_per_tick() -> usize {
    64
}

fn default_max_accepts_per_tick() -> usize {
    8
}

fn default_accept_timeout_ms() -> u64 {
    1
}

fn default_max_scenes_per_client() -> usize {
    256
}

fn default_max_outbound_len() -> usize {
    1024 * 1024
}

fn default_stall_timeout_ms() -> u64 {
    10_000
}

impl Default for CatConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: 2000,
            verb: Verbosity::default(),
            tick_hz: default_tick_hz(),
            max_payload_len: default_max_payload_len(),
            max_commands_per_tick: default_max_commands_per_tick(),
            max_accepts_per_tick: default_max_accepts_per_tick(),
            accept_timeout_ms: default_accept_timeout_ms(),
            max_scenes_per_client: default_max_scenes_per_client(),
            max_outbound_len: default_max_outbound_len(),
            stall_timeout_ms: default_stall_timeout_ms(),
        }
    }
}

impl CatConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Undecoded bytes held per client before reads pause: one full
    /// command of the largest allowed size.
    pub fn max_inbound_buffered(&self) -> usize {
        HEADER_LEN.saturating_add(usize::try_from(self.max_payload_len).unwrap_or(usize::MAX))
    }

    /// `host:port` for logs.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
