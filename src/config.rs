//! # Server Configuration
//!
//! `ServerConfig` holds every tunable of the server. It is built in three
//! layers, later layers winning:
//!
//! 1. Built-in defaults
//! 2. An optional JSON file (`--config path.json`); missing fields keep
//!    their default
//! 3. Command-line flags

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::codec::packet::GameMode;
use crate::server_state::voxels::world::WorldOptions;

/// Command-line flags. Every flag overrides the matching config field.
#[derive(Debug, Default, Parser)]
#[command(name = "voxel-server", version, about = "Multiplayer voxel world server")]
pub struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    pub bind: Option<String>,

    /// TCP port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// World name; selects the directory under the world directory
    #[arg(short, long)]
    pub world: Option<String>,

    /// Directory holding all worlds
    #[arg(long)]
    pub world_dir: Option<PathBuf>,

    /// Seed for a new world. Ignored when the world already exists.
    #[arg(short, long)]
    pub seed: Option<u32>,

    /// Player limit
    #[arg(long)]
    pub max_players: Option<usize>,
}

/// Every tunable of the server. Missing JSON fields take their default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind: String,
    /// TCP port to listen on.
    pub port: u16,
    /// Name of the world, also its directory under `world_dir`.
    pub world_name: String,
    /// Directory holding all worlds.
    pub world_dir: PathBuf,
    /// Seed for a new world; random when unset. An existing world keeps its
    /// stored seed.
    pub seed: Option<u32>,
    /// Logins beyond this many players are refused.
    pub max_players: usize,
    /// Chebyshev radius, in chunks, streamed around each player.
    pub render_distance: u32,
    /// Clients must present exactly this version in their handshake.
    pub protocol_version: String,
    /// Game loop ticks per second.
    pub tick_rate: u32,
    /// Ticks between TimeUpdate broadcasts.
    pub time_update_interval: u64,
    /// Seconds between keep-alive challenges.
    pub keep_alive_interval_secs: u64,
    /// Connections silent for longer than this are dropped.
    pub keep_alive_timeout_secs: u64,
    /// Chunks further than the render distance plus this margin from every
    /// player are evicted.
    pub eviction_margin: u32,
    /// Ticks between world metadata saves.
    pub metadata_save_interval: u64,
    /// Threads generating chunks.
    pub generation_workers: usize,
    /// Chunks streamed to one player per tick after login.
    pub chunks_per_tick: usize,
    /// Mode announced to every player.
    pub game_mode: GameMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "0.0.0.0".to_string(),
            port: 25565,
            world_name: "world".to_string(),
            world_dir: PathBuf::from("worlds"),
            seed: None,
            max_players: 20,
            render_distance: 4,
            protocol_version: "1.0.0".to_string(),
            tick_rate: 20,
            time_update_interval: 20,
            keep_alive_interval_secs: 5,
            keep_alive_timeout_secs: 30,
            eviction_margin: 2,
            metadata_save_interval: 100,
            generation_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            chunks_per_tick: 8,
            game_mode: GameMode::Survival,
        }
    }
}

impl ServerConfig {
    /// Reads a JSON config file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Builds the effective configuration from command-line flags.
    pub fn load(args: &Args) -> anyhow::Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_args(args);
        Ok(config)
    }

    /// Overrides fields with the flags that were given.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(bind) = &args.bind {
            self.bind = bind.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(world) = &args.world {
            self.world_name = world.clone();
        }
        if let Some(world_dir) = &args.world_dir {
            self.world_dir = world_dir.clone();
        }
        if args.seed.is_some() {
            self.seed = args.seed;
        }
        if let Some(max_players) = args.max_players {
            self.max_players = max_players;
        }
    }

    /// The address to bind, from `bind` and `port`.
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.bind, self.port))
    }

    /// Length of one tick.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate.max(1)
    }

    /// See `keep_alive_interval_secs`.
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_secs)
    }

    /// See `keep_alive_timeout_secs`.
    pub fn keep_alive_timeout(&self) -> Duration {
        Duration::from_secs(self.keep_alive_timeout_secs)
    }

    /// The world store settings derived from this configuration.
    pub fn world_options(&self) -> WorldOptions {
        WorldOptions {
            eviction_margin: self.eviction_margin,
            metadata_save_interval: self.metadata_save_interval,
            generation_workers: self.generation_workers.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"port": 4000, "render_distance": 2, "game_mode": "creative"}"#).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.render_distance, 2);
        assert_eq!(config.game_mode, GameMode::Creative);
        assert_eq!(config.max_players, 20);
        assert_eq!(config.protocol_version, "1.0.0");
    }

    #[test]
    fn flags_override_file_values() {
        let args = Args::parse_from(["voxel-server", "--port", "1234", "--world", "alpha", "--seed", "42"]);
        let mut config = ServerConfig {
            port: 4000,
            seed: Some(7),
            ..ServerConfig::default()
        };
        config.apply_args(&args);
        assert_eq!(config.port, 1234);
        assert_eq!(config.world_name, "alpha");
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.bind, "0.0.0.0");
    }

    #[test]
    fn derived_durations() {
        let config = ServerConfig::default();
        assert_eq!(config.tick_duration(), Duration::from_millis(50));
        assert_eq!(config.keep_alive_timeout(), Duration::from_secs(30));
        assert_eq!(config.socket_addr().unwrap().port(), 25565);
    }
}
