#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel Server
//!
//! An authoritative multiplayer server for a procedurally generated voxel
//! world.
//!
//! Clients connect over TCP, complete a handshake and login, receive the
//! chunks around them and then exchange movement, block edits and chat.
//! The server owns the world: it generates terrain from a seed, keeps
//! recently used chunks in memory and persists edits to disk.
//!
//! ## Key Modules
//!
//! * `codec` - run-length block encoding and the packet envelope
//! * `config` - command-line flags and the JSON configuration file
//! * `net` - socket tasks and length-prefixed framing
//! * `server_state` - the game server, sessions, plugins and the voxel world
//!
//! ## Architecture
//!
//! One task owns all game state and runs the fixed-rate tick loop. Every
//! socket gets its own task that decodes frames and forwards them over a
//! channel; replies travel back on a per-socket channel. Chunk generation
//! runs on a pool of worker threads.
//!
//! ## Usage
//!
//! ```no_run
//! fn main() -> anyhow::Result<()> {
//!     voxel_server::run()
//! }
//! ```

use anyhow::Context;
use clap::Parser;
use log::{error, info};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use config::{Args, ServerConfig};
use server_state::voxels::world::WorldStore;
use server_state::GameServer;

pub mod codec;
pub mod config;
pub mod net;
pub mod server_state;

/// Parses flags, initializes logging and serves until Ctrl-C.
pub fn run() -> anyhow::Result<()> {
    let mut log_builder = env_logger::Builder::new();
    log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .init();

    info!("Logger initialized");

    let args = Args::parse();
    let config = ServerConfig::load(&args)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    let result = runtime.block_on(serve(config));
    if let Err(err) = &result {
        error!("Server failed: {:#}", err);
    }
    result
}

/// Opens the world, binds the listener and runs the game loop until Ctrl-C.
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let world = WorldStore::open_in_directory(
        &config.world_dir,
        &config.world_name,
        config.seed,
        config.world_options(),
    )
    .with_context(|| format!("failed to open world '{}'", config.world_name))?;

    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        "Listening on {} (protocol {}, up to {} players)",
        addr, config.protocol_version, config.max_players
    );

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let acceptor = tokio::spawn(net::accept_loop(listener, events_tx));

    let server = GameServer::new(config, world, tokio::time::Instant::now());
    let result = server
        .run(events_rx, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    acceptor.abort();
    result.context("failed to save the world on shutdown")?;
    info!("Server stopped");
    Ok(())
}
