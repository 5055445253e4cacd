//! # Server Events
//!
//! The observer seam plugins attach to. The game server emits a
//! [`ServerEvent`] at each hook point and hands every subscriber a mutable
//! reference to itself, so a handler can call back into the world and chat
//! API (`GameServer::get_block`, `set_block`, `broadcast_chat`, ...).
//!
//! Handlers are isolated from each other and from the game loop: an `Err`
//! is logged, and a panic is caught and logged. Neither stops the remaining
//! handlers.

use std::panic::{self, AssertUnwindSafe};

use log::{debug, warn};
use uuid::Uuid;

use super::GameServer;
use crate::server_state::voxels::block::BlockId;
use crate::server_state::voxels::chunk::ChunkCoord;

/// Hook points plugins observe, emitted after the change they describe.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerEvent {
    /// A chunk was produced by the generator for the first time in this
    /// process (not loaded from storage).
    ChunkGenerated {
        /// The new chunk.
        coord: ChunkCoord,
    },
    /// A player dug out a block.
    BlockBreak {
        /// The digging player.
        entity_id: u32,
        /// World X.
        x: i32,
        /// World Y.
        y: i32,
        /// World Z.
        z: i32,
        /// Block that was there before.
        previous: BlockId,
    },
    /// A player placed a block.
    BlockPlace {
        /// The placing player.
        entity_id: u32,
        /// World X.
        x: i32,
        /// World Y.
        y: i32,
        /// World Z.
        z: i32,
        /// The placed block.
        block: BlockId,
    },
    /// A player finished login.
    PlayerJoin {
        /// Assigned entity id.
        entity_id: u32,
        /// Player identity.
        uuid: Uuid,
        /// Display name.
        username: String,
    },
    /// A logged-in player's connection ended.
    PlayerLeave {
        /// Entity id the player had.
        entity_id: u32,
        /// Player identity.
        uuid: Uuid,
        /// Display name.
        username: String,
        /// Disconnect reason.
        reason: String,
    },
    /// A player chatted.
    Chat {
        /// Username of the speaker.
        sender: String,
        /// The text.
        message: String,
    },
    /// A player sent a plugin message.
    PluginMessage {
        /// The sending player.
        entity_id: u32,
        /// Namespaced channel.
        channel: String,
        /// Raw bytes.
        payload: Vec<u8>,
    },
}

/// A plugin hooked into the server.
pub trait EventSubscriber: Send {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    /// Handles one event. `server` may be used to read and edit the world
    /// or to send chat.
    fn on_event(&mut self, event: &ServerEvent, server: &mut GameServer) -> anyhow::Result<()>;
}

/// The ordered list of subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Box<dyn EventSubscriber>>,
}

impl EventBus {
    /// Adds a subscriber after the existing ones.
    pub fn subscribe(&mut self, subscriber: Box<dyn EventSubscriber>) {
        debug!("Subscribed plugin '{}'", subscriber.name());
        self.subscribers.push(subscriber);
    }

    /// Whether nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Moves subscribers registered on `other` to the end of this bus.
    pub fn append(&mut self, other: &mut EventBus) {
        self.subscribers.append(&mut other.subscribers);
    }

    /// Delivers `event` to every subscriber in registration order.
    pub fn dispatch(&mut self, event: &ServerEvent, server: &mut GameServer) {
        for subscriber in &mut self.subscribers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_event(event, server)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!("Plugin '{}' failed on {:?}: {:#}", subscriber.name(), event, err),
                Err(_) => warn!("Plugin '{}' panicked on {:?}", subscriber.name(), event),
            }
        }
    }
}
