//! # Server State Module
//!
//! The game server: session manager, tick loop and broadcast hub.
//!
//! ## Key Components
//!
//! * `GameServer` - owns the world store, every connection and the plugin bus
//! * `session` - per-connection state machine and player sessions
//! * `events` - plugin event seam
//! * `task_management` - worker pool used for chunk generation
//! * `voxels` - blocks, chunks, generation, storage and the world store
//!
//! ## Architecture
//!
//! A single task runs [`GameServer::run`], multiplexing connection events
//! and a fixed-rate tick timer. All game state is mutated from that task
//! only, so nothing here is locked. Socket tasks talk to it over channels
//! (see [`crate::net`]).
//!
//! Every handler takes the current [`Instant`] instead of reading the clock,
//! so the whole state machine can be driven directly in tests.

use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;

use cgmath::Point3;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::codec::packet::{
    BlockChange, ChatMessageServer, ChunkData, DestroyEntities, EntityLook, EntityPosition,
    EntityPositionAndLook, Handshake, Login, MultiBlockChange, Packet, PlayerInfo, PlayerInfoAction,
    ServerKeepAlive, SpawnPlayer, TimeUpdate, WorldInfo,
};
use crate::codec::CodecError;
use crate::config::ServerConfig;
use crate::net::{ConnectionEvent, ConnectionId, OutboundSender};
use events::{EventBus, EventSubscriber, ServerEvent};
use session::{offline_uuid, position_in_world, Connection, ConnectionState, PlayerSession, ProtocolError};
use voxels::block::{BlockId, AIR};
use voxels::chunk::{ChunkCoord, CHUNK_DEPTH, CHUNK_HEIGHT, CHUNK_WIDTH};
use voxels::storage::StoreError;
use voxels::world::WorldStore;

pub mod events;
pub mod session;
pub mod task_management;
pub mod voxels;

/// World column players spawn in.
pub const SPAWN_COLUMN: (i32, i32) = (8, 8);

/// The authoritative game state.
pub struct GameServer {
    config: ServerConfig,
    world: WorldStore,
    /// Ordered so broadcasts reach connections in accept order.
    connections: BTreeMap<ConnectionId, Connection>,
    next_entity_id: u32,
    ticks: u64,
    last_keep_alive_broadcast: Instant,
    next_keep_alive_id: u64,
    events: EventBus,
}

impl GameServer {
    /// Creates a server with no connections around an opened world.
    ///
    /// # Arguments
    /// * `now` - start of the first keep-alive interval
    pub fn new(config: ServerConfig, world: WorldStore, now: Instant) -> Self {
        GameServer {
            config,
            world,
            connections: BTreeMap::new(),
            next_entity_id: 1,
            ticks: 0,
            last_keep_alive_broadcast: now,
            next_keep_alive_id: 0,
            events: EventBus::default(),
        }
    }

    /// The configuration the server was started with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The world store.
    pub fn world(&self) -> &WorldStore {
        &self.world
    }

    /// Mutable access to the world store, bypassing broadcasts.
    pub fn world_mut(&mut self) -> &mut WorldStore {
        &mut self.world
    }

    /// Registers a plugin. Subscribers see events in registration order.
    pub fn subscribe(&mut self, subscriber: Box<dyn EventSubscriber>) {
        self.events.subscribe(subscriber);
    }

    /// Every logged-in player, in accept order.
    pub fn players(&self) -> impl Iterator<Item = &PlayerSession> {
        self.connections
            .values()
            .filter(|connection| connection.is_logged_in())
            .filter_map(|connection| connection.player.as_ref())
    }

    /// Number of logged-in players.
    pub fn player_count(&self) -> usize {
        self.players().count()
    }

    /// Runs the game loop until `shutdown` resolves, then disconnects every
    /// session and closes the world.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), StoreError> {
        let mut ticker = tokio::time::interval(self.config.tick_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            "Game loop running at {} ticks per second",
            self.config.tick_rate
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event, Instant::now()),
                    None => break,
                },
                _ = ticker.tick() => self.tick(Instant::now()),
            }
        }

        self.shutdown()
    }

    /// Dispatches one event from the socket tasks.
    pub fn handle_event(&mut self, event: ConnectionEvent, now: Instant) {
        match event {
            ConnectionEvent::Connected { id, addr, sender } => self.handle_connect(id, Some(addr), sender, now),
            ConnectionEvent::Packet { id, packet } => self.handle_packet(id, packet, now),
            ConnectionEvent::Malformed { id, error } => self.handle_malformed(id, error),
            ConnectionEvent::Closed { id } => self.handle_disconnect(id),
        }
    }

    /// Registers a new connection waiting for its handshake.
    pub fn handle_connect(&mut self, id: ConnectionId, addr: Option<SocketAddr>, sender: OutboundSender, now: Instant) {
        debug!("Connection {} registered", id);
        self.connections.insert(id, Connection::new(id, addr, sender, now));
    }

    /// The socket closed on its own.
    pub fn handle_disconnect(&mut self, id: ConnectionId) {
        if let Some(mut connection) = self.connections.remove(&id) {
            connection.state = ConnectionState::Disconnected;
            self.on_removed(connection, "Connection closed");
        }
    }

    /// A frame from `id` could not be decoded. Dropped after login, fatal
    /// before it.
    pub fn handle_malformed(&mut self, id: ConnectionId, error: CodecError) {
        let Some(connection) = self.connections.get(&id) else {
            return;
        };
        if connection.is_logged_in() {
            warn!("Dropping malformed packet from connection {}: {}", id, error);
        } else {
            self.disconnect(id, &ProtocolError::Malformed(error).to_string());
        }
    }

    /// Advances the connection state machine with one packet.
    pub fn handle_packet(&mut self, id: ConnectionId, packet: Packet, now: Instant) {
        let Some(state) = self.connections.get(&id).map(|connection| connection.state) else {
            debug!("Packet for unknown connection {}", id);
            return;
        };

        match (state, packet) {
            (ConnectionState::Unauthenticated, Packet::Handshake(handshake)) => {
                self.handle_handshake(id, handshake)
            }
            (ConnectionState::HandshakeOk, Packet::Login(login)) => self.handle_login(id, login, now),
            (ConnectionState::Unauthenticated | ConnectionState::HandshakeOk, other) => {
                self.disconnect(id, &ProtocolError::NotLoggedIn(other.packet_type()).to_string())
            }
            (ConnectionState::LoggedIn, packet) => self.handle_play(id, packet, now),
            (ConnectionState::Disconnected, _) => {}
        }

        self.flush_generated_events();
    }

    fn handle_handshake(&mut self, id: ConnectionId, handshake: Handshake) {
        if handshake.protocol_version != self.config.protocol_version {
            let error = ProtocolError::VersionMismatch {
                server: self.config.protocol_version.clone(),
                client: handshake.protocol_version,
            };
            self.disconnect(id, &error.to_string());
            return;
        }
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.state = ConnectionState::HandshakeOk;
            debug!("Connection {} completed handshake", id);
        }
    }

    fn handle_login(&mut self, id: ConnectionId, login: Login, now: Instant) {
        if self.player_count() >= self.config.max_players {
            info!("Rejecting '{}': server full", login.username);
            self.disconnect(id, &ProtocolError::ServerFull.to_string());
            return;
        }

        let uuid = login
            .uuid
            .as_deref()
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .unwrap_or_else(|| offline_uuid(&login.username));
        let entity_id = self.allocate_entity_id();

        let spawn = self.spawn_position();
        let view_distance = self.config.render_distance;
        let mut player = PlayerSession::new(entity_id, uuid, login.username, spawn, view_distance);

        let world_info = WorldInfo {
            world_name: self.world.name().to_string(),
            seed: self.world.seed(),
            world_age: self.world.world_age(),
            time_of_day: self.world.time_of_day(),
            entity_id,
            game_mode: self.config.game_mode,
            max_players: self.config.max_players,
            render_distance: view_distance,
            chunk_width: CHUNK_WIDTH,
            chunk_height: CHUNK_HEIGHT,
            chunk_depth: CHUNK_DEPTH,
        };
        let spawn_packet = EntityPositionAndLook {
            entity_id,
            x: spawn.x,
            y: spawn.y,
            z: spawn.z,
            yaw: 0.0,
            pitch: 0.0,
        };

        let coords: Vec<ChunkCoord> = player.chunk().square_around(view_distance).collect();
        let chunk_packets = self.load_chunk_packets(&coords);
        player
            .loaded_chunks
            .extend(chunk_packets.iter().map(|data| ChunkCoord::new(data.chunk_x, data.chunk_z)));

        let existing: Vec<(PlayerInfo, SpawnPlayer)> = self
            .players()
            .map(|other| (player_info(other, PlayerInfoAction::Add), spawn_player(other)))
            .collect();
        let announce_spawn = spawn_player(&player);
        let announce_info = player_info(&player, PlayerInfoAction::Add);
        let join_event = ServerEvent::PlayerJoin {
            entity_id,
            uuid,
            username: player.username.clone(),
        };
        info!("{} joined as entity {} ({})", player.username, entity_id, uuid);

        let Some(connection) = self.connections.get_mut(&id) else {
            return;
        };
        connection.send(world_info);
        connection.send(spawn_packet);
        for data in chunk_packets {
            connection.send(data);
        }
        connection.state = ConnectionState::LoggedIn;
        connection.last_keep_alive = now;
        connection.player = Some(player);

        self.broadcast_except(id, announce_spawn);
        self.broadcast(announce_info);
        if let Some(connection) = self.connections.get(&id) {
            for (info, spawn) in existing {
                connection.send(info);
                connection.send(spawn);
            }
        }

        self.emit(join_event);
    }

    /// Hands out the next entity id that no online player holds. Ids wrap
    /// around to 1 after `u32::MAX`.
    fn allocate_entity_id(&mut self) -> u32 {
        loop {
            let candidate = self.next_entity_id;
            self.next_entity_id = candidate.checked_add(1).unwrap_or(1);
            let taken = self
                .connections
                .values()
                .filter_map(|connection| connection.player.as_ref())
                .any(|player| player.entity_id == candidate);
            if !taken {
                return candidate;
            }
        }
    }

    /// Loads (or generates) `coords` and builds their ChunkData packets.
    /// Chunks that cannot be read are left out, so streaming retries them.
    fn load_chunk_packets(&mut self, coords: &[ChunkCoord]) -> Vec<ChunkData> {
        self.world.prefetch(coords.iter().copied());
        coords
            .iter()
            .filter_map(|&coord| match self.world.get_chunk(coord) {
                Ok(chunk) => Some(ChunkData::from_chunk(chunk)),
                Err(err) => {
                    warn!("Cannot send chunk ({}, {}): {}", coord.x, coord.z, err);
                    None
                }
            })
            .collect()
    }

    /// One block above the highest block of the spawn column.
    fn spawn_position(&mut self) -> Point3<f64> {
        let (x, z) = SPAWN_COLUMN;
        let sea_level = self.world.generator().settings().sea_level;
        let y = match self.world.highest_block_y(x, z) {
            Ok(Some(top)) => top + 1,
            Ok(None) => sea_level + 1,
            Err(err) => {
                warn!("Cannot read the spawn column: {}", err);
                sea_level + 1
            }
        };
        Point3::new(x as f64 + 0.5, y as f64, z as f64 + 0.5)
    }

    fn handle_play(&mut self, id: ConnectionId, packet: Packet, now: Instant) {
        match packet {
            Packet::PlayerPosition(update) => {
                if !position_in_world(update.x, update.y, update.z) {
                    self.disconnect(id, &ProtocolError::InvalidPosition.to_string());
                    return;
                }
                let Some(player) = self.player_mut(id) else { return };
                player.position = Point3::new(update.x, update.y, update.z);
                let entity_id = player.entity_id;
                self.broadcast_except(
                    id,
                    EntityPosition {
                        entity_id,
                        x: update.x,
                        y: update.y,
                        z: update.z,
                    },
                );
            }
            Packet::PlayerLook(look) => {
                let Some(player) = self.player_mut(id) else { return };
                player.yaw = look.yaw;
                player.pitch = look.pitch;
                let entity_id = player.entity_id;
                self.broadcast_except(
                    id,
                    EntityLook {
                        entity_id,
                        yaw: look.yaw,
                        pitch: look.pitch,
                    },
                );
            }
            Packet::PlayerPositionAndLook(update) => {
                if !position_in_world(update.x, update.y, update.z) {
                    self.disconnect(id, &ProtocolError::InvalidPosition.to_string());
                    return;
                }
                let Some(player) = self.player_mut(id) else { return };
                player.position = Point3::new(update.x, update.y, update.z);
                player.yaw = update.yaw;
                player.pitch = update.pitch;
                let entity_id = player.entity_id;
                self.broadcast_except(
                    id,
                    EntityPositionAndLook {
                        entity_id,
                        x: update.x,
                        y: update.y,
                        z: update.z,
                        yaw: update.yaw,
                        pitch: update.pitch,
                    },
                );
            }
            Packet::PlayerDigging(dig) => {
                let Some(entity_id) = self.player_mut(id).map(|player| player.entity_id) else { return };
                let previous = match self.world.get_block(dig.x, dig.y, dig.z) {
                    Ok(previous) => previous,
                    Err(err) => {
                        warn!("Ignoring dig at ({}, {}, {}): {}", dig.x, dig.y, dig.z, err);
                        return;
                    }
                };
                if self.apply_block_change(dig.x, dig.y, dig.z, AIR) {
                    self.emit(ServerEvent::BlockBreak {
                        entity_id,
                        x: dig.x,
                        y: dig.y,
                        z: dig.z,
                        previous,
                    });
                } else {
                    debug!("Ignoring dig outside the world at ({}, {}, {})", dig.x, dig.y, dig.z);
                }
            }
            Packet::PlayerBlockPlacement(place) => {
                let Some(entity_id) = self.player_mut(id).map(|player| player.entity_id) else { return };
                if self.apply_block_change(place.x, place.y, place.z, place.block_id) {
                    self.emit(ServerEvent::BlockPlace {
                        entity_id,
                        x: place.x,
                        y: place.y,
                        z: place.z,
                        block: place.block_id,
                    });
                } else {
                    debug!("Ignoring placement outside the world at ({}, {}, {})", place.x, place.y, place.z);
                }
            }
            Packet::ChatMessage(chat) => {
                let Some(sender) = self.player_mut(id).map(|player| player.username.clone()) else { return };
                info!("<{}> {}", sender, chat.message);
                self.broadcast(ChatMessageServer {
                    sender: Some(sender.clone()),
                    message: chat.message.clone(),
                });
                self.emit(ServerEvent::Chat {
                    sender,
                    message: chat.message,
                });
            }
            Packet::ClientSettings(settings) => {
                let server_distance = self.config.render_distance;
                let Some(player) = self.player_mut(id) else { return };
                player.view_distance = settings.view_distance.min(server_distance);
                debug!("{} view distance is now {}", player.username, player.view_distance);
            }
            Packet::KeepAlive(_) => {
                if let Some(connection) = self.connections.get_mut(&id) {
                    connection.last_keep_alive = now;
                }
            }
            Packet::PluginMessage(message) => {
                let Some(entity_id) = self.player_mut(id).map(|player| player.entity_id) else { return };
                self.emit(ServerEvent::PluginMessage {
                    entity_id,
                    channel: message.channel,
                    payload: message.payload,
                });
            }
            Packet::Handshake(_) | Packet::Login(_) => {
                warn!("Connection {} repeated its handshake or login, ignoring", id);
            }
            other => {
                warn!("Connection {} sent client-bound {:?}, ignoring", id, other.packet_type());
            }
        }
    }

    /// Runs the fixed-rate duties of one tick.
    pub fn tick(&mut self, now: Instant) {
        self.world.tick();
        self.ticks += 1;

        if self.ticks % self.config.time_update_interval.max(1) == 0 {
            self.broadcast(TimeUpdate {
                world_age: self.world.world_age(),
                time_of_day: self.world.time_of_day(),
            });
        }

        if now.saturating_duration_since(self.last_keep_alive_broadcast) >= self.config.keep_alive_interval() {
            self.last_keep_alive_broadcast = now;
            self.next_keep_alive_id += 1;
            self.broadcast(ServerKeepAlive {
                id: self.next_keep_alive_id,
            });
        }

        let timeout = self.config.keep_alive_timeout();
        let expired: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|connection| now.saturating_duration_since(connection.last_keep_alive) > timeout)
            .map(|connection| connection.id)
            .collect();
        for id in expired {
            info!("Connection {} timed out", id);
            self.disconnect(id, &ProtocolError::TimedOut.to_string());
        }

        self.stream_chunks();

        let player_chunks: Vec<ChunkCoord> = self.players().map(PlayerSession::chunk).collect();
        self.world
            .unload_distant_chunks(&player_chunks, self.config.render_distance);

        self.flush_generated_events();
    }

    /// Reconciles every player's view set with its render distance: drops
    /// chunks that fell out of range and sends missing ones, nearest first,
    /// up to the per-tick budget.
    fn stream_chunks(&mut self) {
        let budget = self.config.chunks_per_tick;
        let ids: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|connection| connection.is_logged_in())
            .map(|connection| connection.id)
            .collect();

        for id in ids {
            let Some(player) = self.player_mut(id) else { continue };
            let center = player.chunk();
            let view_distance = player.view_distance;
            player
                .loaded_chunks
                .retain(|coord| coord.chebyshev_distance(&center) <= view_distance);

            let mut missing: Vec<ChunkCoord> = center
                .square_around(view_distance)
                .filter(|coord| !player.loaded_chunks.contains(coord))
                .collect();
            if missing.is_empty() {
                continue;
            }
            missing.sort_by_key(|coord| {
                (
                    coord.chebyshev_distance(&center),
                    coord.x.abs_diff(center.x) + coord.z.abs_diff(center.z),
                )
            });
            missing.truncate(budget);

            let packets = self.load_chunk_packets(&missing);
            if let Some(connection) = self.connections.get_mut(&id) {
                let sent: Vec<ChunkCoord> = packets
                    .iter()
                    .map(|data| ChunkCoord::new(data.chunk_x, data.chunk_z))
                    .collect();
                for data in packets {
                    connection.send(data);
                }
                if let Some(player) = connection.player.as_mut() {
                    player.loaded_chunks.extend(sent);
                }
            }
        }
    }

    /// Disconnects every session and closes the world store.
    pub fn shutdown(mut self) -> Result<(), StoreError> {
        let ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        info!("Disconnecting {} connections", ids.len());
        for id in ids {
            self.disconnect(id, &ProtocolError::ServerClosed.to_string());
        }
        self.flush_generated_events();
        self.world.close()
    }

    // Plugin API

    /// Reads one block, loading or generating its chunk.
    ///
    /// # Returns
    /// Air above or below the world, or the storage error when the chunk
    /// cannot be read.
    pub fn get_block(&mut self, x: i32, y: i32, z: i32) -> Result<BlockId, StoreError> {
        self.world.get_block(x, y, z)
    }

    /// Sets one block and broadcasts the change to every player.
    pub fn set_block(&mut self, x: i32, y: i32, z: i32, block: BlockId) -> bool {
        self.apply_block_change(x, y, z, block)
    }

    /// Sets many blocks and broadcasts the applied ones in a single
    /// MultiBlockChange. Returns how many were applied.
    pub fn set_blocks(&mut self, changes: &[BlockChange]) -> usize {
        let applied: Vec<BlockChange> = changes
            .iter()
            .filter(|change| match self.world.set_block(change.x, change.y, change.z, change.block_id) {
                Ok(applied) => applied,
                Err(err) => {
                    warn!("Skipping block change at ({}, {}, {}): {}", change.x, change.y, change.z, err);
                    false
                }
            })
            .cloned()
            .collect();
        let count = applied.len();
        if count > 0 {
            self.broadcast(MultiBlockChange { changes: applied });
        }
        count
    }

    /// Sends a server announcement to every player.
    pub fn broadcast_chat(&self, message: &str) {
        self.broadcast(ChatMessageServer {
            sender: None,
            message: message.to_string(),
        });
    }

    /// Sends a server message to one player. `false` if they are not online.
    pub fn send_chat(&self, username: &str, message: &str) -> bool {
        let target = self.connections.values().find(|connection| {
            connection
                .player
                .as_ref()
                .is_some_and(|player| player.username == username)
        });
        match target {
            Some(connection) => {
                connection.send(ChatMessageServer {
                    sender: None,
                    message: message.to_string(),
                });
                true
            }
            None => false,
        }
    }

    // Internals

    fn player_mut(&mut self, id: ConnectionId) -> Option<&mut PlayerSession> {
        self.connections
            .get_mut(&id)
            .and_then(|connection| connection.player.as_mut())
    }

    fn apply_block_change(&mut self, x: i32, y: i32, z: i32, block: BlockId) -> bool {
        match self.world.set_block(x, y, z, block) {
            Ok(true) => {}
            Ok(false) => return false,
            Err(err) => {
                warn!("Block change at ({}, {}, {}) failed: {}", x, y, z, err);
                return false;
            }
        }
        self.broadcast(BlockChange {
            x,
            y,
            z,
            block_id: block,
        });
        true
    }

    /// Sends `reason`, closes the socket and forgets the connection.
    fn disconnect(&mut self, id: ConnectionId, reason: &str) {
        let Some(mut connection) = self.connections.remove(&id) else {
            return;
        };
        info!("Disconnecting connection {}: {}", id, reason);
        connection.close(reason);
        self.on_removed(connection, reason);
    }

    fn on_removed(&mut self, connection: Connection, reason: &str) {
        let Some(player) = connection.player else {
            return;
        };
        info!("{} left ({})", player.username, reason);
        self.broadcast(DestroyEntities {
            entity_ids: vec![player.entity_id],
        });
        self.broadcast(player_info(&player, PlayerInfoAction::Remove));
        self.emit(ServerEvent::PlayerLeave {
            entity_id: player.entity_id,
            uuid: player.uuid,
            username: player.username,
            reason: reason.to_string(),
        });
    }

    /// Sends to every logged-in player.
    fn broadcast(&self, packet: impl Into<Packet>) {
        let packet = packet.into();
        for connection in self.connections.values().filter(|c| c.is_logged_in()) {
            connection.send(packet.clone());
        }
    }

    /// Sends to every logged-in player except `skip`.
    fn broadcast_except(&self, skip: ConnectionId, packet: impl Into<Packet>) {
        let packet = packet.into();
        for connection in self
            .connections
            .values()
            .filter(|c| c.is_logged_in() && c.id != skip)
        {
            connection.send(packet.clone());
        }
    }

    fn emit(&mut self, event: ServerEvent) {
        if self.events.is_empty() {
            return;
        }
        let mut bus = std::mem::take(&mut self.events);
        bus.dispatch(&event, self);
        bus.append(&mut self.events);
        self.events = bus;
    }

    fn flush_generated_events(&mut self) {
        for coord in self.world.take_generated() {
            self.emit(ServerEvent::ChunkGenerated { coord });
        }
    }
}

fn spawn_player(player: &PlayerSession) -> SpawnPlayer {
    SpawnPlayer {
        entity_id: player.entity_id,
        uuid: player.uuid,
        username: player.username.clone(),
        x: player.position.x,
        y: player.position.y,
        z: player.position.z,
        yaw: player.yaw,
        pitch: player.pitch,
    }
}

fn player_info(player: &PlayerSession, action: PlayerInfoAction) -> PlayerInfo {
    PlayerInfo {
        action,
        uuid: player.uuid,
        username: player.username.clone(),
        entity_id: player.entity_id,
    }
}
