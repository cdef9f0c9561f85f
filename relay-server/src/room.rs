//! One isolation domain: the player set, host election, seeds, the dead
//! NPC set, and all message dispatch/relay logic. See `spec.md` §4.2.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use protocol::message as msg;
use protocol::{tags, validate, Incoming};
use protocol::{Creature, PlayerSnapshot, Position, Rotation};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};

/// Outbound frames are queued per player; a slow peer drops its own
/// oldest-unread frames (the channel fills and further `try_send`s fail)
/// rather than ever blocking the room (`spec.md` §5).
pub const OUTBOUND_BUFFER_SIZE: usize = 256;

/// Every room starts on this master seed (see DESIGN.md "Open Question
/// resolutions" — inferred from `spec.md` §8 scenario 1). Only
/// `REQUEST_MAP_CHANGE` ever draws a new one.
pub const DEFAULT_MASTER_SEED: u32 = 12345;

pub type OutboundSender = mpsc::Sender<String>;

/// One connected participant in one room.
pub struct Player {
    pub id: u64,
    pub display_name: String,
    pub position: Position,
    pub rotation: Rotation,
    pub scale: f64,
    pub creature: Option<Creature>,
    pub in_game: bool,
    pub last_update: Instant,
    sender: OutboundSender,
    warned_tags: HashSet<i64>,
}

impl Player {
    fn send(&self, frame: String) {
        if let Err(err) = self.sender.try_send(frame) {
            tracing::debug!(player_id = self.id, error = %err, "dropping send to slow or closed player");
        }
    }

    /// Logs at most once per (player, tag) for the lifetime of the
    /// connection, per `spec.md` §4.2.5.
    fn warn_once(&mut self, tag: i64, reason: &str) {
        if self.warned_tags.insert(tag) {
            tracing::warn!(player_id = self.id, tag, reason, "dropping message");
        }
    }

    fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id,
            name: self.display_name.clone(),
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
            creature: self.creature.clone(),
        }
    }
}

/// One isolation domain containing a disjoint set of players.
pub struct Room {
    pub id: String,
    pub max_players: usize,
    pub world_seed: u32,
    pub npc_seed: u32,
    /// Ordered by player id, which doubles as the "stable iteration
    /// order" `spec.md` requires for broadcasts and host migration.
    pub players: BTreeMap<u64, Player>,
    pub next_player_id: u64,
    pub host_id: Option<u64>,
    pub dead_npc_ids: HashSet<String>,
    pub tick_count: u64,
    pub tick_rate: u32,
}

impl Room {
    pub fn new(id: String, max_players: usize, tick_rate: u32) -> Self {
        let world_seed = DEFAULT_MASTER_SEED;
        Self {
            id,
            max_players,
            world_seed,
            npc_seed: derive_npc_seed(world_seed),
            players: BTreeMap::new(),
            next_player_id: 1,
            host_id: None,
            dead_npc_ids: HashSet::new(),
            tick_count: 0,
            tick_rate,
        }
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn has_capacity(&self) -> bool {
        self.players.len() < self.max_players
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Closes every connection this room owns and clears its player map
    /// (`spec.md` §4.2.5). Dropping each player's outbound sender ends
    /// that connection's writer task, which in turn drops the WebSocket
    /// sink; further messages arriving on those connections' reader tasks
    /// find the room already empty and are simply ignored.
    pub fn destroy(&mut self) {
        self.players.clear();
        self.host_id = None;
    }

    /// Admits a new player, sends it `WELCOME`, and assigns it as host if
    /// the room was previously empty. Does **not** broadcast the join —
    /// that happens on `JOIN_GAME` (`spec.md` §4.2.1).
    pub fn add_player(&mut self, display_name: &str, sender: OutboundSender) -> u64 {
        let id = self.next_player_id;
        self.next_player_id += 1;

        let became_host = self.players.is_empty();
        if became_host {
            self.host_id = Some(id);
        }

        let others: Vec<PlayerSnapshot> = self
            .players
            .values()
            .filter(|p| p.in_game)
            .map(Player::snapshot)
            .collect();
        let dead_npc_ids: Vec<String> = self.dead_npc_ids.iter().cloned().collect();

        let welcome = msg::WelcomeOut::new(
            id,
            self.id.clone(),
            self.world_seed,
            self.npc_seed,
            self.host_id,
            became_host,
            others,
            dead_npc_ids,
        );

        let player = Player {
            id,
            display_name: truncate_name(display_name),
            position: Position::SPAWN,
            rotation: Rotation::ZERO,
            scale: 1.0,
            creature: None,
            in_game: false,
            last_update: Instant::now(),
            sender,
            warned_tags: HashSet::new(),
        };
        player.send(msg::encode(&welcome));
        self.players.insert(id, player);
        id
    }

    /// Removes a player, broadcasting `PLAYER_LEAVE` and migrating the
    /// host if it was this player. Returns `true` if the room is now
    /// empty.
    pub fn remove_player(&mut self, player_id: u64) -> bool {
        if self.players.remove(&player_id).is_some() {
            self.broadcast(&msg::PlayerLeaveOut::new(player_id));
            if self.host_id == Some(player_id) {
                self.migrate_host();
            }
        }
        self.players.is_empty()
    }

    /// Picks the smallest remaining player id as the new host — any
    /// deterministic, stable choice satisfies `spec.md` §4.2.3.
    fn migrate_host(&mut self) {
        match self.players.keys().next().copied() {
            Some(new_host_id) => {
                self.host_id = Some(new_host_id);
                if let Some(new_host) = self.players.get(&new_host_id) {
                    new_host.send(msg::encode(&msg::HostAssignedOut::new(true)));
                }
                self.broadcast_except(new_host_id, &msg::HostChangedOut::new(new_host_id));
            }
            None => self.host_id = None,
        }
    }

    /// Dispatches on message type. Unknown types (including anything that
    /// failed to decode) are logged at most once per `(player, tag)` and
    /// dropped — `spec.md` §4.2.1.
    pub fn handle_message(&mut self, sender_id: u64, incoming: Incoming) {
        match incoming {
            Incoming::Ping(ping) => self.handle_ping(sender_id, ping),
            Incoming::Position(position) => self.handle_position(sender_id, position),
            Incoming::JoinGame(join) => self.handle_join_game(sender_id, join),
            Incoming::CreatureUpdate(update) => self.handle_creature_update(sender_id, update),
            Incoming::EatNpc(eat) => self.handle_eat_npc(sender_id, eat),
            Incoming::NpcSnapshot(snapshot) => self.handle_npc_snapshot(sender_id, snapshot),
            Incoming::AbilityStart(ability) => {
                self.handle_ability(sender_id, tags::ABILITY_START, ability)
            }
            Incoming::AbilityStop(ability) => {
                self.handle_ability(sender_id, tags::ABILITY_STOP, ability)
            }
            Incoming::PrismPlace(place) => self.handle_prism_place(sender_id, place),
            Incoming::PrismRemove(remove) => self.handle_prism_remove(sender_id, remove),
            Incoming::Chat(chat) => self.handle_chat(sender_id, chat),
            Incoming::RequestMapChange => self.handle_request_map_change(sender_id),
            Incoming::Unknown(tag) => {
                if let Some(player) = self.players.get_mut(&sender_id) {
                    player.warn_once(tag, "unhandled or unparseable message type");
                }
            }
        }
    }

    fn handle_ping(&self, sender_id: u64, ping: msg::PingIn) {
        let Some(player) = self.players.get(&sender_id) else {
            return;
        };
        player.send(msg::encode(&msg::PongOut::new(ping.client_time, now_millis())));
    }

    fn handle_position(&mut self, sender_id: u64, update: msg::PositionIn) {
        let position = update.position();
        let Some(player) = self.players.get_mut(&sender_id) else {
            return;
        };
        if !validate::is_valid_position(&position) {
            player.warn_once(tags::POSITION, "position out of range or non-finite");
            return;
        }
        player.position = position;
        player.rotation = update.rotation();
        if let Some(scale) = update.scale {
            if validate::is_valid_scale(scale) {
                player.scale = scale;
            }
        }
        player.last_update = Instant::now();
    }

    fn handle_join_game(&mut self, sender_id: u64, join: msg::JoinGameIn) {
        if !validate::is_valid_creature(&join.creature) {
            if let Some(player) = self.players.get_mut(&sender_id) {
                player.warn_once(tags::JOIN_GAME, "invalid creature");
            }
            return;
        }

        let Some(player) = self.players.get_mut(&sender_id) else {
            return;
        };
        if let Some(name) = join.name {
            player.display_name = truncate_name(&name);
        }
        player.creature = Some(join.creature.clone());
        player.in_game = true;

        let out = msg::PlayerJoinOut::new(
            sender_id,
            player.display_name.clone(),
            player.position,
            player.rotation,
            player.scale,
            join.creature,
        );
        self.broadcast_except(sender_id, &out);
    }

    fn handle_creature_update(&mut self, sender_id: u64, update: msg::CreatureUpdateIn) {
        if !validate::is_valid_creature(&update.creature) {
            if let Some(player) = self.players.get_mut(&sender_id) {
                player.warn_once(tags::CREATURE_UPDATE, "invalid creature");
            }
            return;
        }
        let Some(player) = self.players.get_mut(&sender_id) else {
            return;
        };
        player.creature = Some(update.creature.clone());
        self.broadcast_except(
            sender_id,
            &msg::CreatureUpdateOut::new(sender_id, update.creature),
        );
    }

    fn handle_eat_npc(&mut self, sender_id: u64, eat: msg::EatNpcIn) {
        if eat.npc_id.is_empty() {
            if let Some(player) = self.players.get_mut(&sender_id) {
                player.warn_once(tags::EAT_NPC, "empty npcId");
            }
            return;
        }
        if !self.dead_npc_ids.insert(eat.npc_id.clone()) {
            // Already dead: idempotence guard, no rebroadcast.
            return;
        }
        self.broadcast(&msg::NpcDeathOut::new(eat.npc_id, sender_id));
    }

    fn handle_npc_snapshot(&mut self, sender_id: u64, snapshot: msg::NpcSnapshotIn) {
        if self.host_id != Some(sender_id) {
            // Not the (current) host: silently dropped, including stale
            // snapshots from a host that has since migrated away.
            return;
        }
        if !validate::is_valid_npc_snapshot(&snapshot.fish) {
            if let Some(player) = self.players.get_mut(&sender_id) {
                player.warn_once(tags::NPC_SNAPSHOT, "malformed snapshot");
            }
            return;
        }
        let out = msg::NpcSnapshotOut::new(snapshot.tick, snapshot.fish);
        self.broadcast_except(sender_id, &out);
    }

    fn handle_ability(&mut self, sender_id: u64, tag: i64, ability: msg::AbilityIn) {
        if !validate::is_valid_ability(&ability.ability) {
            if let Some(player) = self.players.get_mut(&sender_id) {
                player.warn_once(tag, "ability not in the closed set");
            }
            return;
        }
        let out = msg::AbilityRelayOut::new(tag, sender_id, &ability);
        self.broadcast_except(sender_id, &out);
    }

    fn handle_prism_place(&mut self, sender_id: u64, place: msg::PrismPlaceIn) {
        // prismId/position/quaternion are non-optional fields on
        // PrismPlaceIn, so a frame missing any of them never decodes
        // into this variant in the first place (spec.md §4.2.2).
        let out = msg::PrismPlaceOut::new(sender_id, &place);
        self.broadcast_except(sender_id, &out);
    }

    fn handle_prism_remove(&mut self, sender_id: u64, remove: msg::PrismRemoveIn) {
        let out = msg::PrismRemoveOut::new(sender_id, remove.prism_id);
        self.broadcast_except(sender_id, &out);
    }

    fn handle_chat(&mut self, sender_id: u64, chat: msg::ChatIn) {
        if chat.text.is_empty() {
            return;
        }
        let text: String = chat.text.chars().take(200).collect();
        let Some(player) = self.players.get(&sender_id) else {
            return;
        };
        let out = msg::ChatOut::new(
            sender_id,
            player.display_name.clone(),
            text,
            chat.is_emoji.unwrap_or(false),
            chat.show_proximity.unwrap_or(true),
        );
        self.broadcast_except(sender_id, &out);
    }

    fn handle_request_map_change(&mut self, sender_id: u64) {
        let master_seed: u32 = rand::random();
        self.world_seed = master_seed;
        self.npc_seed = derive_npc_seed(master_seed);
        self.dead_npc_ids.clear();
        self.broadcast(&msg::MapChangeOut::new(master_seed, sender_id));
    }

    /// One tick of the position-broadcast loop — `spec.md` §4.2.4.
    pub fn tick(&mut self) {
        self.tick_count += 1;
        let server_time = now_millis();

        let samples: Vec<msg::PositionSample> = self
            .players
            .values()
            .filter(|p| p.in_game)
            .map(|p| msg::PositionSample {
                id: p.id,
                x: p.position.x,
                y: p.position.y,
                z: p.position.z,
                rx: p.rotation.rx,
                ry: p.rotation.ry,
                rz: p.rotation.rz,
                s: p.scale,
            })
            .collect();

        if !samples.is_empty() {
            self.broadcast(&msg::BatchPositionsOut::new(server_time, samples));
        }

        let log_every = self.tick_rate.max(1) as u64 * 30;
        if self.tick_count % log_every == 0 && !self.players.is_empty() {
            tracing::info!(room_id = %self.id, count = self.players.len(), "players active");
        }
    }

    fn broadcast<T: Serialize>(&self, frame: &T) {
        let text = msg::encode(frame);
        for player in self.players.values() {
            player.send(text.clone());
        }
    }

    fn broadcast_except<T: Serialize>(&self, exclude: u64, frame: &T) {
        let text = msg::encode(frame);
        for player in self.players.values() {
            if player.id != exclude {
                player.send(text.clone());
            }
        }
    }
}

fn derive_npc_seed(master_seed: u32) -> u32 {
    master_seed.wrapping_add(1)
}

fn truncate_name(name: &str) -> String {
    name.trim().chars().take(20).collect()
}

fn now_millis() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

/// Drives one room's tick loop until the surrounding task is aborted (on
/// room destruction). Lives alongside `Room` rather than in `manager.rs`
/// because it only ever touches this room's lock.
pub async fn run_tick_loop(room: Arc<Mutex<Room>>) {
    let tick_rate = room.lock().await.tick_rate.max(1);
    let mut interval = tokio::time::interval(Duration::from_millis(1000 / tick_rate as u64));
    loop {
        interval.tick().await;
        room.lock().await.tick();
    }
}
