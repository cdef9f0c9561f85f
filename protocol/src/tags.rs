//! Wire type tags, organised by decade as in the original protocol.
//!
//! Each constant is the value carried under the `t` key of a frame. Tags
//! with no corresponding handler in `Room::handle_message` (see DESIGN.md
//! "Open Question resolutions") are still declared here so the full
//! taxonomy is visible in one place, even though nothing server-side ever
//! constructs or matches on them.

// 1-9: connection lifecycle.
pub const WELCOME: i64 = 1;
pub const PLAYER_JOIN: i64 = 2;
pub const PLAYER_LEAVE: i64 = 3;
pub const PING: i64 = 4;
pub const PONG: i64 = 5;

// 10-19: movement.
pub const POSITION: i64 = 10;
pub const BATCH_POSITIONS: i64 = 11;

// 20-29: creature.
pub const JOIN_GAME: i64 = 20;
pub const CREATURE_UPDATE: i64 = 21;
/// Declared, never dispatched — see DESIGN.md.
pub const SIZE_UPDATE: i64 = 22;

// 30-39: NPCs.
/// Declared, never dispatched — see DESIGN.md.
pub const NPC_SPAWN: i64 = 30;
/// Declared, never dispatched — see DESIGN.md.
pub const NPC_BATCH_SPAWN: i64 = 31;
pub const NPC_DEATH: i64 = 32;
pub const EAT_NPC: i64 = 33;
pub const NPC_SNAPSHOT: i64 = 34;
pub const HOST_ASSIGNED: i64 = 35;
pub const HOST_CHANGED: i64 = 36;

// 40-49: PvP, reserved (spec.md §4.2.2, §9).
/// Reserved, currently ignored — see DESIGN.md.
pub const EAT_PLAYER: i64 = 40;
/// Declared, never dispatched — see DESIGN.md.
pub const PLAYER_EATEN: i64 = 41;
/// Declared, never dispatched — see DESIGN.md.
pub const PLAYER_DIED: i64 = 42;
/// Declared, never dispatched — see DESIGN.md.
pub const PLAYER_RESPAWN: i64 = 43;

// 60-69: declared but unhandled room operations.
/// Declared, never dispatched — see DESIGN.md and spec.md §9.
pub const SWITCH_ROOM: i64 = 62;

// 70-79: world sync.
pub const REQUEST_MAP_CHANGE: i64 = 70;
pub const MAP_CHANGE: i64 = 71;

// 80-89: abilities.
pub const ABILITY_START: i64 = 80;
pub const ABILITY_STOP: i64 = 81;

// 90-99: structures / chat. spec.md names these without assigning numbers;
// fixed here to the first free slots in the decade (see DESIGN.md).
pub const PRISM_PLACE: i64 = 90;
pub const PRISM_REMOVE: i64 = 91;
pub const CHAT: i64 = 92;

/// The closed set of ability identifiers `ABILITY_START`/`ABILITY_STOP`
/// may name.
pub const VALID_ABILITIES: [&str; 4] = ["sprinter", "stacker", "camper", "attacker"];
