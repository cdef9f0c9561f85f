//! Shared value types carried inside protocol messages.

use serde::{Deserialize, Serialize};

/// A position in world space. Bounds are enforced by
/// [`crate::validate::is_valid_position`], not by this type itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    /// The position every newly admitted player starts at.
    pub const SPAWN: Position = Position {
        x: 0.0,
        y: 10.0,
        z: 0.0,
    };
}

/// Euler-like rotation. Any real value is accepted; there is no bound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    #[serde(default)]
    pub rx: f64,
    #[serde(default)]
    pub ry: f64,
    #[serde(default)]
    pub rz: f64,
}

impl Rotation {
    pub const ZERO: Rotation = Rotation {
        rx: 0.0,
        ry: 0.0,
        rz: 0.0,
    };
}

/// A bound creature, as submitted by a client in `JOIN_GAME` or
/// `CREATURE_UPDATE` and as echoed back to everyone else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creature {
    #[serde(rename = "type")]
    pub creature_type: String,
    pub class: String,
    #[serde(default)]
    pub variant: u32,
    pub seed: i64,
}

/// The subset of a player's state that the welcome snapshot and
/// `PLAYER_JOIN` broadcasts publish to other players.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: u64,
    pub name: String,
    pub position: Position,
    pub rotation: Rotation,
    pub scale: f64,
    pub creature: Option<Creature>,
}
