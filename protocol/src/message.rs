//! Message decoding (client -> server) and the typed outgoing frames
//! (server -> client). See `spec.md` §4.1 for the contract each type
//! carries.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tags;
use crate::types::{Creature, PlayerSnapshot, Position, Rotation};

// ---------------------------------------------------------------------
// Incoming (client -> server)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingIn {
    pub client_time: f64,
}

/// `POSITION` carries a flat record; rotation fields default to 0 when
/// absent and `scale` is optional (an absent or out-of-range scale simply
/// leaves the player's stored scale untouched).
#[derive(Debug, Clone, Deserialize)]
pub struct PositionIn {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub rx: f64,
    #[serde(default)]
    pub ry: f64,
    #[serde(default)]
    pub rz: f64,
    pub scale: Option<f64>,
}

impl PositionIn {
    pub fn position(&self) -> Position {
        Position {
            x: self.x,
            y: self.y,
            z: self.z,
        }
    }

    pub fn rotation(&self) -> Rotation {
        Rotation {
            rx: self.rx,
            ry: self.ry,
            rz: self.rz,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGameIn {
    pub creature: Creature,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatureUpdateIn {
    pub creature: Creature,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EatNpcIn {
    pub npc_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcSnapshotIn {
    pub tick: f64,
    pub fish: Value,
}

/// Shared shape for `ABILITY_START` and `ABILITY_STOP`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilityIn {
    pub ability: String,
    pub color: Option<Value>,
    pub terrain: Option<Value>,
    pub mimic_seed: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrismPlaceIn {
    pub prism_id: String,
    pub position: Position,
    pub quaternion: Value,
    pub length: Option<f64>,
    pub radius: Option<f64>,
    pub color: Option<Value>,
    pub roughness: Option<f64>,
    pub metalness: Option<f64>,
    pub emissive: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrismRemoveIn {
    pub prism_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatIn {
    pub text: String,
    pub is_emoji: Option<bool>,
    pub show_proximity: Option<bool>,
}

/// A decoded client frame. `Unknown` covers both "could not even parse a
/// type tag" (`tag == -1`) and "the tag is recognised by the protocol but
/// has no server-side handler" — see DESIGN.md.
#[derive(Debug, Clone)]
pub enum Incoming {
    Ping(PingIn),
    Position(PositionIn),
    JoinGame(JoinGameIn),
    CreatureUpdate(CreatureUpdateIn),
    EatNpc(EatNpcIn),
    NpcSnapshot(NpcSnapshotIn),
    AbilityStart(AbilityIn),
    AbilityStop(AbilityIn),
    PrismPlace(PrismPlaceIn),
    PrismRemove(PrismRemoveIn),
    Chat(ChatIn),
    RequestMapChange,
    Unknown(i64),
}

impl Incoming {
    /// The wire tag this frame carried (or would have carried, for the
    /// `Unknown(-1)` "unparseable" case).
    pub fn tag(&self) -> i64 {
        match self {
            Incoming::Ping(_) => tags::PING,
            Incoming::Position(_) => tags::POSITION,
            Incoming::JoinGame(_) => tags::JOIN_GAME,
            Incoming::CreatureUpdate(_) => tags::CREATURE_UPDATE,
            Incoming::EatNpc(_) => tags::EAT_NPC,
            Incoming::NpcSnapshot(_) => tags::NPC_SNAPSHOT,
            Incoming::AbilityStart(_) => tags::ABILITY_START,
            Incoming::AbilityStop(_) => tags::ABILITY_STOP,
            Incoming::PrismPlace(_) => tags::PRISM_PLACE,
            Incoming::PrismRemove(_) => tags::PRISM_REMOVE,
            Incoming::Chat(_) => tags::CHAT,
            Incoming::RequestMapChange => tags::REQUEST_MAP_CHANGE,
            Incoming::Unknown(tag) => *tag,
        }
    }
}

/// Decode one wire frame. Never fails: anything that isn't valid JSON, or
/// has no readable integer `t`, or has a `t` this protocol doesn't
/// recognise, or fails to deserialize into the shape its `t` implies,
/// becomes `Incoming::Unknown`.
pub fn decode(raw: &str) -> Incoming {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return Incoming::Unknown(-1);
    };
    let Some(tag) = value.get("t").and_then(Value::as_i64) else {
        return Incoming::Unknown(-1);
    };

    let parsed = match tag {
        t if t == tags::PING => serde_json::from_value(value).map(Incoming::Ping),
        t if t == tags::POSITION => serde_json::from_value(value).map(Incoming::Position),
        t if t == tags::JOIN_GAME => serde_json::from_value(value).map(Incoming::JoinGame),
        t if t == tags::CREATURE_UPDATE => {
            serde_json::from_value(value).map(Incoming::CreatureUpdate)
        }
        t if t == tags::EAT_NPC => serde_json::from_value(value).map(Incoming::EatNpc),
        t if t == tags::NPC_SNAPSHOT => serde_json::from_value(value).map(Incoming::NpcSnapshot),
        t if t == tags::ABILITY_START => {
            serde_json::from_value(value).map(Incoming::AbilityStart)
        }
        t if t == tags::ABILITY_STOP => serde_json::from_value(value).map(Incoming::AbilityStop),
        t if t == tags::PRISM_PLACE => serde_json::from_value(value).map(Incoming::PrismPlace),
        t if t == tags::PRISM_REMOVE => serde_json::from_value(value).map(Incoming::PrismRemove),
        t if t == tags::CHAT => serde_json::from_value(value).map(Incoming::Chat),
        t if t == tags::REQUEST_MAP_CHANGE => return Incoming::RequestMapChange,
        other => return Incoming::Unknown(other),
    };
    parsed.unwrap_or(Incoming::Unknown(tag))
}

// ---------------------------------------------------------------------
// Outgoing (server -> client)
// ---------------------------------------------------------------------

/// Serialize an outgoing frame to the JSON text sent over the WebSocket.
/// Outgoing frames are built entirely from server-held state plus
/// already-validated client data, so serialization is not expected to
/// fail.
pub fn encode<T: Serialize>(frame: &T) -> String {
    serde_json::to_string(frame).expect("outgoing frame must serialize")
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeOut {
    pub t: i64,
    pub id: u64,
    pub room_id: String,
    pub world_seed: u32,
    pub npc_seed: u32,
    pub host_id: Option<u64>,
    pub is_host: bool,
    pub players: Vec<PlayerSnapshot>,
    pub dead_npc_ids: Vec<String>,
}

impl WelcomeOut {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u64,
        room_id: String,
        world_seed: u32,
        npc_seed: u32,
        host_id: Option<u64>,
        is_host: bool,
        players: Vec<PlayerSnapshot>,
        dead_npc_ids: Vec<String>,
    ) -> Self {
        Self {
            t: tags::WELCOME,
            id,
            room_id,
            world_seed,
            npc_seed,
            host_id,
            is_host,
            players,
            dead_npc_ids,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerJoinOut {
    pub t: i64,
    pub id: u64,
    pub name: String,
    pub position: Position,
    pub rotation: Rotation,
    pub scale: f64,
    pub creature: Creature,
}

impl PlayerJoinOut {
    pub fn new(
        id: u64,
        name: String,
        position: Position,
        rotation: Rotation,
        scale: f64,
        creature: Creature,
    ) -> Self {
        Self {
            t: tags::PLAYER_JOIN,
            id,
            name,
            position,
            rotation,
            scale,
            creature,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerLeaveOut {
    pub t: i64,
    pub id: u64,
}

impl PlayerLeaveOut {
    pub fn new(id: u64) -> Self {
        Self {
            t: tags::PLAYER_LEAVE,
            id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PongOut {
    pub t: i64,
    pub client_time: f64,
    pub server_time: f64,
}

impl PongOut {
    pub fn new(client_time: f64, server_time: f64) -> Self {
        Self {
            t: tags::PONG,
            client_time,
            server_time,
        }
    }
}

/// One player's sample inside a `BATCH_POSITIONS` frame. Field names match
/// the wire record in `spec.md` §4.2.4 exactly (`s` for scale).
#[derive(Debug, Clone, Serialize)]
pub struct PositionSample {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
    pub s: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchPositionsOut {
    pub t: i64,
    pub time: f64,
    pub p: Vec<PositionSample>,
}

impl BatchPositionsOut {
    pub fn new(time: f64, p: Vec<PositionSample>) -> Self {
        Self {
            t: tags::BATCH_POSITIONS,
            time,
            p,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatureUpdateOut {
    pub t: i64,
    pub id: u64,
    pub creature: Creature,
}

impl CreatureUpdateOut {
    pub fn new(id: u64, creature: Creature) -> Self {
        Self {
            t: tags::CREATURE_UPDATE,
            id,
            creature,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcDeathOut {
    pub t: i64,
    pub npc_id: String,
    pub eaten_by: u64,
}

impl NpcDeathOut {
    pub fn new(npc_id: String, eaten_by: u64) -> Self {
        Self {
            t: tags::NPC_DEATH,
            npc_id,
            eaten_by,
        }
    }
}

/// Relayed verbatim from the host — `tick`/`fish` are forwarded without
/// reinterpretation (spec.md §4.2.2).
#[derive(Debug, Clone, Serialize)]
pub struct NpcSnapshotOut {
    pub t: i64,
    pub tick: f64,
    pub fish: Value,
}

impl NpcSnapshotOut {
    pub fn new(tick: f64, fish: Value) -> Self {
        Self {
            t: tags::NPC_SNAPSHOT,
            tick,
            fish,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostAssignedOut {
    pub t: i64,
    pub is_host: bool,
}

impl HostAssignedOut {
    pub fn new(is_host: bool) -> Self {
        Self {
            t: tags::HOST_ASSIGNED,
            is_host,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostChangedOut {
    pub t: i64,
    pub host_id: u64,
}

impl HostChangedOut {
    pub fn new(host_id: u64) -> Self {
        Self {
            t: tags::HOST_CHANGED,
            host_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapChangeOut {
    pub t: i64,
    pub seed: u32,
    pub requested_by: u64,
}

impl MapChangeOut {
    pub fn new(seed: u32, requested_by: u64) -> Self {
        Self {
            t: tags::MAP_CHANGE,
            seed,
            requested_by,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilityRelayOut {
    pub t: i64,
    pub id: u64,
    pub ability: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terrain: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mimic_seed: Option<i64>,
}

impl AbilityRelayOut {
    pub fn new(tag: i64, id: u64, msg: &AbilityIn) -> Self {
        Self {
            t: tag,
            id,
            ability: msg.ability.clone(),
            color: msg.color.clone(),
            terrain: msg.terrain.clone(),
            mimic_seed: msg.mimic_seed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrismPlaceOut {
    pub t: i64,
    pub id: u64,
    pub prism_id: String,
    pub position: Position,
    pub quaternion: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roughness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metalness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emissive: Option<Value>,
}

impl PrismPlaceOut {
    pub fn new(id: u64, msg: &PrismPlaceIn) -> Self {
        Self {
            t: tags::PRISM_PLACE,
            id,
            prism_id: msg.prism_id.clone(),
            position: msg.position,
            quaternion: msg.quaternion.clone(),
            length: msg.length,
            radius: msg.radius,
            color: msg.color.clone(),
            roughness: msg.roughness,
            metalness: msg.metalness,
            emissive: msg.emissive.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrismRemoveOut {
    pub t: i64,
    pub id: u64,
    pub prism_id: String,
}

impl PrismRemoveOut {
    pub fn new(id: u64, prism_id: String) -> Self {
        Self {
            t: tags::PRISM_REMOVE,
            id,
            prism_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatOut {
    pub t: i64,
    pub sender_id: u64,
    pub sender: String,
    pub text: String,
    pub is_emoji: bool,
    pub show_proximity: bool,
}

impl ChatOut {
    pub fn new(sender_id: u64, sender: String, text: String, is_emoji: bool, show_proximity: bool) -> Self {
        Self {
            t: tags::CHAT,
            sender_id,
            sender,
            text,
            is_emoji,
            show_proximity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_garbage() {
        assert_eq!(decode("not json").tag(), -1);
        assert_eq!(decode("{}").tag(), -1);
        assert_eq!(decode(r#"{"t": "ten"}"#).tag(), -1);
    }

    #[test]
    fn decode_unrecognised_tag_is_unknown_with_tag_preserved() {
        let msg = decode(r#"{"t": 40, "npcId": "n-1"}"#);
        assert!(matches!(msg, Incoming::Unknown(40)));
    }

    #[test]
    fn decode_known_tag_but_wrong_shape_is_unknown() {
        // POSITION requires numeric x/y/z.
        let msg = decode(r#"{"t": 10, "x": "nope", "y": 0, "z": 0}"#);
        assert!(matches!(msg, Incoming::Unknown(10)));
    }

    #[test]
    fn decode_position_defaults_rotation_to_zero() {
        let msg = decode(r#"{"t": 10, "x": 1.0, "y": 2.0, "z": 3.0}"#);
        match msg {
            Incoming::Position(p) => {
                assert_eq!(p.rotation(), Rotation::ZERO);
                assert_eq!(p.scale, None);
            }
            other => panic!("expected Position, got {other:?}"),
        }
    }

    #[test]
    fn decode_request_map_change_has_no_fields() {
        assert!(matches!(decode(r#"{"t": 70}"#), Incoming::RequestMapChange));
    }

    #[test]
    fn welcome_round_trips_through_json() {
        let out = WelcomeOut::new(1, "ocean_1".into(), 12345, 12346, Some(1), true, vec![], vec![]);
        let text = encode(&out);
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["t"], 1);
        assert_eq!(value["worldSeed"], 12345);
        assert_eq!(value["isHost"], true);
    }
}
