//! Process configuration, read once at startup from the environment.

use std::env;

use crate::error::ServerError;

#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Listening port for both the WebSocket and HTTP surface.
    pub port: u16,
    /// `Room::maxPlayers`, inherited by every room the manager creates.
    pub max_players_per_room: usize,
    /// `RoomManager::minRooms` — the floor below which cleanup never
    /// shrinks the room count.
    pub min_rooms: usize,
    /// Ticks per second for each room's position-broadcast loop.
    pub tick_rate: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 9001,
            max_players_per_room: 100,
            min_rooms: 1,
            tick_rate: 20,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ServerError> {
        let defaults = Self::default();
        Ok(Self {
            port: parse_env("PORT", defaults.port)?,
            max_players_per_room: parse_env("MAX_PLAYERS_PER_ROOM", defaults.max_players_per_room)?,
            min_rooms: parse_env("MIN_ROOMS", defaults.min_rooms)?,
            tick_rate: parse_env("TICK_RATE", defaults.tick_rate)?,
        })
    }
}

fn parse_env<T>(name: &'static str, default: T) -> Result<T, ServerError>
where
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|source| ServerError::InvalidEnvVar { name, value, source }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.port, 9001);
        assert_eq!(cfg.max_players_per_room, 100);
        assert_eq!(cfg.min_rooms, 1);
        assert_eq!(cfg.tick_rate, 20);
    }
}
