//! The wire protocol for the ocean relay server: type tags, message
//! shapes, and the validators applied before any server-side state
//! change. No state, no I/O — just data and pure functions over it.

pub mod message;
pub mod tags;
pub mod types;
pub mod validate;

pub use message::{decode, encode, Incoming};
pub use types::{Creature, PlayerSnapshot, Position, Rotation};
