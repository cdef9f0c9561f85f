//! Structural validators, called before any state change. Each is a total
//! function over an already-typed value — decoding has already rejected
//! anything of the wrong shape or kind.

use crate::tags::VALID_ABILITIES;
use crate::types::{Creature, Position};

/// `|x|,|z| <= 1000`, `|y| <= 100`, all three finite. `spec.md` §8 resolves
/// the boundary explicitly: the bound is inclusive (`<=`, not `<`).
pub fn is_valid_position(p: &Position) -> bool {
    p.x.is_finite()
        && p.y.is_finite()
        && p.z.is_finite()
        && p.x.abs() <= 1000.0
        && p.z.abs() <= 1000.0
        && p.y.abs() <= 100.0
}

/// Strictly within `(0, 100)`.
pub fn is_valid_scale(scale: f64) -> bool {
    scale.is_finite() && scale > 0.0 && scale < 100.0
}

/// Non-empty `type`/`class`. `seed` is already a typed integer by the time
/// this runs, so there is nothing further to check on it.
pub fn is_valid_creature(c: &Creature) -> bool {
    !c.creature_type.trim().is_empty() && !c.class.trim().is_empty()
}

/// `fish` must be present as a JSON array; its elements are not
/// individually re-validated (performance — see spec.md §4.1).
pub fn is_valid_npc_snapshot(fish: &serde_json::Value) -> bool {
    fish.is_array()
}

/// `ability` must be one of the closed set the protocol recognises.
pub fn is_valid_ability(ability: &str) -> bool {
    VALID_ABILITIES.contains(&ability)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(x: f64, y: f64, z: f64) -> Position {
        Position { x, y, z }
    }

    #[test]
    fn position_bounds_are_inclusive() {
        assert!(is_valid_position(&pos(1000.0, 0.0, -1000.0)));
        assert!(is_valid_position(&pos(0.0, 100.0, 0.0)));
        assert!(!is_valid_position(&pos(1000.01, 0.0, 0.0)));
        assert!(!is_valid_position(&pos(0.0, 100.01, 0.0)));
    }

    #[test]
    fn position_rejects_non_finite() {
        assert!(!is_valid_position(&pos(f64::NAN, 0.0, 0.0)));
        assert!(!is_valid_position(&pos(f64::INFINITY, 0.0, 0.0)));
    }

    #[test]
    fn scale_bounds_are_strict() {
        assert!(!is_valid_scale(0.0));
        assert!(!is_valid_scale(100.0));
        assert!(is_valid_scale(0.01));
        assert!(is_valid_scale(99.9));
    }

    #[test]
    fn creature_requires_non_empty_type_and_class() {
        let good = Creature {
            creature_type: "fish".into(),
            class: "tuna".into(),
            variant: 0,
            seed: 7,
        };
        assert!(is_valid_creature(&good));

        let empty_type = Creature {
            creature_type: "".into(),
            ..good.clone()
        };
        assert!(!is_valid_creature(&empty_type));

        let blank_class = Creature {
            class: "   ".into(),
            ..good
        };
        assert!(!is_valid_creature(&blank_class));
    }

    #[test]
    fn npc_snapshot_requires_array_fish() {
        assert!(is_valid_npc_snapshot(&serde_json::json!([1, 2, 3])));
        assert!(is_valid_npc_snapshot(&serde_json::json!([])));
        assert!(!is_valid_npc_snapshot(&serde_json::json!({"a": 1})));
        assert!(!is_valid_npc_snapshot(&serde_json::Value::Null));
    }

    #[test]
    fn ability_must_be_in_closed_set() {
        assert!(is_valid_ability("sprinter"));
        assert!(is_valid_ability("attacker"));
        assert!(!is_valid_ability("invisibility"));
        assert!(!is_valid_ability(""));
    }
}
