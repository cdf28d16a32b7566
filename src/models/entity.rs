//! Persisted entity graph.
//!
//! Natural keys:
//!
//! | Entity            | Key                                   |
//! |-------------------|---------------------------------------|
//! | `Player`          | `character_guid`                      |
//! | `CharacterSpec`   | `(class_id, spec_id)`                 |
//! | `RaidType`        | `(map, difficulty, instance_type)`    |
//! | `Raid`            | `raid_id`                             |
//! | `Encounter`       | `(raid_row_id, encounter_entry, start_time)` |
//! | `PlayerEncounter` | `(player_id, encounter_id)`           |

use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::RaidTypeKey;

/// A row read back from the store together with its surrogate id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stored<T> {
    pub id: i64,
    #[serde(flatten)]
    pub value: T,
}

impl<T> Stored<T> {
    pub fn new(id: i64, value: T) -> Self {
        Self { id, value }
    }
}

impl<T> Deref for Stored<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Player {
    pub character_guid: String,
    pub name: String,
    pub race: i32,
    pub class_id: i32,
    /// Derived from `class_id`; backfilled when the class table learns it
    pub class_name: Option<String>,
    pub gender: i32,
    pub level: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CharacterSpec {
    pub class_id: i32,
    pub spec_id: i32,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RaidType {
    pub map: i32,
    pub difficulty: i32,
    pub instance_type: i32,
    pub name: Option<String>,
}

impl RaidType {
    pub fn key(&self) -> RaidTypeKey {
        RaidTypeKey {
            map: self.map,
            difficulty: self.difficulty,
            instance_type: self.instance_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Raid {
    pub raid_id: String,
    pub raid_type_id: i64,
    pub guild_name: Option<String>,
    pub leader_name: Option<String>,
    pub start_time: DateTime<Utc>,
    /// Seconds
    pub total_time: i64,
    pub damage_done: i64,
    pub healing_done: i64,
    pub wipes: i32,
    pub bosses_killed: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Encounter {
    pub raid_row_id: i64,
    pub encounter_entry: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub success: bool,
    pub damage_done: i64,
    pub healing_done: i64,
    pub tanks: i32,
    pub healers: i32,
    pub damagers: i32,
    pub name: Option<String>,
}

impl Encounter {
    /// Fight length in whole seconds; negative when the upstream times are swapped.
    pub fn duration_secs(&self) -> i64 {
        (self.end_time - self.start_time).num_seconds()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerEncounter {
    pub player_id: i64,
    pub encounter_id: i64,
    pub spec_id: Option<i64>,
    pub role: Option<String>,
    pub damage_done: i64,
    pub healing_done: i64,
    pub absorb_done: i64,
    pub dps: f64,
}

/// Damage per second over an encounter; zero for empty or inverted fights.
pub fn dps(damage_done: i64, duration_secs: i64) -> f64 {
    if duration_secs <= 0 {
        0.0
    } else {
        damage_done as f64 / duration_secs as f64
    }
}

/// Row counts per entity table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub players: u64,
    pub character_specs: u64,
    pub raid_types: u64,
    pub raids: u64,
    pub encounters: u64,
    pub player_encounters: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dps() {
        assert_eq!(dps(600_000, 300), 2000.0);
        assert_eq!(dps(600_000, 0), 0.0);
        assert_eq!(dps(600_000, -5), 0.0);
        assert_eq!(dps(0, 120), 0.0);
    }

    #[test]
    fn test_encounter_duration() {
        let encounter = Encounter {
            raid_row_id: 1,
            encounter_entry: 15956,
            start_time: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            end_time: DateTime::from_timestamp(1_700_000_300, 0).unwrap(),
            success: true,
            damage_done: 0,
            healing_done: 0,
            tanks: 0,
            healers: 0,
            damagers: 0,
            name: None,
        };
        assert_eq!(encounter.duration_secs(), 300);
    }

    #[test]
    fn test_stored_derefs_to_value() {
        let spec = Stored::new(
            7,
            CharacterSpec {
                class_id: 8,
                spec_id: 1,
                name: None,
            },
        );
        assert_eq!(spec.id, 7);
        assert_eq!(spec.class_id, 8);
    }
}
