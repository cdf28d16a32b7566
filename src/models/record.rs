//! Raw upstream records and their typed decodings.
//!
//! Every scalar arrives loosely typed; `decode()` turns a record into a typed
//! row or a `FieldParse` error naming the offending field, so one bad record
//! never takes the rest of its batch down with it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::utils::{
    loose_string, parse_epoch, parse_field, parse_flag, parse_optional, parse_text,
};

/// Ladder selection criteria sent with every ladder page request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LadderFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,

    /// Guild name filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild: Option<String>,
}

/// Identity of a raid type: `(map, difficulty, instanceType)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RaidTypeKey {
    pub map: i32,
    pub difficulty: i32,
    pub instance_type: i32,
}

/// A ladder entry as returned by the panel.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaidRecord {
    #[serde(default, deserialize_with = "loose_string")]
    pub raid_id: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub map: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub difficulty: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub instance_type: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub guild_name: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub leader_name: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub start_time: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub total_time: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub damage_done: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub healing_done: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub wipes: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub bosses_killed: Option<String>,
}

/// Typed form of [`RaidRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct RaidRow {
    pub raid_id: String,
    pub raid_type: RaidTypeKey,
    pub guild_name: Option<String>,
    pub leader_name: Option<String>,
    pub start_time: DateTime<Utc>,
    pub total_time: i64,
    pub damage_done: i64,
    pub healing_done: i64,
    pub wipes: i32,
    pub bosses_killed: i32,
}

impl RaidRecord {
    const KIND: &'static str = "raid";

    pub fn decode(&self) -> Result<RaidRow> {
        let raid_id = parse_text(self.raid_id.as_deref())
            .ok_or_else(|| AppError::field(Self::KIND, "raidId", "<missing>"))?;
        let raid_type = RaidTypeKey {
            map: parse_field(Self::KIND, "map", self.map.as_deref())?,
            difficulty: parse_field(Self::KIND, "difficulty", self.difficulty.as_deref())?,
            // Ladder rows for plain raids omit the instance type.
            instance_type: parse_optional(Self::KIND, "instanceType", self.instance_type.as_deref())?
                .unwrap_or(0),
        };

        Ok(RaidRow {
            raid_id,
            raid_type,
            guild_name: parse_text(self.guild_name.as_deref()),
            leader_name: parse_text(self.leader_name.as_deref()),
            start_time: parse_epoch(Self::KIND, "startTime", self.start_time.as_deref())?,
            total_time: count(Self::KIND, "totalTime", &self.total_time)?,
            damage_done: count(Self::KIND, "damageDone", &self.damage_done)?,
            healing_done: count(Self::KIND, "healingDone", &self.healing_done)?,
            wipes: count(Self::KIND, "wipes", &self.wipes)?,
            bosses_killed: count(Self::KIND, "bossesKilled", &self.bosses_killed)?,
        })
    }
}

/// One boss attempt inside a raid, as returned by the encounter listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncounterRecord {
    #[serde(default, deserialize_with = "loose_string")]
    pub raid_id: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub encounter_entry: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub start_time: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub end_time: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub success: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub damage_done: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub healing_done: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub tanks: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub healers: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub damagers: Option<String>,
}

/// Typed form of [`EncounterRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct EncounterRow {
    pub raid_id: String,
    pub encounter_entry: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub success: bool,
    pub damage_done: i64,
    pub healing_done: i64,
    pub tanks: i32,
    pub healers: i32,
    pub damagers: i32,
}

impl EncounterRow {
    /// Batch-level identity: `(raidId, encounterEntry, startTime)`.
    pub fn key(&self) -> EncounterKey {
        EncounterKey {
            raid_id: self.raid_id.clone(),
            encounter_entry: self.encounter_entry,
            start_time: self.start_time.timestamp(),
        }
    }
}

impl EncounterRecord {
    const KIND: &'static str = "encounter";

    pub fn decode(&self) -> Result<EncounterRow> {
        let raid_id = parse_text(self.raid_id.as_deref())
            .ok_or_else(|| AppError::field(Self::KIND, "raidId", "<missing>"))?;

        Ok(EncounterRow {
            raid_id,
            encounter_entry: parse_field(
                Self::KIND,
                "encounterEntry",
                self.encounter_entry.as_deref(),
            )?,
            start_time: parse_epoch(Self::KIND, "startTime", self.start_time.as_deref())?,
            end_time: parse_epoch(Self::KIND, "endTime", self.end_time.as_deref())?,
            success: parse_flag(Self::KIND, "success", self.success.as_deref())?,
            damage_done: count(Self::KIND, "damageDone", &self.damage_done)?,
            healing_done: count(Self::KIND, "healingDone", &self.healing_done)?,
            tanks: count(Self::KIND, "tanks", &self.tanks)?,
            healers: count(Self::KIND, "healers", &self.healers)?,
            damagers: count(Self::KIND, "damagers", &self.damagers)?,
        })
    }
}

/// Identity of an encounter inside one batch, before the raid row exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncounterKey {
    pub raid_id: String,
    pub encounter_entry: i32,
    /// Unix seconds
    pub start_time: i64,
}

/// One player's line in an encounter roster.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerEncounterRecord {
    #[serde(default, deserialize_with = "loose_string")]
    pub raid_id: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub encounter_entry: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub start_time: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub character_guid: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub race: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub class_id: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub spec_id: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub gender: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub level: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub damage_done: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub healing_done: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub absorb_done: Option<String>,
}

/// Character attributes carried by a roster line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRow {
    pub character_guid: String,
    pub name: String,
    pub race: i32,
    pub class_id: i32,
    pub gender: i32,
    pub level: i32,
}

/// Typed form of [`PlayerEncounterRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerEncounterRow {
    pub encounter: EncounterKey,
    pub player: PlayerRow,
    pub spec_id: Option<i32>,
    pub role: Option<String>,
    pub damage_done: i64,
    pub healing_done: i64,
    pub absorb_done: i64,
}

impl PlayerEncounterRecord {
    const KIND: &'static str = "player encounter";

    /// True when this roster line belongs to the given encounter.
    ///
    /// Lines whose key fields do not parse never match.
    pub fn belongs_to(&self, encounter_entry: i32, start_time: i64) -> bool {
        let entry = parse_field::<i32>(Self::KIND, "encounterEntry", self.encounter_entry.as_deref());
        let start = parse_field::<i64>(Self::KIND, "startTime", self.start_time.as_deref());
        matches!((entry, start), (Ok(e), Ok(s)) if e == encounter_entry && s == start_time)
    }

    pub fn decode(&self) -> Result<PlayerEncounterRow> {
        let raid_id = parse_text(self.raid_id.as_deref())
            .ok_or_else(|| AppError::field(Self::KIND, "raidId", "<missing>"))?;
        let character_guid = parse_text(self.character_guid.as_deref()).ok_or_else(|| {
            AppError::field(Self::KIND, "characterGuid", "<missing>")
        })?;

        let encounter = EncounterKey {
            raid_id,
            encounter_entry: parse_field(
                Self::KIND,
                "encounterEntry",
                self.encounter_entry.as_deref(),
            )?,
            start_time: parse_field(Self::KIND, "startTime", self.start_time.as_deref())?,
        };

        let player = PlayerRow {
            name: parse_text(self.name.as_deref()).unwrap_or_else(|| character_guid.clone()),
            character_guid,
            race: count(Self::KIND, "race", &self.race)?,
            class_id: parse_field(Self::KIND, "classId", self.class_id.as_deref())?,
            gender: count(Self::KIND, "gender", &self.gender)?,
            level: count(Self::KIND, "level", &self.level)?,
        };

        Ok(PlayerEncounterRow {
            encounter,
            player,
            spec_id: parse_optional(Self::KIND, "specId", self.spec_id.as_deref())?,
            role: parse_text(self.role.as_deref()),
            damage_done: count(Self::KIND, "damageDone", &self.damage_done)?,
            healing_done: count(Self::KIND, "healingDone", &self.healing_done)?,
            absorb_done: count(Self::KIND, "absorbDone", &self.absorb_done)?,
        })
    }
}

/// Optional counter: blank is zero, garbage is an error.
fn count<T: std::str::FromStr + Default>(
    record: &'static str,
    field: &'static str,
    raw: &Option<String>,
) -> Result<T> {
    Ok(parse_optional(record, field, raw.as_deref())?.unwrap_or_default())
}

/// One unit of work for the resolver: raids with their encounters and rosters.
#[derive(Debug, Clone, Default)]
pub struct RaidBatch {
    pub raids: Vec<RaidRecord>,
    pub encounters: Vec<EncounterRecord>,
    pub players: Vec<PlayerEncounterRecord>,
}
