// src/storage/sqlite.rs

//! SQLite-backed `RaidStore` with durable persistence.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{
    CharacterSpec, Encounter, Player, PlayerEncounter, Raid, RaidType, RaidTypeKey, Stored,
    TableCounts,
};
use crate::storage::RaidStore;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS players (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    character_guid TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    race INTEGER NOT NULL,
    class_id INTEGER NOT NULL,
    class_name TEXT NULL,
    gender INTEGER NOT NULL,
    level INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS character_specs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    class_id INTEGER NOT NULL,
    spec_id INTEGER NOT NULL,
    name TEXT NULL,
    UNIQUE (class_id, spec_id)
);

CREATE TABLE IF NOT EXISTS raid_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    map INTEGER NOT NULL,
    difficulty INTEGER NOT NULL,
    instance_type INTEGER NOT NULL,
    name TEXT NULL,
    UNIQUE (map, difficulty, instance_type)
);

CREATE TABLE IF NOT EXISTS raids (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    raid_id TEXT NOT NULL UNIQUE,
    raid_type_id INTEGER NOT NULL REFERENCES raid_types(id),
    guild_name TEXT NULL,
    leader_name TEXT NULL,
    start_time INTEGER NOT NULL,
    total_time INTEGER NOT NULL,
    damage_done INTEGER NOT NULL,
    healing_done INTEGER NOT NULL,
    wipes INTEGER NOT NULL,
    bosses_killed INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS encounters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    raid_row_id INTEGER NOT NULL REFERENCES raids(id),
    encounter_entry INTEGER NOT NULL,
    start_time INTEGER NOT NULL,
    end_time INTEGER NOT NULL,
    success INTEGER NOT NULL,
    damage_done INTEGER NOT NULL,
    healing_done INTEGER NOT NULL,
    tanks INTEGER NOT NULL,
    healers INTEGER NOT NULL,
    damagers INTEGER NOT NULL,
    name TEXT NULL,
    UNIQUE (raid_row_id, encounter_entry, start_time)
);

CREATE TABLE IF NOT EXISTS player_encounters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    player_id INTEGER NOT NULL REFERENCES players(id),
    encounter_id INTEGER NOT NULL REFERENCES encounters(id),
    spec_id INTEGER NULL REFERENCES character_specs(id),
    role TEXT NULL,
    damage_done INTEGER NOT NULL,
    healing_done INTEGER NOT NULL,
    absorb_done INTEGER NOT NULL,
    dps REAL NOT NULL,
    UNIQUE (player_id, encounter_id)
);

CREATE INDEX IF NOT EXISTS idx_encounters_raid ON encounters (raid_row_id);
CREATE INDEX IF NOT EXISTS idx_player_encounters_encounter ON player_encounters (encounter_id);
"#;

/// Persistent store backed by a single SQLite connection.
#[derive(Debug)]
pub struct SqliteStore {
    connection: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, creating the schema if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        log::debug!("Opening database {}", path.display());
        Self::with_connection(Connection::open(path)?)
    }

    /// Private in-memory database.
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(connection: Connection) -> Result<Self> {
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;
        connection.execute_batch(SCHEMA)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }
}

/// Translate a unique-constraint violation into a conflict on `entity`.
fn conflict_or(error: rusqlite::Error, entity: &'static str, key: impl FnOnce() -> String) -> AppError {
    match &error {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
                && failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            AppError::conflict(entity, key())
        }
        _ => AppError::Sqlite(error),
    }
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(idx)?;
    DateTime::from_timestamp(secs, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, secs))
}

fn ensure_updated(changed: usize, table: &str, id: i64) -> Result<()> {
    if changed == 0 {
        return Err(AppError::validation(format!("no {table} row with id {id}")));
    }
    Ok(())
}

fn player_from_row(row: &Row<'_>) -> rusqlite::Result<Stored<Player>> {
    Ok(Stored::new(
        row.get(0)?,
        Player {
            character_guid: row.get(1)?,
            name: row.get(2)?,
            race: row.get(3)?,
            class_id: row.get(4)?,
            class_name: row.get(5)?,
            gender: row.get(6)?,
            level: row.get(7)?,
        },
    ))
}

fn raid_from_row(row: &Row<'_>) -> rusqlite::Result<Stored<Raid>> {
    Ok(Stored::new(
        row.get(0)?,
        Raid {
            raid_id: row.get(1)?,
            raid_type_id: row.get(2)?,
            guild_name: row.get(3)?,
            leader_name: row.get(4)?,
            start_time: timestamp(row, 5)?,
            total_time: row.get(6)?,
            damage_done: row.get(7)?,
            healing_done: row.get(8)?,
            wipes: row.get(9)?,
            bosses_killed: row.get(10)?,
        },
    ))
}

fn encounter_from_row(row: &Row<'_>) -> rusqlite::Result<Stored<Encounter>> {
    Ok(Stored::new(
        row.get(0)?,
        Encounter {
            raid_row_id: row.get(1)?,
            encounter_entry: row.get(2)?,
            start_time: timestamp(row, 3)?,
            end_time: timestamp(row, 4)?,
            success: row.get(5)?,
            damage_done: row.get(6)?,
            healing_done: row.get(7)?,
            tanks: row.get(8)?,
            healers: row.get(9)?,
            damagers: row.get(10)?,
            name: row.get(11)?,
        },
    ))
}

fn player_encounter_from_row(row: &Row<'_>) -> rusqlite::Result<Stored<PlayerEncounter>> {
    Ok(Stored::new(
        row.get(0)?,
        PlayerEncounter {
            player_id: row.get(1)?,
            encounter_id: row.get(2)?,
            spec_id: row.get(3)?,
            role: row.get(4)?,
            damage_done: row.get(5)?,
            healing_done: row.get(6)?,
            absorb_done: row.get(7)?,
            dps: row.get(8)?,
        },
    ))
}

fn count(connection: &Connection, table: &str) -> Result<u64> {
    let n: i64 = connection.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })?;
    Ok(n as u64)
}

#[async_trait]
impl RaidStore for SqliteStore {
    async fn find_player(&self, character_guid: &str) -> Result<Option<Stored<Player>>> {
        let connection = self.connection.lock().await;
        let player = connection
            .query_row(
                "SELECT id, character_guid, name, race, class_id, class_name, gender, level
                 FROM players WHERE character_guid = ?1",
                params![character_guid],
                player_from_row,
            )
            .optional()?;
        Ok(player)
    }

    async fn insert_player(&self, player: &Player) -> Result<Stored<Player>> {
        let connection = self.connection.lock().await;
        connection
            .execute(
                "INSERT INTO players (character_guid, name, race, class_id, class_name, gender, level)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    player.character_guid,
                    player.name,
                    player.race,
                    player.class_id,
                    player.class_name,
                    player.gender,
                    player.level,
                ],
            )
            .map_err(|e| conflict_or(e, "player", || player.character_guid.clone()))?;
        Ok(Stored::new(connection.last_insert_rowid(), player.clone()))
    }

    async fn set_player_class_name(&self, id: i64, class_name: &str) -> Result<()> {
        let connection = self.connection.lock().await;
        let changed = connection.execute(
            "UPDATE players SET class_name = ?1 WHERE id = ?2",
            params![class_name, id],
        )?;
        ensure_updated(changed, "player", id)
    }

    async fn find_character_spec(
        &self,
        class_id: i32,
        spec_id: i32,
    ) -> Result<Option<Stored<CharacterSpec>>> {
        let connection = self.connection.lock().await;
        let spec = connection
            .query_row(
                "SELECT id, class_id, spec_id, name FROM character_specs
                 WHERE class_id = ?1 AND spec_id = ?2",
                params![class_id, spec_id],
                |row| {
                    Ok(Stored::new(
                        row.get(0)?,
                        CharacterSpec {
                            class_id: row.get(1)?,
                            spec_id: row.get(2)?,
                            name: row.get(3)?,
                        },
                    ))
                },
            )
            .optional()?;
        Ok(spec)
    }

    async fn insert_character_spec(&self, spec: &CharacterSpec) -> Result<Stored<CharacterSpec>> {
        let connection = self.connection.lock().await;
        connection
            .execute(
                "INSERT INTO character_specs (class_id, spec_id, name) VALUES (?1, ?2, ?3)",
                params![spec.class_id, spec.spec_id, spec.name],
            )
            .map_err(|e| {
                conflict_or(e, "character spec", || {
                    format!("{}/{}", spec.class_id, spec.spec_id)
                })
            })?;
        Ok(Stored::new(connection.last_insert_rowid(), spec.clone()))
    }

    async fn set_character_spec_name(&self, id: i64, name: &str) -> Result<()> {
        let connection = self.connection.lock().await;
        let changed = connection.execute(
            "UPDATE character_specs SET name = ?1 WHERE id = ?2",
            params![name, id],
        )?;
        ensure_updated(changed, "character spec", id)
    }

    async fn find_raid_type(&self, key: RaidTypeKey) -> Result<Option<Stored<RaidType>>> {
        let connection = self.connection.lock().await;
        let raid_type = connection
            .query_row(
                "SELECT id, map, difficulty, instance_type, name FROM raid_types
                 WHERE map = ?1 AND difficulty = ?2 AND instance_type = ?3",
                params![key.map, key.difficulty, key.instance_type],
                |row| {
                    Ok(Stored::new(
                        row.get(0)?,
                        RaidType {
                            map: row.get(1)?,
                            difficulty: row.get(2)?,
                            instance_type: row.get(3)?,
                            name: row.get(4)?,
                        },
                    ))
                },
            )
            .optional()?;
        Ok(raid_type)
    }

    async fn insert_raid_type(&self, raid_type: &RaidType) -> Result<Stored<RaidType>> {
        let connection = self.connection.lock().await;
        connection
            .execute(
                "INSERT INTO raid_types (map, difficulty, instance_type, name)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    raid_type.map,
                    raid_type.difficulty,
                    raid_type.instance_type,
                    raid_type.name,
                ],
            )
            .map_err(|e| conflict_or(e, "raid type", || format!("{:?}", raid_type.key())))?;
        Ok(Stored::new(connection.last_insert_rowid(), raid_type.clone()))
    }

    async fn set_raid_type_name(&self, id: i64, name: &str) -> Result<()> {
        let connection = self.connection.lock().await;
        let changed = connection.execute(
            "UPDATE raid_types SET name = ?1 WHERE id = ?2",
            params![name, id],
        )?;
        ensure_updated(changed, "raid type", id)
    }

    async fn find_raid(&self, raid_id: &str) -> Result<Option<Stored<Raid>>> {
        let connection = self.connection.lock().await;
        let raid = connection
            .query_row(
                "SELECT id, raid_id, raid_type_id, guild_name, leader_name, start_time,
                        total_time, damage_done, healing_done, wipes, bosses_killed
                 FROM raids WHERE raid_id = ?1",
                params![raid_id],
                raid_from_row,
            )
            .optional()?;
        Ok(raid)
    }

    async fn insert_raid(&self, raid: &Raid) -> Result<Stored<Raid>> {
        let connection = self.connection.lock().await;
        connection
            .execute(
                "INSERT INTO raids (raid_id, raid_type_id, guild_name, leader_name, start_time,
                                    total_time, damage_done, healing_done, wipes, bosses_killed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    raid.raid_id,
                    raid.raid_type_id,
                    raid.guild_name,
                    raid.leader_name,
                    raid.start_time.timestamp(),
                    raid.total_time,
                    raid.damage_done,
                    raid.healing_done,
                    raid.wipes,
                    raid.bosses_killed,
                ],
            )
            .map_err(|e| conflict_or(e, "raid", || raid.raid_id.clone()))?;
        Ok(Stored::new(connection.last_insert_rowid(), raid.clone()))
    }

    async fn find_encounter(
        &self,
        raid_row_id: i64,
        encounter_entry: i32,
        start_time: DateTime<Utc>,
    ) -> Result<Option<Stored<Encounter>>> {
        let connection = self.connection.lock().await;
        let encounter = connection
            .query_row(
                "SELECT id, raid_row_id, encounter_entry, start_time, end_time, success,
                        damage_done, healing_done, tanks, healers, damagers, name
                 FROM encounters
                 WHERE raid_row_id = ?1 AND encounter_entry = ?2 AND start_time = ?3",
                params![raid_row_id, encounter_entry, start_time.timestamp()],
                encounter_from_row,
            )
            .optional()?;
        Ok(encounter)
    }

    async fn insert_encounter(&self, encounter: &Encounter) -> Result<Stored<Encounter>> {
        let connection = self.connection.lock().await;
        connection
            .execute(
                "INSERT INTO encounters (raid_row_id, encounter_entry, start_time, end_time,
                                         success, damage_done, healing_done, tanks, healers,
                                         damagers, name)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    encounter.raid_row_id,
                    encounter.encounter_entry,
                    encounter.start_time.timestamp(),
                    encounter.end_time.timestamp(),
                    encounter.success,
                    encounter.damage_done,
                    encounter.healing_done,
                    encounter.tanks,
                    encounter.healers,
                    encounter.damagers,
                    encounter.name,
                ],
            )
            .map_err(|e| {
                conflict_or(e, "encounter", || {
                    format!(
                        "{}/{}/{}",
                        encounter.raid_row_id,
                        encounter.encounter_entry,
                        encounter.start_time.timestamp()
                    )
                })
            })?;
        Ok(Stored::new(connection.last_insert_rowid(), encounter.clone()))
    }

    async fn set_encounter_name(&self, id: i64, name: &str) -> Result<()> {
        let connection = self.connection.lock().await;
        let changed = connection.execute(
            "UPDATE encounters SET name = ?1 WHERE id = ?2",
            params![name, id],
        )?;
        ensure_updated(changed, "encounter", id)
    }

    async fn find_player_encounter(
        &self,
        player_id: i64,
        encounter_id: i64,
    ) -> Result<Option<Stored<PlayerEncounter>>> {
        let connection = self.connection.lock().await;
        let player_encounter = connection
            .query_row(
                "SELECT id, player_id, encounter_id, spec_id, role, damage_done,
                        healing_done, absorb_done, dps
                 FROM player_encounters WHERE player_id = ?1 AND encounter_id = ?2",
                params![player_id, encounter_id],
                player_encounter_from_row,
            )
            .optional()?;
        Ok(player_encounter)
    }

    async fn insert_player_encounter(
        &self,
        player_encounter: &PlayerEncounter,
    ) -> Result<Stored<PlayerEncounter>> {
        let connection = self.connection.lock().await;
        connection
            .execute(
                "INSERT INTO player_encounters (player_id, encounter_id, spec_id, role,
                                                damage_done, healing_done, absorb_done, dps)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    player_encounter.player_id,
                    player_encounter.encounter_id,
                    player_encounter.spec_id,
                    player_encounter.role,
                    player_encounter.damage_done,
                    player_encounter.healing_done,
                    player_encounter.absorb_done,
                    player_encounter.dps,
                ],
            )
            .map_err(|e| {
                conflict_or(e, "player encounter", || {
                    format!("{}/{}", player_encounter.player_id, player_encounter.encounter_id)
                })
            })?;
        Ok(Stored::new(
            connection.last_insert_rowid(),
            player_encounter.clone(),
        ))
    }

    async fn counts(&self) -> Result<TableCounts> {
        let connection = self.connection.lock().await;
        Ok(TableCounts {
            players: count(&connection, "players")?,
            character_specs: count(&connection, "character_specs")?,
            raid_types: count(&connection, "raid_types")?,
            raids: count(&connection, "raids")?,
            encounters: count(&connection, "encounters")?,
            player_encounters: count(&connection, "player_encounters")?,
        })
    }
}
