//! In-process storage backend.
//!
//! Enforces the same natural-key and reference checks as the SQLite schema.
//! Used for dry runs and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{
    CharacterSpec, Encounter, Player, PlayerEncounter, Raid, RaidType, RaidTypeKey, Stored,
    TableCounts,
};
use crate::storage::RaidStore;

#[derive(Debug, Default, Serialize)]
struct Tables {
    players: Vec<Stored<Player>>,
    character_specs: Vec<Stored<CharacterSpec>>,
    raid_types: Vec<Stored<RaidType>>,
    raids: Vec<Stored<Raid>>,
    encounters: Vec<Stored<Encounter>>,
    player_encounters: Vec<Stored<PlayerEncounter>>,
}

/// Memory-backed store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every table serialized, for whole-store comparisons.
    pub async fn snapshot(&self) -> Result<Value> {
        let tables = self.tables.lock().await;
        Ok(serde_json::to_value(&*tables)?)
    }
}

fn push<T: Clone>(rows: &mut Vec<Stored<T>>, value: &T) -> Stored<T> {
    let stored = Stored::new(rows.len() as i64 + 1, value.clone());
    rows.push(stored.clone());
    stored
}

fn row_mut<'a, T>(
    rows: &'a mut [Stored<T>],
    id: i64,
    table: &'static str,
) -> Result<&'a mut Stored<T>> {
    rows.iter_mut()
        .find(|row| row.id == id)
        .ok_or_else(|| AppError::validation(format!("no {table} row with id {id}")))
}

fn require<T>(rows: &[Stored<T>], id: i64, table: &'static str) -> Result<()> {
    if rows.iter().any(|row| row.id == id) {
        Ok(())
    } else {
        Err(AppError::validation(format!(
            "reference to missing {table} row {id}"
        )))
    }
}

#[async_trait]
impl RaidStore for MemoryStore {
    async fn find_player(&self, character_guid: &str) -> Result<Option<Stored<Player>>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .players
            .iter()
            .find(|p| p.character_guid == character_guid)
            .cloned())
    }

    async fn insert_player(&self, player: &Player) -> Result<Stored<Player>> {
        let mut tables = self.tables.lock().await;
        if tables
            .players
            .iter()
            .any(|p| p.character_guid == player.character_guid)
        {
            return Err(AppError::conflict("player", &player.character_guid));
        }
        Ok(push(&mut tables.players, player))
    }

    async fn set_player_class_name(&self, id: i64, class_name: &str) -> Result<()> {
        let mut tables = self.tables.lock().await;
        row_mut(&mut tables.players, id, "player")?.value.class_name = Some(class_name.into());
        Ok(())
    }

    async fn find_character_spec(
        &self,
        class_id: i32,
        spec_id: i32,
    ) -> Result<Option<Stored<CharacterSpec>>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .character_specs
            .iter()
            .find(|s| s.class_id == class_id && s.spec_id == spec_id)
            .cloned())
    }

    async fn insert_character_spec(&self, spec: &CharacterSpec) -> Result<Stored<CharacterSpec>> {
        let mut tables = self.tables.lock().await;
        if tables
            .character_specs
            .iter()
            .any(|s| s.class_id == spec.class_id && s.spec_id == spec.spec_id)
        {
            return Err(AppError::conflict(
                "character spec",
                format!("{}/{}", spec.class_id, spec.spec_id),
            ));
        }
        Ok(push(&mut tables.character_specs, spec))
    }

    async fn set_character_spec_name(&self, id: i64, name: &str) -> Result<()> {
        let mut tables = self.tables.lock().await;
        row_mut(&mut tables.character_specs, id, "character spec")?.value.name = Some(name.into());
        Ok(())
    }

    async fn find_raid_type(&self, key: RaidTypeKey) -> Result<Option<Stored<RaidType>>> {
        let tables = self.tables.lock().await;
        Ok(tables.raid_types.iter().find(|t| t.key() == key).cloned())
    }

    async fn insert_raid_type(&self, raid_type: &RaidType) -> Result<Stored<RaidType>> {
        let mut tables = self.tables.lock().await;
        if tables.raid_types.iter().any(|t| t.key() == raid_type.key()) {
            return Err(AppError::conflict(
                "raid type",
                format!("{:?}", raid_type.key()),
            ));
        }
        Ok(push(&mut tables.raid_types, raid_type))
    }

    async fn set_raid_type_name(&self, id: i64, name: &str) -> Result<()> {
        let mut tables = self.tables.lock().await;
        row_mut(&mut tables.raid_types, id, "raid type")?.value.name = Some(name.into());
        Ok(())
    }

    async fn find_raid(&self, raid_id: &str) -> Result<Option<Stored<Raid>>> {
        let tables = self.tables.lock().await;
        Ok(tables.raids.iter().find(|r| r.raid_id == raid_id).cloned())
    }

    async fn insert_raid(&self, raid: &Raid) -> Result<Stored<Raid>> {
        let mut tables = self.tables.lock().await;
        require(&tables.raid_types, raid.raid_type_id, "raid type")?;
        if tables.raids.iter().any(|r| r.raid_id == raid.raid_id) {
            return Err(AppError::conflict("raid", &raid.raid_id));
        }
        Ok(push(&mut tables.raids, raid))
    }

    async fn find_encounter(
        &self,
        raid_row_id: i64,
        encounter_entry: i32,
        start_time: DateTime<Utc>,
    ) -> Result<Option<Stored<Encounter>>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .encounters
            .iter()
            .find(|e| {
                e.raid_row_id == raid_row_id
                    && e.encounter_entry == encounter_entry
                    && e.start_time == start_time
            })
            .cloned())
    }

    async fn insert_encounter(&self, encounter: &Encounter) -> Result<Stored<Encounter>> {
        let mut tables = self.tables.lock().await;
        require(&tables.raids, encounter.raid_row_id, "raid")?;
        if tables.encounters.iter().any(|e| {
            e.raid_row_id == encounter.raid_row_id
                && e.encounter_entry == encounter.encounter_entry
                && e.start_time == encounter.start_time
        }) {
            return Err(AppError::conflict(
                "encounter",
                format!(
                    "{}/{}/{}",
                    encounter.raid_row_id,
                    encounter.encounter_entry,
                    encounter.start_time.timestamp()
                ),
            ));
        }
        Ok(push(&mut tables.encounters, encounter))
    }

    async fn set_encounter_name(&self, id: i64, name: &str) -> Result<()> {
        let mut tables = self.tables.lock().await;
        row_mut(&mut tables.encounters, id, "encounter")?.value.name = Some(name.into());
        Ok(())
    }

    async fn find_player_encounter(
        &self,
        player_id: i64,
        encounter_id: i64,
    ) -> Result<Option<Stored<PlayerEncounter>>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .player_encounters
            .iter()
            .find(|pe| pe.player_id == player_id && pe.encounter_id == encounter_id)
            .cloned())
    }

    async fn insert_player_encounter(
        &self,
        player_encounter: &PlayerEncounter,
    ) -> Result<Stored<PlayerEncounter>> {
        let mut tables = self.tables.lock().await;
        require(&tables.players, player_encounter.player_id, "player")?;
        require(&tables.encounters, player_encounter.encounter_id, "encounter")?;
        if let Some(spec_id) = player_encounter.spec_id {
            require(&tables.character_specs, spec_id, "character spec")?;
        }
        if tables.player_encounters.iter().any(|pe| {
            pe.player_id == player_encounter.player_id
                && pe.encounter_id == player_encounter.encounter_id
        }) {
            return Err(AppError::conflict(
                "player encounter",
                format!(
                    "{}/{}",
                    player_encounter.player_id, player_encounter.encounter_id
                ),
            ));
        }
        Ok(push(&mut tables.player_encounters, player_encounter))
    }

    async fn counts(&self) -> Result<TableCounts> {
        let tables = self.tables.lock().await;
        Ok(TableCounts {
            players: tables.players.len() as u64,
            character_specs: tables.character_specs.len() as u64,
            raid_types: tables.raid_types.len() as u64,
            raids: tables.raids.len() as u64,
            encounters: tables.encounters.len() as u64,
            player_encounters: tables.player_encounters.len() as u64,
        })
    }
}
