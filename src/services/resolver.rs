// src/services/resolver.rs

//! Entity resolution and idempotent upserts.
//!
//! A batch is written in foreign-key order:
//! players and specs, raid types, raids, encounters, player encounters.
//! Every create is preceded by a natural-key lookup, so saving the same batch
//! twice leaves the store unchanged apart from display-name backfills.
//! Writes commit one by one; an aborted batch is completed by a rerun.

use std::fmt;
use std::future::Future;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::catalog;
use crate::error::{AppError, Result};
use crate::models::{
    CharacterSpec, Encounter, EncounterRecord, EncounterRow, Player, PlayerEncounter,
    PlayerEncounterRecord, PlayerEncounterRow, Raid, RaidBatch, RaidRecord, RaidRow, RaidType,
    Stored, dps,
};
use crate::services::cache::IdentityCache;
use crate::storage::RaidStore;

/// Outcome counters for one entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityTally {
    pub created: u64,
    pub backfilled: u64,
    pub skipped: u64,
}

impl EntityTally {
    fn merge(&mut self, other: &EntityTally) {
        self.created += other.created;
        self.backfilled += other.backfilled;
        self.skipped += other.skipped;
    }
}

impl fmt::Display for EntityTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "+{} ~{} !{}",
            self.created, self.backfilled, self.skipped
        )
    }
}

/// Summary of one or more saved batches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub raids_seen: u64,
    pub players: EntityTally,
    pub character_specs: EntityTally,
    pub raid_types: EntityTally,
    pub raids: EntityTally,
    pub encounters: EntityTally,
    pub player_encounters: EntityTally,
}

impl IngestReport {
    pub fn merge(&mut self, other: &IngestReport) {
        self.raids_seen += other.raids_seen;
        self.players.merge(&other.players);
        self.character_specs.merge(&other.character_specs);
        self.raid_types.merge(&other.raid_types);
        self.raids.merge(&other.raids);
        self.encounters.merge(&other.encounters);
        self.player_encounters.merge(&other.player_encounters);
    }

    /// Rows inserted across all tables.
    pub fn created(&self) -> u64 {
        self.tallies().iter().map(|(_, t)| t.created).sum()
    }

    /// Records dropped across all kinds.
    pub fn skipped(&self) -> u64 {
        self.tallies().iter().map(|(_, t)| t.skipped).sum()
    }

    fn tallies(&self) -> [(&'static str, &EntityTally); 6] {
        [
            ("players", &self.players),
            ("specs", &self.character_specs),
            ("raid types", &self.raid_types),
            ("raids", &self.raids),
            ("encounters", &self.encounters),
            ("player encounters", &self.player_encounters),
        ]
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} raids seen", self.raids_seen)?;
        for (label, tally) in self.tallies() {
            write!(f, "; {label} {tally}")?;
        }
        Ok(())
    }
}

/// Where a resolved row came from.
enum Settled<T> {
    Created(Stored<T>),
    Existing(Stored<T>),
}

/// Turn an insert outcome into a row.
///
/// A conflict means the natural key appeared between lookup and insert;
/// the lookup is repeated once before the conflict is reported.
async fn settle<T, F>(inserted: Result<Stored<T>>, refetch: F) -> Result<Settled<T>>
where
    F: Future<Output = Result<Option<Stored<T>>>>,
{
    match inserted {
        Ok(row) => Ok(Settled::Created(row)),
        Err(err @ AppError::Conflict { .. }) => match refetch.await? {
            Some(row) => {
                log::debug!("{}; using existing row {}", err, row.id);
                Ok(Settled::Existing(row))
            }
            None => Err(err),
        },
        Err(err) => Err(err),
    }
}

/// Keep record-level failures local to the record.
fn tolerate<T>(outcome: Result<T>, tally: &mut EntityTally, what: &str) -> Result<Option<T>> {
    match outcome {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_record_level() => {
            log::warn!("Skipping {}: {}", what, err);
            tally.skipped += 1;
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn decode_all<R, T>(
    records: &[R],
    decode: impl Fn(&R) -> Result<T>,
    tally: &mut EntityTally,
    kind: &str,
) -> Result<Vec<T>> {
    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        if let Some(row) = tolerate(decode(record), tally, kind)? {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Writes upstream batches into a [`RaidStore`].
pub struct EntityResolver<'a> {
    store: &'a dyn RaidStore,
    cancel: CancellationToken,
}

impl<'a> EntityResolver<'a> {
    pub fn new(store: &'a dyn RaidStore, cancel: CancellationToken) -> Self {
        Self { store, cancel }
    }

    /// Persist the entity graph of one batch.
    pub async fn save_batch(&self, batch: &RaidBatch) -> Result<IngestReport> {
        let mut cache = IdentityCache::new();
        let mut report = IngestReport {
            raids_seen: batch.raids.len() as u64,
            ..IngestReport::default()
        };

        let raids = decode_all(&batch.raids, RaidRecord::decode, &mut report.raids, "raid")?;
        let encounters = decode_all(
            &batch.encounters,
            EncounterRecord::decode,
            &mut report.encounters,
            "encounter",
        )?;
        let lines = decode_all(
            &batch.players,
            PlayerEncounterRecord::decode,
            &mut report.player_encounters,
            "player encounter",
        )?;

        for line in &lines {
            self.checkpoint()?;
            let player = self.resolve_player(line, &mut cache, &mut report.players).await;
            tolerate(player, &mut report.players, "player")?;

            if let Some(spec_id) = line.spec_id {
                let spec = self
                    .resolve_spec(line.player.class_id, spec_id, &mut cache, &mut report.character_specs)
                    .await;
                tolerate(spec, &mut report.character_specs, "character spec")?;
            }
        }

        for row in &raids {
            self.checkpoint()?;
            let raid_type = self.resolve_raid_type(row, &mut cache, &mut report.raid_types).await;
            tolerate(raid_type, &mut report.raid_types, "raid type")?;
        }

        for row in &raids {
            self.checkpoint()?;
            let raid = self.resolve_raid(row, &mut cache, &mut report.raids).await;
            tolerate(raid, &mut report.raids, "raid")?;
        }

        for row in &encounters {
            self.checkpoint()?;
            if !cache.raids.contains_key(&row.raid_id) {
                log::debug!(
                    "Skipping encounter {} of raid {} outside this batch",
                    row.encounter_entry,
                    row.raid_id
                );
                report.encounters.skipped += 1;
                continue;
            }
            let encounter = self
                .resolve_encounter(row, &mut cache, &mut report.encounters)
                .await;
            tolerate(encounter, &mut report.encounters, "encounter")?;
        }

        for line in &lines {
            self.checkpoint()?;
            let saved = self
                .save_player_encounter(line, &cache, &mut report.player_encounters)
                .await;
            tolerate(saved, &mut report.player_encounters, "player encounter")?;
        }

        log::info!("Batch saved: {}", report);
        Ok(report)
    }

    /// Persist one raid with its encounters and roster lines.
    pub async fn save_raid(
        &self,
        raid: RaidRecord,
        encounters: Vec<EncounterRecord>,
        players: Vec<PlayerEncounterRecord>,
    ) -> Result<IngestReport> {
        let batch = RaidBatch {
            raids: vec![raid],
            encounters,
            players,
        };
        self.save_batch(&batch).await
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        Ok(())
    }

    async fn resolve_player(
        &self,
        line: &PlayerEncounterRow,
        cache: &mut IdentityCache,
        tally: &mut EntityTally,
    ) -> Result<()> {
        let guid = &line.player.character_guid;
        if cache.players.contains_key(guid) {
            return Ok(());
        }

        let class_name = catalog::class_name(line.player.class_id);
        let stored = match self.store.find_player(guid).await? {
            Some(mut existing) => {
                if let (true, Some(name)) = (existing.class_name.is_none(), class_name) {
                    self.store.set_player_class_name(existing.id, name).await?;
                    existing.value.class_name = Some(name.to_string());
                    tally.backfilled += 1;
                }
                existing
            }
            None => {
                let player = Player {
                    character_guid: guid.clone(),
                    name: line.player.name.clone(),
                    race: line.player.race,
                    class_id: line.player.class_id,
                    class_name: class_name.map(String::from),
                    gender: line.player.gender,
                    level: line.player.level,
                };
                let inserted = self.store.insert_player(&player).await;
                match settle(inserted, self.store.find_player(guid)).await? {
                    Settled::Created(row) => {
                        tally.created += 1;
                        row
                    }
                    Settled::Existing(row) => row,
                }
            }
        };

        cache.players.insert(guid.clone(), stored);
        Ok(())
    }

    async fn resolve_spec(
        &self,
        class_id: i32,
        spec_id: i32,
        cache: &mut IdentityCache,
        tally: &mut EntityTally,
    ) -> Result<()> {
        if cache.specs.contains_key(&(class_id, spec_id)) {
            return Ok(());
        }

        let name = catalog::spec_name(class_id, spec_id);
        let stored = match self.store.find_character_spec(class_id, spec_id).await? {
            Some(mut existing) => {
                if let (true, Some(name)) = (existing.name.is_none(), name) {
                    self.store.set_character_spec_name(existing.id, name).await?;
                    existing.value.name = Some(name.to_string());
                    tally.backfilled += 1;
                }
                existing
            }
            None => {
                let spec = CharacterSpec {
                    class_id,
                    spec_id,
                    name: name.map(String::from),
                };
                let inserted = self.store.insert_character_spec(&spec).await;
                let refetch = self.store.find_character_spec(class_id, spec_id);
                match settle(inserted, refetch).await? {
                    Settled::Created(row) => {
                        tally.created += 1;
                        row
                    }
                    Settled::Existing(row) => row,
                }
            }
        };

        cache.specs.insert((class_id, spec_id), stored);
        Ok(())
    }

    async fn resolve_raid_type(
        &self,
        row: &RaidRow,
        cache: &mut IdentityCache,
        tally: &mut EntityTally,
    ) -> Result<()> {
        let key = row.raid_type;
        if cache.raid_types.contains_key(&key) {
            return Ok(());
        }

        let name = catalog::raid_type_name(key.map, key.difficulty);
        let stored = match self.store.find_raid_type(key).await? {
            Some(mut existing) => {
                // The name is derived, so a newer table wins over what is stored.
                if let Some(name) = name.filter(|n| existing.name.as_ref() != Some(n)) {
                    self.store.set_raid_type_name(existing.id, &name).await?;
                    existing.value.name = Some(name);
                    tally.backfilled += 1;
                }
                existing
            }
            None => {
                let raid_type = RaidType {
                    map: key.map,
                    difficulty: key.difficulty,
                    instance_type: key.instance_type,
                    name,
                };
                let inserted = self.store.insert_raid_type(&raid_type).await;
                match settle(inserted, self.store.find_raid_type(key)).await? {
                    Settled::Created(row) => {
                        tally.created += 1;
                        row
                    }
                    Settled::Existing(row) => row,
                }
            }
        };

        cache.raid_types.insert(key, stored);
        Ok(())
    }

    async fn resolve_raid(
        &self,
        row: &RaidRow,
        cache: &mut IdentityCache,
        tally: &mut EntityTally,
    ) -> Result<()> {
        if cache.raids.contains_key(&row.raid_id) {
            return Ok(());
        }

        let stored = match self.store.find_raid(&row.raid_id).await? {
            Some(existing) => existing,
            None => {
                let Some(raid_type) = cache.raid_types.get(&row.raid_type) else {
                    log::warn!("Skipping raid {}: raid type unresolved", row.raid_id);
                    tally.skipped += 1;
                    return Ok(());
                };
                let raid = Raid {
                    raid_id: row.raid_id.clone(),
                    raid_type_id: raid_type.id,
                    guild_name: row.guild_name.clone(),
                    leader_name: row.leader_name.clone(),
                    start_time: row.start_time,
                    total_time: row.total_time,
                    damage_done: row.damage_done,
                    healing_done: row.healing_done,
                    wipes: row.wipes,
                    bosses_killed: row.bosses_killed,
                };
                let inserted = self.store.insert_raid(&raid).await;
                match settle(inserted, self.store.find_raid(&row.raid_id)).await? {
                    Settled::Created(row) => {
                        tally.created += 1;
                        row
                    }
                    Settled::Existing(row) => row,
                }
            }
        };

        cache.raids.insert(row.raid_id.clone(), stored);
        Ok(())
    }

    async fn resolve_encounter(
        &self,
        row: &EncounterRow,
        cache: &mut IdentityCache,
        tally: &mut EntityTally,
    ) -> Result<()> {
        let key = row.key();
        if cache.encounters.contains_key(&key) {
            return Ok(());
        }
        let Some(raid) = cache.raids.get(&row.raid_id) else {
            return Ok(());
        };
        let raid_row_id = raid.id;
        let name = cache
            .map_of(raid)
            .and_then(|map| catalog::encounter_name(map, row.encounter_entry));

        let existing = self
            .store
            .find_encounter(raid_row_id, row.encounter_entry, row.start_time)
            .await?;
        let stored = match existing {
            Some(mut existing) => {
                if let (true, Some(name)) = (existing.name.is_none(), name) {
                    self.store.set_encounter_name(existing.id, name).await?;
                    existing.value.name = Some(name.to_string());
                    tally.backfilled += 1;
                }
                existing
            }
            None => {
                let encounter = Encounter {
                    raid_row_id,
                    encounter_entry: row.encounter_entry,
                    start_time: row.start_time,
                    end_time: row.end_time,
                    success: row.success,
                    damage_done: row.damage_done,
                    healing_done: row.healing_done,
                    tanks: row.tanks,
                    healers: row.healers,
                    damagers: row.damagers,
                    name: name.map(String::from),
                };
                let inserted = self.store.insert_encounter(&encounter).await;
                let refetch =
                    self.store
                        .find_encounter(raid_row_id, row.encounter_entry, row.start_time);
                match settle(inserted, refetch).await? {
                    Settled::Created(row) => {
                        tally.created += 1;
                        row
                    }
                    Settled::Existing(row) => row,
                }
            }
        };

        cache.encounters.insert(key, stored);
        Ok(())
    }

    /// Write-once: an existing row is never touched.
    async fn save_player_encounter(
        &self,
        line: &PlayerEncounterRow,
        cache: &IdentityCache,
        tally: &mut EntityTally,
    ) -> Result<()> {
        let Some(encounter) = cache.encounters.get(&line.encounter) else {
            log::debug!(
                "Skipping {} in {:?}: encounter not saved",
                line.player.character_guid,
                line.encounter
            );
            tally.skipped += 1;
            return Ok(());
        };
        let Some(player) = cache.players.get(&line.player.character_guid) else {
            tally.skipped += 1;
            return Ok(());
        };

        if self
            .store
            .find_player_encounter(player.id, encounter.id)
            .await?
            .is_some()
        {
            return Ok(());
        }

        let spec_id = line
            .spec_id
            .and_then(|spec| cache.specs.get(&(line.player.class_id, spec)))
            .map(|spec| spec.id);
        let player_encounter = PlayerEncounter {
            player_id: player.id,
            encounter_id: encounter.id,
            spec_id,
            role: line.role.clone(),
            damage_done: line.damage_done,
            healing_done: line.healing_done,
            absorb_done: line.absorb_done,
            dps: dps(line.damage_done, encounter.duration_secs()),
        };
        let inserted = self.store.insert_player_encounter(&player_encounter).await;
        let refetch = self.store.find_player_encounter(player.id, encounter.id);
        if let Settled::Created(_) = settle(inserted, refetch).await? {
            tally.created += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::{Value, json};

    use super::*;
    use crate::models::{RaidTypeKey, TableCounts};
    use crate::storage::MemoryStore;

    fn raid_record(raid_id: &str) -> Value {
        json!({
            "raidId": raid_id,
            "map": "533",
            "difficulty": "1",
            "guildName": "Exodus",
            "leaderName": "Tirion",
            "startTime": "1700000000",
            "totalTime": "5400",
            "damageDone": "90000000",
            "healingDone": "40000000",
            "wipes": "1",
            "bossesKilled": "15"
        })
    }

    fn encounter_record(raid_id: &str) -> Value {
        json!({
            "raidId": raid_id,
            "encounterEntry": "15956",
            "startTime": "1700000000",
            "endTime": "1700000300",
            "success": "1",
            "damageDone": "5000000",
            "healingDone": "1000000",
            "tanks": "2",
            "healers": "5",
            "damagers": "18"
        })
    }

    fn roster_line(raid_id: &str, guid: &str, damage: &str) -> Value {
        json!({
            "raidId": raid_id,
            "encounterEntry": "15956",
            "startTime": "1700000000",
            "characterGuid": guid,
            "name": "Valeera",
            "race": "1",
            "classId": "4",
            "specId": "1",
            "gender": "1",
            "level": "80",
            "role": "dps",
            "damageDone": damage,
            "healingDone": "0",
            "absorbDone": "0"
        })
    }

    fn batch(raids: Vec<Value>, encounters: Vec<Value>, players: Vec<Value>) -> RaidBatch {
        RaidBatch {
            raids: raids
                .into_iter()
                .map(|v| serde_json::from_value(v).unwrap())
                .collect(),
            encounters: encounters
                .into_iter()
                .map(|v| serde_json::from_value(v).unwrap())
                .collect(),
            players: players
                .into_iter()
                .map(|v| serde_json::from_value(v).unwrap())
                .collect(),
        }
    }

    fn scenario() -> RaidBatch {
        batch(
            vec![raid_record("R1")],
            vec![encounter_record("R1")],
            vec![roster_line("R1", "G1", "600000")],
        )
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_scenario_builds_full_graph() {
        let store = MemoryStore::new();
        let resolver = EntityResolver::new(&store, CancellationToken::new());

        let report = resolver.save_batch(&scenario()).await.unwrap();

        assert_eq!(report.created(), 6);
        assert_eq!(report.skipped(), 0);
        assert_eq!(
            store.counts().await.unwrap(),
            TableCounts {
                players: 1,
                character_specs: 1,
                raid_types: 1,
                raids: 1,
                encounters: 1,
                player_encounters: 1,
            }
        );

        let raid_type = store
            .find_raid_type(RaidTypeKey {
                map: 533,
                difficulty: 1,
                instance_type: 0,
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(raid_type.name.as_deref(), Some("Наксрамас (25 об.)"));

        let raid = store.find_raid("R1").await.unwrap().unwrap();
        assert_eq!(raid.raid_type_id, raid_type.id);
        assert_eq!(raid.start_time, at(1_700_000_000));

        let encounter = store
            .find_encounter(raid.id, 15956, at(1_700_000_000))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(encounter.name.as_deref(), Some("Ануб'Рекан"));

        let player = store.find_player("G1").await.unwrap().unwrap();
        assert_eq!(player.class_name.as_deref(), Some("Разбойник"));

        let line = store
            .find_player_encounter(player.id, encounter.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line.dps, 2000.0);
        assert!(line.spec_id.is_some());
    }

    #[tokio::test]
    async fn test_rerun_creates_nothing() {
        let store = MemoryStore::new();
        let resolver = EntityResolver::new(&store, CancellationToken::new());

        resolver.save_batch(&scenario()).await.unwrap();
        let before = store.snapshot().await.unwrap();

        let report = resolver.save_batch(&scenario()).await.unwrap();

        assert_eq!(report.created(), 0);
        assert_eq!(report.players.backfilled, 0);
        assert_eq!(store.snapshot().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_encounter_of_foreign_raid_is_skipped() {
        let store = MemoryStore::new();
        let resolver = EntityResolver::new(&store, CancellationToken::new());

        let report = resolver
            .save_batch(&batch(
                vec![raid_record("R1")],
                vec![encounter_record("R2")],
                vec![roster_line("R2", "G1", "1000")],
            ))
            .await
            .unwrap();

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.raids, 1);
        assert_eq!(counts.encounters, 0);
        assert_eq!(counts.player_encounters, 0);
        assert_eq!(report.encounters.skipped, 1);
        assert_eq!(report.player_encounters.skipped, 1);
    }

    #[tokio::test]
    async fn test_bad_record_does_not_abort_batch() {
        let store = MemoryStore::new();
        let resolver = EntityResolver::new(&store, CancellationToken::new());

        let mut broken = raid_record("R2");
        broken["startTime"] = json!("not-a-time");
        let report = resolver
            .save_batch(&batch(
                vec![broken, raid_record("R1")],
                vec![encounter_record("R1")],
                vec![
                    roster_line("R1", "G1", "600000"),
                    roster_line("R1", "G2", "lots"),
                ],
            ))
            .await
            .unwrap();

        assert_eq!(report.raids.skipped, 1);
        assert_eq!(report.raids.created, 1);
        assert_eq!(report.player_encounters.skipped, 1);
        assert_eq!(report.player_encounters.created, 1);
        assert!(store.find_raid("R2").await.unwrap().is_none());
        assert!(store.find_player("G2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_names_are_backfilled() {
        let store = MemoryStore::new();
        let player = store
            .insert_player(&Player {
                character_guid: "G1".into(),
                name: "Valeera".into(),
                race: 1,
                class_id: 4,
                class_name: None,
                gender: 1,
                level: 80,
            })
            .await
            .unwrap();
        let raid_type = store
            .insert_raid_type(&RaidType {
                map: 533,
                difficulty: 1,
                instance_type: 0,
                name: Some("Naxx 25".into()),
            })
            .await
            .unwrap();

        let resolver = EntityResolver::new(&store, CancellationToken::new());
        let report = resolver.save_batch(&scenario()).await.unwrap();

        assert_eq!(report.players.backfilled, 1);
        assert_eq!(report.players.created, 0);
        assert_eq!(report.raid_types.backfilled, 1);

        let player = store.find_player("G1").await.unwrap().unwrap();
        assert_eq!(player.class_name.as_deref(), Some("Разбойник"));
        let raid_type = store
            .find_raid_type(raid_type.key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(raid_type.name.as_deref(), Some("Наксрамас (25 об.)"));
    }

    #[tokio::test]
    async fn test_encounter_and_spec_names_are_backfilled() {
        let store = MemoryStore::new();
        let raid_type = store
            .insert_raid_type(&RaidType {
                map: 533,
                difficulty: 1,
                instance_type: 0,
                name: Some("Наксрамас (25 об.)".into()),
            })
            .await
            .unwrap();
        let raid = store
            .insert_raid(&Raid {
                raid_id: "R1".into(),
                raid_type_id: raid_type.id,
                guild_name: Some("Exodus".into()),
                leader_name: Some("Tirion".into()),
                start_time: at(1_700_000_000),
                total_time: 5400,
                damage_done: 90_000_000,
                healing_done: 40_000_000,
                wipes: 1,
                bosses_killed: 15,
            })
            .await
            .unwrap();
        let encounter = store
            .insert_encounter(&Encounter {
                raid_row_id: raid.id,
                encounter_entry: 15956,
                start_time: at(1_700_000_000),
                end_time: at(1_700_000_300),
                success: true,
                damage_done: 5_000_000,
                healing_done: 1_000_000,
                tanks: 2,
                healers: 5,
                damagers: 18,
                name: None,
            })
            .await
            .unwrap();
        store
            .insert_character_spec(&CharacterSpec {
                class_id: 4,
                spec_id: 1,
                name: None,
            })
            .await
            .unwrap();

        let resolver = EntityResolver::new(&store, CancellationToken::new());
        let report = resolver.save_batch(&scenario()).await.unwrap();

        assert_eq!(report.encounters.backfilled, 1);
        assert_eq!(report.encounters.created, 0);
        assert_eq!(report.character_specs.backfilled, 1);
        assert_eq!(report.character_specs.created, 0);
        assert_eq!(report.raid_types.backfilled, 0);

        let encounter = store
            .find_encounter(raid.id, 15956, encounter.start_time)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(encounter.name.as_deref(), Some("Ануб'Рекан"));
        let spec = store.find_character_spec(4, 1).await.unwrap().unwrap();
        assert_eq!(spec.name.as_deref(), Some("Бой"));
        assert_eq!(store.counts().await.unwrap().player_encounters, 1);
    }

    #[tokio::test]
    async fn test_zero_length_encounter_has_zero_dps() {
        let store = MemoryStore::new();
        let resolver = EntityResolver::new(&store, CancellationToken::new());

        let mut encounter = encounter_record("R1");
        encounter["endTime"] = json!("1700000000");
        resolver
            .save_batch(&batch(
                vec![raid_record("R1")],
                vec![encounter],
                vec![roster_line("R1", "G1", "600000")],
            ))
            .await
            .unwrap();

        let player = store.find_player("G1").await.unwrap().unwrap();
        let line = store.find_player_encounter(player.id, 1).await.unwrap().unwrap();
        assert_eq!(line.dps, 0.0);
    }

    #[tokio::test]
    async fn test_duplicate_lines_in_batch_collapse() {
        let store = MemoryStore::new();
        let resolver = EntityResolver::new(&store, CancellationToken::new());

        let report = resolver
            .save_batch(&batch(
                vec![raid_record("R1"), raid_record("R1")],
                vec![encounter_record("R1"), encounter_record("R1")],
                vec![
                    roster_line("R1", "G1", "600000"),
                    roster_line("R1", "G1", "600000"),
                ],
            ))
            .await
            .unwrap();

        assert_eq!(report.raids_seen, 2);
        assert_eq!(report.created(), 6);
        assert_eq!(store.counts().await.unwrap().player_encounters, 1);
    }

    #[tokio::test]
    async fn test_cancelled_resolver_writes_nothing() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let resolver = EntityResolver::new(&store, cancel);

        let err = resolver.save_batch(&scenario()).await.unwrap_err();

        assert!(matches!(err, AppError::Cancelled));
        assert_eq!(store.counts().await.unwrap(), TableCounts::default());
    }

    #[tokio::test]
    async fn test_save_raid_wraps_batch() {
        let store = MemoryStore::new();
        let resolver = EntityResolver::new(&store, CancellationToken::new());
        let batch = scenario();

        let report = resolver
            .save_raid(
                batch.raids[0].clone(),
                batch.encounters.clone(),
                batch.players.clone(),
            )
            .await
            .unwrap();

        assert_eq!(report.raids.created, 1);
        assert_eq!(report.player_encounters.created, 1);
    }

    /// Hides rows from the first lookup of each raid id, as if another
    /// writer created them in between.
    struct RacyStore {
        inner: MemoryStore,
        hidden: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RaidStore for RacyStore {
        async fn find_player(&self, guid: &str) -> Result<Option<Stored<Player>>> {
            self.inner.find_player(guid).await
        }
        async fn insert_player(&self, player: &Player) -> Result<Stored<Player>> {
            self.inner.insert_player(player).await
        }
        async fn set_player_class_name(&self, id: i64, name: &str) -> Result<()> {
            self.inner.set_player_class_name(id, name).await
        }
        async fn find_character_spec(
            &self,
            class_id: i32,
            spec_id: i32,
        ) -> Result<Option<Stored<CharacterSpec>>> {
            self.inner.find_character_spec(class_id, spec_id).await
        }
        async fn insert_character_spec(
            &self,
            spec: &CharacterSpec,
        ) -> Result<Stored<CharacterSpec>> {
            self.inner.insert_character_spec(spec).await
        }
        async fn set_character_spec_name(&self, id: i64, name: &str) -> Result<()> {
            self.inner.set_character_spec_name(id, name).await
        }
        async fn find_raid_type(&self, key: RaidTypeKey) -> Result<Option<Stored<RaidType>>> {
            self.inner.find_raid_type(key).await
        }
        async fn insert_raid_type(&self, raid_type: &RaidType) -> Result<Stored<RaidType>> {
            self.inner.insert_raid_type(raid_type).await
        }
        async fn set_raid_type_name(&self, id: i64, name: &str) -> Result<()> {
            self.inner.set_raid_type_name(id, name).await
        }
        async fn find_raid(&self, raid_id: &str) -> Result<Option<Stored<Raid>>> {
            let hide = {
                let mut hidden = self.hidden.lock().unwrap();
                let pos = hidden.iter().position(|id| id == raid_id);
                pos.map(|pos| hidden.remove(pos)).is_some()
            };
            if hide {
                return Ok(None);
            }
            self.inner.find_raid(raid_id).await
        }
        async fn insert_raid(&self, raid: &Raid) -> Result<Stored<Raid>> {
            self.inner.insert_raid(raid).await
        }
        async fn find_encounter(
            &self,
            raid_row_id: i64,
            encounter_entry: i32,
            start_time: DateTime<Utc>,
        ) -> Result<Option<Stored<Encounter>>> {
            self.inner
                .find_encounter(raid_row_id, encounter_entry, start_time)
                .await
        }
        async fn insert_encounter(&self, encounter: &Encounter) -> Result<Stored<Encounter>> {
            self.inner.insert_encounter(encounter).await
        }
        async fn set_encounter_name(&self, id: i64, name: &str) -> Result<()> {
            self.inner.set_encounter_name(id, name).await
        }
        async fn find_player_encounter(
            &self,
            player_id: i64,
            encounter_id: i64,
        ) -> Result<Option<Stored<PlayerEncounter>>> {
            self.inner
                .find_player_encounter(player_id, encounter_id)
                .await
        }
        async fn insert_player_encounter(
            &self,
            player_encounter: &PlayerEncounter,
        ) -> Result<Stored<PlayerEncounter>> {
            self.inner.insert_player_encounter(player_encounter).await
        }
        async fn counts(&self) -> Result<TableCounts> {
            self.inner.counts().await
        }
    }

    #[tokio::test]
    async fn test_conflict_falls_back_to_existing_row() {
        let store = RacyStore {
            inner: MemoryStore::new(),
            hidden: Mutex::new(Vec::new()),
        };
        let resolver = EntityResolver::new(&store, CancellationToken::new());
        resolver.save_batch(&scenario()).await.unwrap();

        store.hidden.lock().unwrap().push("R1".to_string());
        let report = resolver.save_batch(&scenario()).await.unwrap();

        assert_eq!(report.raids.created, 0);
        assert_eq!(report.raids.skipped, 0);
        assert_eq!(report.created(), 0);
        assert_eq!(store.counts().await.unwrap().raids, 1);
    }
}
