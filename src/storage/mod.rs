//! Storage abstractions for the persisted entity graph.
//!
//! Each method commits on its own; there is no transaction spanning a batch.
//! Inserts enforce the natural-key uniqueness of every table and report a
//! duplicate as [`AppError::Conflict`](crate::error::AppError::Conflict).
//!
//! ```text
//! raid_types ◄── raids ◄── encounters ◄── player_encounters ──► players
//!                                                    └────────► character_specs
//! ```

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    CharacterSpec, Encounter, Player, PlayerEncounter, Raid, RaidType, RaidTypeKey, Stored,
    TableCounts,
};

// Re-export for convenience
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Trait for entity graph storage backends.
#[async_trait]
pub trait RaidStore: Send + Sync {
    async fn find_player(&self, character_guid: &str) -> Result<Option<Stored<Player>>>;
    async fn insert_player(&self, player: &Player) -> Result<Stored<Player>>;
    async fn set_player_class_name(&self, id: i64, class_name: &str) -> Result<()>;

    async fn find_character_spec(
        &self,
        class_id: i32,
        spec_id: i32,
    ) -> Result<Option<Stored<CharacterSpec>>>;
    async fn insert_character_spec(&self, spec: &CharacterSpec) -> Result<Stored<CharacterSpec>>;
    async fn set_character_spec_name(&self, id: i64, name: &str) -> Result<()>;

    async fn find_raid_type(&self, key: RaidTypeKey) -> Result<Option<Stored<RaidType>>>;
    async fn insert_raid_type(&self, raid_type: &RaidType) -> Result<Stored<RaidType>>;
    async fn set_raid_type_name(&self, id: i64, name: &str) -> Result<()>;

    async fn find_raid(&self, raid_id: &str) -> Result<Option<Stored<Raid>>>;
    async fn insert_raid(&self, raid: &Raid) -> Result<Stored<Raid>>;

    async fn find_encounter(
        &self,
        raid_row_id: i64,
        encounter_entry: i32,
        start_time: DateTime<Utc>,
    ) -> Result<Option<Stored<Encounter>>>;
    async fn insert_encounter(&self, encounter: &Encounter) -> Result<Stored<Encounter>>;
    async fn set_encounter_name(&self, id: i64, name: &str) -> Result<()>;

    async fn find_player_encounter(
        &self,
        player_id: i64,
        encounter_id: i64,
    ) -> Result<Option<Stored<PlayerEncounter>>>;
    async fn insert_player_encounter(
        &self,
        player_encounter: &PlayerEncounter,
    ) -> Result<Stored<PlayerEncounter>>;

    /// Row count of every table.
    async fn counts(&self) -> Result<TableCounts>;
}
