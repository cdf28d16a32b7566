//! Batch-scoped identity map.

use std::collections::HashMap;

use crate::models::{
    CharacterSpec, Encounter, EncounterKey, Player, Raid, RaidType, RaidTypeKey, Stored,
};

/// Rows already resolved while saving one batch, keyed by natural key.
///
/// Created fresh for every batch and dropped with it; it never outlives the
/// store state it mirrors.
#[derive(Debug, Default)]
pub struct IdentityCache {
    pub players: HashMap<String, Stored<Player>>,
    pub specs: HashMap<(i32, i32), Stored<CharacterSpec>>,
    pub raid_types: HashMap<RaidTypeKey, Stored<RaidType>>,
    pub raids: HashMap<String, Stored<Raid>>,
    pub encounters: HashMap<EncounterKey, Stored<Encounter>>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map id of the raid type a persisted raid points at.
    pub fn map_of(&self, raid: &Raid) -> Option<i32> {
        self.raid_types
            .values()
            .find(|t| t.id == raid.raid_type_id)
            .map(|t| t.map)
    }
}
