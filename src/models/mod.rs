// src/models/mod.rs

//! Domain models for the ingestion engine.
//!
//! - `record`: loosely-typed upstream records and their typed decodings
//! - `entity`: the persisted entity graph
//! - `config`: application configuration

mod config;
mod entity;
mod record;

// Re-export all public types
pub use config::{Config, CrawlerConfig, RpcConfig, StorageConfig};
pub use entity::{
    CharacterSpec, Encounter, Player, PlayerEncounter, Raid, RaidType, Stored, TableCounts, dps,
};
pub use record::{
    EncounterKey, EncounterRecord, EncounterRow, LadderFilter, PlayerEncounterRecord,
    PlayerEncounterRow, PlayerRow, RaidBatch, RaidRecord, RaidRow, RaidTypeKey,
};
