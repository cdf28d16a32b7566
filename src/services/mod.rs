//! Service layer for the ingestion engine.
//!
//! This module contains the business logic for:
//! - Crawling the panel's paginated list methods (`RaidCrawler`)
//! - Resolving and saving the entity graph (`EntityResolver`)

mod cache;
mod crawler;
mod resolver;

pub use cache::IdentityCache;
pub use crawler::RaidCrawler;
pub use resolver::{EntityResolver, EntityTally, IngestReport};
