//! Pipeline entry points.
//!
//! - `run_ingest`: crawl the ladder and save every raid it lists

pub mod ingest;

pub use ingest::run_ingest;
