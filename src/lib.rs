// src/lib.rs

//! Raid log ingestion library

pub mod catalog;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod rpc;
pub mod services;
pub mod storage;
pub mod utils;
