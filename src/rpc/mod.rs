//! RPC envelope and transport abstraction.
//!
//! Every call is a POST of
//! `{"type":"rpc","tid":N,"action":"wow_Services","method":M,"data":[payload]}`.
//! The panel answers either with one reply object or with an array of replies
//! from its multiplexed channel; [`RpcResponse::take`] picks ours by method.

mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};

pub use client::RpcClient;

/// Upstream method names.
pub mod methods {
    pub const LADDER: &str = "getLadder";
    pub const RAID_ENCOUNTERS: &str = "getRaidEncounters";
    pub const ENCOUNTER_PLAYERS: &str = "getEncounterPlayers";
    pub const LOGIN: &str = "login";
}

/// Something that can execute one RPC method call.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Call `method` with `payload`.
    ///
    /// `Ok(None)` means the reply matched but carried no result.
    async fn call(&self, method: &str, payload: Value) -> Result<Option<Value>>;
}

/// Outgoing request envelope.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub tid: u64,
    pub action: &'a str,
    pub method: &'a str,
    pub data: [Value; 1],
}

impl<'a> RpcRequest<'a> {
    pub fn new(tid: u64, action: &'a str, method: &'a str, payload: Value) -> Self {
        Self {
            kind: "rpc",
            tid,
            action,
            method,
            data: [payload],
        }
    }
}

/// One reply element.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpcReply {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub tid: Option<u64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Reply body: a single element or a multiplexed batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RpcResponse {
    Batch(Vec<RpcReply>),
    Single(RpcReply),
}

impl RpcResponse {
    /// Extract the result for `method`.
    ///
    /// A body without a reply for `method` is an error, not an empty result:
    /// the crawler must never mistake a malformed answer for the last page.
    pub fn take(self, method: &str) -> Result<Option<Value>> {
        let replies = match self {
            Self::Single(reply) => vec![reply],
            Self::Batch(replies) => replies,
        };

        let reply = replies
            .into_iter()
            .find(|r| r.method.as_deref() == Some(method))
            .ok_or_else(|| AppError::EnvelopeMiss {
                method: method.to_string(),
            })?;

        if reply.kind.as_deref() == Some("exception") {
            return Err(AppError::RpcException {
                method: method.to_string(),
                message: reply.message.unwrap_or_default(),
            });
        }

        Ok(reply.result.filter(|v| !v.is_null()))
    }
}

/// A page of records in a list-style result.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}
