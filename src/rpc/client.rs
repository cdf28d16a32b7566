// src/rpc/client.rs

//! reqwest-backed RPC client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::RpcConfig;
use crate::rpc::{RpcRequest, RpcResponse, Transport, methods};
use crate::utils::http::{backoff_delay, create_async_client, is_transient};

/// Client for the panel's RPC router.
pub struct RpcClient {
    client: Client,
    url: Url,
    action: String,
    max_attempts: u32,
    backoff_base: Duration,
    next_tid: AtomicU64,
    cancel: CancellationToken,
}

#[derive(Debug, Deserialize)]
struct LoginResult {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

impl RpcClient {
    /// Create a new client from the RPC configuration.
    pub fn new(config: &RpcConfig) -> Result<Self> {
        let mut url = Url::parse(&config.endpoint)?;
        url.query_pairs_mut().append_pair("realm", &config.realm);

        Ok(Self {
            client: create_async_client(config)?,
            url,
            action: config.action.clone(),
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            next_tid: AtomicU64::new(1),
            cancel: CancellationToken::new(),
        })
    }

    /// Abort retry backoff when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Open a panel session; the cookie is kept for later calls.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let payload = json!({ "username": username, "password": password });
        let result = self
            .call(methods::LOGIN, payload)
            .await?
            .ok_or_else(|| AppError::config("login returned no result"))?;

        let login: LoginResult = serde_json::from_value(result)?;
        if !login.success {
            return Err(AppError::config(format!(
                "login rejected for {}: {}",
                username,
                login.message.as_deref().unwrap_or("no reason given")
            )));
        }

        log::info!("Logged in as {}", username);
        Ok(())
    }

    /// POST the envelope, retrying connection-level failures only.
    async fn send(&self, method: &str, request: &RpcRequest<'_>) -> Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.post(self.url.clone()).json(request).send().await {
                Ok(response) => return Ok(response),
                Err(error) if is_transient(&error) && attempt < self.max_attempts => {
                    let wait = backoff_delay(self.backoff_base, attempt);
                    log::warn!(
                        "{} attempt {}/{} failed: {}. Retrying in {:?}",
                        method,
                        attempt,
                        self.max_attempts,
                        error,
                        wait
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(AppError::Cancelled),
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                Err(error) if is_transient(&error) => {
                    return Err(AppError::Transport {
                        method: method.to_string(),
                        attempts: attempt,
                        source: error,
                    });
                }
                Err(error) => return Err(AppError::Http(error)),
            }
        }
    }
}

#[async_trait]
impl Transport for RpcClient {
    async fn call(&self, method: &str, payload: Value) -> Result<Option<Value>> {
        let tid = self.next_tid.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(tid, &self.action, method, payload);

        log::debug!("RPC {} (tid {})", method, tid);
        let response = self.send(method, &request).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Status {
                method: method.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let envelope: RpcResponse = serde_json::from_slice(&body)?;
        envelope.take(method)
    }
}
