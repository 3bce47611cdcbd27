// JSON-RPC Ledger Client
// Talks to a rippled node over its HTTP JSON-RPC port. New ledgers are
// discovered by polling the latest validated ledger.

use super::traits::{ClientError, ClientEvent, LedgerClient, CLOSE_ABNORMAL, CLOSE_NORMAL};
use crate::ledger::{Address, LedgerInfo, LedgerVersion, ServerInfo, Transaction, TransactionQuery};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Seconds between the Unix epoch and the ledger's epoch (2000-01-01)
const RIPPLE_EPOCH_OFFSET: i64 = 946_684_800;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// RPC CLIENT CONFIG
// ============================================================================

/// Configuration for the JSON-RPC client
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    /// Node URL, e.g. `https://s1.ripple.com:51234`
    pub url: String,
    /// How often to ask for the latest validated ledger
    pub poll_interval_ms: u64,
    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
    /// Page size for `account_tx`
    pub page_limit: u32,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5005".to_string(),
            poll_interval_ms: 3500,
            request_timeout_secs: 30,
            page_limit: 200,
        }
    }
}

impl RpcClientConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    pub fn with_page_limit(mut self, limit: u32) -> Self {
        self.page_limit = limit;
        self
    }
}

// ============================================================================
// RPC TRANSPORT
// ============================================================================

#[derive(Clone)]
struct RpcTransport {
    url: String,
    http: reqwest::Client,
}

impl RpcTransport {
    async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let body = json!({ "method": method, "params": [params] });

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClientError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::RequestFailed(format!("HTTP {} from {}", status, method)));
        }

        let mut envelope: Value = response
            .json()
            .await
            .map_err(|e| ClientError::MalformedResponse(e.to_string()))?;

        let result = envelope
            .get_mut("result")
            .map(Value::take)
            .ok_or_else(|| ClientError::MalformedResponse(format!("{} response has no result", method)))?;

        if result.get("status").and_then(Value::as_str) == Some("error") {
            let code = result
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let message = result
                .get("error_message")
                .and_then(Value::as_str)
                .unwrap_or(&code)
                .to_string();
            return Err(ClientError::Server { code, message });
        }

        Ok(result)
    }

    async fn validated_ledger(&self) -> Result<LedgerInfo, ClientError> {
        let result = self
            .call("ledger", json!({ "ledger_index": "validated" }))
            .await?;

        let ledger_version = result
            .get("ledger_index")
            .and_then(as_ledger_version)
            .ok_or_else(|| ClientError::MalformedResponse("ledger has no ledger_index".to_string()))?;

        Ok(LedgerInfo {
            ledger_version,
            ledger_hash: result
                .get("ledger_hash")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// Ledger indexes arrive as numbers or, in some responses, as strings
fn as_ledger_version(value: &Value) -> Option<LedgerVersion> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Convert one `account_tx` entry into a transaction
pub fn parse_account_tx_entry(entry: &Value) -> Result<Transaction, ClientError> {
    let malformed = |what: &str| ClientError::MalformedResponse(format!("account_tx entry has no {}", what));

    let tx = entry.get("tx").ok_or_else(|| malformed("tx"))?;
    let meta = entry.get("meta");

    let id = tx
        .get("hash")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("hash"))?;
    let ledger_version = tx
        .get("ledger_index")
        .and_then(as_ledger_version)
        .ok_or_else(|| malformed("ledger_index"))?;
    let source = tx
        .get("Account")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("Account"))?;

    let index_in_ledger = meta
        .and_then(|m| m.get("TransactionIndex"))
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    let result = meta
        .and_then(|m| m.get("TransactionResult"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let tx_type = tx
        .get("TransactionType")
        .and_then(Value::as_str)
        .unwrap_or("unknown");

    let mut transaction = Transaction::new(id, ledger_version, source)
        .with_index(index_in_ledger)
        .with_type(tx_type)
        .with_result(result)
        .with_raw(entry.clone());

    if let Some(timestamp) = tx
        .get("date")
        .and_then(Value::as_i64)
        .and_then(|date| DateTime::<Utc>::from_timestamp(date + RIPPLE_EPOCH_OFFSET, 0))
    {
        transaction = transaction.with_timestamp(timestamp);
    }

    Ok(transaction)
}

// ============================================================================
// RPC LEDGER CLIENT
// ============================================================================

/// LedgerClient backed by rippled's JSON-RPC API
pub struct RpcLedgerClient {
    config: RpcClientConfig,
    transport: RpcTransport,
    event_tx: mpsc::Sender<ClientEvent>,
    event_rx: Mutex<Option<mpsc::Receiver<ClientEvent>>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl RpcLedgerClient {
    pub fn new(config: RpcClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;

        let (event_tx, event_rx) = mpsc::channel(1000);

        Ok(Self {
            transport: RpcTransport {
                url: config.url.clone(),
                http,
            },
            config,
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
            poller: Mutex::new(None),
        })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    async fn poll_loop(transport: RpcTransport, interval: Duration, event_tx: mpsc::Sender<ClientEvent>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut connected = true;
        let mut last_seen: Option<LedgerVersion> = None;

        loop {
            ticker.tick().await;
            if event_tx.is_closed() {
                break;
            }

            match transport.validated_ledger().await {
                Ok(ledger) => {
                    if !connected {
                        info!(url = %transport.url, "connection to node restored");
                        connected = true;
                        let _ = event_tx.send(ClientEvent::Connected).await;
                    }
                    if last_seen.map_or(true, |seen| ledger.ledger_version > seen) {
                        last_seen = Some(ledger.ledger_version);
                        let _ = event_tx.send(ClientEvent::Ledger(ledger)).await;
                    }
                }
                Err(e) if connected => {
                    warn!(url = %transport.url, error = %e, "lost connection to node");
                    connected = false;
                    let _ = event_tx
                        .send(ClientEvent::Error {
                            code: e.code().to_string(),
                            message: e.to_string(),
                            data: None,
                        })
                        .await;
                    let _ = event_tx
                        .send(ClientEvent::Disconnected { code: CLOSE_ABNORMAL })
                        .await;
                }
                Err(e) => {
                    debug!(url = %transport.url, error = %e, "node still unreachable");
                }
            }
        }
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn connect(&self) -> Result<(), ClientError> {
        self.transport
            .call("server_info", json!({}))
            .await
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;

        self.event_tx
            .send(ClientEvent::Connected)
            .await
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;

        let handle = tokio::spawn(Self::poll_loop(
            self.transport.clone(),
            Duration::from_millis(self.config.poll_interval_ms),
            self.event_tx.clone(),
        ));

        if let Some(previous) = lock(&self.poller).replace(handle) {
            previous.abort();
        }

        info!(url = %self.config.url, "connected to node");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        let poller = lock(&self.poller).take();
        match poller {
            Some(handle) => {
                handle.abort();
                let _ = self
                    .event_tx
                    .send(ClientEvent::Disconnected { code: CLOSE_NORMAL })
                    .await;
                Ok(())
            }
            None => Err(ClientError::NotConnected),
        }
    }

    fn take_events(&self) -> Result<mpsc::Receiver<ClientEvent>, ClientError> {
        lock(&self.event_rx).take().ok_or(ClientError::EventsTaken)
    }

    async fn server_info(&self) -> Result<ServerInfo, ClientError> {
        let result = self.transport.call("server_info", json!({})).await?;
        let info = result
            .get("info")
            .ok_or_else(|| ClientError::MalformedResponse("server_info has no info".to_string()))?;

        let text = |key: &str| info.get(key).and_then(Value::as_str).map(str::to_string);

        Ok(ServerInfo {
            complete_ledgers: text("complete_ledgers").unwrap_or_default(),
            build_version: text("build_version"),
            server_state: text("server_state"),
        })
    }

    async fn transactions(
        &self,
        address: &Address,
        query: &TransactionQuery,
    ) -> Result<Vec<Transaction>, ClientError> {
        let mut transactions = Vec::new();
        let mut marker: Option<Value> = None;

        loop {
            let mut params = json!({
                "account": address.as_str(),
                "ledger_index_min": query.min_ledger_version,
                "ledger_index_max": query.max_ledger_version,
                "forward": query.earliest_first,
                "binary": query.binary,
                "limit": self.config.page_limit,
                "api_version": 1,
            });
            if let Some(marker) = marker.take() {
                params["marker"] = marker;
            }

            let mut result = self.transport.call("account_tx", params).await?;

            let entries = result
                .get("transactions")
                .and_then(Value::as_array)
                .ok_or_else(|| ClientError::MalformedResponse("account_tx has no transactions".to_string()))?;

            for entry in entries {
                if entry.get("validated").and_then(Value::as_bool) == Some(false) {
                    continue;
                }
                let tx = parse_account_tx_entry(entry)?;
                if query.exclude_failures && !tx.is_success() {
                    continue;
                }
                transactions.push(tx);
            }

            match result.get_mut("marker").map(Value::take) {
                Some(next) if !next.is_null() => marker = Some(next),
                _ => break,
            }
        }

        debug!(
            address = %address,
            min = query.min_ledger_version,
            max = query.max_ledger_version,
            found = transactions.len(),
            "account_tx complete"
        );

        Ok(transactions)
    }
}

impl Drop for RpcLedgerClient {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.poller).take() {
            handle.abort();
        }
    }
}
