// Mock Ledger Client
// Scripted in-memory stand-in for a network node, used by tests and demos

use super::traits::{ClientError, ClientEvent, LedgerClient, CLOSE_NORMAL};
use crate::ledger::{Address, LedgerInfo, LedgerVersion, ServerInfo, Transaction, TransactionQuery};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A query the mock has answered (or refused)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedQuery {
    pub address: Address,
    pub query: TransactionQuery,
    pub failed: bool,
}

/// Mock implementation of LedgerClient for testing
pub struct MockLedgerClient {
    server_info: Mutex<Result<ServerInfo, ClientError>>,
    history: Mutex<HashMap<Address, Vec<Transaction>>>,
    failures_remaining: Mutex<HashMap<Address, usize>>,
    queries: Mutex<Vec<RecordedQuery>>,
    delays: Mutex<HashMap<Address, u64>>,
    connected: AtomicBool,
    server_info_calls: AtomicUsize,
    event_tx: mpsc::Sender<ClientEvent>,
    event_rx: Mutex<Option<mpsc::Receiver<ClientEvent>>>,
}

impl MockLedgerClient {
    /// Create a mock that retains every ledger from 1
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::channel(1024);
        Self {
            server_info: Mutex::new(Ok(ServerInfo::with_complete_ledgers("1-1"))),
            history: Mutex::new(HashMap::new()),
            failures_remaining: Mutex::new(HashMap::new()),
            queries: Mutex::new(Vec::new()),
            delays: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(false),
            server_info_calls: AtomicUsize::new(0),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
        }
    }

    /// Configure the retained range reported by `server_info`
    pub fn with_complete_ledgers(self, complete_ledgers: &str) -> Self {
        self.set_complete_ledgers(complete_ledgers);
        self
    }

    pub fn set_complete_ledgers(&self, complete_ledgers: &str) {
        *lock(&self.server_info) = Ok(ServerInfo::with_complete_ledgers(complete_ledgers));
    }

    /// Make `server_info` fail until reconfigured
    pub fn fail_server_info(&self, error: ClientError) {
        *lock(&self.server_info) = Err(error);
    }

    /// Record a transaction as affecting `address`
    pub fn add_transaction(&self, address: impl Into<Address>, tx: Transaction) {
        lock(&self.history).entry(address.into()).or_default().push(tx);
    }

    /// Fail the next `count` queries for `address`
    pub fn fail_next_queries(&self, address: impl Into<Address>, count: usize) {
        lock(&self.failures_remaining).insert(address.into(), count);
    }

    /// Delay answers for `address`, to shuffle completion order
    pub fn delay_queries(&self, address: impl Into<Address>, delay_ms: u64) {
        lock(&self.delays).insert(address.into(), delay_ms);
    }

    /// All queries seen so far, in arrival order
    pub fn queries(&self) -> Vec<RecordedQuery> {
        lock(&self.queries).clone()
    }

    /// Queries seen for one address
    pub fn queries_for(&self, address: &Address) -> Vec<RecordedQuery> {
        lock(&self.queries)
            .iter()
            .filter(|q| &q.address == address)
            .cloned()
            .collect()
    }

    pub fn server_info_calls(&self) -> usize {
        self.server_info_calls.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Sender for pushing arbitrary client events
    pub fn event_sender(&self) -> mpsc::Sender<ClientEvent> {
        self.event_tx.clone()
    }

    /// Announce a newly validated ledger
    pub async fn emit_ledger(&self, ledger_version: LedgerVersion) {
        let _ = self
            .event_tx
            .send(ClientEvent::Ledger(LedgerInfo::new(ledger_version)))
            .await;
    }
}

impl Default for MockLedgerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for MockLedgerClient {
    async fn connect(&self) -> Result<(), ClientError> {
        self.connected.store(true, Ordering::SeqCst);
        self.event_tx
            .send(ClientEvent::Connected)
            .await
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self
            .event_tx
            .send(ClientEvent::Disconnected { code: CLOSE_NORMAL })
            .await;
        Ok(())
    }

    fn take_events(&self) -> Result<mpsc::Receiver<ClientEvent>, ClientError> {
        lock(&self.event_rx).take().ok_or(ClientError::EventsTaken)
    }

    async fn server_info(&self) -> Result<ServerInfo, ClientError> {
        self.server_info_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.server_info).clone()
    }

    async fn transactions(
        &self,
        address: &Address,
        query: &TransactionQuery,
    ) -> Result<Vec<Transaction>, ClientError> {
        let delay_ms = lock(&self.delays).get(address).copied().unwrap_or(0);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        let should_fail = {
            let mut failures = lock(&self.failures_remaining);
            match failures.get_mut(address) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };

        lock(&self.queries).push(RecordedQuery {
            address: address.clone(),
            query: query.clone(),
            failed: should_fail,
        });

        if should_fail {
            return Err(ClientError::RequestFailed(format!(
                "simulated failure for {}",
                address
            )));
        }

        let mut found: Vec<Transaction> = lock(&self.history)
            .get(address)
            .map(|txs| {
                txs.iter()
                    .filter(|tx| query.covers(tx.ledger_version))
                    .filter(|tx| !query.exclude_failures || tx.is_success())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        found.sort_by_key(|tx| (tx.ledger_version, tx.index_in_ledger));
        if !query.earliest_first {
            found.reverse();
        }

        Ok(found)
    }
}
