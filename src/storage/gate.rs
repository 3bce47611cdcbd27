// Durability Gate - Remembers what was already delivered
//
// One record per transaction id. The record lists every watched address
// that has been notified of the transaction, so an address whose query was
// retried after another address delivered the same transaction is still
// notified exactly once.

use crate::ledger::{Address, LedgerVersion, Transaction, TxId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Errors from durability gate operations
#[derive(Error, Debug)]
pub enum GateError {
    #[error("Failed to open delivery store: {0}")]
    OpenFailed(String),

    #[error("Database operation failed: {0}")]
    DatabaseError(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Flush failed: {0}")]
    FlushFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid record template {0:?}: must contain {{id}} and no other placeholder")]
    InvalidTemplate(String),

    #[error("Write rejected: {0}")]
    WriteRejected(String),

    #[error("Transaction id {0:?} cannot be used as a file name")]
    InvalidId(String),
}

impl From<sled::Error> for GateError {
    fn from(err: sled::Error) -> Self {
        GateError::DatabaseError(err.to_string())
    }
}

/// Persistent delivery record, keyed by transaction id
pub trait DurabilityGate: Send + Sync {
    /// Addresses already notified of this transaction, by this or an
    /// earlier run. Empty when the transaction was never delivered.
    fn delivered_to(&self, id: &TxId) -> Result<BTreeSet<Address>, GateError>;

    /// Durably add `addresses` to the transaction's record, creating it if
    /// needed. Addresses already on record are kept.
    fn record_delivered(&self, tx: &Transaction, addresses: &BTreeSet<Address>) -> Result<(), GateError>;

    /// Has any address been notified of this transaction?
    fn already_delivered(&self, id: &TxId) -> Result<bool, GateError> {
        Ok(!self.delivered_to(id)?.is_empty())
    }
}

/// What the sled gate stores per delivered transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: TxId,
    pub ledger_version: LedgerVersion,
    pub index_in_ledger: u32,
    /// Watched addresses notified so far
    pub addresses: BTreeSet<Address>,
    /// Unix timestamp (seconds) of the last write
    pub recorded_at: i64,
}

impl DeliveryRecord {
    pub fn from_transaction(tx: &Transaction, addresses: &BTreeSet<Address>) -> Self {
        Self {
            id: tx.id.clone(),
            ledger_version: tx.ledger_version,
            index_in_ledger: tx.index_in_ledger,
            addresses: addresses.clone(),
            recorded_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Fold more notified addresses into the record
    pub fn merge(&mut self, addresses: &BTreeSet<Address>) {
        self.addresses.extend(addresses.iter().cloned());
        self.recorded_at = chrono::Utc::now().timestamp();
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, GateError> {
        postcard::to_allocvec(self).map_err(|e| GateError::SerializationFailed(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GateError> {
        postcard::from_bytes(bytes).map_err(|e| GateError::DeserializationFailed(e.to_string()))
    }
}

// ============================================================================
// MEMORY GATE
// ============================================================================

/// In-memory gate with failure injection, for tests
#[derive(Default)]
pub struct MemoryGate {
    delivered: Mutex<HashMap<TxId, BTreeSet<Address>>>,
    record_calls: AtomicUsize,
    fail_reads: AtomicBool,
    failing_writes: AtomicUsize,
}

impl MemoryGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate as if a prior run had notified `addresses` of `tx`
    pub fn with_delivered<I, A>(self, tx: Transaction, addresses: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Address>,
    {
        self.delivered()
            .entry(tx.id)
            .or_default()
            .extend(addresses.into_iter().map(Into::into));
        self
    }

    /// Reject the next `count` writes
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Make every read fail until switched back
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, id: &TxId) -> bool {
        self.delivered().contains_key(id)
    }

    /// Addresses on record for a transaction, ignoring injected failures
    pub fn notified(&self, id: &TxId) -> BTreeSet<Address> {
        self.delivered().get(id).cloned().unwrap_or_default()
    }

    /// Number of distinct transactions recorded
    pub fn len(&self) -> usize {
        self.delivered().len()
    }

    pub fn is_empty(&self) -> bool {
        self.delivered().is_empty()
    }

    /// Number of successful `record_delivered` calls
    pub fn record_calls(&self) -> usize {
        self.record_calls.load(Ordering::SeqCst)
    }

    fn delivered(&self) -> MutexGuard<'_, HashMap<TxId, BTreeSet<Address>>> {
        self.delivered.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DurabilityGate for MemoryGate {
    fn delivered_to(&self, id: &TxId) -> Result<BTreeSet<Address>, GateError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(GateError::DatabaseError("simulated read failure".to_string()));
        }
        Ok(self.notified(id))
    }

    fn record_delivered(&self, tx: &Transaction, addresses: &BTreeSet<Address>) -> Result<(), GateError> {
        let rejected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(GateError::WriteRejected(format!("simulated write failure for {}", tx.id)));
        }

        self.delivered()
            .entry(tx.id.clone())
            .or_default()
            .extend(addresses.iter().cloned());
        self.record_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
