// Pending Transaction Index - Observed but not yet delivered
//
// Buffers transactions by ledger version, then by transaction id. The same
// transaction seen through several addresses collapses into one entry that
// remembers every observer.

use crate::ledger::{Address, LedgerVersion, Transaction, TxId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A buffered transaction and the watched addresses that observed it
#[derive(Clone, Debug, PartialEq)]
pub struct PendingTx {
    transaction: Transaction,
    observers: BTreeSet<Address>,
}

impl PendingTx {
    fn new(observer: Address, transaction: Transaction) -> Self {
        let mut observers = BTreeSet::new();
        observers.insert(observer);
        Self {
            transaction,
            observers,
        }
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn id(&self) -> &TxId {
        &self.transaction.id
    }

    /// Watched addresses that observed this transaction, sorted
    pub fn observers(&self) -> &BTreeSet<Address> {
        &self.observers
    }
}

type LedgerBucket = HashMap<TxId, PendingTx>;

/// Ledger version → transaction id → pending transaction
#[derive(Debug, Default)]
pub struct PendingTxIndex {
    ledgers: Mutex<BTreeMap<LedgerVersion, LedgerBucket>>,
}

impl PendingTxIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn ledgers(&self) -> MutexGuard<'_, BTreeMap<LedgerVersion, LedgerBucket>> {
        self.ledgers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Buffer a transaction observed through `observer`.
    ///
    /// Keyed by the transaction's own ledger version and id. Returns true if
    /// a new entry was created; a repeat only records the extra observer.
    pub fn insert(&self, observer: &Address, tx: Transaction) -> bool {
        let mut ledgers = self.ledgers();
        let bucket = ledgers.entry(tx.ledger_version).or_default();

        match bucket.get_mut(&tx.id) {
            Some(existing) => {
                existing.observers.insert(observer.clone());
                false
            }
            None => {
                bucket.insert(tx.id.clone(), PendingTx::new(observer.clone(), tx));
                true
            }
        }
    }

    /// Remove and return every entry with ledger version ≤ `ledger_version`.
    ///
    /// Lower ledgers come first; within a ledger entries follow their index.
    pub fn flush_up_to(&self, ledger_version: LedgerVersion) -> Vec<PendingTx> {
        let mut ledgers = self.ledgers();
        let newer = match ledger_version.checked_add(1) {
            Some(next) => ledgers.split_off(&next),
            None => BTreeMap::new(),
        };
        let flushed = std::mem::replace(&mut *ledgers, newer);
        drop(ledgers);

        flushed
            .into_values()
            .flat_map(|bucket| {
                let mut entries: Vec<PendingTx> = bucket.into_values().collect();
                entries.sort_by(|a, b| {
                    a.transaction
                        .index_in_ledger
                        .cmp(&b.transaction.index_in_ledger)
                        .then_with(|| a.transaction.id.cmp(&b.transaction.id))
                });
                entries
            })
            .collect()
    }

    pub fn contains(&self, ledger_version: LedgerVersion, id: &TxId) -> bool {
        self.ledgers()
            .get(&ledger_version)
            .is_some_and(|bucket| bucket.contains_key(id))
    }

    /// Copy of a buffered entry
    pub fn get(&self, ledger_version: LedgerVersion, id: &TxId) -> Option<PendingTx> {
        self.ledgers()
            .get(&ledger_version)
            .and_then(|bucket| bucket.get(id))
            .cloned()
    }

    /// Total buffered transactions
    pub fn len(&self) -> usize {
        self.ledgers().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of ledger versions with buffered transactions
    pub fn ledger_count(&self) -> usize {
        self.ledgers().len()
    }
}
