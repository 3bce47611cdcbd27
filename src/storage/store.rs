// SledGate - Persistent delivery records using sled
//
// One tree of delivered transactions, keyed by transaction id, each value a
// postcard-encoded DeliveryRecord listing the addresses notified so far.
// Every record is flushed before it counts.

use super::gate::{DeliveryRecord, DurabilityGate, GateError};
use crate::ledger::{Address, Transaction, TxId};
use std::collections::BTreeSet;
use std::path::Path;

/// Tree names
mod keys {
    pub const DELIVERED: &[u8] = b"delivered";
}

/// Statistics about the delivery store
#[derive(Clone, Debug)]
pub struct StorageStats {
    /// Number of delivered transactions on record
    pub delivered_count: usize,
    /// Approximate disk size in bytes
    pub disk_size_bytes: u64,
}

/// Durability gate backed by an embedded sled database
pub struct SledGate {
    db: sled::Db,
    delivered: sled::Tree,
}

impl SledGate {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GateError> {
        let db = sled::open(path).map_err(|e| GateError::OpenFailed(e.to_string()))?;
        let delivered = db.open_tree(keys::DELIVERED)?;
        Ok(Self { db, delivered })
    }

    /// Check if nothing has been delivered yet
    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty()
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), GateError> {
        self.delivered
            .flush()
            .map_err(|e| GateError::FlushFailed(e.to_string()))?;
        Ok(())
    }

    /// Get storage statistics
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            delivered_count: self.delivered.len(),
            disk_size_bytes: self.db.size_on_disk().unwrap_or(0),
        }
    }

    /// Load the record kept for a transaction
    pub fn load_record(&self, id: &TxId) -> Result<Option<DeliveryRecord>, GateError> {
        match self.delivered.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(DeliveryRecord::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Drop a record so the transaction is delivered again if re-observed
    pub fn forget(&self, id: &TxId) -> Result<bool, GateError> {
        let removed = self.delivered.remove(id.as_bytes())?.is_some();
        self.flush()?;
        Ok(removed)
    }

    /// All transaction ids on record
    pub fn delivered_ids(&self) -> Result<Vec<TxId>, GateError> {
        let mut ids = Vec::new();
        for result in self.delivered.iter().keys() {
            let key = result?;
            let id = String::from_utf8(key.to_vec())
                .map_err(|e| GateError::DeserializationFailed(e.to_string()))?;
            ids.push(TxId::new(id));
        }
        Ok(ids)
    }
}

impl DurabilityGate for SledGate {
    fn delivered_to(&self, id: &TxId) -> Result<BTreeSet<Address>, GateError> {
        Ok(self
            .load_record(id)?
            .map(|record| record.addresses)
            .unwrap_or_default())
    }

    fn record_delivered(&self, tx: &Transaction, addresses: &BTreeSet<Address>) -> Result<(), GateError> {
        let record = match self.load_record(&tx.id)? {
            Some(mut existing) => {
                existing.merge(addresses);
                existing
            }
            None => DeliveryRecord::from_transaction(tx, addresses),
        };
        self.delivered.insert(tx.id.as_bytes(), record.to_bytes()?)?;
        self.flush()
    }

    fn already_delivered(&self, id: &TxId) -> Result<bool, GateError> {
        Ok(self.delivered.contains_key(id.as_bytes())?)
    }
}
