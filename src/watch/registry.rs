// Address Registry - Which addresses we watch and how far we got
//
// Each watched address carries a cursor: the lowest ledger version not yet
// queried for it. Cursors only move forward.

use crate::ledger::{Address, LedgerVersion, MIN_LEDGER_VERSION};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Registry-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown address {0}")]
    UnknownAddress(Address),
}

/// A watched address and its progress cursor
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchedAddress {
    address: Address,
    cursor: LedgerVersion,
}

impl WatchedAddress {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            cursor: MIN_LEDGER_VERSION,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn cursor(&self) -> LedgerVersion {
        self.cursor
    }

    /// Move the cursor forward. Returns false if it would not advance.
    pub fn advance(&mut self, new_cursor: LedgerVersion) -> bool {
        if new_cursor > self.cursor {
            self.cursor = new_cursor;
            true
        } else {
            false
        }
    }
}

/// Set of watched addresses, shared between concurrent per-address tasks
#[derive(Debug, Default)]
pub struct AddressRegistry {
    entries: Mutex<HashMap<Address, WatchedAddress>>,
}

impl AddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Address, WatchedAddress>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start watching an address. Returns true if it was not watched before.
    pub fn register(&self, address: impl Into<Address>) -> bool {
        let address = address.into();
        let mut entries = self.entries();
        if entries.contains_key(&address) {
            return false;
        }
        entries.insert(address.clone(), WatchedAddress::new(address));
        true
    }

    /// Current cursor of an address
    pub fn cursor_for(&self, address: &Address) -> Result<LedgerVersion, RegistryError> {
        self.entries()
            .get(address)
            .map(WatchedAddress::cursor)
            .ok_or_else(|| RegistryError::UnknownAddress(address.clone()))
    }

    /// Advance the cursor if `new_cursor` is ahead; no-op otherwise.
    /// Returns whether the cursor moved.
    pub fn advance_cursor(
        &self,
        address: &Address,
        new_cursor: LedgerVersion,
    ) -> Result<bool, RegistryError> {
        self.entries()
            .get_mut(address)
            .map(|entry| entry.advance(new_cursor))
            .ok_or_else(|| RegistryError::UnknownAddress(address.clone()))
    }

    /// Stop watching an address. Returns false if it was not watched.
    pub fn remove(&self, address: &Address) -> bool {
        self.entries().remove(address).is_some()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.entries().contains_key(address)
    }

    /// Snapshot of watched addresses, sorted
    pub fn addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self.entries().keys().cloned().collect();
        addresses.sort();
        addresses
    }

    /// Snapshot of every entry, sorted by address
    pub fn snapshot(&self) -> Vec<WatchedAddress> {
        let mut entries: Vec<WatchedAddress> = self.entries().values().cloned().collect();
        entries.sort_by(|a, b| a.address.cmp(&b.address));
        entries
    }

    /// Current cursor of every address
    pub fn cursors(&self) -> HashMap<Address, LedgerVersion> {
        self.entries()
            .iter()
            .map(|(address, entry)| (address.clone(), entry.cursor()))
            .collect()
    }

    /// Lowest cursor across all addresses
    pub fn lowest_cursor(&self) -> Option<LedgerVersion> {
        self.entries().values().map(WatchedAddress::cursor).min()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
