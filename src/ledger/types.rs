// Ledger Types - What the network hands us
//
// Addresses, ledger versions, transactions and the server metadata the
// monitor consumes. Transactions are immutable once received.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer identifier of a ledger, assigned by the network
pub type LedgerVersion = u64;

/// The minimum valid ledger version
pub const MIN_LEDGER_VERSION: LedgerVersion = 1;

/// Result code the network uses for an applied, successful transaction
pub const SUCCESS_RESULT: &str = "tesSUCCESS";

// ============================================================================
// ADDRESS
// ============================================================================

/// A ledger account identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// TRANSACTION ID
// ============================================================================

/// Unique transaction identifier (the transaction hash)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(String);

impl TxId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TxId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TxId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// TRANSACTION
// ============================================================================

/// Whether the network applied the transaction successfully
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failed,
}

impl Outcome {
    /// Derive the outcome from a network result code
    pub fn from_result(result: &str) -> Self {
        if result == SUCCESS_RESULT {
            Self::Success
        } else {
            Self::Failed
        }
    }
}

/// A validated transaction as returned by a range query
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub ledger_version: LedgerVersion,
    pub index_in_ledger: u32,
    pub result: String,
    pub tx_type: String,
    pub source_address: Address,
    pub timestamp: Option<DateTime<Utc>>,
    pub outcome: Outcome,
    /// Full payload as returned by the server
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl Transaction {
    /// Minimal transaction, mostly useful for tests and mocks
    pub fn new(id: impl Into<TxId>, ledger_version: LedgerVersion, source: impl Into<Address>) -> Self {
        Self {
            id: id.into(),
            ledger_version,
            index_in_ledger: 0,
            result: SUCCESS_RESULT.to_string(),
            tx_type: "Payment".to_string(),
            source_address: source.into(),
            timestamp: None,
            outcome: Outcome::Success,
            raw: serde_json::Value::Null,
        }
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.index_in_ledger = index;
        self
    }

    pub fn with_type(mut self, tx_type: &str) -> Self {
        self.tx_type = tx_type.to_string();
        self
    }

    pub fn with_result(mut self, result: &str) -> Self {
        self.result = result.to_string();
        self.outcome = Outcome::from_result(result);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = raw;
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

// ============================================================================
// SERVER / LEDGER METADATA
// ============================================================================

/// Server metadata retrieved after connecting
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Retained ledger ranges, e.g. "32570-62000000"
    pub complete_ledgers: String,
    pub build_version: Option<String>,
    pub server_state: Option<String>,
}

impl ServerInfo {
    pub fn with_complete_ledgers(complete_ledgers: &str) -> Self {
        Self {
            complete_ledgers: complete_ledgers.to_string(),
            ..Self::default()
        }
    }
}

/// A new-ledger notification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerInfo {
    pub ledger_version: LedgerVersion,
    pub ledger_hash: Option<String>,
}

impl LedgerInfo {
    pub fn new(ledger_version: LedgerVersion) -> Self {
        Self {
            ledger_version,
            ledger_hash: None,
        }
    }
}

/// Parameters of a transaction-range query
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionQuery {
    pub min_ledger_version: LedgerVersion,
    pub max_ledger_version: LedgerVersion,
    pub earliest_first: bool,
    pub exclude_failures: bool,
    pub binary: bool,
}

impl TransactionQuery {
    /// Ascending query over `[min, max]` that includes failed transactions
    pub fn range(min_ledger_version: LedgerVersion, max_ledger_version: LedgerVersion) -> Self {
        Self {
            min_ledger_version,
            max_ledger_version,
            earliest_first: true,
            exclude_failures: false,
            binary: false,
        }
    }

    /// Whether a ledger version falls inside the queried range
    pub fn covers(&self, ledger_version: LedgerVersion) -> bool {
        ledger_version >= self.min_ledger_version && ledger_version <= self.max_ledger_version
    }
}
