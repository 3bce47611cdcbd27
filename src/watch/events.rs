// Monitor Events and Errors
// Everything a subscriber can observe, and the error taxonomy behind `Error`

use crate::client::ClientError;
use crate::ledger::{Address, FloorError, LedgerInfo, LedgerVersion, ServerInfo, Transaction};
use crate::storage::GateError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while monitoring. None of them stop the monitor.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query for {address} over [{min}, {max}] failed: {source}")]
    Query {
        address: Address,
        min: LedgerVersion,
        max: LedgerVersion,
        #[source]
        source: ClientError,
    },

    #[error("Ledger floor unchanged: {0}")]
    FloorParse(#[from] FloorError),

    #[error("Persistence failed for {id}: {source}")]
    Persistence {
        id: String,
        #[source]
        source: GateError,
    },
}

impl MonitorError {
    /// Stable error code for published reports
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Query { .. } => "query",
            Self::FloorParse(_) => "floor_parse",
            Self::Persistence { .. } => "persistence",
        }
    }

    /// Diagnostic payload attached to the published report
    pub fn data(&self) -> Option<serde_json::Value> {
        match self {
            Self::Query {
                address, min, max, source,
            } => Some(serde_json::json!({
                "address": address.as_str(),
                "min_ledger_version": min,
                "max_ledger_version": max,
                "client_code": source.code(),
            })),
            Self::Persistence { id, .. } => Some(serde_json::json!({ "id": id })),
            _ => None,
        }
    }

    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code().to_string(),
            message: self.to_string(),
            data: self.data(),
        }
    }
}

/// An error as seen by subscribers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

/// Events published by the monitor
#[derive(Clone, Debug, PartialEq)]
pub enum MonitorEvent {
    /// Connected and server metadata retrieved
    Connected(ServerInfo),
    /// Connection closed with the given code
    Disconnected { code: u16 },
    /// A contained, non-fatal error
    Error(ErrorReport),
    /// A new ledger notification, before its transactions are fetched
    Ledger(LedgerInfo),
    /// Every transaction in ledgers up to this version has been delivered
    LedgerComplete(LedgerVersion),
    /// A new transaction touching a watched address
    AddressActivity {
        address: Address,
        affected_address: Address,
        transaction: Transaction,
    },
}

impl MonitorEvent {
    /// The watched address this event is scoped to, if any
    pub fn address(&self) -> Option<&Address> {
        match self {
            Self::AddressActivity { address, .. } => Some(address),
            _ => None,
        }
    }
}
