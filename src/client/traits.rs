// Ledger Client Traits and Core Types
// Defines the abstract LedgerClient trait and the events a client produces

use crate::ledger::{Address, LedgerInfo, ServerInfo, Transaction, TransactionQuery};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Close code reported for a requested disconnect
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code reported when the connection was lost
pub const CLOSE_ABNORMAL: u16 = 1006;

// ============================================================================
// CLIENT EVENTS
// ============================================================================

/// Events produced by a ledger client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Connection (re)established
    Connected,
    /// Connection closed
    Disconnected { code: u16 },
    /// Something went wrong on the client side
    Error {
        code: String,
        message: String,
        data: Option<serde_json::Value>,
    },
    /// A new ledger was validated
    Ledger(LedgerInfo),
}

// ============================================================================
// CLIENT ERROR
// ============================================================================

/// Errors from ledger client operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Server returned error {code}: {message}")]
    Server { code: String, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Event stream already taken")]
    EventsTaken,
}

impl ClientError {
    /// Short error code, mirrored in published error reports
    pub fn code(&self) -> &str {
        match self {
            Self::ConnectionFailed(_) => "connection_failed",
            Self::NotConnected => "not_connected",
            Self::RequestFailed(_) => "request_failed",
            Self::Server { code, .. } => code.as_str(),
            Self::MalformedResponse(_) => "malformed_response",
            Self::EventsTaken => "events_taken",
        }
    }

    /// Check if this is a connection-related error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionFailed(_) | Self::NotConnected)
    }
}

// ============================================================================
// LEDGER CLIENT TRAIT
// ============================================================================

/// Connection to a ledger network node
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Open the connection and start producing events
    async fn connect(&self) -> Result<(), ClientError>;

    /// Close the connection
    async fn disconnect(&self) -> Result<(), ClientError>;

    /// Hand out the event stream. Can only be taken once.
    fn take_events(&self) -> Result<mpsc::Receiver<ClientEvent>, ClientError>;

    /// Retrieve server metadata, including the retained ledger range
    async fn server_info(&self) -> Result<ServerInfo, ClientError>;

    /// Transactions affecting `address` in the queried ledger range
    async fn transactions(
        &self,
        address: &Address,
        query: &TransactionQuery,
    ) -> Result<Vec<Transaction>, ClientError>;
}
