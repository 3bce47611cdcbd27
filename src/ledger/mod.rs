// Ledger module - WHAT THE NETWORK TELLS US
// Domain types for addresses, transactions and ledgers, plus the history floor

mod floor;
mod types;

pub use floor::{parse_floor, FloorError, LedgerFloorTracker};
pub use types::{
    Address, LedgerInfo, LedgerVersion, Outcome, ServerInfo, Transaction, TransactionQuery, TxId,
    MIN_LEDGER_VERSION, SUCCESS_RESULT,
};
