// ledgerwatch - Address-scoped, exactly-once transaction notifications
// from an append-only ledger network.
//
// Layers, leaf-first:
// - ledger:  addresses, transactions, retained-history floor
// - client:  the network node (JSON-RPC or scripted mock)
// - storage: durability gates remembering what was delivered
// - watch:   registry, ingestion fan-out, pending buffer, dispatcher, monitor

pub mod client;
pub mod config;
pub mod ledger;
pub mod report;
pub mod storage;
pub mod watch;

pub use client::{ClientError, ClientEvent, LedgerClient, MockLedgerClient, RpcLedgerClient};
pub use config::{ConfigError, MonitorConfig};
pub use ledger::{Address, LedgerVersion, Transaction, TxId};
pub use storage::{DurabilityGate, FileGate, MemoryGate, SledGate};
pub use watch::{Monitor, MonitorEvent};
