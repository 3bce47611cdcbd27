// Ingestion Loop - Catch up every watched address on each new ledger
//
// One task per address queries [max(cursor, floor), ledger]. A cursor only
// advances after its query succeeds, so a failed range is asked again on the
// next ledger. `process_ledger` returns once every task has settled.

use super::events::MonitorError;
use super::pending::PendingTxIndex;
use super::registry::AddressRegistry;
use crate::client::LedgerClient;
use crate::ledger::{Address, LedgerFloorTracker, LedgerVersion, TransactionQuery};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// What happened to one address during a ledger
#[derive(Debug)]
pub enum AddressOutcome {
    /// Range queried, cursor advanced
    Queried {
        address: Address,
        min_ledger_version: LedgerVersion,
        max_ledger_version: LedgerVersion,
        found: usize,
        buffered: usize,
    },
    /// Nothing new to ask for
    Skipped {
        address: Address,
        lower_bound: LedgerVersion,
    },
    /// Query failed, cursor untouched
    Failed { address: Address, error: MonitorError },
}

impl AddressOutcome {
    pub fn address(&self) -> &Address {
        match self {
            Self::Queried { address, .. } | Self::Skipped { address, .. } | Self::Failed { address, .. } => {
                address
            }
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Per-ledger summary of the fan-out
#[derive(Debug)]
pub struct LedgerReport {
    pub ledger_version: LedgerVersion,
    pub outcomes: Vec<AddressOutcome>,
    /// Tasks that died without reporting back
    pub aborted_tasks: usize,
}

impl LedgerReport {
    fn new(ledger_version: LedgerVersion) -> Self {
        Self {
            ledger_version,
            outcomes: Vec::new(),
            aborted_tasks: 0,
        }
    }

    pub fn outcome_for(&self, address: &Address) -> Option<&AddressOutcome> {
        self.outcomes.iter().find(|o| o.address() == address)
    }

    pub fn failures(&self) -> impl Iterator<Item = &MonitorError> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            AddressOutcome::Failed { error, .. } => Some(error),
            _ => None,
        })
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    /// Transactions newly buffered across all addresses
    pub fn buffered(&self) -> usize {
        self.outcomes
            .iter()
            .map(|outcome| match outcome {
                AddressOutcome::Queried { buffered, .. } => *buffered,
                _ => 0,
            })
            .sum()
    }
}

/// Fans a ledger notification out into per-address range queries
#[derive(Clone)]
pub struct IngestionLoop {
    client: Arc<dyn LedgerClient>,
    registry: Arc<AddressRegistry>,
    floor: Arc<LedgerFloorTracker>,
    pending: Arc<PendingTxIndex>,
}

impl IngestionLoop {
    pub fn new(
        client: Arc<dyn LedgerClient>,
        registry: Arc<AddressRegistry>,
        floor: Arc<LedgerFloorTracker>,
        pending: Arc<PendingTxIndex>,
    ) -> Self {
        Self {
            client,
            registry,
            floor,
            pending,
        }
    }

    /// Query every watched address up to `ledger_version` and wait for all
    pub async fn process_ledger(&self, ledger_version: LedgerVersion) -> LedgerReport {
        let mut tasks = JoinSet::new();

        for address in self.registry.addresses() {
            let this = self.clone();
            tasks.spawn(async move { this.ingest_address(address, ledger_version).await });
        }

        let mut report = LedgerReport::new(ledger_version);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => {
                    error!(ledger = ledger_version, error = %e, "ingestion task aborted");
                    report.aborted_tasks += 1;
                }
            }
        }

        debug!(
            ledger = ledger_version,
            addresses = report.outcomes.len(),
            buffered = report.buffered(),
            failures = report.failure_count(),
            "ledger ingested"
        );
        report
    }

    async fn ingest_address(&self, address: Address, ledger_version: LedgerVersion) -> AddressOutcome {
        let cursor = match self.registry.cursor_for(&address) {
            Ok(cursor) => cursor,
            Err(_) => {
                return AddressOutcome::Skipped {
                    address,
                    lower_bound: ledger_version.saturating_add(1),
                }
            }
        };

        let lower_bound = cursor.max(self.floor.current_floor());
        if lower_bound > ledger_version {
            return AddressOutcome::Skipped {
                address,
                lower_bound,
            };
        }

        let query = TransactionQuery::range(lower_bound, ledger_version);
        debug!(address = %address, min = lower_bound, max = ledger_version, "querying transactions");

        match self.client.transactions(&address, &query).await {
            Ok(transactions) => {
                let found = transactions.len();
                let buffered = transactions
                    .into_iter()
                    .map(|tx| self.pending.insert(&address, tx))
                    .filter(|is_new| *is_new)
                    .count();

                if let Err(e) = self.registry.advance_cursor(&address, ledger_version) {
                    warn!(address = %address, error = %e, "address unwatched during query, cursor dropped");
                }

                debug!(address = %address, found, buffered, "found transactions up to ledger {}", ledger_version);
                AddressOutcome::Queried {
                    address,
                    min_ledger_version: lower_bound,
                    max_ledger_version: ledger_version,
                    found,
                    buffered,
                }
            }
            Err(source) => {
                warn!(
                    address = %address,
                    min = lower_bound,
                    max = ledger_version,
                    error = %source,
                    "transaction query failed, will retry on next ledger"
                );
                AddressOutcome::Failed {
                    error: MonitorError::Query {
                        address: address.clone(),
                        min: lower_bound,
                        max: ledger_version,
                        source,
                    },
                    address,
                }
            }
        }
    }
}
