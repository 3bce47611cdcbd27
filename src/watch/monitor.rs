// Monitor - The single control flow
//
// Consumes client events one at a time. Each new ledger goes through
// ingestion (joined), flush, delivery and finally the ledger-complete
// checkpoint before the next event is looked at.

use super::dispatch::{DeliveryDispatcher, DeliveryReport, DispatchStats};
use super::events::{ErrorReport, MonitorError, MonitorEvent};
use super::ingest::{IngestionLoop, LedgerReport};
use super::pending::PendingTxIndex;
use super::registry::AddressRegistry;
use crate::client::{ClientError, ClientEvent, LedgerClient};
use crate::ledger::{Address, LedgerFloorTracker, LedgerInfo, LedgerVersion};
use crate::storage::DurabilityGate;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Statistics about the monitor
#[derive(Clone, Debug, Default)]
pub struct MonitorStats {
    pub ledgers_processed: u64,
    pub queries_failed: u64,
    pub transactions_delivered: u64,
    pub connects: u64,
    pub disconnects: u64,
}

/// Result of handling one ledger notification
#[derive(Debug)]
pub struct LedgerCycle {
    pub ingest: LedgerReport,
    pub delivery: DeliveryReport,
}

/// Watches a set of addresses on a ledger network
pub struct Monitor {
    client: Arc<dyn LedgerClient>,
    gate: Arc<dyn DurabilityGate>,
    registry: Arc<AddressRegistry>,
    floor: Arc<LedgerFloorTracker>,
    pending: Arc<PendingTxIndex>,
    dispatcher: Arc<DeliveryDispatcher>,
    ingestion: IngestionLoop,
    last_seen_ledger: Option<LedgerVersion>,
    stats: MonitorStats,
}

impl Monitor {
    pub fn new(client: Arc<dyn LedgerClient>, gate: Arc<dyn DurabilityGate>) -> Self {
        let registry = Arc::new(AddressRegistry::new());
        let floor = Arc::new(LedgerFloorTracker::new());
        let pending = Arc::new(PendingTxIndex::new());
        let ingestion = IngestionLoop::new(
            client.clone(),
            registry.clone(),
            floor.clone(),
            pending.clone(),
        );

        Self {
            client,
            gate,
            registry,
            floor,
            pending,
            dispatcher: Arc::new(DeliveryDispatcher::new()),
            ingestion,
            last_seen_ledger: None,
            stats: MonitorStats::default(),
        }
    }

    // ========================================================================
    // SETUP
    // ========================================================================

    /// Start watching an address. Returns false if already watched.
    pub fn add_address(&self, address: impl Into<Address>) -> bool {
        let address = address.into();
        let added = self.registry.register(address.clone());
        if added {
            debug!(address = %address, "watching address");
        }
        added
    }

    /// Stop watching an address. Returns false if it was not watched.
    pub fn remove_address(&self, address: &Address) -> bool {
        let removed = self.registry.remove(address);
        if removed {
            debug!(address = %address, "no longer watching address");
        }
        removed
    }

    /// Receive every event
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<MonitorEvent> {
        self.dispatcher.subscribe()
    }

    /// Receive activity for one address
    pub fn subscribe_address(&self, address: impl Into<Address>) -> mpsc::UnboundedReceiver<MonitorEvent> {
        self.dispatcher.subscribe_address(address)
    }

    pub fn registry(&self) -> &Arc<AddressRegistry> {
        &self.registry
    }

    pub fn floor(&self) -> &Arc<LedgerFloorTracker> {
        &self.floor
    }

    pub fn pending(&self) -> &Arc<PendingTxIndex> {
        &self.pending
    }

    pub fn dispatcher(&self) -> &Arc<DeliveryDispatcher> {
        &self.dispatcher
    }

    pub fn last_seen_ledger(&self) -> Option<LedgerVersion> {
        self.last_seen_ledger
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    // ========================================================================
    // CONNECTION
    // ========================================================================

    pub async fn connect(&self) -> Result<(), ClientError> {
        self.client.connect().await
    }

    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.client.disconnect().await
    }

    /// Take the client's event stream and handle events until it closes
    pub async fn run(&mut self) -> Result<(), ClientError> {
        let mut events = self.client.take_events()?;
        info!(addresses = self.registry.len(), "monitor running");

        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }

        info!("client event stream closed, monitor stopping");
        Ok(())
    }

    // ========================================================================
    // EVENT HANDLING
    // ========================================================================

    /// Handle one client event to completion
    pub async fn handle_event(&mut self, event: ClientEvent) -> Option<LedgerCycle> {
        match event {
            ClientEvent::Connected => {
                self.on_connected().await;
                None
            }
            ClientEvent::Disconnected { code } => {
                info!(code, "disconnected from node");
                self.stats.disconnects += 1;
                self.dispatcher.publish(MonitorEvent::Disconnected { code });
                None
            }
            ClientEvent::Error {
                code,
                message,
                data,
            } => {
                warn!(code = %code, "client error: {}", message);
                self.dispatcher
                    .publish(MonitorEvent::Error(ErrorReport { code, message, data }));
                None
            }
            ClientEvent::Ledger(ledger) => Some(self.process_ledger(ledger).await),
        }
    }

    /// Refresh server metadata and the ledger floor after (re)connecting
    async fn on_connected(&mut self) {
        self.stats.connects += 1;

        match self.client.server_info().await {
            Ok(info) => {
                match self.floor.update_from_server_info(&info) {
                    Ok(floor) => info!(floor, complete_ledgers = %info.complete_ledgers, "ledger floor updated"),
                    Err(e) => self.report(MonitorError::FloorParse(e)),
                }
                self.dispatcher.publish(MonitorEvent::Connected(info));
            }
            Err(e) => self.report(MonitorError::Connection(e.to_string())),
        }
    }

    /// Ingest, flush and deliver one ledger, then mark it complete
    pub async fn process_ledger(&mut self, ledger: LedgerInfo) -> LedgerCycle {
        let ledger_version = ledger.ledger_version;
        self.last_seen_ledger = Some(ledger_version);
        self.dispatcher.publish(MonitorEvent::Ledger(ledger));

        let ingest = self.ingestion.process_ledger(ledger_version).await;
        for error in ingest.failures() {
            self.dispatcher.notify_error(error);
        }

        let flushed = self.pending.flush_up_to(ledger_version);
        let delivery = self.dispatcher.deliver(flushed, self.gate.as_ref());
        for error in &delivery.errors {
            self.dispatcher.notify_error(error);
        }

        self.dispatcher.notify_ledger_complete(ledger_version);

        let pruned = self.dispatcher.prune_settled(&self.registry.cursors());
        if pruned > 0 {
            debug!(ledger = ledger_version, pruned, "forgot settled announcements");
        }

        self.stats.ledgers_processed += 1;
        self.stats.queries_failed += ingest.failure_count() as u64;
        self.stats.transactions_delivered += delivery.delivered as u64;

        debug!(
            ledger = ledger_version,
            delivered = delivery.delivered,
            skipped = delivery.already_delivered,
            "ledger complete"
        );

        LedgerCycle { ingest, delivery }
    }

    fn report(&self, error: MonitorError) {
        warn!(code = error.code(), "{}", error);
        self.dispatcher.notify_error(&error);
    }
}
