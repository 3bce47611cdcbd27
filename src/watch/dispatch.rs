// Delivery Dispatcher - Hands events to subscribers
//
// Publishes monitor events over per-subscriber channels and delivers flushed
// transactions through the durability gate. Within one process a given
// (address, transaction) pair is announced at most once; across restarts the
// gate takes over.

use super::events::{MonitorError, MonitorEvent};
use super::pending::PendingTx;
use crate::ledger::{Address, LedgerVersion, Transaction, TxId};
use crate::storage::DurabilityGate;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Subscriber {
    /// Only activity for this address, or everything when unset
    address: Option<Address>,
    sender: mpsc::UnboundedSender<MonitorEvent>,
}

impl Subscriber {
    fn wants(&self, event: &MonitorEvent) -> bool {
        match &self.address {
            None => true,
            Some(filter) => event.address() == Some(filter),
        }
    }
}

/// Outcome of delivering one batch of flushed transactions
#[derive(Debug, Default)]
pub struct DeliveryReport {
    /// Transactions announced and handed to the gate
    pub delivered: usize,
    /// Transactions the gate already knew about
    pub already_delivered: usize,
    /// Address notifications published
    pub notifications: usize,
    /// Gate failures, reported but not fatal
    pub errors: Vec<MonitorError>,
}

/// Statistics about the dispatcher
#[derive(Clone, Debug, Default)]
pub struct DispatchStats {
    pub events_published: u64,
    pub notifications: u64,
    pub duplicates_suppressed: u64,
    pub persistence_failures: u64,
}

/// Publishes monitor events to subscribers
#[derive(Default)]
pub struct DeliveryDispatcher {
    subscribers: Mutex<Vec<Subscriber>>,
    /// (address, id) pairs announced in this process, by ledger version
    announced: Mutex<BTreeMap<LedgerVersion, HashSet<(Address, TxId)>>>,
    stats: Mutex<DispatchStats>,
}

impl DeliveryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // SUBSCRIPTIONS
    // ========================================================================

    /// Receive every event
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<MonitorEvent> {
        self.add_subscriber(None)
    }

    /// Receive only activity for one address
    pub fn subscribe_address(&self, address: impl Into<Address>) -> mpsc::UnboundedReceiver<MonitorEvent> {
        self.add_subscriber(Some(address.into()))
    }

    fn add_subscriber(&self, address: Option<Address>) -> mpsc::UnboundedReceiver<MonitorEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        lock(&self.subscribers).push(Subscriber { address, sender });
        receiver
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Send an event to every interested subscriber, dropping closed ones
    pub fn publish(&self, event: MonitorEvent) {
        lock(&self.subscribers).retain(|subscriber| {
            if subscriber.sender.is_closed() {
                return false;
            }
            if !subscriber.wants(&event) {
                return true;
            }
            subscriber.sender.send(event.clone()).is_ok()
        });
        lock(&self.stats).events_published += 1;
    }

    // ========================================================================
    // NOTIFICATIONS
    // ========================================================================

    /// Announce a transaction for a watched address.
    ///
    /// Returns false, without publishing, if this pair was already announced.
    pub fn notify_address_activity(
        &self,
        address: &Address,
        tx: &Transaction,
        affected_address: &Address,
    ) -> bool {
        let fresh = lock(&self.announced)
            .entry(tx.ledger_version)
            .or_default()
            .insert((address.clone(), tx.id.clone()));

        if !fresh {
            lock(&self.stats).duplicates_suppressed += 1;
            debug!(address = %address, id = %tx.id, "duplicate notification suppressed");
            return false;
        }

        self.publish(MonitorEvent::AddressActivity {
            address: address.clone(),
            affected_address: affected_address.clone(),
            transaction: tx.clone(),
        });
        lock(&self.stats).notifications += 1;
        true
    }

    /// Announce that everything up to `ledger_version` has been delivered
    pub fn notify_ledger_complete(&self, ledger_version: LedgerVersion) {
        self.publish(MonitorEvent::LedgerComplete(ledger_version));
    }

    /// Publish a contained error
    pub fn notify_error(&self, err: &MonitorError) {
        self.publish(MonitorEvent::Error(err.to_report()));
    }

    // ========================================================================
    // DELIVERY
    // ========================================================================

    /// Deliver flushed transactions through the durability gate.
    ///
    /// Each observer the gate has not recorded for the transaction is
    /// notified, then the gate record is extended with every observer. A
    /// transaction whose observers are all on record is skipped. A failed
    /// gate read is treated as "nobody notified yet"; a failed write leaves
    /// those observers unrecorded so a restart notifies them again.
    pub fn deliver(&self, flushed: Vec<PendingTx>, gate: &dyn DurabilityGate) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for entry in flushed {
            let tx = entry.transaction();

            let on_record = match gate.delivered_to(&tx.id) {
                Ok(addresses) => addresses,
                Err(e) => {
                    warn!(id = %tx.id, error = %e, "delivery record unreadable, delivering anyway");
                    report.errors.push(MonitorError::Persistence {
                        id: tx.id.to_string(),
                        source: e,
                    });
                    BTreeSet::new()
                }
            };

            let unrecorded: BTreeSet<Address> = entry
                .observers()
                .difference(&on_record)
                .cloned()
                .collect();
            if unrecorded.is_empty() {
                debug!(id = %tx.id, "already delivered by an earlier run");
                report.already_delivered += 1;
                continue;
            }

            for observer in &unrecorded {
                if self.notify_address_activity(observer, tx, observer) {
                    report.notifications += 1;
                }
            }

            if let Err(e) = gate.record_delivered(tx, &unrecorded) {
                error!(id = %tx.id, error = %e, "failed to record delivery");
                lock(&self.stats).persistence_failures += 1;
                report.errors.push(MonitorError::Persistence {
                    id: tx.id.to_string(),
                    source: e,
                });
            }
            report.delivered += 1;
        }

        report
    }

    /// Forget announcements no query can repeat.
    ///
    /// A pair is dropped once its ledger is below the cursor of its address,
    /// so an address whose queries keep failing does not hold back the rest.
    /// Addresses missing from `cursors` keep their pairs.
    pub fn prune_settled(&self, cursors: &HashMap<Address, LedgerVersion>) -> usize {
        let mut announced = lock(&self.announced);
        let mut pruned = 0;

        announced.retain(|ledger_version, pairs| {
            let before = pairs.len();
            pairs.retain(|(address, _)| {
                cursors
                    .get(address)
                    .map_or(true, |cursor| ledger_version >= cursor)
            });
            pruned += before - pairs.len();
            !pairs.is_empty()
        });

        pruned
    }

    /// Number of (address, id) pairs remembered
    pub fn announced_count(&self) -> usize {
        lock(&self.announced).values().map(HashSet::len).sum()
    }

    pub fn stats(&self) -> DispatchStats {
        lock(&self.stats).clone()
    }
}
