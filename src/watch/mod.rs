// Watch module - THE INGESTION ENGINE
// Registry, ingestion fan-out, pending buffer and delivery to subscribers

mod dispatch;
mod events;
mod ingest;
mod monitor;
mod pending;
mod registry;

pub use dispatch::{DeliveryDispatcher, DeliveryReport, DispatchStats};
pub use events::{ErrorReport, MonitorError, MonitorEvent};
pub use ingest::{AddressOutcome, IngestionLoop, LedgerReport};
pub use monitor::{LedgerCycle, Monitor, MonitorStats};
pub use pending::{PendingTx, PendingTxIndex};
pub use registry::{AddressRegistry, RegistryError, WatchedAddress};
