// Storage module - PERSISTENCE
// Durability gates that remember delivered transactions across restarts

mod file;
mod gate;
mod store;

pub use file::FileGate;
pub use gate::{DeliveryRecord, DurabilityGate, GateError, MemoryGate};
pub use store::{SledGate, StorageStats};
