// FileGate - One JSON file per delivered transaction
//
// The presence of the file is the delivery marker, and the file doubles as a
// permanent local copy of the transaction. File names derive from the
// transaction id only, so a lookup by id always finds the same file. The
// transaction JSON carries one extra key, `notified_addresses`.

use super::gate::{DurabilityGate, GateError};
use crate::ledger::{Address, Transaction, TxId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

const ID_PLACEHOLDER: &str = "{id}";

/// On-disk layout: the transaction plus who has been told about it
#[derive(Serialize, Deserialize)]
struct FileRecord {
    #[serde(flatten)]
    transaction: Transaction,
    #[serde(default)]
    notified_addresses: BTreeSet<Address>,
}

/// Durability gate that writes pretty-printed transaction files
#[derive(Clone, Debug)]
pub struct FileGate {
    template: String,
}

impl FileGate {
    /// Create a gate from a path template such as `"tx/{id}.json"`
    pub fn new(template: &str) -> Result<Self, GateError> {
        let without_id = template.replace(ID_PLACEHOLDER, "");
        if !template.contains(ID_PLACEHOLDER) || without_id.contains('{') || without_id.contains('}') {
            return Err(GateError::InvalidTemplate(template.to_string()));
        }
        Ok(Self {
            template: template.to_string(),
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Path of the record file for a transaction id.
    ///
    /// Ids that could escape the template directory are rejected.
    pub fn path_for(&self, id: &TxId) -> Result<PathBuf, GateError> {
        let raw = id.as_str();
        let unsafe_id = raw.is_empty()
            || raw == "."
            || raw == ".."
            || raw.contains(['/', '\\', '\0']);
        if unsafe_id {
            return Err(GateError::InvalidId(raw.to_string()));
        }
        Ok(PathBuf::from(self.template.replace(ID_PLACEHOLDER, raw)))
    }

    /// Read back a recorded transaction
    pub fn load(&self, id: &TxId) -> Result<Option<Transaction>, GateError> {
        Ok(self.load_record(id)?.map(|record| record.transaction))
    }

    fn load_record(&self, id: &TxId) -> Result<Option<FileRecord>, GateError> {
        let path = self.path_for(id)?;
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| GateError::DeserializationFailed(e.to_string()))
    }
}

impl DurabilityGate for FileGate {
    fn delivered_to(&self, id: &TxId) -> Result<BTreeSet<Address>, GateError> {
        Ok(self
            .load_record(id)?
            .map(|record| record.notified_addresses)
            .unwrap_or_default())
    }

    fn record_delivered(&self, tx: &Transaction, addresses: &BTreeSet<Address>) -> Result<(), GateError> {
        let path = self.path_for(&tx.id)?;
        let mut notified_addresses = self
            .load_record(&tx.id)?
            .map(|record| record.notified_addresses)
            .unwrap_or_default();
        notified_addresses.extend(addresses.iter().cloned());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let record = FileRecord {
            transaction: tx.clone(),
            notified_addresses,
        };
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| GateError::SerializationFailed(e.to_string()))?;

        // Write then rename so a crash never leaves a half-written marker
        let mut partial = path.clone().into_os_string();
        partial.push(".partial");
        fs::write(&partial, json)?;
        fs::rename(&partial, &path)?;
        Ok(())
    }

    fn already_delivered(&self, id: &TxId) -> Result<bool, GateError> {
        Ok(self.path_for(id)?.is_file())
    }
}
