// Ledger Floor - The oldest history we can safely ask for
//
// A node only keeps a window of history. The floor is derived from the last
// retained range it reports and is deliberately set to the midpoint, since
// the window can shrink between computing the floor and using it.

use super::types::{LedgerVersion, ServerInfo, MIN_LEDGER_VERSION};
use std::sync::RwLock;
use thiserror::Error;

/// Errors from floor computation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FloorError {
    #[error("Malformed retained range {0:?}")]
    Parse(String),
}

/// Compute the floor from a retained-range string such as `"a-b,c-d"`
pub fn parse_floor(complete_ledgers: &str) -> Result<LedgerVersion, FloorError> {
    let malformed = || FloorError::Parse(complete_ledgers.to_string());

    let last = complete_ledgers
        .split(',')
        .map(str::trim)
        .last()
        .filter(|chunk| !chunk.is_empty())
        .ok_or_else(malformed)?;

    let (start, end) = match last.split_once('-') {
        Some((start, end)) => (start.trim(), end.trim()),
        None => (last, last),
    };

    let start: LedgerVersion = start.parse().map_err(|_| malformed())?;
    let end: LedgerVersion = end.parse().map_err(|_| malformed())?;
    if start > end {
        return Err(malformed());
    }

    // ceil((start + end) / 2) without overflowing
    let midpoint = start + (end - start).div_ceil(2);
    Ok(midpoint.max(MIN_LEDGER_VERSION))
}

/// Tracks the safe lower bound for range queries
#[derive(Debug)]
pub struct LedgerFloorTracker {
    floor: RwLock<LedgerVersion>,
}

impl LedgerFloorTracker {
    pub fn new() -> Self {
        Self {
            floor: RwLock::new(MIN_LEDGER_VERSION),
        }
    }

    /// Recompute the floor from fresh server metadata.
    ///
    /// On malformed input the previous floor is kept.
    pub fn update_from_server_info(&self, info: &ServerInfo) -> Result<LedgerVersion, FloorError> {
        let floor = parse_floor(&info.complete_ledgers)?;
        let mut current = self.floor.write().unwrap_or_else(|e| e.into_inner());
        *current = floor;
        Ok(floor)
    }

    /// Last computed floor, or the minimum ledger version if never computed
    pub fn current_floor(&self) -> LedgerVersion {
        *self.floor.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for LedgerFloorTracker {
    fn default() -> Self {
        Self::new()
    }
}
