// Console report - one line per delivered activity

use crate::config::Nicknames;
use crate::ledger::{Address, Transaction};
use std::fmt;

/// `<time> <ledger>.<index> <result> <id> <type> by <source>[ affected <address>]`
pub struct ActivityLine<'a> {
    pub transaction: &'a Transaction,
    pub affected_address: &'a Address,
    pub nicknames: &'a Nicknames,
}

impl fmt::Display for ActivityLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tx = self.transaction;
        let timestamp = tx
            .timestamp
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());

        write!(
            f,
            "{} {}.{} {} {} {} by {}",
            timestamp,
            tx.ledger_version,
            tx.index_in_ledger,
            tx.result,
            tx.id,
            tx.tx_type,
            self.nicknames.display(&tx.source_address)
        )?;

        if self.affected_address != &tx.source_address {
            write!(f, " affected {}", self.nicknames.display(self.affected_address))?;
        }
        Ok(())
    }
}
