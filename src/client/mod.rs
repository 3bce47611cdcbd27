// Client module - THE NETWORK (abstract)
// Abstract ledger client plus a JSON-RPC implementation and a scripted mock

mod mock;
mod rpc;
mod traits;

pub use traits::{ClientError, ClientEvent, LedgerClient, CLOSE_ABNORMAL, CLOSE_NORMAL};

pub use rpc::{parse_account_tx_entry, RpcClientConfig, RpcLedgerClient};

pub use mock::{MockLedgerClient, RecordedQuery};
