//! FundMe: a crowdfunding custody ledger.
//!
//! Contributors `fund` the ledger with native value; the minimum contribution
//! is checked against a price oracle; only the owner bound at construction can
//! `withdraw`, which sends the full balance to the owner and resets every
//! contribution.
//!
//! * [`ledger`] — the [`FundMe`] state machine, its events and snapshots.
//! * [`oracle`] — the [`PriceFeed`] seam and a mock aggregator.
//! * [`transfer`] — the [`TransferChannel`] seam and an in-memory account book.
//! * [`sync`] — a mutex-serialized handle for multi-threaded hosts.
//! * [`config`] / [`store`] — JSON configuration and state files used by the
//!   `fundme` CLI.

pub mod config;
pub mod ledger;
pub mod oracle;
pub mod store;
pub mod sync;
pub mod transfer;
pub mod types;
pub mod units;

pub use ledger::{FundMe, LedgerError, LedgerEvent, LedgerSnapshot, MinimumContribution};
pub use oracle::{MockV3Aggregator, OracleError, PriceFeed};
pub use sync::SharedFundMe;
pub use transfer::{AccountBook, TransferChannel, TransferError};
pub use types::{Address, Amount, WEI_PER_ETH};
