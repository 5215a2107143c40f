//! On-disk deployment: ledger snapshot, mock aggregator and account balances
//! in one JSON state file.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    config::{ConfigError, FundMeConfig},
    ledger::{FundMe, LedgerError, LedgerSnapshot},
    oracle::MockV3Aggregator,
    transfer::{AccountBook, TransferError},
    types::{Address, Amount},
};

pub const STATE_VERSION_V1: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed state file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported state file version {0}")]
    UnsupportedVersion(u32),
    #[error("state file {0} already exists")]
    AlreadyDeployed(PathBuf),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct StateFileV1 {
    version: u32,
    ledger: LedgerSnapshot,
    aggregator: MockV3Aggregator,
    accounts: AccountBook,
}

/// A deployed ledger plus the native balances of the accounts using it.
pub struct Deployment {
    pub ledger: FundMe<MockV3Aggregator>,
    pub accounts: AccountBook,
}

impl Deployment {
    /// Fresh deployment owned by `owner`, with every derived account funded
    /// with the configured initial balance.
    pub fn deploy(config: &FundMeConfig, owner: Address) -> Result<Self, StoreError> {
        let aggregator = MockV3Aggregator::new(
            config.oracle_address(),
            config.aggregator.decimals,
            config.initial_answer()?,
        );
        let ledger = FundMe::new(owner, aggregator, config.minimum_contribution()?);
        let initial = config.initial_balance()?;
        let mut accounts = AccountBook::new();
        for account in config.accounts() {
            accounts.credit(&account, initial)?;
        }
        Ok(Self { ledger, accounts })
    }

    /// Move `value` from the caller's account into the ledger.
    pub fn fund(&mut self, caller: &Address, value: Amount) -> Result<(), StoreError> {
        let mut accounts = self.accounts.clone();
        accounts.debit(caller, value)?;
        self.ledger.fund(caller, value)?;
        self.accounts = accounts;
        Ok(())
    }

    pub fn withdraw(&mut self, caller: &Address) -> Result<Amount, StoreError> {
        Ok(self.ledger.withdraw(caller, &mut self.accounts)?)
    }

    pub fn set_price(&mut self, answer: i128, timestamp: u64) {
        self.ledger.price_feed_mut().update_answer(answer, timestamp);
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let raw = fs::read(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let state: StateFileV1 = serde_json::from_slice(&raw)?;
        if state.version != STATE_VERSION_V1 {
            return Err(StoreError::UnsupportedVersion(state.version));
        }
        let ledger = FundMe::restore(state.ledger, state.aggregator)?;
        debug!(
            path = %path.display(),
            height = ledger.height(),
            balance = %ledger.balance(),
            "loaded state file"
        );
        Ok(Self {
            ledger,
            accounts: state.accounts,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let state = StateFileV1 {
            version: STATE_VERSION_V1,
            ledger: self.ledger.snapshot(),
            aggregator: self.ledger.price_feed().clone(),
            accounts: self.accounts.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&state)?;
        atomic_write(path, &bytes)?;
        info!(
            path = %path.display(),
            height = self.ledger.height(),
            state_root = %state.ledger.state_root,
            "state saved"
        );
        Ok(())
    }

    /// Like [`Deployment::save`] but refuses to overwrite an existing file.
    pub fn save_new(&self, path: &Path) -> Result<(), StoreError> {
        if path.exists() {
            return Err(StoreError::AlreadyDeployed(path.to_path_buf()));
        }
        self.save(path)
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}
