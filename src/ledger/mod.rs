//! The FundMe funding ledger.
//!
//! Tracks how much every contributor has sent, the order of `fund` calls and
//! the aggregate balance held on behalf of a fixed owner. Every mutator is
//! all-or-nothing: on error the ledger is exactly as it was before the call.
//! The ledger does no logging of its own.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    oracle::{conversion_rate, OracleError, PriceFeed},
    transfer::{TransferChannel, TransferError},
    types::{amount_string, Address, Amount, WEI_PER_ETH},
    units::format_ether,
};


/// Default minimum contribution: 50 USD.
pub const MINIMUM_USD: Amount = 50 * WEI_PER_ETH;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("You need to spend more ETH!")]
    InsufficientContribution {
        value: Amount,
        minimum: MinimumContribution,
    },
    #[error("FundMe_NotOwner")]
    NotOwner { caller: Address },
    #[error("funder index {index} out of range ({len} funders)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("ledger balance overflow")]
    Overflow,
    #[error("price oracle: {0}")]
    Oracle(#[from] OracleError),
    #[error("withdrawal transfer failed: {0}")]
    Transfer(#[from] TransferError),
    #[error("ledger lock poisoned")]
    Poisoned,
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Threshold a single `fund` call has to meet.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MinimumContribution {
    /// Fixed native amount in wei.
    Wei(#[serde(with = "amount_string")] Amount),
    /// USD value with 18 decimals, priced through the oracle.
    Usd(#[serde(with = "amount_string")] Amount),
}

impl Default for MinimumContribution {
    fn default() -> Self {
        MinimumContribution::Usd(MINIMUM_USD)
    }
}

impl std::fmt::Display for MinimumContribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MinimumContribution::Wei(v) => write!(f, "{} ETH", format_ether(*v)),
            MinimumContribution::Usd(v) => write!(f, "{} USD", format_ether(*v)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Funded {
        funder: Address,
        #[serde(with = "amount_string")]
        amount: Amount,
    },
    Withdrawn {
        owner: Address,
        #[serde(with = "amount_string")]
        amount: Amount,
        funders_cleared: usize,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContributorRecord {
    pub address: Address,
    #[serde(with = "amount_string")]
    pub amount: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub owner: Address,
    pub price_feed: Address,
    pub minimum: MinimumContribution,
    #[serde(with = "amount_string")]
    pub balance: Amount,
    pub contributors: Vec<ContributorRecord>,
    pub funders: Vec<Address>,
    pub height: u64,
    pub events: Vec<LedgerEvent>,
    /// Hex SHA-256 commitment over owner, feed, minimum, height, balance,
    /// records and funders.
    pub state_root: String,
}

pub struct FundMe<F> {
    owner: Address,
    price_feed: F,
    minimum: MinimumContribution,
    address_to_amount_funded: BTreeMap<Address, Amount>,
    funders: Vec<Address>,
    balance: Amount,
    events: Vec<LedgerEvent>,
    height: u64,
}

impl<F: PriceFeed> FundMe<F> {
    pub fn new(owner: Address, price_feed: F, minimum: MinimumContribution) -> Self {
        Self {
            owner,
            price_feed,
            minimum,
            address_to_amount_funded: BTreeMap::new(),
            funders: Vec::new(),
            balance: 0,
            events: Vec::new(),
            height: 0,
        }
    }

    /// Record a contribution of `value` wei from `caller`.
    pub fn fund(&mut self, caller: &Address, value: Amount) -> Result<(), LedgerError> {
        self.check_minimum(value)?;
        let balance = self
            .balance
            .checked_add(value)
            .ok_or(LedgerError::Overflow)?;
        let recorded = self
            .amount_funded_by(caller)
            .checked_add(value)
            .ok_or(LedgerError::Overflow)?;

        self.address_to_amount_funded.insert(*caller, recorded);
        self.funders.push(*caller);
        self.balance = balance;
        self.events.push(LedgerEvent::Funded {
            funder: *caller,
            amount: value,
        });
        self.height += 1;
        Ok(())
    }

    /// Plain value transfer into the ledger. Same rules as [`FundMe::fund`].
    pub fn receive(&mut self, caller: &Address, value: Amount) -> Result<(), LedgerError> {
        self.fund(caller, value)
    }

    /// Send the whole balance to the owner and reset all contributions.
    ///
    /// Records stay in place with a zero amount; the funder sequence is
    /// emptied. Returns the amount sent.
    pub fn withdraw<C: TransferChannel + ?Sized>(
        &mut self,
        caller: &Address,
        channel: &mut C,
    ) -> Result<Amount, LedgerError> {
        if *caller != self.owner {
            return Err(LedgerError::NotOwner { caller: *caller });
        }
        let amount = self.balance;
        channel.send(&self.owner, amount)?;

        for recorded in self.address_to_amount_funded.values_mut() {
            *recorded = 0;
        }
        let funders_cleared = self.funders.len();
        self.funders.clear();
        self.balance = 0;
        self.events.push(LedgerEvent::Withdrawn {
            owner: self.owner,
            amount,
            funders_cleared,
        });
        self.height += 1;
        Ok(amount)
    }

    fn check_minimum(&self, value: Amount) -> Result<(), LedgerError> {
        let sufficient = match self.minimum {
            _ if value == 0 => false,
            MinimumContribution::Wei(min) => value >= min,
            MinimumContribution::Usd(min) => conversion_rate(value, &self.price_feed)? >= min,
        };
        if !sufficient {
            return Err(LedgerError::InsufficientContribution {
                value,
                minimum: self.minimum,
            });
        }
        Ok(())
    }

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    pub fn price_feed(&self) -> &F {
        &self.price_feed
    }

    /// Mutable access to the feed, for harnesses that move the price.
    pub fn price_feed_mut(&mut self) -> &mut F {
        &mut self.price_feed
    }

    pub fn price_feed_address(&self) -> Address {
        self.price_feed.address()
    }

    pub fn version(&self) -> u64 {
        self.price_feed.version()
    }

    pub fn minimum(&self) -> MinimumContribution {
        self.minimum
    }

    /// Zero for addresses that never funded.
    pub fn amount_funded_by(&self, address: &Address) -> Amount {
        self.address_to_amount_funded
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    pub fn funder_at(&self, index: usize) -> Result<Address, LedgerError> {
        self.funders
            .get(index)
            .copied()
            .ok_or(LedgerError::IndexOutOfRange {
                index,
                len: self.funders.len(),
            })
    }

    pub fn funder_count(&self) -> usize {
        self.funders.len()
    }

    pub fn funders(&self) -> &[Address] {
        &self.funders
    }

    /// Every address that ever funded, including those reset to zero.
    pub fn contributors(&self) -> impl Iterator<Item = (&Address, &Amount)> {
        self.address_to_amount_funded.iter()
    }

    pub fn is_contributor(&self, address: &Address) -> bool {
        self.address_to_amount_funded.contains_key(address)
    }

    pub fn balance(&self) -> Amount {
        self.balance
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Number of successful state changes.
    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn state_root(&self) -> [u8; 32] {
        compute_state_root(
            &self.owner,
            &self.price_feed.address(),
            &self.minimum,
            self.height,
            self.balance,
            &self.address_to_amount_funded,
            &self.funders,
        )
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            owner: self.owner,
            price_feed: self.price_feed.address(),
            minimum: self.minimum,
            balance: self.balance,
            contributors: self
                .address_to_amount_funded
                .iter()
                .map(|(address, amount)| ContributorRecord {
                    address: *address,
                    amount: *amount,
                })
                .collect(),
            funders: self.funders.clone(),
            height: self.height,
            events: self.events.clone(),
            state_root: hex::encode(self.state_root()),
        }
    }

    /// Rebuild a ledger from `snapshot`, bound to `price_feed`.
    pub fn restore(snapshot: LedgerSnapshot, price_feed: F) -> Result<Self, LedgerError> {
        let invalid = |msg: String| LedgerError::InvalidSnapshot(msg);
        if price_feed.address() != snapshot.price_feed {
            return Err(invalid(format!(
                "price feed {} does not match snapshot feed {}",
                price_feed.address(),
                snapshot.price_feed
            )));
        }

        let mut records = BTreeMap::new();
        let mut total: Amount = 0;
        for record in &snapshot.contributors {
            if records.insert(record.address, record.amount).is_some() {
                return Err(invalid(format!("duplicate contributor {}", record.address)));
            }
            total = total
                .checked_add(record.amount)
                .ok_or_else(|| invalid("contributor total overflows".into()))?;
        }
        if total != snapshot.balance {
            return Err(invalid(format!(
                "balance {} does not equal contributor total {}",
                snapshot.balance, total
            )));
        }
        if let Some(stray) = snapshot.funders.iter().find(|f| !records.contains_key(*f)) {
            return Err(invalid(format!("funder {} has no contribution record", stray)));
        }

        let ledger = Self {
            owner: snapshot.owner,
            price_feed,
            minimum: snapshot.minimum,
            address_to_amount_funded: records,
            funders: snapshot.funders,
            balance: snapshot.balance,
            events: snapshot.events,
            height: snapshot.height,
        };
        let root = hex::encode(ledger.state_root());
        if root != snapshot.state_root {
            return Err(invalid(format!(
                "state root mismatch: computed {}, recorded {}",
                root, snapshot.state_root
            )));
        }
        Ok(ledger)
    }
}

fn compute_state_root(
    owner: &Address,
    price_feed: &Address,
    minimum: &MinimumContribution,
    height: u64,
    balance: Amount,
    records: &BTreeMap<Address, Amount>,
    funders: &[Address],
) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::with_capacity(1 + records.len() + funders.len());

    let mut hasher = Sha256::new();
    hasher.update(b"fundme");
    hasher.update(owner.as_bytes());
    hasher.update(price_feed.as_bytes());
    let (kind, threshold) = match minimum {
        MinimumContribution::Wei(v) => (b"wei", *v),
        MinimumContribution::Usd(v) => (b"usd", *v),
    };
    hasher.update(kind);
    hasher.update(threshold.to_le_bytes());
    hasher.update(height.to_le_bytes());
    hasher.update(balance.to_le_bytes());
    leaves.push(hasher.finalize().into());

    for (address, amount) in records {
        let mut hasher = Sha256::new();
        hasher.update(b"acct");
        hasher.update(address.as_bytes());
        hasher.update(amount.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    for (idx, funder) in funders.iter().enumerate() {
        let mut hasher = Sha256::new();
        hasher.update(b"funder");
        hasher.update((idx as u64).to_le_bytes());
        hasher.update(funder.as_bytes());
        leaves.push(hasher.finalize().into());
    }
    build_merkle(leaves)
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"fundme-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            // odd node out is paired with itself
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}
