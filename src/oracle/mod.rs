//! Price oracle seam.
//!
//! The ledger only consumes a reference ETH/USD price. [`PriceFeed`] is the
//! interface it needs; [`MockV3Aggregator`] is the in-process feed used by the
//! CLI and the tests, modelled on an aggregator that reports a fixed-point
//! answer with a known number of decimals and a round counter.

use serde::{Deserialize, Serialize};

use crate::types::{Address, Amount, ETHER_DECIMALS, WEI_PER_ETH};

pub const MOCK_DECIMALS: u8 = 8;
pub const MOCK_INITIAL_ANSWER: i128 = 2_000_00000000; // 2000 USD with 8 decimals
pub const MOCK_VERSION: u64 = 4;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("price feed returned a non-positive answer: {0}")]
    NonPositiveAnswer(i128),
    #[error("price feed reports {0} decimals (max 18)")]
    DecimalsTooLarge(u8),
    #[error("price conversion overflow")]
    Overflow,
}

pub trait PriceFeed {
    /// On-chain style address the feed is reachable at.
    fn address(&self) -> Address;
    fn decimals(&self) -> u8;
    fn version(&self) -> u64;
    /// Latest answer, scaled by `10^decimals()`.
    fn latest_answer(&self) -> Result<i128, OracleError>;
}

impl<T: PriceFeed + ?Sized> PriceFeed for &T {
    fn address(&self) -> Address {
        (**self).address()
    }
    fn decimals(&self) -> u8 {
        (**self).decimals()
    }
    fn version(&self) -> u64 {
        (**self).version()
    }
    fn latest_answer(&self) -> Result<i128, OracleError> {
        (**self).latest_answer()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MockV3Aggregator {
    pub address: Address,
    pub decimals: u8,
    pub answer: i128,
    pub round_id: u64,
    pub updated_at: u64,
}

impl MockV3Aggregator {
    pub fn new(address: Address, decimals: u8, initial_answer: i128) -> Self {
        Self {
            address,
            decimals,
            answer: initial_answer,
            round_id: 1,
            updated_at: 0,
        }
    }

    pub fn update_answer(&mut self, answer: i128, timestamp: u64) {
        self.answer = answer;
        self.round_id += 1;
        self.updated_at = timestamp;
    }
}

impl PriceFeed for MockV3Aggregator {
    fn address(&self) -> Address {
        self.address
    }
    fn decimals(&self) -> u8 {
        self.decimals
    }
    fn version(&self) -> u64 {
        MOCK_VERSION
    }
    fn latest_answer(&self) -> Result<i128, OracleError> {
        Ok(self.answer)
    }
}

/// ETH price in USD with 18 decimals.
pub fn eth_price<F: PriceFeed + ?Sized>(feed: &F) -> Result<Amount, OracleError> {
    let answer = feed.latest_answer()?;
    if answer <= 0 {
        return Err(OracleError::NonPositiveAnswer(answer));
    }
    let decimals = feed.decimals();
    if u32::from(decimals) > ETHER_DECIMALS {
        return Err(OracleError::DecimalsTooLarge(decimals));
    }
    let scale = 10u128.pow(ETHER_DECIMALS - u32::from(decimals));
    (answer as u128)
        .checked_mul(scale)
        .ok_or(OracleError::Overflow)
}

/// USD value (18 decimals) of `eth_amount` wei.
pub fn conversion_rate<F: PriceFeed + ?Sized>(
    eth_amount: Amount,
    feed: &F,
) -> Result<Amount, OracleError> {
    let price = eth_price(feed)?;
    price
        .checked_mul(eth_amount)
        .map(|v| v / WEI_PER_ETH)
        .ok_or(OracleError::Overflow)
}
