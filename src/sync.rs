//! Shared handle for hosts that call the ledger from several threads.
//!
//! Every operation takes the lock exactly once, so `fund` and `withdraw`
//! never interleave and a reader never observes half an operation.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    ledger::{FundMe, LedgerError, LedgerSnapshot},
    oracle::PriceFeed,
    transfer::TransferChannel,
    types::{Address, Amount},
};

pub struct SharedFundMe<F> {
    inner: Arc<Mutex<FundMe<F>>>,
}

impl<F> Clone for SharedFundMe<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: PriceFeed> SharedFundMe<F> {
    pub fn new(ledger: FundMe<F>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, FundMe<F>>, LedgerError> {
        self.inner.lock().map_err(|_| LedgerError::Poisoned)
    }

    pub fn fund(&self, caller: &Address, value: Amount) -> Result<(), LedgerError> {
        self.lock()?.fund(caller, value)
    }

    pub fn withdraw<C: TransferChannel + ?Sized>(
        &self,
        caller: &Address,
        channel: &mut C,
    ) -> Result<Amount, LedgerError> {
        self.lock()?.withdraw(caller, channel)
    }

    pub fn amount_funded_by(&self, address: &Address) -> Result<Amount, LedgerError> {
        Ok(self.lock()?.amount_funded_by(address))
    }

    pub fn funder_at(&self, index: usize) -> Result<Address, LedgerError> {
        self.lock()?.funder_at(index)
    }

    pub fn balance(&self) -> Result<Amount, LedgerError> {
        Ok(self.lock()?.balance())
    }

    pub fn snapshot(&self) -> Result<LedgerSnapshot, LedgerError> {
        Ok(self.lock()?.snapshot())
    }

    /// Run `f` against the ledger while holding the lock.
    pub fn with<R>(&self, f: impl FnOnce(&mut FundMe<F>) -> R) -> Result<R, LedgerError> {
        let mut guard = self.lock()?;
        Ok(f(&mut *guard))
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::{
        ledger::MinimumContribution,
        oracle::{MockV3Aggregator, MOCK_DECIMALS, MOCK_INITIAL_ANSWER},
        transfer::AccountBook,
    };

    fn shared() -> SharedFundMe<MockV3Aggregator> {
        let feed = MockV3Aggregator::new(Address::derive("sync", 99), MOCK_DECIMALS, MOCK_INITIAL_ANSWER);
        SharedFundMe::new(FundMe::new(
            Address::derive("sync", 0),
            feed,
            MinimumContribution::Wei(1),
        ))
    }

    #[test]
    fn concurrent_funders_keep_the_books_balanced() {
        let ledger = shared();
        let handles: Vec<_> = (1..=8u32)
            .map(|i| {
                let ledger = ledger.clone();
                thread::spawn(move || {
                    let me = Address::derive("sync", i);
                    for _ in 0..100 {
                        ledger.fund(&me, u128::from(i)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let expected: Amount = (1..=8u128).map(|i| i * 100).sum();
        assert_eq!(ledger.balance().unwrap(), expected);
        let total = ledger
            .with(|l| l.contributors().map(|(_, a)| *a).sum::<Amount>())
            .unwrap();
        assert_eq!(total, expected);
        assert_eq!(ledger.with(|l| l.funder_count()).unwrap(), 800);
        assert_eq!(
            ledger.amount_funded_by(&Address::derive("sync", 3)).unwrap(),
            300
        );
    }

    #[test]
    fn withdraw_while_funding_never_loses_value() {
        let ledger = shared();
        let funder = {
            let ledger = ledger.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    ledger.fund(&Address::derive("sync", 1), 5).unwrap();
                }
            })
        };
        let mut book = AccountBook::new();
        let mut withdrawn = 0;
        for _ in 0..20 {
            withdrawn += ledger
                .withdraw(&Address::derive("sync", 0), &mut book)
                .unwrap();
        }
        funder.join().unwrap();
        withdrawn += ledger
            .withdraw(&Address::derive("sync", 0), &mut book)
            .unwrap();

        assert_eq!(withdrawn, 1_000);
        assert_eq!(book.balance_of(&Address::derive("sync", 0)), 1_000);
        assert_eq!(ledger.balance().unwrap(), 0);
        assert!(ledger.funder_at(0).is_err());
    }
}
