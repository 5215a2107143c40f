use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Address, Amount};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("insufficient funds in account {account}: need {needed}, have {available}")]
    InsufficientFunds {
        account: Address,
        needed: Amount,
        available: Amount,
    },
    #[error("balance overflow for account {account}")]
    Overflow { account: Address },
    #[error("transfer rejected: {0}")]
    Rejected(String),
}

/// Moves native value out of the ledger. Implementations must either move the
/// full amount or fail without effect.
pub trait TransferChannel {
    fn send(&mut self, to: &Address, amount: Amount) -> Result<(), TransferError>;
}

impl<T: TransferChannel + ?Sized> TransferChannel for &mut T {
    fn send(&mut self, to: &Address, amount: Amount) -> Result<(), TransferError> {
        (**self).send(to, amount)
    }
}

/// Native balances of externally owned accounts.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AccountBook {
    #[serde(with = "balances_string")]
    balances: BTreeMap<Address, Amount>,
}

impl AccountBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn credit(&mut self, account: &Address, amount: Amount) -> Result<(), TransferError> {
        let balance = self.balances.entry(*account).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(TransferError::Overflow { account: *account })?;
        Ok(())
    }

    pub fn debit(&mut self, account: &Address, amount: Amount) -> Result<(), TransferError> {
        let available = self.balance_of(account);
        if available < amount {
            return Err(TransferError::InsufficientFunds {
                account: *account,
                needed: amount,
                available,
            });
        }
        if amount > 0 {
            self.balances.insert(*account, available - amount);
        }
        Ok(())
    }
}

impl TransferChannel for AccountBook {
    fn send(&mut self, to: &Address, amount: Amount) -> Result<(), TransferError> {
        self.credit(to, amount)
    }
}

mod balances_string {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::types::{Address, Amount};

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<Address, Amount>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let as_strings: BTreeMap<String, String> = map
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        as_strings.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<Address, Amount>, D::Error> {
        let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(k, v)| {
                let addr: Address = k.parse().map_err(serde::de::Error::custom)?;
                let amount: Amount = v.parse().map_err(serde::de::Error::custom)?;
                Ok((addr, amount))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debit_requires_funds_and_credit_accumulates() {
        let alice = Address::derive("t", 0);
        let mut book = AccountBook::new();
        book.credit(&alice, 100).unwrap();
        book.credit(&alice, 50).unwrap();
        assert_eq!(book.balance_of(&alice), 150);
        assert_eq!(
            book.debit(&alice, 200),
            Err(TransferError::InsufficientFunds {
                account: alice,
                needed: 200,
                available: 150,
            })
        );
        book.debit(&alice, 150).unwrap();
        assert_eq!(book.balance_of(&alice), 0);
    }

    #[test]
    fn send_credits_the_recipient() {
        let bob = Address::derive("t", 1);
        let mut book = AccountBook::new();
        book.send(&bob, 7).unwrap();
        assert_eq!(book.balance_of(&bob), 7);
        assert_eq!(
            book.send(&bob, u128::MAX),
            Err(TransferError::Overflow { account: bob })
        );
        assert_eq!(book.balance_of(&bob), 7);
    }

    #[test]
    fn book_round_trips_through_json() {
        let mut book = AccountBook::new();
        book.credit(&Address::derive("t", 2), u128::MAX / 3).unwrap();
        let json = serde_json::to_string(&book).unwrap();
        let back: AccountBook = serde_json::from_str(&json).unwrap();
        assert_eq!(back, book);
    }
}
