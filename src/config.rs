//! Deployment configuration.
//!
//! Loaded from a JSON file; every field has a default, so an empty object (or
//! no file at all) yields a working local setup: ten derived accounts with
//! 10000 ETH each, `deployer` at index 0, `user` at index 1, a mock
//! aggregator at 2000 USD/ETH and a 50 USD minimum.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    ledger::MinimumContribution,
    oracle::{MOCK_DECIMALS, MOCK_INITIAL_ANSWER},
    types::{Address, AddressError, Amount},
    units::{format_units, parse_ether, parse_units, UnitsError},
};

/// Index reserved for the price feed address in the derived account family.
const ORACLE_ACCOUNT_INDEX: u32 = u32::MAX;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid amount in config: {0}")]
    Units(#[from] UnitsError),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("{input:?} is neither a named account nor an address ({source})")]
    UnknownAccount { input: String, source: AddressError },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MinimumSetting {
    /// Decimal USD value, e.g. `"50"`.
    Usd(String),
    /// Decimal ETH value, e.g. `"0.01"`.
    Eth(String),
}

impl MinimumSetting {
    pub fn resolve(&self) -> Result<MinimumContribution, ConfigError> {
        Ok(match self {
            MinimumSetting::Usd(v) => MinimumContribution::Usd(parse_ether(v)?),
            MinimumSetting::Eth(v) => MinimumContribution::Wei(parse_ether(v)?),
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct AggregatorConfig {
    pub decimals: u8,
    /// Decimal USD price of one ETH.
    pub initial_answer: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            decimals: MOCK_DECIMALS,
            initial_answer: format_units(MOCK_INITIAL_ANSWER as Amount, u32::from(MOCK_DECIMALS)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct FundMeConfig {
    pub minimum: MinimumSetting,
    pub aggregator: AggregatorConfig,
    pub account_seed: String,
    pub accounts: u32,
    /// Starting ETH balance of every derived account.
    pub initial_balance: String,
    pub named_accounts: BTreeMap<String, u32>,
}

impl Default for FundMeConfig {
    fn default() -> Self {
        Self {
            minimum: MinimumSetting::Usd("50".into()),
            aggregator: AggregatorConfig::default(),
            account_seed: "fundme".into(),
            accounts: 10,
            initial_balance: "10000".into(),
            named_accounts: BTreeMap::from([("deployer".to_string(), 0), ("user".to_string(), 1)]),
        }
    }
}

impl FundMeConfig {
    /// Defaults when `path` is `None`, otherwise the parsed file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            None => Self::default(),
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                serde_json::from_str(&raw)?
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accounts == 0 || self.accounts == ORACLE_ACCOUNT_INDEX {
            return Err(ConfigError::Invalid(format!(
                "accounts must be between 1 and {}",
                ORACLE_ACCOUNT_INDEX - 1
            )));
        }
        if let Some((name, idx)) = self
            .named_accounts
            .iter()
            .find(|(_, idx)| **idx >= self.accounts)
        {
            return Err(ConfigError::Invalid(format!(
                "named account {name} points at index {idx}, only {} accounts configured",
                self.accounts
            )));
        }
        self.minimum.resolve()?;
        self.initial_answer()?;
        self.initial_balance()?;
        Ok(())
    }

    pub fn minimum_contribution(&self) -> Result<MinimumContribution, ConfigError> {
        self.minimum.resolve()
    }

    /// Aggregator answer scaled by `10^decimals`.
    pub fn initial_answer(&self) -> Result<i128, ConfigError> {
        if u32::from(self.aggregator.decimals) > crate::types::ETHER_DECIMALS {
            return Err(ConfigError::Invalid(format!(
                "aggregator decimals {} exceed 18",
                self.aggregator.decimals
            )));
        }
        let scaled = parse_units(
            &self.aggregator.initial_answer,
            u32::from(self.aggregator.decimals),
        )?;
        i128::try_from(scaled)
            .map_err(|_| ConfigError::Invalid("aggregator answer too large".into()))
    }

    pub fn initial_balance(&self) -> Result<Amount, ConfigError> {
        Ok(parse_ether(&self.initial_balance)?)
    }

    pub fn account(&self, index: u32) -> Address {
        Address::derive(&self.account_seed, index)
    }

    pub fn accounts(&self) -> Vec<Address> {
        (0..self.accounts).map(|i| self.account(i)).collect()
    }

    pub fn oracle_address(&self) -> Address {
        self.account(ORACLE_ACCOUNT_INDEX)
    }

    pub fn named(&self, name: &str) -> Option<Address> {
        self.named_accounts.get(name).map(|idx| self.account(*idx))
    }

    /// A named account (`deployer`), a derived index (`#3`) or a literal
    /// address.
    pub fn resolve_account(&self, input: &str) -> Result<Address, ConfigError> {
        if let Some(addr) = self.named(input) {
            return Ok(addr);
        }
        if let Some(idx) = input.strip_prefix('#') {
            let idx: u32 = idx
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("bad account index {input:?}")))?;
            if idx >= self.accounts {
                return Err(ConfigError::Invalid(format!(
                    "account index {idx} out of range ({} accounts)",
                    self.accounts
                )));
            }
            return Ok(self.account(idx));
        }
        input.parse().map_err(|source| ConfigError::UnknownAccount {
            input: input.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::types::WEI_PER_ETH;

    #[test]
    fn defaults_match_a_local_deployment() {
        let config = FundMeConfig::load(None).unwrap();
        assert_eq!(
            config.minimum_contribution().unwrap(),
            MinimumContribution::Usd(50 * WEI_PER_ETH)
        );
        assert_eq!(config.initial_answer().unwrap(), MOCK_INITIAL_ANSWER);
        assert_eq!(config.initial_balance().unwrap(), 10_000 * WEI_PER_ETH);
        assert_eq!(config.accounts().len(), 10);
        assert_eq!(config.named("deployer"), Some(config.account(0)));
        assert_eq!(config.named("user"), Some(config.account(1)));
        assert!(!config.accounts().contains(&config.oracle_address()));
    }

    #[test]
    fn resolves_names_indices_and_addresses() {
        let config = FundMeConfig::default();
        assert_eq!(config.resolve_account("deployer").unwrap(), config.account(0));
        assert_eq!(config.resolve_account("#4").unwrap(), config.account(4));
        let literal = config.account(7).to_string();
        assert_eq!(config.resolve_account(&literal).unwrap(), config.account(7));
        assert!(matches!(
            config.resolve_account("#10"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            config.resolve_account("nobody"),
            Err(ConfigError::UnknownAccount { .. })
        ));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"minimum": {{"eth": "1"}}, "aggregator": {{"initial_answer": "3000.5"}}}}"#
        )
        .unwrap();
        let config = FundMeConfig::load(Some(file.path())).unwrap();
        assert_eq!(
            config.minimum_contribution().unwrap(),
            MinimumContribution::Wei(WEI_PER_ETH)
        );
        assert_eq!(config.initial_answer().unwrap(), 3_000_50000000);
        assert_eq!(config.accounts, 10);
    }

    #[test]
    fn rejects_unknown_fields_and_bad_indices() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"acounts": 3}}"#).unwrap();
        assert!(matches!(
            FundMeConfig::load(Some(file.path())),
            Err(ConfigError::Parse(_))
        ));

        let config = FundMeConfig {
            accounts: 1,
            ..FundMeConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            FundMeConfig::load(Some(dir.path().join("nope.json").as_path())),
            Err(ConfigError::Io { .. })
        ));
    }
}
