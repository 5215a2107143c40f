//! Decimal <-> fixed-point conversion for ether-style amounts.

use crate::types::{Amount, ETHER_DECIMALS};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UnitsError {
    #[error("empty amount")]
    Empty,
    #[error("invalid amount {0:?}")]
    Invalid(String),
    #[error("too many decimal places in {value:?} (max {max})")]
    TooPrecise { value: String, max: u32 },
    #[error("amount {0:?} overflows")]
    Overflow(String),
}

/// Parse a decimal string with up to `decimals` fractional digits into its
/// fixed-point integer, e.g. `parse_units("1.5", 18)`.
pub fn parse_units(value: &str, decimals: u32) -> Result<Amount, UnitsError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(UnitsError::Empty);
    }
    let (int_part, frac_part) = match value.split_once('.') {
        Some((i, f)) => (i, f),
        None => (value, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(UnitsError::Invalid(value.to_string()));
    }
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(UnitsError::Invalid(value.to_string()));
    }
    let frac_trimmed = frac_part.trim_end_matches('0');
    if frac_trimmed.len() as u32 > decimals {
        return Err(UnitsError::TooPrecise {
            value: value.to_string(),
            max: decimals,
        });
    }

    let overflow = || UnitsError::Overflow(value.to_string());
    let scale = 10u128.checked_pow(decimals).ok_or_else(overflow)?;
    let int_value: Amount = if int_part.is_empty() {
        0
    } else {
        int_part.parse().map_err(|_| overflow())?
    };
    let frac_value: Amount = if frac_trimmed.is_empty() {
        0
    } else {
        let pad = 10u128.pow(decimals - frac_trimmed.len() as u32);
        let digits: Amount = frac_trimmed.parse().map_err(|_| overflow())?;
        digits * pad
    };
    int_value
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_value))
        .ok_or_else(overflow)
}

pub fn format_units(value: Amount, decimals: u32) -> String {
    let scale = 10u128.pow(decimals);
    let int_part = value / scale;
    let frac_part = value % scale;
    if frac_part == 0 {
        return int_part.to_string();
    }
    let frac = format!("{:0width$}", frac_part, width = decimals as usize);
    format!("{}.{}", int_part, frac.trim_end_matches('0'))
}

/// `"1"` -> 1e18 wei.
pub fn parse_ether(value: &str) -> Result<Amount, UnitsError> {
    parse_units(value, ETHER_DECIMALS)
}

pub fn format_ether(wei: Amount) -> String {
    format_units(wei, ETHER_DECIMALS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WEI_PER_ETH;

    #[test]
    fn parses_whole_and_fractional_ether() {
        assert_eq!(parse_ether("1").unwrap(), WEI_PER_ETH);
        assert_eq!(parse_ether("0.5").unwrap(), WEI_PER_ETH / 2);
        assert_eq!(parse_ether(".25").unwrap(), WEI_PER_ETH / 4);
        assert_eq!(parse_ether("2.").unwrap(), 2 * WEI_PER_ETH);
        assert_eq!(parse_ether("0.000000000000000001").unwrap(), 1);
        assert_eq!(parse_ether("1.500").unwrap(), 3 * WEI_PER_ETH / 2);
    }

    #[test]
    fn rejects_malformed_values() {
        assert_eq!(parse_ether(""), Err(UnitsError::Empty));
        assert!(matches!(parse_ether("."), Err(UnitsError::Invalid(_))));
        assert!(matches!(parse_ether("-1"), Err(UnitsError::Invalid(_))));
        assert!(matches!(parse_ether("1e18"), Err(UnitsError::Invalid(_))));
        assert!(matches!(
            parse_ether("0.0000000000000000001"),
            Err(UnitsError::TooPrecise { max: 18, .. })
        ));
        assert!(matches!(
            parse_ether("999999999999999999999999999999"),
            Err(UnitsError::Overflow(_))
        ));
    }

    #[test]
    fn formats_without_trailing_zeros() {
        assert_eq!(format_ether(WEI_PER_ETH), "1");
        assert_eq!(format_ether(WEI_PER_ETH / 2), "0.5");
        assert_eq!(format_ether(1), "0.000000000000000001");
        assert_eq!(format_ether(0), "0");
        assert_eq!(format_units(2_000_00000000, 8), "2000");
    }
}
