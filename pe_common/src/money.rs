use std::fmt::Display;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

//--------------------------------------        Money        ---------------------------------------------------------

/// A validated monetary value: a strictly positive decimal amount and a 3-letter ISO-4217 currency code.
///
/// `Money` is immutable. The only way to obtain one from user input is [`Money::new`], which normalises the
/// currency code (trim + uppercase) before validating it. Two `Money` values are equal when both the amount
/// and the currency match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMoney")]
pub struct Money {
    amount: Decimal,
    currency: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Amount must be greater than zero")]
    NonPositiveAmount,
    #[error("Currency cannot be empty")]
    EmptyCurrency,
    #[error("Currency must be a 3-letter ISO 4217 code (e.g. USD or EUR)")]
    InvalidCurrencyCode,
}

impl Money {
    /// Validating constructor. The currency is trimmed and upper-cased, so `"usd"` yields `"USD"`.
    pub fn new(amount: Decimal, currency: &str) -> Result<Self, MoneyError> {
        if amount <= Decimal::ZERO {
            return Err(MoneyError::NonPositiveAmount);
        }
        let currency = currency.trim().to_uppercase();
        if currency.is_empty() {
            return Err(MoneyError::EmptyCurrency);
        }
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(MoneyError::InvalidCurrencyCode);
        }
        Ok(Self { amount, currency })
    }

    /// Rehydrate a value that has already been validated, e.g. one read back from the database.
    pub fn from_parts(amount: Decimal, currency: String) -> Self {
        Self { amount, currency }
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

#[derive(Deserialize)]
struct RawMoney {
    amount: Decimal,
    currency: String,
}

impl TryFrom<RawMoney> for Money {
    type Error = MoneyError;

    fn try_from(raw: RawMoney) -> Result<Self, Self::Error> {
        Money::new(raw.amount, &raw.currency)
    }
}

#[cfg(test)]
mod test {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn lowercase_currency_is_normalised() {
        let money = Money::new(dec!(12.50), "usd").unwrap();
        assert_eq!(money.currency(), "USD");
        assert_eq!(money.amount(), dec!(12.50));
        assert_eq!(money.to_string(), "12.50 USD");
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        let money = Money::new(dec!(1), " eur ").unwrap();
        assert_eq!(money.currency(), "EUR");
    }

    #[test]
    fn zero_and_negative_amounts_are_rejected() {
        assert_eq!(Money::new(Decimal::ZERO, "USD"), Err(MoneyError::NonPositiveAmount));
        assert_eq!(Money::new(dec!(-0.01), "USD"), Err(MoneyError::NonPositiveAmount));
    }

    #[test]
    fn malformed_currency_codes_are_rejected() {
        for code in ["US", "USDD", "123", "U1D"] {
            assert_eq!(Money::new(dec!(10), code), Err(MoneyError::InvalidCurrencyCode), "code: {code}");
        }
        assert_eq!(Money::new(dec!(10), "  "), Err(MoneyError::EmptyCurrency));
    }

    #[test]
    fn equality_is_by_amount_and_currency() {
        let a = Money::new(dec!(5), "USD").unwrap();
        let b = Money::new(dec!(5), "usd").unwrap();
        let c = Money::new(dec!(5), "EUR").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn deserialisation_applies_the_same_validation() {
        let money: Money = serde_json::from_str(r#"{"amount":"9.99","currency":"gbp"}"#).unwrap();
        assert_eq!(money.currency(), "GBP");
        assert!(serde_json::from_str::<Money>(r#"{"amount":"-1","currency":"GBP"}"#).is_err());
    }
}
