//! Value Objects for storefront pricing

use rust_decimal::prelude::*;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};
use thiserror::Error;

/// Monetary values are kept at exactly 2 fractional digits
pub const CENT_PLACES: u32 = 2;

/// Largest amount accepted from a display layer, in whole units.
pub const DISPLAY_AMOUNT_CEILING: u64 = 1_000_000_000_000;

/// Round half-up (away from zero) to 2 places and pin the scale to 2.
pub fn round2(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(CENT_PLACES, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(CENT_PLACES);
    rounded
}

/// Money value object
///
/// Always holds a 2-decimal value. Intermediate math that needs more precision
/// (percentages, ratios) works on [`Decimal`] and comes back through
/// [`Money::new`], which is the only rounding point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self { Self(round2(amount)) }

    /// Strict parse used inside pricing: malformed or negative input fails.
    pub fn parse(raw: &str) -> Result<Self, MoneyError> {
        let trimmed = raw.trim();
        let amount = Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map_err(|_| MoneyError::Invalid(raw.to_string()))?;
        Self::try_from_decimal(amount)
    }

    pub fn try_from_decimal(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() { return Err(MoneyError::Negative); }
        Ok(Self::new(amount))
    }

    /// Lenient parse for values coming from a display layer (templates, stored
    /// receipts). Currency symbols and thousands separators are stripped, a lone
    /// comma is read as the decimal point. Anything unreadable, negative or
    /// above [`DISPLAY_AMOUNT_CEILING`] becomes zero.
    pub fn from_display(raw: &str) -> Self {
        let cleaned: String = raw.trim().chars().filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-')).collect();
        let normalized = if cleaned.contains('.') { cleaned.replace(',', "") } else { cleaned.replace(',', ".") };
        match Decimal::from_str(&normalized) {
            Ok(amount) if amount >= Decimal::ZERO && amount <= Decimal::from(DISPLAY_AMOUNT_CEILING) => Self::new(amount),
            _ => Self::ZERO,
        }
    }

    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_zero(&self) -> bool { self.0.is_zero() }
    pub fn is_positive(&self) -> bool { self.0 > Decimal::ZERO }

    pub fn times(&self, qty: u32) -> Money { Money(self.0 * Decimal::from(qty)) }

    /// `pct` percent of this amount, unrounded.
    pub fn percent(&self, pct: Decimal) -> Decimal { self.0 * (pct / Decimal::ONE_HUNDRED) }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money::new(self.0 + rhs.0) }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money { Money::new(self.0 - rhs.0) }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, |acc, m| acc + m) }
}

impl From<u32> for Money {
    fn from(units: u32) -> Self { Money::new(Decimal::from(units)) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.0) }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> { s.serialize_str(&self.to_string()) }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw { Text(String), Number(serde_json::Number) }

        let raw = match Raw::deserialize(d)? {
            Raw::Text(s) => s,
            Raw::Number(n) => n.to_string(),
        };
        Money::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("not a decimal amount: {0:?}")]
    Invalid(String),
    #[error("amount must not be negative")]
    Negative,
}

/// Coupon code value object. Codes are case-insensitive; the canonical form is
/// trimmed upper-case.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CouponCode(String);

impl CouponCode {
    pub fn new(value: impl Into<String>) -> Result<Self, CouponCodeError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(CouponCodeError::Empty); }
        if value.len() > 64 { return Err(CouponCodeError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for CouponCode {
    type Error = CouponCodeError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<CouponCode> for String {
    fn from(code: CouponCode) -> Self { code.0 }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone)] pub enum CouponCodeError { Empty, TooLong }
impl std::error::Error for CouponCodeError {}
impl fmt::Display for CouponCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Empty => write!(f, "coupon code empty"), Self::TooLong => write!(f, "coupon code too long") }
    }
}

/// Buyer email as used for per-customer redemption counts.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct CustomerEmail(String);

impl CustomerEmail {
    /// Trimmed, lower-cased; `None` when nothing is left.
    pub fn normalize(raw: &str) -> Option<Self> {
        let value = raw.trim().to_lowercase();
        (!value.is_empty()).then_some(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

/// Stock quantity value object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self { Self(value) }
    pub fn covers(&self, requested: u32) -> bool { self.0 >= requested }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_half_up() {
        assert_eq!(round2(dec!(0.005)), dec!(0.01));
        assert_eq!(round2(dec!(0.004)), dec!(0.00));
        assert_eq!(round2(dec!(2.675)), dec!(2.68));
        assert_eq!(round2(dec!(399.999)), dec!(400.00));
    }

    #[test]
    fn test_round_idempotent() {
        for x in [dec!(0), dec!(0.005), dec!(1.2345), dec!(599.9985), dec!(12.5), dec!(1000000.555)] {
            assert_eq!(round2(round2(x)), round2(x));
        }
    }

    #[test]
    fn test_money_scale_and_display() {
        assert_eq!(Money::new(dec!(300)).to_string(), "300.00");
        assert_eq!(Money::ZERO.to_string(), "0.00");
        assert_eq!(Money::new(dec!(1.005)).to_string(), "1.01");
    }

    #[test]
    fn test_money_parse() {
        assert_eq!(Money::parse(" 999.99 ").unwrap().amount(), dec!(999.99));
        assert_eq!(Money::parse("abc"), Err(MoneyError::Invalid("abc".into())));
        assert_eq!(Money::parse(""), Err(MoneyError::Invalid("".into())));
        assert_eq!(Money::parse("-1"), Err(MoneyError::Negative));
    }

    #[test]
    fn test_money_from_display() {
        assert_eq!(Money::from_display("$1,234.50").amount(), dec!(1234.50));
        assert_eq!(Money::from_display("12,5").amount(), dec!(12.50));
        assert_eq!(Money::from_display("n/a"), Money::ZERO);
        assert_eq!(Money::from_display("-50"), Money::ZERO);
        assert_eq!(Money::from_display("79228162514264337593543950"), Money::ZERO);
    }

    #[test]
    fn test_money_arithmetic() {
        let a = Money::new(dec!(1500.00));
        assert_eq!(a.times(2).amount(), dec!(3000.00));
        assert_eq!((a + Money::new(dec!(0.01))).amount(), dec!(1500.01));
        assert_eq!(a.percent(dec!(15)), dec!(225.0000));
        let total: Money = vec![a, a, Money::new(dec!(999.99))].into_iter().sum();
        assert_eq!(total.amount(), dec!(3999.99));
    }

    #[test]
    fn test_money_json() {
        let m: Money = serde_json::from_str("999.99").unwrap();
        assert_eq!(m.amount(), dec!(999.99));
        let m: Money = serde_json::from_str("\"260\"").unwrap();
        assert_eq!(serde_json::to_string(&m).unwrap(), "\"260.00\"");
        assert!(serde_json::from_str::<Money>("\"ten\"").is_err());
    }

    #[test]
    fn test_coupon_code() {
        assert_eq!(CouponCode::new("  welcome10 ").unwrap().as_str(), "WELCOME10");
        assert!(CouponCode::new("   ").is_err());
    }

    #[test]
    fn test_email_normalize() {
        assert_eq!(CustomerEmail::normalize(" Ana@Example.COM ").unwrap().as_str(), "ana@example.com");
        assert!(CustomerEmail::normalize("  ").is_none());
    }
}
