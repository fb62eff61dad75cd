//! Coupon Aggregate
//!
//! Coupons are authored through the admin surface and only read by pricing.
//! Timestamps are stored and compared as UTC instants.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::value_objects::{CouponCode, CustomerEmail, Money};
use crate::PricingError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType { Percent, Fixed }

/// Which ceilings bound a computed discount.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapMode { Amount, Percent, #[default] Both }

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Percent => "percent", Self::Fixed => "fixed" }
    }
}

impl FromStr for DiscountType {
    type Err = PricingError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "percent" => Ok(Self::Percent),
            "fixed" => Ok(Self::Fixed),
            other => Err(PricingError::InvalidCoupon(format!("unknown discount type {other:?}"))),
        }
    }
}

impl CapMode {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Amount => "amount", Self::Percent => "percent", Self::Both => "both" }
    }
    pub fn includes_amount(&self) -> bool { matches!(self, Self::Amount | Self::Both) }
    pub fn includes_percent(&self) -> bool { matches!(self, Self::Percent | Self::Both) }
}

impl FromStr for CapMode {
    type Err = PricingError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "amount" => Ok(Self::Amount),
            "percent" => Ok(Self::Percent),
            "both" | "" => Ok(Self::Both),
            other => Err(PricingError::InvalidCoupon(format!("unknown cap mode {other:?}"))),
        }
    }
}

/// Inclusive `[starts_at, ends_at]` validity window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveWindow {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl ActiveWindow {
    pub fn new(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Self { Self { starts_at, ends_at } }

    /// `None` if either bound cannot be read.
    pub fn parse(starts_at: &str, ends_at: &str) -> Option<Self> {
        Some(Self::new(parse_instant(starts_at)?, parse_instant(ends_at)?))
    }

    pub fn contains(&self, now: DateTime<Utc>) -> bool { self.starts_at <= now && now <= self.ends_at }
}

/// Reads an instant with an explicit offset (normalized to UTC) or a naive
/// timestamp, which is taken to already be UTC.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: CouponCode,
    #[serde(rename = "type")]
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub active: bool,
    /// `None` when the stored timestamps were unreadable; such a coupon is never active.
    #[serde(flatten)]
    pub window: Option<ActiveWindow>,
    pub min_order_amount: Option<Money>,
    pub cap_mode: CapMode,
    pub cap_amount: Option<Money>,
    pub cap_percent: Option<Decimal>,
    pub cap_amount_msi: Option<Money>,
    pub cap_percent_msi: Option<Decimal>,
    pub max_uses: Option<u32>,
    pub max_uses_per_user: Option<u32>,
}

impl Coupon {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.active && self.window.is_some_and(|w| w.contains(now))
    }

    pub fn meets_minimum_order(&self, subtotal: Money) -> bool {
        self.min_order_amount.map_or(true, |min| subtotal >= min)
    }

    /// Checks the record invariants enforced on every admin write.
    pub fn validate(&self) -> Result<(), PricingError> {
        let window = self.window.ok_or_else(|| invalid("start/end dates are unreadable"))?;
        if window.ends_at <= window.starts_at { return Err(invalid("ends_at must be after starts_at")); }
        if self.value < Decimal::ZERO { return Err(invalid("value must not be negative")); }
        if self.discount_type == DiscountType::Percent && self.value > Decimal::ONE_HUNDRED {
            return Err(invalid("percent value must be between 0 and 100"));
        }
        for (name, pct) in [("cap_percent", self.cap_percent), ("cap_percent_msi", self.cap_percent_msi)] {
            if pct.is_some_and(|p| p < Decimal::ZERO || p > Decimal::ONE_HUNDRED) {
                return Err(invalid(&format!("{name} must be between 0 and 100")));
            }
        }
        for (name, cap) in [("cap_amount", self.cap_amount), ("cap_amount_msi", self.cap_amount_msi), ("min_order_amount", self.min_order_amount)] {
            if cap.is_some_and(|m| m.amount() < Decimal::ZERO) {
                return Err(invalid(&format!("{name} must not be negative")));
            }
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> PricingError { PricingError::InvalidCoupon(msg.to_string()) }

/// One recorded use of a coupon against a paid order. Append-only; written by
/// the store after payment confirmation, never by pricing.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CouponRedemption {
    pub coupon_id: Uuid,
    pub order_id: Uuid,
    pub user_id: Option<String>,
    pub email: Option<CustomerEmail>,
    pub amount: Money,
}

/// Admin-authored coupon before it has an id.
#[derive(Clone, Debug, Deserialize)]
pub struct CouponDraft {
    pub code: String,
    #[serde(rename = "type")]
    pub discount_type: DiscountType,
    pub value: Decimal,
    #[serde(default)]
    pub active: bool,
    pub starts_at: String,
    pub ends_at: String,
    pub min_order_amount: Option<Money>,
    #[serde(default)]
    pub cap_mode: CapMode,
    pub cap_amount: Option<Money>,
    pub cap_percent: Option<Decimal>,
    pub cap_amount_msi: Option<Money>,
    pub cap_percent_msi: Option<Decimal>,
    pub max_uses: Option<u32>,
    pub max_uses_per_user: Option<u32>,
}

impl CouponDraft {
    pub fn into_coupon(self, id: Uuid) -> Result<Coupon, PricingError> {
        let code = CouponCode::new(self.code).map_err(|e| invalid(&e.to_string()))?;
        let window = ActiveWindow::parse(&self.starts_at, &self.ends_at)
            .ok_or_else(|| invalid("start/end dates are unreadable"))?;
        let coupon = Coupon {
            id, code, discount_type: self.discount_type, value: self.value, active: self.active,
            window: Some(window), min_order_amount: self.min_order_amount, cap_mode: self.cap_mode,
            cap_amount: self.cap_amount, cap_percent: self.cap_percent,
            cap_amount_msi: self.cap_amount_msi, cap_percent_msi: self.cap_percent_msi,
            max_uses: self.max_uses, max_uses_per_user: self.max_uses_per_user,
        };
        coupon.validate()?;
        Ok(coupon)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::percent_coupon;
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_instant_normalizes_to_utc() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 1, 6, 0, 0).unwrap();
        assert_eq!(parse_instant("2025-03-01T00:00:00-06:00"), Some(expected));
        assert_eq!(parse_instant("2025-03-01T06:00:00Z"), Some(expected));
        assert_eq!(parse_instant("2025-03-01 06:00:00+00"), Some(expected));
        assert_eq!(parse_instant("2025-03-01T06:00:00"), Some(expected));
        assert_eq!(parse_instant("2025-03-01T06:00"), Some(expected));
        assert_eq!(parse_instant("next tuesday"), None);
    }

    #[test]
    fn test_is_active_window_inclusive() {
        let now = Utc::now();
        let mut c = percent_coupon(dec!(10));
        c.window = Some(ActiveWindow::new(now, now + Duration::hours(1)));
        assert!(c.is_active(now));
        assert!(c.is_active(now + Duration::hours(1)));
        assert!(!c.is_active(now + Duration::hours(1) + Duration::seconds(1)));
        assert!(!c.is_active(now - Duration::seconds(1)));
    }

    #[test]
    fn test_inactive_flag_and_bad_dates() {
        let mut c = percent_coupon(dec!(10));
        c.active = false;
        assert!(!c.is_active(Utc::now()));
        let mut c = percent_coupon(dec!(10));
        c.window = ActiveWindow::parse("garbage", "2099-01-01T00:00:00Z");
        assert!(!c.is_active(Utc::now()));
    }

    #[test]
    fn test_minimum_order() {
        let mut c = percent_coupon(dec!(10));
        assert!(c.meets_minimum_order(Money::ZERO));
        c.min_order_amount = Some(Money::new(dec!(1000)));
        assert!(c.meets_minimum_order(Money::new(dec!(1000.00))));
        assert!(!c.meets_minimum_order(Money::new(dec!(999.99))));
    }

    #[test]
    fn test_validate() {
        assert!(percent_coupon(dec!(10)).validate().is_ok());
        assert!(percent_coupon(dec!(101)).validate().is_err());
        let mut c = percent_coupon(dec!(10));
        c.cap_percent_msi = Some(dec!(120));
        assert!(c.validate().is_err());
        let mut c = percent_coupon(dec!(10));
        let w = c.window.unwrap();
        c.window = Some(ActiveWindow::new(w.ends_at, w.starts_at));
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_draft_into_coupon() {
        let draft: CouponDraft = serde_json::from_value(serde_json::json!({
            "code": " spring15 ", "type": "percent", "value": "15", "active": true,
            "starts_at": "2025-03-01T00:00:00-06:00", "ends_at": "2025-03-31T23:59:00-06:00",
            "cap_mode": "amount", "cap_amount": "500"
        })).unwrap();
        let c = draft.into_coupon(Uuid::new_v4()).unwrap();
        assert_eq!(c.code.as_str(), "SPRING15");
        assert_eq!(c.cap_mode, CapMode::Amount);
        assert_eq!(c.window.unwrap().starts_at, Utc.with_ymd_and_hms(2025, 3, 1, 6, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("PERCENT".parse::<DiscountType>().unwrap(), DiscountType::Percent);
        assert_eq!("".parse::<CapMode>().unwrap(), CapMode::Both);
        assert!("bogus".parse::<CapMode>().is_err());
    }
}
