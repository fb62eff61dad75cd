//! Process configuration, read once at startup from the environment.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::domain::value_objects::Money;

pub const DEFAULT_SHIPPING_BASE: u32 = 260;
pub const DEFAULT_FREE_SHIPPING_THRESHOLD: u32 = 8500;
pub const DEFAULT_PORT: u16 = 8083;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// What a percentage coupon is computed against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponPercentBase {
    #[default]
    Products,
    ProductsPlusShipping,
}

impl FromStr for CouponPercentBase {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, ()> {
        match s.trim().to_ascii_lowercase().as_str() {
            "products" => Ok(Self::Products),
            "products_plus_shipping" => Ok(Self::ProductsPlusShipping),
            _ => Err(()),
        }
    }
}

/// What to do when the redemption count cannot be read from the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageCountPolicy {
    /// Treat the count as 0 and let the coupon through (logged).
    #[default]
    FailOpen,
    /// Treat the coupon as exhausted.
    FailClosed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingConfig {
    pub shipping_base: Money,
    pub free_shipping_threshold: Money,
    pub coupon_percent_base: CouponPercentBase,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            shipping_base: Money::from(DEFAULT_SHIPPING_BASE),
            free_shipping_threshold: Money::from(DEFAULT_FREE_SHIPPING_THRESHOLD),
            coupon_percent_base: CouponPercentBase::Products,
        }
    }
}

impl PricingConfig {
    /// Build from an arbitrary key lookup; unset keys take their defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            shipping_base: money_var(&get, "SHIPPING_BASE", defaults.shipping_base)?,
            free_shipping_threshold: money_var(&get, "FREE_SHIPPING_THRESHOLD", defaults.free_shipping_threshold)?,
            coupon_percent_base: match get("COUPON_PERCENT_BASE") {
                Some(v) => v.parse().map_err(|_| ConfigError::Invalid { key: "COUPON_PERCENT_BASE", value: v })?,
                None => defaults.coupon_percent_base,
            },
        })
    }
}

fn money_var(get: &impl Fn(&str) -> Option<String>, key: &'static str, default: Money) -> Result<Money, ConfigError> {
    match get(key) {
        Some(v) => Money::parse(&v).map_err(|_| ConfigError::Invalid { key, value: v }),
        None => Ok(default),
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub nats_url: Option<String>,
    pub usage_count_policy: UsageCountPolicy,
    pub pricing: PricingConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let port = match get("PORT") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid { key: "PORT", value: v })?,
            None => DEFAULT_PORT,
        };
        let usage_count_policy = match get("COUPON_USAGE_FAIL_CLOSED").as_deref().map(str::trim) {
            None | Some("") | Some("false") | Some("0") => UsageCountPolicy::FailOpen,
            Some("true") | Some("1") => UsageCountPolicy::FailClosed,
            Some(other) => return Err(ConfigError::Invalid { key: "COUPON_USAGE_FAIL_CLOSED", value: other.to_string() }),
        };
        Ok(Self {
            database_url,
            port,
            nats_url: get("NATS_URL").filter(|v| !v.trim().is_empty()),
            usage_count_policy,
            pricing: PricingConfig::from_lookup(&get)?,
        })
    }
}
