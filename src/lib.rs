//! Jewelry Storefront - pricing and coupon engine
//!
//! Server-side source of truth for cart money.
//!
//! ## Features
//! - Cart totals with flat/free shipping
//! - Percent and fixed coupons with amount/percent caps (and installment caps)
//! - Coupon eligibility: active window, minimum order, usage limits
//! - Proportional allocation of a cart-level discount over receipt lines

use thiserror::Error;

pub mod config;
pub mod domain;
pub mod pricing;
pub mod store;

pub use config::{AppConfig, CouponPercentBase, PricingConfig, UsageCountPolicy};
pub use domain::value_objects::{Money, MoneyError};
pub use pricing::{
    allocate, compute_discount, compute_totals, CouponGate, Eligibility, IneligibleReason,
    TotalsBreakdown,
};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum PricingError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Negative amount")]
    NegativeAmount,

    #[error("Invalid quantity")]
    InvalidQuantity,

    #[error("Invalid coupon: {0}")]
    InvalidCoupon(String),

    #[error("Coupon not found")]
    CouponNotFound,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<MoneyError> for PricingError {
    fn from(e: MoneyError) -> Self {
        match e {
            MoneyError::Negative => PricingError::NegativeAmount,
            MoneyError::Invalid(raw) => PricingError::InvalidAmount(raw),
        }
    }
}

pub type Result<T> = std::result::Result<T, PricingError>;
