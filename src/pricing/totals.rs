//! Cart totals
//!
//! `total == pre_coupon - discount_total` and
//! `pre_coupon == subtotal_products + shipping`, exact to the cent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::config::{CouponPercentBase, PricingConfig};
use crate::domain::aggregates::{Coupon, LineItem};
use crate::domain::value_objects::Money;
use crate::pricing::compute_discount;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalsBreakdown {
    #[serde(rename = "subtotalProducts")]
    pub subtotal_products: Money,
    pub shipping: Money,
    #[serde(rename = "preCoupon")]
    pub pre_coupon: Money,
    pub discount_total: Money,
    pub total: Money,
    pub coupon_code: Option<String>,
}

impl TotalsBreakdown {
    /// Amount the coupon percentage was computed against.
    pub fn coupon_base(&self, base: CouponPercentBase) -> Money {
        match base {
            CouponPercentBase::Products => self.subtotal_products,
            CouponPercentBase::ProductsPlusShipping => self.pre_coupon,
        }
    }
}

/// Shipping is free for an empty cart and at or above the threshold.
pub fn shipping_for(subtotal_products: Money, config: &PricingConfig) -> Money {
    if subtotal_products.is_zero() || subtotal_products >= config.free_shipping_threshold {
        Money::ZERO
    } else {
        config.shipping_base
    }
}

/// Prices `items`. The coupon is re-checked against `now` so one that expired
/// after being attached to the session no longer applies.
pub fn compute_totals(
    items: &[LineItem],
    config: &PricingConfig,
    coupon: Option<&Coupon>,
    msi_selected: bool,
    now: DateTime<Utc>,
) -> TotalsBreakdown {
    let subtotal_products: Money = items.iter().map(LineItem::line_total).sum();
    let shipping = shipping_for(subtotal_products, config);
    let pre_coupon = subtotal_products + shipping;

    let mut breakdown = TotalsBreakdown {
        subtotal_products, shipping, pre_coupon,
        discount_total: Money::ZERO, total: pre_coupon, coupon_code: None,
    };

    if let Some(coupon) = coupon.filter(|c| c.is_active(now)) {
        let base = breakdown.coupon_base(config.coupon_percent_base);
        breakdown.discount_total = compute_discount(base, Some(coupon), msi_selected);
        breakdown.total = pre_coupon - breakdown.discount_total;
        breakdown.coupon_code = Some(coupon.code.to_string());
    }

    tracing::debug!(
        subtotal = %breakdown.subtotal_products, shipping = %breakdown.shipping,
        discount = %breakdown.discount_total, total = %breakdown.total,
        "cart totals computed"
    );
    breakdown
}
