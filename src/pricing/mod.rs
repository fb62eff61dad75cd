//! Pricing engine: discounts, eligibility, cart totals, receipt allocation

pub mod allocation;
pub mod discount;
pub mod eligibility;
pub mod totals;

pub use allocation::allocate;
pub use discount::{compute_discount, EffectiveCaps};
pub use eligibility::{
    can_redeem, is_active, meets_minimum_order, Buyer, CouponDecision, CouponGate, CouponSource,
    Eligibility, IneligibleReason, QueryResult, RedemptionLedger, RedemptionScope,
};
pub use totals::{compute_totals, shipping_for, TotalsBreakdown};
