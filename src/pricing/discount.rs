//! Discount Calculator
//!
//! Turns a coupon and a base amount into a discount. Pure: no clock, no I/O.

use rust_decimal::Decimal;
use crate::domain::aggregates::{Coupon, DiscountType};
use crate::domain::value_objects::Money;

/// Caps in force for one pricing call, after the installment override.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EffectiveCaps {
    pub amount: Option<Money>,
    pub percent: Option<Decimal>,
}

impl EffectiveCaps {
    /// Installment-plan caps replace the standard ones per dimension, only when set.
    pub fn for_coupon(coupon: &Coupon, msi_selected: bool) -> Self {
        Self {
            amount: pick(msi_selected, coupon.cap_amount_msi, coupon.cap_amount),
            percent: pick(msi_selected, coupon.cap_percent_msi, coupon.cap_percent),
        }
    }

    /// Cap values that bound a discount on `base`, filtered by the coupon's cap mode.
    fn applicable(&self, coupon: &Coupon, base: Money) -> Vec<Decimal> {
        let mut caps = Vec::with_capacity(2);
        if coupon.cap_mode.includes_amount() {
            caps.extend(self.amount.map(|m| m.amount()));
        }
        if coupon.cap_mode.includes_percent() {
            caps.extend(self.percent.map(|pct| base.percent(pct)));
        }
        caps
    }
}

fn pick<T>(msi_selected: bool, msi: Option<T>, standard: Option<T>) -> Option<T> {
    if msi_selected && msi.is_some() { msi } else { standard }
}

/// Discount `coupon` grants on `base`, in `[0, base]`, rounded to cents.
pub fn compute_discount(base: Money, coupon: Option<&Coupon>, msi_selected: bool) -> Money {
    let Some(coupon) = coupon else { return Money::ZERO };
    if !base.is_positive() {
        return Money::ZERO;
    }

    let raw = match coupon.discount_type {
        DiscountType::Percent => base.percent(coupon.value),
        DiscountType::Fixed => coupon.value,
    };

    let capped = EffectiveCaps::for_coupon(coupon, msi_selected)
        .applicable(coupon, base)
        .into_iter()
        .fold(raw, |acc, cap| acc.min(cap));

    Money::new(capped.clamp(Decimal::ZERO, base.amount()))
}
