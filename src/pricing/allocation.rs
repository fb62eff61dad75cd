//! Line Item Allocator
//!
//! Spreads a cart-level discount over receipt lines in proportion to each
//! line's pre-discount total. Two passes: every line but the last gets its
//! rounded share, the last line takes the remainder. A final cent correction
//! on the last line makes the line totals add up to the discounted cart total.
//!
//! The remainder can be negative when earlier shares round up: 0.02 over four
//! 1.00 lines gives the first three 0.01 each and the last -0.01. The sum is
//! still exact; the last line then shows a price slightly above its unit price.

use rust_decimal::Decimal;
use crate::domain::aggregates::NormalizedLineItem;
use crate::domain::value_objects::Money;

pub fn allocate(mut items: Vec<NormalizedLineItem>, discount_total: Money) -> Vec<NormalizedLineItem> {
    if items.is_empty() || !discount_total.is_positive() {
        return items;
    }
    // Lines that already carry a discount are never overwritten.
    if items.iter().any(NormalizedLineItem::carries_discount) {
        return items;
    }

    let pre_totals: Vec<Money> = items.iter().map(NormalizedLineItem::pre_discount_total).collect();
    let pre_sum: Money = pre_totals.iter().copied().sum();
    if !pre_sum.is_positive() {
        return items;
    }
    let discount = if discount_total > pre_sum {
        tracing::warn!(%discount_total, %pre_sum, "discount exceeds receipt lines, clamping");
        pre_sum
    } else {
        discount_total
    };

    for (item, share) in items.iter_mut().zip(line_shares(&pre_totals, pre_sum, discount)) {
        let qty = Decimal::from(item.quantity.max(1));
        item.discount = Money::new(share.amount() / qty);
        item.final_price = item.unit_price - item.discount;
        item.line_total = item.final_price.times(item.quantity);
    }

    let expected = pre_sum - discount;
    let computed: Money = items.iter().map(|i| i.line_total).sum();
    if computed != expected {
        let delta = expected.amount() - computed.amount();
        tracing::warn!(%expected, %computed, %delta, "per-unit rounding drift, correcting last line");
        if let Some(last) = items.last_mut() {
            let qty = Decimal::from(last.quantity.max(1));
            last.line_total = Money::new(last.line_total.amount() + delta);
            last.final_price = Money::new(last.line_total.amount() / qty);
            last.discount = last.unit_price - last.final_price;
        }
        let reconciled: Money = items.iter().map(|i| i.line_total).sum();
        if reconciled != expected {
            tracing::warn!(%expected, %reconciled, "receipt lines still do not reconcile");
        }
    }

    items
}

/// Proportional shares of `discount`; the last share absorbs all rounding.
fn line_shares(pre_totals: &[Money], pre_sum: Money, discount: Money) -> Vec<Money> {
    let last = pre_totals.len().saturating_sub(1);
    let mut allocated = Money::ZERO;
    pre_totals
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i == last {
                discount - allocated
            } else {
                let share = Money::new(line.amount() / pre_sum.amount() * discount.amount());
                allocated = allocated + share;
                share
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(id: &str, price: Decimal, qty: u32) -> NormalizedLineItem {
        NormalizedLineItem::new(id, id, Money::new(price), qty)
    }

    fn sum_totals(items: &[NormalizedLineItem]) -> Money { items.iter().map(|i| i.line_total).sum() }

    #[test]
    fn test_allocates_proportionally() {
        let items = vec![line("ring", dec!(1500.00), 2), line("chain", dec!(999.99), 1)];
        let out = allocate(items, Money::new(dec!(300)));
        assert_eq!(out[0].discount.amount(), dec!(112.50));
        assert_eq!(out[0].final_price.amount(), dec!(1387.50));
        assert_eq!(out[0].line_total.amount(), dec!(2775.00));
        assert_eq!(out[1].discount.amount(), dec!(75.00));
        assert_eq!(out[1].line_total.amount(), dec!(924.99));
        assert_eq!(sum_totals(&out).amount(), dec!(3699.99));
    }

    #[test]
    fn test_corrects_per_unit_drift_on_last_line() {
        let out = allocate(vec![line("a", dec!(10.00), 3)], Money::new(dec!(1.00)));
        assert_eq!(out[0].line_total.amount(), dec!(29.00));
        assert_eq!(out[0].final_price.amount(), dec!(9.67));
    }

    #[test]
    fn test_reconciles_exactly() {
        let carts = vec![
            (vec![line("a", dec!(33.33), 3), line("b", dec!(0.99), 7), line("c", dec!(101.01), 1)], dec!(17.77)),
            (vec![line("a", dec!(10), 1), line("b", dec!(10), 1), line("c", dec!(10), 1)], dec!(10)),
            (vec![line("a", dec!(1), 1), line("b", dec!(1), 1), line("c", dec!(1), 1), line("d", dec!(1), 1)], dec!(0.02)),
            (vec![line("a", dec!(2499.5), 4), line("b", dec!(15.75), 9)], dec!(2499.49)),
            (vec![line("a", dec!(5), 2)], dec!(10)),
        ];
        for (items, discount) in carts {
            let pre: Money = items.iter().map(NormalizedLineItem::pre_discount_total).sum();
            let out = allocate(items, Money::new(discount));
            assert_eq!(sum_totals(&out), pre - Money::new(discount), "discount {discount}");
        }
    }

    #[test]
    fn test_leaves_items_with_existing_discount() {
        let mut discounted = line("a", dec!(100), 1);
        discounted.discount = Money::new(dec!(5));
        discounted.final_price = Money::new(dec!(95));
        let items = vec![discounted.clone(), line("b", dec!(50), 1)];
        let out = allocate(items.clone(), Money::new(dec!(20)));
        assert_eq!(out, items);
    }

    #[test]
    fn test_zero_discount_is_noop() {
        let items = vec![line("a", dec!(100), 2)];
        assert_eq!(allocate(items.clone(), Money::ZERO), items);
        assert!(allocate(vec![], Money::new(dec!(5))).is_empty());
    }

    #[test]
    fn test_last_line_remainder_may_be_negative() {
        let items = vec![line("a", dec!(1), 1), line("b", dec!(1), 1), line("c", dec!(1), 1), line("d", dec!(1), 1)];
        let out = allocate(items, Money::new(dec!(0.02)));
        assert_eq!(out[0].discount.amount(), dec!(0.01));
        assert_eq!(out[3].discount.amount(), dec!(-0.01));
        assert_eq!(out[3].final_price.amount(), dec!(1.01));
        assert_eq!(sum_totals(&out).amount(), dec!(3.98));
    }

    #[test]
    fn test_oversized_display_rows_do_not_overflow() {
        let huge = serde_json::json!({"unit_price": "79228162514264337593543950", "quantity": 5000});
        let items = vec![NormalizedLineItem::from_display(&huge), line("b", dec!(10), 1)];
        let out = allocate(items, Money::new(dec!(1)));
        assert_eq!(out[0].line_total, Money::ZERO);
        assert_eq!(sum_totals(&out).amount(), dec!(9.00));

        let ceiling = serde_json::json!({"unit_price": "1000000000000", "quantity": 100000});
        let out = allocate(vec![NormalizedLineItem::from_display(&ceiling)], Money::new(dec!(1)));
        assert_eq!(sum_totals(&out).amount(), dec!(99999999999999999.00));
    }
}
