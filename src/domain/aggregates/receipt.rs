//! Receipt lines
//!
//! Order-confirmation rows arrive from stored order items and session
//! snapshots whose shapes vary; they are normalized here before any discount
//! is spread over them. Unreadable amounts become zero at this boundary only.

use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::domain::value_objects::Money;

/// Quantities above this are unreadable and fall back to 1.
pub const MAX_LINE_QUANTITY: u32 = 100_000;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedLineItem {
    pub id: Option<String>,
    pub name: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    /// Discount per unit.
    pub discount: Money,
    pub final_price: Money,
    pub line_total: Money,
}

impl NormalizedLineItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>, unit_price: Money, quantity: u32) -> Self {
        let quantity = quantity.max(1);
        Self {
            id: Some(id.into()), name: Some(name.into()), quantity, unit_price,
            discount: Money::ZERO, final_price: unit_price, line_total: unit_price.times(quantity),
        }
    }

    /// Stored order items carry the Spanish keys (`precio`, `cantidad`,
    /// `descuento`, `nombre`); session snapshots carry the English ones.
    pub fn from_display(row: &Value) -> Self {
        let unit_price = money_field(row, &["precio", "unit_price"]);
        let discount = money_field(row, &["descuento", "discount"]);
        let quantity = money_field(row, &["cantidad", "quantity"])
            .amount()
            .trunc()
            .to_u32()
            .filter(|q| (1..=MAX_LINE_QUANTITY).contains(q))
            .unwrap_or(1);
        let final_price = match first(row, &["final_price"]) {
            Some(v) => display_money(v),
            None => unit_price - discount,
        };
        Self {
            id: first(row, &["id"]).and_then(value_to_string),
            name: first(row, &["nombre", "title"]).and_then(value_to_string),
            quantity,
            unit_price,
            discount,
            final_price,
            line_total: final_price.times(quantity),
        }
    }

    pub fn pre_discount_total(&self) -> Money { self.unit_price.times(self.quantity) }

    pub fn carries_discount(&self) -> bool { !self.discount.is_zero() || self.final_price != self.unit_price }
}

/// First key holding a usable value; null and empty strings fall through to the next key.
fn first<'a>(row: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|k| row.get(*k)).find(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    })
}

fn money_field(row: &Value, keys: &[&str]) -> Money {
    first(row, keys).map(display_money).unwrap_or(Money::ZERO)
}

fn display_money(v: &Value) -> Money {
    match v {
        Value::Number(n) => Money::from_display(&n.to_string()),
        Value::String(s) => Money::from_display(s),
        _ => Money::ZERO,
    }
}

fn value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_from_display_defaults() {
        let item = NormalizedLineItem::from_display(&json!({"id": 7, "title": "Earrings", "unit_price": "$1,250.00", "quantity": "2"}));
        assert_eq!(item.id.as_deref(), Some("7"));
        assert_eq!(item.name.as_deref(), Some("Earrings"));
        assert_eq!(item.unit_price.amount(), dec!(1250));
        assert_eq!(item.quantity, 2);
        assert_eq!(item.final_price.amount(), dec!(1250));
        assert_eq!(item.line_total.amount(), dec!(2500));
        assert!(!item.carries_discount());
    }

    #[test]
    fn test_from_display_garbage_is_zero() {
        let item = NormalizedLineItem::from_display(&json!({"unit_price": "n/a", "quantity": null}));
        assert_eq!(item.unit_price, Money::ZERO);
        assert_eq!(item.quantity, 1);
    }

    #[test]
    fn test_from_display_keeps_item_discount() {
        let item = NormalizedLineItem::from_display(&json!({"unit_price": 100, "discount": 10, "quantity": 3}));
        assert_eq!(item.final_price.amount(), dec!(90));
        assert_eq!(item.line_total.amount(), dec!(270));
        assert!(item.carries_discount());
    }

    #[test]
    fn test_from_display_reads_stored_order_keys() {
        let item = NormalizedLineItem::from_display(&json!({"precio": "1500.00", "cantidad": 2, "descuento": "0", "nombre": "Anillo"}));
        assert_eq!(item.unit_price.amount(), dec!(1500));
        assert_eq!(item.quantity, 2);
        assert_eq!(item.name.as_deref(), Some("Anillo"));
        assert_eq!(item.line_total.amount(), dec!(3000));
    }

    #[test]
    fn test_from_display_prefers_stored_keys_over_snapshot_keys() {
        let item = NormalizedLineItem::from_display(&json!({"precio": "80", "unit_price": "95", "cantidad": null, "quantity": 4}));
        assert_eq!(item.unit_price.amount(), dec!(80));
        assert_eq!(item.quantity, 4);
    }

    #[test]
    fn test_from_display_out_of_range_values_fall_back() {
        let item = NormalizedLineItem::from_display(&json!({"unit_price": "79228162514264337593543950", "quantity": 5000000}));
        assert_eq!(item.unit_price, Money::ZERO);
        assert_eq!(item.quantity, 1);
        let negative = NormalizedLineItem::from_display(&json!({"unit_price": "-50", "quantity": 2}));
        assert_eq!(negative.unit_price, Money::ZERO);
    }
}
