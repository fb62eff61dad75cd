//! Catalog product rows as seen by the cart.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::aggregates::LineItem;
use crate::domain::value_objects::{Money, Quantity};
use crate::PricingError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: Uuid,
    pub name: String,
    pub price: Money,
    /// Catalog markdown percentage; a sale price is only honored when this is non-zero.
    pub discount_pct: Option<Decimal>,
    pub sale_price: Option<Money>,
    pub stock: Option<Quantity>,
}

impl CatalogProduct {
    /// Price a buyer pays per unit before any coupon.
    pub fn effective_unit_price(&self) -> Money {
        match (self.discount_pct, self.sale_price) {
            (Some(pct), Some(sale)) if !pct.is_zero() => sale,
            _ => self.price,
        }
    }

    /// Untracked stock always covers the request.
    pub fn has_stock_for(&self, quantity: u32) -> bool {
        self.stock.map_or(true, |s| s.covers(quantity))
    }

    pub fn to_line_item(&self, quantity: u32) -> Result<LineItem, PricingError> {
        LineItem::new(self.id.to_string(), self.name.clone(), self.effective_unit_price(), quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn necklace() -> CatalogProduct {
        CatalogProduct {
            id: Uuid::new_v4(), name: "Gold necklace".into(), price: Money::new(dec!(2000)),
            discount_pct: None, sale_price: Some(Money::new(dec!(1600))), stock: Some(Quantity::new(3)),
        }
    }

    #[test]
    fn test_sale_price_needs_discount_pct() {
        let mut p = necklace();
        assert_eq!(p.effective_unit_price().amount(), dec!(2000));
        p.discount_pct = Some(dec!(20));
        assert_eq!(p.effective_unit_price().amount(), dec!(1600));
        p.discount_pct = Some(dec!(0));
        assert_eq!(p.effective_unit_price().amount(), dec!(2000));
    }

    #[test]
    fn test_stock() {
        let mut p = necklace();
        assert!(p.has_stock_for(3));
        assert!(!p.has_stock_for(4));
        p.stock = None;
        assert!(p.has_stock_for(100));
    }

    #[test]
    fn test_to_line_item() {
        let item = necklace().to_line_item(2).unwrap();
        assert_eq!(item.line_total().amount(), dec!(4000));
        assert!(necklace().to_line_item(0).is_err());
    }
}
