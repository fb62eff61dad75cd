//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::aggregates::Coupon;
use crate::domain::value_objects::{CouponCode, Money};
use crate::config::PricingConfig;
use crate::pricing::{compute_totals, TotalsBreakdown};
use crate::PricingError;

/// One product line as priced by the cart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: String,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
}

impl LineItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>, unit_price: Money, quantity: u32) -> Result<Self, PricingError> {
        if quantity == 0 { return Err(PricingError::InvalidQuantity); }
        Ok(Self { id: id.into(), name: name.into(), unit_price, quantity })
    }

    pub fn line_total(&self) -> Money { self.unit_price.times(self.quantity) }
}

/// Session-scoped cart: lines plus the coupon code the buyer attached.
#[derive(Clone, Debug, Default)]
pub struct Cart {
    items: Vec<LineItem>,
    coupon_code: Option<CouponCode>,
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn coupon_code(&self) -> Option<&CouponCode> { self.coupon_code.as_ref() }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn subtotal(&self) -> Money { self.items.iter().map(LineItem::line_total).sum() }

    pub fn add_item(&mut self, item: LineItem) {
        if let Some(existing) = self.items.iter_mut().find(|i| i.id == item.id) {
            existing.quantity += item.quantity;
            existing.unit_price = item.unit_price;
        } else {
            self.items.push(item);
        }
    }

    pub fn update_quantity(&mut self, item_id: &str, quantity: u32) -> Result<(), CartError> {
        let item = self.items.iter_mut().find(|i| i.id == item_id).ok_or(CartError::ItemNotFound)?;
        if quantity == 0 { self.items.retain(|i| i.id != item_id); }
        else { item.quantity = quantity; }
        Ok(())
    }

    pub fn remove_item(&mut self, item_id: &str) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.id != item_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        Ok(())
    }

    pub fn attach_coupon(&mut self, code: CouponCode) { self.coupon_code = Some(code); }
    pub fn detach_coupon(&mut self) { self.coupon_code = None; }

    pub fn clear(&mut self) { self.items.clear(); self.coupon_code = None; }

    /// Prices the cart. `coupon` is the row loaded for the attached code, if any;
    /// a coupon that no longer matches the attached code is ignored.
    pub fn totals(&self, config: &PricingConfig, coupon: Option<&Coupon>, msi_selected: bool, now: DateTime<Utc>) -> TotalsBreakdown {
        let coupon = coupon.filter(|c| self.coupon_code.as_ref() == Some(&c.code));
        compute_totals(&self.items, config, coupon, msi_selected, now)
    }
}

#[derive(Debug, Clone)] pub enum CartError { ItemNotFound }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "Item not found") }
}
